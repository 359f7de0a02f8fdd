// SPDX-License-Identifier: Apache-2.0

//! Per-variant linear delay models.
//!
//! Each interchangeable variant at a stage is characterized by sweeping the
//! load axis of its timing arc at the stage's fixed input transition and
//! fitting `delay = a * load + b` by ordinary least squares. With loads in pF
//! and delays in ns, `a` comes out in kOhm.

use crate::error::{Result, SizerError};
use crate::liberty::family::split_cell_family;
use crate::liberty::library::{TimingArc, TimingLibrary};
use serde::{Deserialize, Serialize};

/// Which arrival times the fitted models feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayConvention {
    /// One worst-case line per variant, used for both setup and hold.
    #[default]
    Nominal,
    /// Separate lines fitted to the worst-case and best-case curves.
    MinMax,
}

impl std::str::FromStr for DelayConvention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nominal" => Ok(DelayConvention::Nominal),
            "min_max" | "minmax" => Ok(DelayConvention::MinMax),
            _ => Err(format!(
                "unknown delay convention {:?}; expected nominal or min_max",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearDelay {
    /// Slope in ns/pF (kOhm).
    pub a: f64,
    /// Intercept in ns.
    pub b: f64,
}

impl LinearDelay {
    pub fn at(&self, load: f64) -> f64 {
        self.a * load + self.b
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DelayModel {
    Nominal(LinearDelay),
    Corner { max: LinearDelay, min: LinearDelay },
}

impl DelayModel {
    pub fn convention(&self) -> DelayConvention {
        match self {
            DelayModel::Nominal(_) => DelayConvention::Nominal,
            DelayModel::Corner { .. } => DelayConvention::MinMax,
        }
    }

    /// The line feeding the latest arrival (setup check).
    pub fn max(&self) -> LinearDelay {
        match self {
            DelayModel::Nominal(d) => *d,
            DelayModel::Corner { max, .. } => *max,
        }
    }

    /// The line feeding the earliest arrival (hold check).
    pub fn min(&self) -> LinearDelay {
        match self {
            DelayModel::Nominal(d) => *d,
            DelayModel::Corner { min, .. } => *min,
        }
    }
}

/// Where a variant's input capacitance came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum InputCapacitance {
    /// Recorded fan-in of the preceding stage's net; only for the placed cell.
    Measured { value: f64 },
    /// Pin capacitance from the cell library.
    Library { value: f64 },
    /// Reference capacitance scaled by the drive-strength ratio.
    Estimated { value: f64, basis: String },
}

impl InputCapacitance {
    pub fn value(&self) -> f64 {
        match self {
            InputCapacitance::Measured { value }
            | InputCapacitance::Library { value }
            | InputCapacitance::Estimated { value, .. } => *value,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, InputCapacitance::Estimated { .. })
    }
}

/// One interchangeable variant for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub cell: String,
    pub delay: DelayModel,
    pub c_in: InputCapacitance,
    pub area: Option<f64>,
}

/// What the builder needs to know about one path position.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec<'a> {
    pub instance: &'a str,
    /// The cell placed at this position in the analyzed netlist.
    pub cell: &'a str,
    pub input_pin: &'a str,
    pub output_pin: &'a str,
    /// Fixed input transition in ns.
    pub input_slew: f64,
}

/// `(load, worst_delay, best_delay)` at every load the arc was characterized
/// at.
pub fn sample_arc(
    cell: &str,
    spec: &StageSpec<'_>,
    arc: &TimingArc,
) -> Result<Vec<(f64, f64, f64)>> {
    let missing = || SizerError::MissingTable {
        cell: cell.to_string(),
        from_pin: spec.input_pin.to_string(),
        to_pin: spec.output_pin.to_string(),
    };
    let loads = arc.load_axis().ok_or_else(missing)?;
    let mut samples = Vec::with_capacity(loads.len());
    for &load in loads {
        let worst = arc
            .worst_delay(spec.input_slew, load)
            .ok_or_else(missing)?;
        let best = arc.best_delay(spec.input_slew, load).ok_or_else(missing)?;
        samples.push((load, worst, best));
    }
    Ok(samples)
}

/// Ordinary least squares fit of `y = a * x + b`.
///
/// Fewer than two samples, or no spread in `x`, yields a flat line through
/// the mean.
pub fn fit_linear(samples: &[(f64, f64)]) -> LinearDelay {
    if samples.is_empty() {
        return LinearDelay { a: 0.0, b: 0.0 };
    }
    let n = samples.len() as f64;
    let mean_x = samples.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = samples.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in samples {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if samples.len() < 2 || sxx == 0.0 {
        return LinearDelay { a: 0.0, b: mean_y };
    }
    let a = sxy / sxx;
    LinearDelay {
        a,
        b: mean_y - a * mean_x,
    }
}

fn strength_or_unit(cell: &str) -> u32 {
    split_cell_family(cell).1.unwrap_or(1).max(1)
}

fn build_choice(
    library: &TimingLibrary,
    spec: &StageSpec<'_>,
    variant: &str,
    convention: DelayConvention,
    reference: Option<&InputCapacitance>,
) -> Result<Choice> {
    let cell = library
        .get_cell(variant)
        .ok_or_else(|| SizerError::ArcNotFound {
            cell: variant.to_string(),
            from_pin: spec.input_pin.to_string(),
            to_pin: spec.output_pin.to_string(),
        })?;
    let arc = cell.find_timing_arc(spec.input_pin, spec.output_pin)?;
    let samples = sample_arc(variant, spec, arc)?;
    let worst: Vec<(f64, f64)> = samples.iter().map(|(l, w, _)| (*l, *w)).collect();
    let delay = match convention {
        DelayConvention::Nominal => DelayModel::Nominal(fit_linear(&worst)),
        DelayConvention::MinMax => {
            let best: Vec<(f64, f64)> = samples.iter().map(|(l, _, b)| (*l, *b)).collect();
            DelayModel::Corner {
                max: fit_linear(&worst),
                min: fit_linear(&best),
            }
        }
    };

    let c_in = match reference {
        Some(reference) if variant == spec.cell => reference.clone(),
        Some(reference) => {
            let ratio = strength_or_unit(variant) as f64 / strength_or_unit(spec.cell) as f64;
            let value = reference.value() * ratio;
            log::warn!(
                "{}: estimated input capacitance of {} as {:.6} pF ({} x {:.3})",
                spec.instance,
                variant,
                value,
                spec.cell,
                ratio
            );
            InputCapacitance::Estimated {
                value,
                basis: spec.cell.to_string(),
            }
        }
        None => match cell.pin_capacitance(spec.input_pin) {
            Some(value) => InputCapacitance::Library { value },
            None => {
                return Err(SizerError::data(
                    format!("stage {}", spec.instance),
                    format!(
                        "no input capacitance known for {} pin {}",
                        variant, spec.input_pin
                    ),
                ))
            }
        },
    };

    Ok(Choice {
        cell: variant.to_string(),
        delay,
        c_in,
        area: cell.area,
    })
}

/// Builds the choice list for one stage, one entry per usable family
/// variant in ascending drive strength.
///
/// `measured_fan_in` is the input capacitance the preceding stage's net
/// actually sees at this position; it is attributed to the placed cell.
/// Variants missing the required arc or its tables are left out.
pub fn build_choices(
    spec: &StageSpec<'_>,
    library: &TimingLibrary,
    convention: DelayConvention,
    measured_fan_in: Option<f64>,
) -> Result<Vec<Choice>> {
    let reference = match measured_fan_in {
        Some(value) => Some(InputCapacitance::Measured { value }),
        None => library
            .get_cell(spec.cell)
            .and_then(|c| c.pin_capacitance(spec.input_pin))
            .map(|value| InputCapacitance::Library { value }),
    };

    let mut choices = Vec::new();
    for variant in library.family_variants(spec.cell) {
        match build_choice(library, spec, &variant, convention, reference.as_ref()) {
            Ok(choice) => choices.push(choice),
            Err(e) if e.is_recoverable() => {
                log::debug!("{}: dropping variant {}: {}", spec.instance, variant, e);
            }
            Err(e) => return Err(e),
        }
    }
    if choices.is_empty() {
        return Err(SizerError::data(
            format!("stage {}", spec.instance),
            format!(
                "no usable variants of {} for arc {}->{}",
                spec.cell, spec.input_pin, spec.output_pin
            ),
        ));
    }
    Ok(choices)
}
