// SPDX-License-Identifier: Apache-2.0

//! The path under optimization: an ordered chain of stages, each driving
//! exactly one net, plus the clocking budget the chain has to fit in.
//!
//! A model is assembled from the path-extraction artifact (JSON emitted by
//! the timing tool), the cell library and the extracted parasitics, and can
//! be written back out as JSON so that solving does not need to re-read the
//! library.

use crate::delay_model::{build_choices, Choice, DelayConvention, StageSpec};
use crate::error::{Result, SizerError};
use crate::liberty::library::TimingLibrary;
use crate::spef::SpefFile;
use crate::units::PS_TO_NS;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Accepts a number, a numeric string, an empty string or null.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clock_period_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clock_skew_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub t_setup_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub t_hold_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clk_q_max_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clk_q_min_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub clock_frequency_hz: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_slack_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub launch_clock_arrival_ps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub capture_clock_arrival_ps: Option<f64>,
}

impl PathSummary {
    /// Clock skew in ps; derived from the clock arrivals when the reported
    /// skew is missing or zero.
    pub fn effective_skew_ps(&self) -> f64 {
        match (self.clock_skew_ps, self.launch_clock_arrival_ps, self.capture_clock_arrival_ps) {
            (Some(skew), _, _) if skew != 0.0 => skew,
            (_, Some(launch), Some(capture)) => capture - launch,
            (skew, _, _) => skew.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPin {
    pub pin_name: String,
    #[serde(default)]
    pub cell: Option<String>,
    #[serde(default)]
    pub is_port: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    #[serde(default)]
    pub stage_index: usize,
    pub instance: String,
    pub cell: String,
    /// Either `pin` or `instance/pin`.
    pub input_pin: String,
    pub driver_pin_name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub input_slew_ps: Option<f64>,
    #[serde(default)]
    pub net: String,
    #[serde(default)]
    pub load_pins: Vec<LoadPin>,
}

/// The path-extraction artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathArtifact {
    pub summary: PathSummary,
    pub stages: Vec<StageRecord>,
}

impl PathArtifact {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| SizerError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| SizerError::data(path.display().to_string(), e.to_string()))
    }
}

fn pin_basename(pin: &str) -> &str {
    pin.rsplit('/').next().unwrap_or(pin)
}

/// Sum of library input capacitance over the non-port pins a stage drives;
/// `None` when the record lists no load pins at all.
fn downstream_fan_in(record: &StageRecord, library: &TimingLibrary) -> Option<f64> {
    if record.load_pins.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for load in record.load_pins.iter().filter(|l| !l.is_port) {
        let Some(cell) = load.cell.as_deref().and_then(|c| library.get_cell(c)) else {
            log::debug!(
                "{}: load pin {} has no library cell; not counted",
                record.instance,
                load.pin_name
            );
            continue;
        };
        if let Some(cap) = cell.pin_capacitance(pin_basename(&load.pin_name)) {
            total += cap;
        }
    }
    Some(total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Buffer,
    Combinational,
}

impl StageKind {
    pub fn of_cell(cell: &str) -> Self {
        if cell.contains("buf") || cell.contains("dly") {
            StageKind::Buffer
        } else {
            StageKind::Combinational
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub index: usize,
    pub instance: String,
    /// Cell placed here in the analyzed netlist.
    pub cell: String,
    pub input_pin: String,
    pub output_pin: String,
    /// ns
    pub input_slew: f64,
    pub kind: StageKind,
    pub choices: Vec<Choice>,
}

impl Stage {
    pub fn choice_index(&self, cell: &str) -> Option<usize> {
        self.choices.iter().position(|c| c.cell == cell)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetSink {
    Stage(usize),
    /// The path endpoint; its load does not depend on any choice.
    Terminal { fixed_capacitance: Option<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Net {
    pub id: String,
    pub source: usize,
    pub sink: NetSink,
    /// pF
    pub wire_capacitance: f64,
    /// kOhm
    pub wire_resistance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockToOutput {
    Single(f64),
    Split { max: f64, min: f64 },
}

impl ClockToOutput {
    pub fn max(&self) -> f64 {
        match self {
            ClockToOutput::Single(v) => *v,
            ClockToOutput::Split { max, .. } => *max,
        }
    }

    pub fn min(&self) -> f64 {
        match self {
            ClockToOutput::Single(v) => *v,
            ClockToOutput::Split { min, .. } => *min,
        }
    }
}

/// Clocking budget, in ns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalTiming {
    pub period: f64,
    pub skew: f64,
    pub setup_margin: f64,
    pub hold_margin: f64,
    pub clock_to_output: ClockToOutput,
}

impl GlobalTiming {
    /// Latest allowed data arrival.
    pub fn setup_required(&self) -> f64 {
        self.period - self.setup_margin - self.skew
    }

    /// Earliest allowed data arrival.
    pub fn hold_required(&self) -> f64 {
        self.hold_margin + self.skew
    }

    pub fn from_summary(summary: &PathSummary, convention: DelayConvention) -> Result<Self> {
        let period = summary
            .clock_period_ps
            .ok_or_else(|| SizerError::data("path summary", "clock_period_ps is missing"))?;
        let clk_q_max = summary.clk_q_max_ps.or(summary.clk_q_min_ps);
        let clk_q_min = summary.clk_q_min_ps.or(summary.clk_q_max_ps);
        if clk_q_max.is_none() {
            log::warn!("path summary has no clock-to-output delay; assuming 0");
        }
        let clk_q_max = clk_q_max.unwrap_or(0.0) * PS_TO_NS;
        let clk_q_min = clk_q_min.unwrap_or(0.0) * PS_TO_NS;
        let clock_to_output = match convention {
            DelayConvention::Nominal => ClockToOutput::Single(clk_q_max),
            DelayConvention::MinMax => ClockToOutput::Split {
                max: clk_q_max,
                min: clk_q_min,
            },
        };
        Ok(GlobalTiming {
            period: period * PS_TO_NS,
            skew: summary.effective_skew_ps() * PS_TO_NS,
            setup_margin: summary.t_setup_ps.unwrap_or(0.0) * PS_TO_NS,
            hold_margin: summary.t_hold_ps.unwrap_or(0.0) * PS_TO_NS,
            clock_to_output,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathModel {
    pub stages: Vec<Stage>,
    /// `nets[i]` is driven by `stages[i]`.
    pub nets: Vec<Net>,
    pub timing: GlobalTiming,
    pub convention: DelayConvention,
}

impl PathModel {
    pub fn build(
        artifact: &PathArtifact,
        library: &TimingLibrary,
        spef: Option<&SpefFile>,
        convention: DelayConvention,
    ) -> Result<Self> {
        if artifact.stages.is_empty() {
            return Err(SizerError::data("path artifact", "path has no stages"));
        }
        let mut records: Vec<&StageRecord> = artifact.stages.iter().collect();
        records.sort_by_key(|r| r.stage_index);
        let fan_ins: Vec<Option<f64>> = records
            .iter()
            .map(|r| downstream_fan_in(r, library))
            .collect();

        let mut stages = Vec::with_capacity(records.len());
        let mut nets = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let input_pin = pin_basename(&record.input_pin);
            let output_pin = pin_basename(&record.driver_pin_name);
            if input_pin.is_empty() || output_pin.is_empty() {
                return Err(SizerError::data(
                    format!("stage {}", record.instance),
                    "stage record is missing its input or driver pin",
                ));
            }
            let input_slew = record.input_slew_ps.unwrap_or(0.0) * PS_TO_NS;
            let measured_fan_in = if i == 0 {
                None
            } else {
                fan_ins[i - 1].filter(|c| *c > 0.0)
            };
            let spec = StageSpec {
                instance: &record.instance,
                cell: &record.cell,
                input_pin,
                output_pin,
                input_slew,
            };
            let choices = build_choices(&spec, library, convention, measured_fan_in)?;
            log::debug!(
                "stage {} ({}): {} choices",
                record.instance,
                record.cell,
                choices.len()
            );
            stages.push(Stage {
                index: i,
                instance: record.instance.clone(),
                cell: record.cell.clone(),
                input_pin: input_pin.to_string(),
                output_pin: output_pin.to_string(),
                input_slew,
                kind: StageKind::of_cell(&record.cell),
                choices,
            });

            let sink = if i + 1 < records.len() {
                NetSink::Stage(i + 1)
            } else {
                NetSink::Terminal {
                    fixed_capacitance: fan_ins[i],
                }
            };
            let parasitics = spef.map(|s| s.net_info(&record.net)).unwrap_or_default();
            nets.push(Net {
                id: record.net.clone(),
                source: i,
                sink,
                wire_capacitance: parasitics.wire_capacitance,
                wire_resistance: parasitics.wire_resistance,
            });
        }

        let model = PathModel {
            stages,
            nets,
            timing: GlobalTiming::from_summary(&artifact.summary, convention)?,
            convention,
        };
        model.validate()?;
        log::info!(
            "Built path model: {} stages, {} candidate assignments",
            model.stages.len(),
            model.choice_space_size()
        );
        Ok(model)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let model: PathModel =
            serde_json::from_str(text).map_err(|e| SizerError::data("path model", e.to_string()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SizerError::data("path model", e.to_string()))
    }

    /// Checks the chain shape and that every choice uses the model's delay
    /// convention.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(SizerError::data("path model", "path has no stages"));
        }
        if self.nets.len() != self.stages.len() {
            return Err(SizerError::data(
                "path model",
                format!(
                    "{} stages but {} nets",
                    self.stages.len(),
                    self.nets.len()
                ),
            ));
        }
        let last = self.stages.len() - 1;
        for (i, (stage, net)) in self.stages.iter().zip(&self.nets).enumerate() {
            let connectivity = |message: String| SizerError::Connectivity {
                stage: stage.instance.clone(),
                net: net.id.clone(),
                message,
            };
            if net.source != i {
                return Err(connectivity(format!(
                    "net is driven by stage {} but listed at position {}",
                    net.source, i
                )));
            }
            match net.sink {
                NetSink::Stage(next) if i < last && next == i + 1 => {}
                NetSink::Stage(next) => {
                    return Err(connectivity(format!("net sinks at unexpected stage {}", next)));
                }
                NetSink::Terminal { .. } if i < last => {
                    return Err(connectivity("intermediate net ends at a terminal".to_string()));
                }
                NetSink::Terminal {
                    fixed_capacitance: None,
                } => {
                    return Err(connectivity(
                        "terminal net has no fixed downstream capacitance".to_string(),
                    ));
                }
                NetSink::Terminal { .. } => {}
            }
            if stage.choices.is_empty() {
                return Err(SizerError::data(
                    format!("stage {}", stage.instance),
                    "stage has no choices",
                ));
            }
            if let Some(choice) = stage
                .choices
                .iter()
                .find(|c| c.delay.convention() != self.convention)
            {
                return Err(SizerError::data(
                    format!("stage {}", stage.instance),
                    format!(
                        "choice {} uses the {:?} delay convention in a {:?} model",
                        choice.cell,
                        choice.delay.convention(),
                        self.convention
                    ),
                ));
            }
        }
        if self.convention == DelayConvention::Nominal
            && matches!(self.timing.clock_to_output, ClockToOutput::Split { .. })
        {
            return Err(SizerError::data(
                "path model",
                "split clock-to-output delays in a nominal model",
            ));
        }
        Ok(())
    }

    /// Number of distinct assignments; saturates at `u128::MAX`.
    pub fn choice_space_size(&self) -> u128 {
        self.stages
            .iter()
            .fold(1u128, |acc, s| acc.saturating_mul(s.choices.len() as u128))
    }

    pub fn stage_by_id(&self, instance: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.instance == instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::test_utils::buffer_library;
    use crate::test_utils::{sample_artifact, sample_spef};
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_accepts_loose_numbers() {
        let summary: PathSummary = serde_json::from_str(
            r#"{"clock_period_ps": "1000", "clock_skew_ps": "", "t_setup_ps": null,
                "t_hold_ps": 40, "launch_clock_arrival_ps": 5.0,
                "capture_clock_arrival_ps": 12.5}"#,
        )
        .unwrap();
        assert_eq!(summary.clock_period_ps, Some(1000.0));
        assert_eq!(summary.clock_skew_ps, None);
        assert_eq!(summary.t_setup_ps, None);
        assert_eq!(summary.t_hold_ps, Some(40.0));
        assert_eq!(summary.effective_skew_ps(), 7.5);
    }

    #[test]
    fn reported_skew_wins_when_nonzero() {
        let summary = PathSummary {
            clock_skew_ps: Some(-3.0),
            launch_clock_arrival_ps: Some(0.0),
            capture_clock_arrival_ps: Some(10.0),
            ..Default::default()
        };
        assert_eq!(summary.effective_skew_ps(), -3.0);
    }

    #[test]
    fn stage_kind_from_cell_name() {
        assert_eq!(StageKind::of_cell("sky130_fd_sc_hd__clkbuf_4"), StageKind::Buffer);
        assert_eq!(StageKind::of_cell("sky130_fd_sc_hd__dlygate4sd3_1"), StageKind::Buffer);
        assert_eq!(StageKind::of_cell("sky130_fd_sc_hd__nand2_1"), StageKind::Combinational);
    }

    #[test]
    fn builds_model_from_artifact() {
        let _ = env_logger::builder().is_test(true).try_init();
        let library = buffer_library();
        let spef = sample_spef();
        let model = PathModel::build(
            &sample_artifact(),
            &library,
            Some(&spef),
            DelayConvention::Nominal,
        )
        .unwrap();
        assert_eq!(model.stages.len(), 2);
        assert_eq!(model.stages[0].instance, "_201_");
        assert_eq!(model.stages[0].kind, StageKind::Buffer);
        assert!((model.stages[0].input_slew - 0.05).abs() < 1e-12);
        assert_eq!(model.nets[0].sink, NetSink::Stage(1));
        assert!((model.nets[0].wire_capacitance - 0.03).abs() < 1e-12);
        assert!((model.nets[0].wire_resistance - 0.1).abs() < 1e-12);
        // Flop D pin only; the output port is not counted.
        assert_eq!(
            model.nets[1].sink,
            NetSink::Terminal {
                fixed_capacitance: Some(0.0017)
            }
        );
        assert!((model.timing.period - 1.0).abs() < 1e-12);
        assert!((model.timing.setup_required() - 0.92).abs() < 1e-12);
        assert_eq!(model.timing.clock_to_output, ClockToOutput::Single(0.1));
        // Placed cell at stage 2 carries the measured fan-in of net 1.
        let placed = model.stages[1].choice_index("sky130_fd_sc_hd__buf_2").unwrap();
        assert!(!model.stages[1].choices[placed].c_in.is_estimate());
        assert_eq!(model.choice_space_size(), 9);
        assert!(model.stage_by_id("_202_").is_some());
    }

    #[test]
    fn json_round_trip_preserves_model() {
        let library = buffer_library();
        let model =
            PathModel::build(&sample_artifact(), &library, None, DelayConvention::MinMax).unwrap();
        let text = model.to_json().unwrap();
        assert_eq!(PathModel::from_json(&text).unwrap(), model);
        assert!(matches!(
            model.timing.clock_to_output,
            ClockToOutput::Split { .. }
        ));
    }

    #[test]
    fn terminal_without_loads_is_a_connectivity_error() {
        let library = buffer_library();
        let mut artifact = sample_artifact();
        let terminal = artifact
            .stages
            .iter_mut()
            .max_by_key(|r| r.stage_index)
            .unwrap();
        assert_eq!(terminal.instance, "_202_");
        terminal.load_pins.clear();
        let err = PathModel::build(&artifact, &library, None, DelayConvention::Nominal).unwrap_err();
        assert!(matches!(err, SizerError::Connectivity { .. }), "{}", err);
    }

    #[test]
    fn mixed_conventions_are_rejected() {
        let library = buffer_library();
        let mut model =
            PathModel::build(&sample_artifact(), &library, None, DelayConvention::Nominal).unwrap();
        let minmax =
            PathModel::build(&sample_artifact(), &library, None, DelayConvention::MinMax).unwrap();
        model.stages[0].choices[0] = minmax.stages[0].choices[0].clone();
        assert!(matches!(model.validate(), Err(SizerError::Data { .. })));
    }

    #[test]
    fn missing_period_is_a_data_error() {
        let library = buffer_library();
        let mut artifact = sample_artifact();
        artifact.summary.clock_period_ps = None;
        let err = PathModel::build(&artifact, &library, None, DelayConvention::Nominal).unwrap_err();
        assert!(err.to_string().contains("clock_period_ps"), "{}", err);
    }
}
