// SPDX-License-Identifier: Apache-2.0

//! Two-dimensional NLDM delay tables and their bilinear lookup.
//!
//! `index_1` is always the input transition axis and `index_2` the output
//! load axis; the library loader transposes tables whose template declares
//! the opposite order. Values are stored row-major, one row per `index_1`
//! entry.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum TableShapeError {
    EmptyAxis {
        axis: &'static str,
    },
    DecreasingAxis {
        axis: &'static str,
        position: usize,
    },
    InvalidValueCount {
        dimensions: (usize, usize),
        expected_values: usize,
        actual_values: usize,
    },
    NonFinite {
        field: &'static str,
        position: usize,
    },
}

impl fmt::Display for TableShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableShapeError::EmptyAxis { axis } => write!(f, "timing table {} is empty", axis),
            TableShapeError::DecreasingAxis { axis, position } => write!(
                f,
                "timing table {} decreases at position {}",
                axis, position
            ),
            TableShapeError::InvalidValueCount {
                dimensions,
                expected_values,
                actual_values,
            } => write!(
                f,
                "timing table shape {:?} expects {} values, found {}",
                dimensions, expected_values, actual_values
            ),
            TableShapeError::NonFinite { field, position } => write!(
                f,
                "timing table {} has a non-finite entry at position {}",
                field, position
            ),
        }
    }
}

impl std::error::Error for TableShapeError {}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DelayTable {
    index_1: Vec<f64>,
    index_2: Vec<f64>,
    values: Vec<f64>,
}

fn check_finite(field: &'static str, values: &[f64]) -> Result<(), TableShapeError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(position) => Err(TableShapeError::NonFinite { field, position }),
        None => Ok(()),
    }
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<(), TableShapeError> {
    if values.is_empty() {
        return Err(TableShapeError::EmptyAxis { axis });
    }
    check_finite(axis, values)?;
    for (i, pair) in values.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(TableShapeError::DecreasingAxis {
                axis,
                position: i + 1,
            });
        }
    }
    Ok(())
}

/// Locates the bracketing interval for `value` on a sorted axis.
///
/// Returns `(lo, hi, t)` with `t` in `[0, 1]`; the value is clamped to the
/// axis range first, so lookups never extrapolate.
fn find_interval(axis: &[f64], value: f64) -> (usize, usize, f64) {
    if axis.len() == 1 {
        return (0, 0, 0.0);
    }
    let last = axis.len() - 1;
    let value = value.clamp(axis[0], axis[last]);
    for lo in 0..last {
        let (low, high) = (axis[lo], axis[lo + 1]);
        if low <= value && value <= high {
            let span = high - low;
            let t = if span == 0.0 {
                0.0
            } else {
                (value - low) / span
            };
            return (lo, lo + 1, t);
        }
    }
    (last - 1, last, 0.0)
}

/// Exact at both ends: `t == 0` gives `v1` and `t == 1` gives `v2`.
fn lerp(v1: f64, v2: f64, t: f64) -> f64 {
    if t >= 1.0 {
        return v2;
    }
    v1 + (v2 - v1) * t
}

impl DelayTable {
    /// Builds a table from axes plus a row-major value matrix, validating
    /// that the axes are non-empty and non-decreasing and that the matrix is
    /// `|index_1| x |index_2|`.
    pub fn new(
        index_1: Vec<f64>,
        index_2: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, TableShapeError> {
        check_axis("index_1", &index_1)?;
        check_axis("index_2", &index_2)?;
        check_finite("values", &values)?;
        let expected_values = index_1.len() * index_2.len();
        if values.len() != expected_values {
            return Err(TableShapeError::InvalidValueCount {
                dimensions: (index_1.len(), index_2.len()),
                expected_values,
                actual_values: values.len(),
            });
        }
        Ok(Self {
            index_1,
            index_2,
            values,
        })
    }

    /// Input transition axis.
    pub fn index_1(&self) -> &[f64] {
        &self.index_1
    }

    /// Output load axis.
    pub fn index_2(&self) -> &[f64] {
        &self.index_2
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.index_1.len(), self.index_2.len())
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.index_1.len() || j >= self.index_2.len() {
            return None;
        }
        self.values.get(i * self.index_2.len() + j).copied()
    }

    fn at(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.index_2.len() + j]
    }

    /// Same table with every axis entry and value multiplied through; used to
    /// bring library units to ns/pF.
    pub fn scaled(&self, index_1_scale: f64, index_2_scale: f64, value_scale: f64) -> Self {
        Self {
            index_1: self.index_1.iter().map(|v| v * index_1_scale).collect(),
            index_2: self.index_2.iter().map(|v| v * index_2_scale).collect(),
            values: self.values.iter().map(|v| v * value_scale).collect(),
        }
    }

    /// Swaps the two axes.
    pub fn transposed(&self) -> Self {
        let (rows, cols) = self.dimensions();
        let mut values = Vec::with_capacity(self.values.len());
        for j in 0..cols {
            for i in 0..rows {
                values.push(self.at(i, j));
            }
        }
        Self {
            index_1: self.index_2.clone(),
            index_2: self.index_1.clone(),
            values,
        }
    }

    /// Bilinear interpolation at (transition `x`, load `y`).
    ///
    /// Queries outside the characterized range are clamped to the edge of the
    /// table. Single-row and single-column tables interpolate along the
    /// remaining axis only.
    pub fn lookup(&self, x: f64, y: f64) -> f64 {
        match self.dimensions() {
            (1, 1) => self.at(0, 0),
            (1, _) => {
                let (j1, j2, ty) = find_interval(&self.index_2, y);
                lerp(self.at(0, j1), self.at(0, j2), ty)
            }
            (_, 1) => {
                let (i1, i2, tx) = find_interval(&self.index_1, x);
                lerp(self.at(i1, 0), self.at(i2, 0), tx)
            }
            _ => {
                let (i1, i2, tx) = find_interval(&self.index_1, x);
                let (j1, j2, ty) = find_interval(&self.index_2, y);
                // Along the load axis at both bracketing transition rows,
                // then across transition.
                let r1 = lerp(self.at(i1, j1), self.at(i1, j2), ty);
                let r2 = lerp(self.at(i2, j1), self.at(i2, j2), ty);
                lerp(r1, r2, tx)
            }
        }
    }
}
