// SPDX-License-Identifier: Apache-2.0

//! Drive-strength selection for the gates on a timing-critical path.
//!
//! The flow reads a Liberty cell library and SPEF parasitics, linearizes each
//! interchangeable cell variant's delay around the path's operating point,
//! and searches for one variant per stage that meets setup and hold under
//! that model, checking every candidate against an external timing tool.

pub mod delay_model;
pub mod error;
pub mod liberty;
pub mod oracle;
pub mod path_model;
pub mod refine;
pub mod solution;
pub mod solver;
pub mod spef;
pub mod units;

pub use error::{Result, SizerError};

#[cfg(test)]
pub(crate) mod test_utils {
    use crate::delay_model::{Choice, DelayConvention, DelayModel, InputCapacitance, LinearDelay};
    use crate::path_model::{
        ClockToOutput, GlobalTiming, Net, NetSink, PathArtifact, PathModel, Stage, StageKind,
    };
    use crate::spef::SpefFile;
    use rand::Rng;

    pub const SAMPLE_PATH_JSON: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/critical_path.json"));
    pub const SAMPLE_SPEF: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/critical_path.spef"));

    pub fn sample_artifact() -> PathArtifact {
        serde_json::from_str(SAMPLE_PATH_JSON).expect("fixture path artifact parses")
    }

    pub fn sample_spef() -> SpefFile {
        SpefFile::parse_str(SAMPLE_SPEF, "critical_path.spef").expect("fixture spef parses")
    }

    pub const X1: usize = 0;
    pub const X2: usize = 1;

    fn choice(cell: &str, a: f64, b: f64, c_in: f64) -> Choice {
        Choice {
            cell: cell.to_string(),
            delay: DelayModel::Nominal(LinearDelay { a, b }),
            c_in: InputCapacitance::Library { value: c_in },
            area: None,
        }
    }

    fn buffer_stage(index: usize) -> Stage {
        Stage {
            index,
            instance: format!("u{}", index + 1),
            cell: "BUF_X1".to_string(),
            input_pin: "A".to_string(),
            output_pin: "X".to_string(),
            input_slew: 0.05,
            kind: StageKind::Buffer,
            choices: vec![
                choice("BUF_X1", 2.0, 0.1, 0.02),
                choice("BUF_X2", 1.0, 0.12, 0.03),
            ],
        }
    }

    /// Two buffers in a row, each with choices X1 (a=2.0, b=0.1, C_in=0.02)
    /// and X2 (a=1.0, b=0.12, C_in=0.03); both nets 0.03 pF / 0.1 kOhm; the
    /// endpoint loads 0.02 pF. Setup 0.08, hold 0.04, no skew, clk->q 0.1.
    pub fn two_stage_model(period: f64) -> PathModel {
        let net = |i: usize, sink: NetSink| Net {
            id: format!("n{}", i + 1),
            source: i,
            sink,
            wire_capacitance: 0.03,
            wire_resistance: 0.1,
        };
        PathModel {
            stages: vec![buffer_stage(0), buffer_stage(1)],
            nets: vec![
                net(0, NetSink::Stage(1)),
                net(
                    1,
                    NetSink::Terminal {
                        fixed_capacitance: Some(0.02),
                    },
                ),
            ],
            timing: GlobalTiming {
                period,
                skew: 0.0,
                setup_margin: 0.08,
                hold_margin: 0.04,
                clock_to_output: ClockToOutput::Single(0.1),
            },
            convention: DelayConvention::Nominal,
        }
    }

    /// A random chain of one to four stages with one to three choices each,
    /// and a period somewhere around the achievable arrival times.
    pub fn synthetic_chain(rng: &mut impl Rng) -> PathModel {
        let stage_count = rng.gen_range(1..=4);
        let mut stages = Vec::new();
        let mut nets = Vec::new();
        for i in 0..stage_count {
            let choice_count = rng.gen_range(1..=3);
            let choices = (0..choice_count)
                .map(|c| {
                    choice(
                        &format!("CELL_{}", c),
                        rng.gen_range(0.2..3.0),
                        rng.gen_range(0.02..0.2),
                        rng.gen_range(0.001..0.05),
                    )
                })
                .collect();
            stages.push(Stage {
                index: i,
                instance: format!("s{}", i),
                cell: "CELL_0".to_string(),
                input_pin: "A".to_string(),
                output_pin: "Y".to_string(),
                input_slew: 0.05,
                kind: StageKind::Combinational,
                choices,
            });
            let sink = if i + 1 < stage_count {
                NetSink::Stage(i + 1)
            } else {
                NetSink::Terminal {
                    fixed_capacitance: Some(rng.gen_range(0.001..0.05)),
                }
            };
            nets.push(Net {
                id: format!("w{}", i),
                source: i,
                sink,
                wire_capacitance: rng.gen_range(0.0..0.05),
                wire_resistance: rng.gen_range(0.0..0.5),
            });
        }
        PathModel {
            stages,
            nets,
            timing: GlobalTiming {
                period: rng.gen_range(0.2..2.0),
                skew: 0.0,
                setup_margin: 0.05,
                hold_margin: 0.02,
                clock_to_output: ClockToOutput::Single(0.1),
            },
            convention: DelayConvention::Nominal,
        }
    }
}
