// SPDX-License-Identifier: Apache-2.0

//! Ground-truth timing for candidate assignments.
//!
//! The authoritative oracle is a static timing analysis tool kept running as
//! a child process and driven over its command line: the candidate is
//! written as a solution file, applied, and the worst setup and hold slacks
//! are read back. A reader thread drains the tool's stdout into a channel so
//! no output is lost while the caller is not reading.

use crate::error::{Result, SizerError};
use crate::path_model::PathModel;
use crate::solution::write_solution;
use crate::solver::{estimate_timing, Assignment};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::JoinHandle;

/// Worst slacks in ns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredSlack {
    pub setup: f64,
    pub hold: f64,
}

impl MeasuredSlack {
    pub fn is_met(&self) -> bool {
        self.setup >= 0.0 && self.hold >= 0.0
    }
}

pub trait TimingOracle {
    fn measure(&mut self, model: &PathModel, assignment: &Assignment) -> Result<MeasuredSlack>;
}

/// Trusts the linear model; used for dry runs without a timing tool.
#[derive(Debug, Default)]
pub struct ModelOracle;

impl TimingOracle for ModelOracle {
    fn measure(&mut self, model: &PathModel, assignment: &Assignment) -> Result<MeasuredSlack> {
        let timing = estimate_timing(model, assignment);
        Ok(MeasuredSlack {
            setup: timing.setup_slack,
            hold: timing.hold_slack,
        })
    }
}

fn default_args() -> Vec<String> {
    vec!["-no_init".to_string()]
}

fn default_setup_script() -> Option<String> {
    Some("setup_sta.tcl".to_string())
}

fn default_solution_path() -> PathBuf {
    PathBuf::from("buffers.sol")
}

fn default_apply_command() -> String {
    "apply_buffer_solution".to_string()
}

fn default_measure_command() -> String {
    "compute_worst_slacks".to_string()
}

fn default_setup_marker() -> String {
    "worst slack max".to_string()
}

fn default_hold_marker() -> String {
    "worst slack min".to_string()
}

fn default_exit_command() -> String {
    "exit".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OracleConfig {
    pub command: String,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Sourced once after start-up; an empty string disables it.
    #[serde(default = "default_setup_script")]
    pub setup_script: Option<String>,
    #[serde(default = "default_solution_path")]
    pub solution_path: PathBuf,
    #[serde(default = "default_apply_command")]
    pub apply_command: String,
    #[serde(default = "default_measure_command")]
    pub measure_command: String,
    #[serde(default = "default_setup_marker")]
    pub setup_marker: String,
    #[serde(default = "default_hold_marker")]
    pub hold_marker: String,
    #[serde(default = "default_exit_command")]
    pub exit_command: String,
}

impl OracleConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: default_args(),
            setup_script: default_setup_script(),
            solution_path: default_solution_path(),
            apply_command: default_apply_command(),
            measure_command: default_measure_command(),
            setup_marker: default_setup_marker(),
            hold_marker: default_hold_marker(),
            exit_command: default_exit_command(),
        }
    }
}

/// Numeric value on the last line starting with `marker`, taken from the
/// line's final token.
fn marker_value(lines: &[String], marker: &str) -> Result<f64> {
    let line = lines
        .iter()
        .rev()
        .find(|l| l.starts_with(marker))
        .ok_or_else(|| SizerError::OracleProtocol(format!("no {:?} line in output", marker)))?;
    let token = line.split_whitespace().last().unwrap_or("");
    token.parse::<f64>().map_err(|e| {
        SizerError::OracleProtocol(format!("cannot parse {:?} from {:?}: {}", token, line, e))
    })
}

/// A running timing tool driven line by line.
pub struct StaSession {
    config: OracleConfig,
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl StaSession {
    pub fn spawn(config: &OracleConfig) -> Result<Self> {
        log::info!("starting timing oracle: {} {:?}", config.command, config.args);
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SizerError::io(Path::new(&config.command), e))?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SizerError::OracleProtocol("oracle stdout unavailable".to_string()))?;
        let (tx, rx) = mpsc::channel::<String>();
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        let mut session = Self {
            config: config.clone(),
            child,
            stdin,
            lines: rx,
            reader: Some(reader),
            closed: false,
        };
        if let Some(script) = config.setup_script.as_deref().filter(|s| !s.is_empty()) {
            session.send(&format!("source {}", script))?;
        }
        Ok(session)
    }

    pub fn send(&mut self, command: &str) -> Result<()> {
        log::debug!("oracle <- {}", command);
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SizerError::OracleProtocol("oracle input already closed".to_string()))?;
        writeln!(stdin, "{}", command)
            .and_then(|_| stdin.flush())
            .map_err(|e| {
                SizerError::OracleProtocol(format!("failed sending {:?}: {}", command, e))
            })
    }

    /// Blocks until a line starting with one of `markers` arrives; returns
    /// every line read, the marker line last.
    pub fn read_until(&mut self, markers: &[&str]) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            match self.lines.recv() {
                Ok(line) => {
                    let done = markers.iter().any(|m| line.starts_with(m));
                    lines.push(line);
                    if done {
                        return Ok(lines);
                    }
                }
                Err(_) => {
                    return Err(SizerError::OracleProtocol(format!(
                        "oracle output ended before any of {:?} (read {} lines)",
                        markers,
                        lines.len()
                    )))
                }
            }
        }
    }

    /// Sends the exit command and waits for the process.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let exit_command = self.config.exit_command.clone();
        let sent = self.send(&exit_command);
        self.stdin = None;
        let status = self
            .child
            .wait()
            .map_err(|e| SizerError::io(Path::new(&self.config.command), e))?;
        log::debug!("timing oracle exited with {}", status);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        sent
    }
}

impl TimingOracle for StaSession {
    fn measure(&mut self, model: &PathModel, assignment: &Assignment) -> Result<MeasuredSlack> {
        let solution_path = self.config.solution_path.clone();
        write_solution(&solution_path, model, assignment)?;
        let apply = format!("{} {}", self.config.apply_command, solution_path.display());
        self.send(&apply)?;
        let measure = self.config.measure_command.clone();
        self.send(&measure)?;
        let hold_marker = self.config.hold_marker.clone();
        let lines = self.read_until(&[hold_marker.as_str()])?;
        Ok(MeasuredSlack {
            setup: marker_value(&lines, &self.config.setup_marker)?,
            hold: marker_value(&lines, &hold_marker)?,
        })
    }
}

impl Drop for StaSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::debug!("closing timing oracle: {}", e);
        }
    }
}
