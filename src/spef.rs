// SPDX-License-Identifier: Apache-2.0

//! Reader for Standard Parasitic Exchange Format (SPEF) files.
//!
//! Only what the Elmore model needs is kept: per net, the capacitance that
//! belongs to the wire itself (as opposed to pin terminals) and one lumped
//! resistance. Segment-level RC topology is flattened away.
//!
//! The header (units, delimiter, `*NAME_MAP`) is read first; every node
//! reference in the net blocks is resolved through the alias table before
//! use.

use crate::error::{Result, SizerError};
use crate::units::{parse_capacitance_unit, parse_resistance_unit};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct NetParasitics {
    pub name: String,
    /// As declared on the `*D_NET` line, in pF.
    pub total_capacitance: f64,
    /// Ground and coupling capacitance not attributed to a connected pin, in pF.
    pub wire_capacitance: f64,
    /// Capacitance declared on pin-connected nodes, in pF.
    pub pin_capacitance: BTreeMap<String, f64>,
    /// Sum of all resistor segments, in kOhm.
    pub wire_resistance: f64,
}

/// What the path model reads for a net; zeros for nets without parasitics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetInfo {
    pub wire_capacitance: f64,
    pub wire_resistance: f64,
}

#[derive(Debug)]
pub struct SpefFile {
    pub design: Option<String>,
    nets: HashMap<String, NetParasitics>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Conn,
    Cap,
    Res,
    Other,
}

struct SpefReader<'a> {
    origin: &'a str,
    lines: Vec<(usize, &'a str)>,
    pos: usize,
    name_map: HashMap<String, String>,
    delimiter: char,
    cap_to_pf: f64,
    res_to_kohm: f64,
    design: Option<String>,
}

fn unescape(name: &str) -> String {
    name.replace('\\', "")
}

impl<'a> SpefReader<'a> {
    fn new(origin: &'a str, text: &'a str) -> Self {
        let lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with("//"))
            .collect();
        Self {
            origin,
            lines,
            pos: 0,
            name_map: HashMap::new(),
            delimiter: ':',
            cap_to_pf: 1.0,
            res_to_kohm: 1e-3,
            design: None,
        }
    }

    fn error(&self, line_no: usize, message: impl Into<String>) -> SizerError {
        SizerError::data(format!("{}:{}", self.origin, line_no), message)
    }

    fn parse_number(&self, line_no: usize, token: &str) -> Result<f64> {
        token
            .parse::<f64>()
            .map_err(|e| self.error(line_no, format!("malformed number {:?}: {}", token, e)))
    }

    fn resolve(&self, token: &str) -> String {
        let Some(body) = token.strip_prefix('*') else {
            return unescape(token);
        };
        let (index, rest) = match body.split_once(self.delimiter) {
            Some((index, rest)) => (index, Some(rest)),
            None => (body, None),
        };
        let base = match self.name_map.get(index) {
            Some(name) => name.clone(),
            None => {
                log::debug!("{}: unmapped name index *{}", self.origin, index);
                index.to_string()
            }
        };
        match rest {
            Some(rest) => unescape(&format!("{}{}{}", base, self.delimiter, rest)),
            None => unescape(&base),
        }
    }

    fn parse_unit(&self, line_no: usize, parts: &[&str]) -> Result<String> {
        if parts.len() < 3 {
            return Err(self.error(line_no, format!("incomplete unit declaration {:?}", parts)));
        }
        Ok(format!("{} {}", parts[1], parts[2]))
    }

    /// Header pass: everything before the first `*D_NET`.
    fn read_header(&mut self) -> Result<()> {
        let mut in_name_map = false;
        while self.pos < self.lines.len() {
            let (line_no, line) = self.lines[self.pos];
            if line.starts_with("*D_NET") {
                break;
            }
            self.pos += 1;
            let parts: Vec<&str> = line.split_whitespace().collect();
            let keyword = parts[0];
            if in_name_map {
                let index = keyword.strip_prefix('*').unwrap_or("");
                if !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()) {
                    let name = line[keyword.len()..].trim();
                    self.name_map.insert(index.to_string(), unescape(name));
                    continue;
                }
                in_name_map = false;
            }
            match keyword {
                "*NAME_MAP" => in_name_map = true,
                "*DESIGN" => {
                    self.design = parts.get(1).map(|d| d.trim_matches('"').to_string());
                }
                "*DELIMITER" => {
                    if let Some(c) = parts.get(1).and_then(|d| d.chars().next()) {
                        self.delimiter = c;
                    }
                }
                "*C_UNIT" => {
                    let unit = self.parse_unit(line_no, &parts)?;
                    self.cap_to_pf = parse_capacitance_unit(&unit)
                        .ok_or_else(|| self.error(line_no, format!("unknown C_UNIT {:?}", unit)))?;
                }
                "*R_UNIT" => {
                    let unit = self.parse_unit(line_no, &parts)?;
                    self.res_to_kohm = parse_resistance_unit(&unit)
                        .ok_or_else(|| self.error(line_no, format!("unknown R_UNIT {:?}", unit)))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn read_net(&mut self) -> Result<NetParasitics> {
        let (start_line, line) = self.lines[self.pos];
        self.pos += 1;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            return Err(self.error(start_line, "*D_NET needs a name and a total capacitance"));
        }
        let name = self.resolve(parts[1]);
        let total_capacitance = self.parse_number(start_line, parts[2])? * self.cap_to_pf;

        let mut connected: HashSet<String> = HashSet::new();
        let mut pin_capacitance: BTreeMap<String, f64> = BTreeMap::new();
        let mut wire_capacitance = 0.0;
        let mut wire_resistance = 0.0;
        let mut section = Section::None;
        while self.pos < self.lines.len() {
            let (line_no, line) = self.lines[self.pos];
            self.pos += 1;
            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts[0] {
                "*END" => {
                    return Ok(NetParasitics {
                        name,
                        total_capacitance,
                        wire_capacitance,
                        pin_capacitance,
                        wire_resistance,
                    });
                }
                "*CONN" => section = Section::Conn,
                "*CAP" => section = Section::Cap,
                "*RES" => section = Section::Res,
                "*INDUC" => section = Section::Other,
                "*D_NET" => {
                    return Err(self.error(
                        start_line,
                        format!("*D_NET {} is not terminated by *END", name),
                    ));
                }
                _ => match section {
                    Section::Conn => {
                        if (parts[0] == "*P" || parts[0] == "*I") && parts.len() >= 2 {
                            connected.insert(self.resolve(parts[1]));
                        }
                    }
                    Section::Cap => match parts.len() {
                        3 => {
                            let node = self.resolve(parts[1]);
                            let value = self.parse_number(line_no, parts[2])? * self.cap_to_pf;
                            if connected.contains(&node) {
                                *pin_capacitance.entry(node).or_insert(0.0) += value;
                            } else {
                                wire_capacitance += value;
                            }
                        }
                        4 => {
                            // Coupling capacitance always belongs to the wire.
                            wire_capacitance +=
                                self.parse_number(line_no, parts[3])? * self.cap_to_pf;
                        }
                        _ => log::debug!(
                            "{}:{}: unrecognized *CAP entry ignored",
                            self.origin,
                            line_no
                        ),
                    },
                    Section::Res => {
                        if parts.len() >= 4 {
                            wire_resistance +=
                                self.parse_number(line_no, parts[3])? * self.res_to_kohm;
                        }
                    }
                    Section::None | Section::Other => {}
                },
            }
        }
        Err(self.error(
            start_line,
            format!("*D_NET {} is not terminated by *END", name),
        ))
    }

    fn read(mut self) -> Result<SpefFile> {
        self.read_header()?;
        let mut nets = HashMap::new();
        while self.pos < self.lines.len() {
            let (_, line) = self.lines[self.pos];
            if line.starts_with("*D_NET") {
                let net = self.read_net()?;
                nets.insert(net.name.clone(), net);
            } else {
                self.pos += 1;
            }
        }
        Ok(SpefFile {
            design: self.design,
            nets,
        })
    }
}

impl SpefFile {
    pub fn parse_str(text: &str, origin: &str) -> Result<Self> {
        SpefReader::new(origin, text).read()
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SizerError::data(path.display().to_string(), format!("cannot read SPEF file: {}", e))
        })?;
        let spef = Self::parse_str(&text, &path.display().to_string())?;
        log::info!(
            "Parsed parasitics for {} nets from {}",
            spef.net_count(),
            path.display()
        );
        Ok(spef)
    }

    pub fn net_count(&self) -> usize {
        self.nets.len()
    }

    pub fn net(&self, name: &str) -> Option<&NetParasitics> {
        self.nets
            .get(name)
            .or_else(|| self.nets.get(&unescape(name)))
    }

    /// Wire capacitance and resistance for `name`; zeros when the net carries
    /// no extracted parasitics.
    pub fn net_info(&self, name: &str) -> NetInfo {
        self.net(name)
            .map(|n| NetInfo {
                wire_capacitance: n.wire_capacitance,
                wire_resistance: n.wire_resistance,
            })
            .unwrap_or_default()
    }
}
