// SPDX-License-Identifier: Apache-2.0

//! Second pass over a Liberty file: turns the parsed group tree into cells,
//! pins, timing arcs and delay tables, and indexes cells by drive-strength
//! family.
//!
//! All capacitances are converted to pF and all times to ns using the
//! library's `capacitive_load_unit` and `time_unit` declarations.

use crate::error::{Result, SizerError};
use crate::liberty::family::{split_cell_family, CellFamily};
use crate::liberty::liberty_parser::{Block, LibertyParser, Value};
use crate::liberty::timing_table::DelayTable;
use crate::units::{parse_capacitance_unit, parse_time_unit};
use flate2::read::MultiGzDecoder;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
    Inout,
    Unknown,
}

impl PinDirection {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "input" => PinDirection::Input,
            "output" => PinDirection::Output,
            "inout" => PinDirection::Inout,
            _ => PinDirection::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingArc {
    /// As written in the library; may name several space-separated pins.
    pub related_pin: String,
    pub timing_type: Option<String>,
    pub cell_rise: Option<DelayTable>,
    pub cell_fall: Option<DelayTable>,
    pub rise_transition: Option<DelayTable>,
    pub fall_transition: Option<DelayTable>,
}

impl TimingArc {
    pub fn relates_to(&self, pin: &str) -> bool {
        self.related_pin.split_whitespace().any(|p| p == pin)
    }

    fn delay_tables(&self) -> impl Iterator<Item = &DelayTable> {
        self.cell_rise.iter().chain(self.cell_fall.iter())
    }

    /// Worst case over the rise and fall tables; `None` when the arc has
    /// neither.
    pub fn worst_delay(&self, slew: f64, load: f64) -> Option<f64> {
        self.delay_tables()
            .map(|t| t.lookup(slew, load))
            .reduce(f64::max)
    }

    /// Best case over the rise and fall tables.
    pub fn best_delay(&self, slew: f64, load: f64) -> Option<f64> {
        self.delay_tables()
            .map(|t| t.lookup(slew, load))
            .reduce(f64::min)
    }

    /// The load axis the catalog characterized this arc over.
    pub fn load_axis(&self) -> Option<&[f64]> {
        self.delay_tables().next().map(DelayTable::index_2)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub name: String,
    pub capacitance: Option<f64>,
    pub direction: PinDirection,
    pub timing: Vec<TimingArc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub name: String,
    pub area: Option<f64>,
    pub pins: BTreeMap<String, Pin>,
}

impl Cell {
    pub fn pin_capacitance(&self, pin_name: &str) -> Option<f64> {
        self.pins.get(pin_name).and_then(|p| p.capacitance)
    }

    /// The arc on `to_pin` driven by `from_pin` that carries a rise table.
    pub fn find_timing_arc(&self, from_pin: &str, to_pin: &str) -> Result<&TimingArc> {
        let not_found = || SizerError::ArcNotFound {
            cell: self.name.clone(),
            from_pin: from_pin.to_string(),
            to_pin: to_pin.to_string(),
        };
        let pin = self.pins.get(to_pin).ok_or_else(not_found)?;
        pin.timing
            .iter()
            .find(|arc| arc.relates_to(from_pin) && arc.cell_rise.is_some())
            .ok_or_else(not_found)
    }
}

#[derive(Debug, Clone)]
struct TableTemplate {
    variable_1: Option<String>,
    variable_2: Option<String>,
    index_1: Vec<f64>,
    index_2: Vec<f64>,
}

impl TableTemplate {
    /// True when the template puts the load on `index_1`.
    fn is_load_major(&self) -> bool {
        let is_load = |v: &Option<String>| v.as_deref().map_or(false, |v| v.contains("capacitance"));
        let is_transition =
            |v: &Option<String>| v.as_deref().map_or(false, |v| v.contains("transition"));
        is_load(&self.variable_1) && is_transition(&self.variable_2)
    }
}

#[derive(Debug, Clone, Copy)]
struct LibraryUnits {
    time_to_ns: f64,
    cap_to_pf: f64,
}

impl Default for LibraryUnits {
    fn default() -> Self {
        Self {
            time_to_ns: 1.0,
            cap_to_pf: 1.0,
        }
    }
}

fn parse_csv_f64s(text: &str, context: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for part in text.split(|c: char| c == ',' || c.is_whitespace()) {
        if part.is_empty() {
            continue;
        }
        let parsed = part.parse::<f64>().map_err(|e| {
            SizerError::data(context, format!("failed parsing '{}' as a number: {}", part, e))
        })?;
        out.push(parsed);
    }
    Ok(out)
}

fn parse_scalar_list(value: &Value, context: &str) -> Result<Vec<f64>> {
    match value {
        Value::Number(n) => Ok(vec![*n]),
        Value::String(s) | Value::Identifier(s) => parse_csv_f64s(s, context),
        Value::Tuple(xs) => {
            let mut out = Vec::new();
            for x in xs {
                out.extend(parse_scalar_list(x, context)?);
            }
            Ok(out)
        }
    }
}

fn parse_units(library: &Block, origin: &str) -> LibraryUnits {
    let mut units = LibraryUnits::default();
    if let Some(text) = library.attr("time_unit").and_then(Value::as_text) {
        match parse_time_unit(&text) {
            Some(scale) => units.time_to_ns = scale,
            None => log::warn!("{}: unrecognized time_unit {:?}; assuming 1ns", origin, text),
        }
    }
    if let Some(Value::Tuple(parts)) = library.attr("capacitive_load_unit") {
        let magnitude = parts.first().and_then(Value::as_f64);
        let unit = parts.get(1).and_then(Value::as_text);
        match (magnitude, unit.as_deref().and_then(parse_capacitance_unit)) {
            (Some(m), Some(scale)) => units.cap_to_pf = m * scale,
            _ => log::warn!(
                "{}: unrecognized capacitive_load_unit {:?}; assuming 1pf",
                origin,
                parts
            ),
        }
    }
    units
}

fn parse_templates(library: &Block, origin: &str) -> Result<HashMap<String, TableTemplate>> {
    let mut out = HashMap::new();
    for block in library.sub_blocks() {
        if !block.block_type.ends_with("template") {
            continue;
        }
        let Some(name) = block.name() else {
            continue;
        };
        let context = format!("{}: template {}", origin, name);
        let index = |attr: &str| -> Result<Vec<f64>> {
            match block.attr(attr) {
                Some(v) => parse_scalar_list(v, &context),
                None => Ok(Vec::new()),
            }
        };
        let template = TableTemplate {
            variable_1: block.attr("variable_1").and_then(Value::as_text),
            variable_2: block.attr("variable_2").and_then(Value::as_text),
            index_1: index("index_1")?,
            index_2: index("index_2")?,
        };
        out.insert(name, template);
    }
    Ok(out)
}

struct CellReader<'a> {
    origin: &'a str,
    units: LibraryUnits,
    templates: HashMap<String, TableTemplate>,
}

impl<'a> CellReader<'a> {
    /// Returns `None` for a table that is absent or incomplete; a table that
    /// is present but inconsistent is a data error.
    fn read_table(&self, timing: &Block, key: &str, context: &str) -> Result<Option<DelayTable>> {
        let Some(block) = timing.sub_blocks_of_type(key).next() else {
            return Ok(None);
        };
        let context = format!("{}/{}", context, key);
        let template = block.name().and_then(|n| self.templates.get(&n));
        let axis = |attr: &str, inherited: Option<&Vec<f64>>| -> Result<Vec<f64>> {
            match block.attr(attr) {
                Some(v) => parse_scalar_list(v, &context),
                None => Ok(inherited.cloned().unwrap_or_default()),
            }
        };
        let index_1 = axis("index_1", template.map(|t| &t.index_1))?;
        let index_2 = axis("index_2", template.map(|t| &t.index_2))?;
        let values = match block.attr("values") {
            Some(v) => parse_scalar_list(v, &context)?,
            None => Vec::new(),
        };
        if index_1.is_empty() || index_2.is_empty() || values.is_empty() {
            log::debug!("{}: incomplete table dropped", context);
            return Ok(None);
        }
        let table = DelayTable::new(index_1, index_2, values)
            .map_err(|e| SizerError::data(context.clone(), e.to_string()))?;
        let table = if template.map_or(false, TableTemplate::is_load_major) {
            table.transposed()
        } else {
            table
        };
        Ok(Some(table.scaled(
            self.units.time_to_ns,
            self.units.cap_to_pf,
            self.units.time_to_ns,
        )))
    }

    fn read_timing(&self, timing: &Block, context: &str) -> Result<TimingArc> {
        let related_pin = timing
            .attr("related_pin")
            .and_then(Value::as_text)
            .unwrap_or_default();
        let context = format!("{}/timing({})", context, related_pin);
        Ok(TimingArc {
            timing_type: timing.attr("timing_type").and_then(Value::as_text),
            cell_rise: self.read_table(timing, "cell_rise", &context)?,
            cell_fall: self.read_table(timing, "cell_fall", &context)?,
            rise_transition: self.read_table(timing, "rise_transition", &context)?,
            fall_transition: self.read_table(timing, "fall_transition", &context)?,
            related_pin,
        })
    }

    fn read_pin(&self, pin: &Block, name: String, context: &str) -> Result<Pin> {
        let context = format!("{}/pin({})", context, name);
        let capacitance = pin
            .attr("capacitance")
            .and_then(Value::as_f64)
            .map(|c| c * self.units.cap_to_pf);
        let direction = pin
            .attr("direction")
            .and_then(Value::as_text)
            .map(|d| PinDirection::from_str(&d))
            .unwrap_or(PinDirection::Unknown);
        let mut timing = Vec::new();
        for t in pin.sub_blocks_of_type("timing") {
            timing.push(self.read_timing(t, &context)?);
        }
        Ok(Pin {
            name,
            capacitance,
            direction,
            timing,
        })
    }

    fn read_cell(&self, cell: &Block, name: String) -> Result<Cell> {
        let context = format!("{}: cell({})", self.origin, name);
        let mut pins = BTreeMap::new();
        let pin_blocks = cell
            .sub_blocks_of_type("pin")
            .chain(cell.sub_blocks_of_type("bus").flat_map(|b| b.sub_blocks_of_type("pin")));
        for pin_block in pin_blocks {
            let Some(pin_name) = pin_block.name() else {
                continue;
            };
            let pin = self.read_pin(pin_block, pin_name.clone(), &context)?;
            pins.insert(pin_name, pin);
        }
        Ok(Cell {
            name,
            area: cell.attr("area").and_then(Value::as_f64),
            pins,
        })
    }
}

/// Reads a Liberty file as text, transparently decompressing `.gz` files.
pub fn read_liberty_text(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| SizerError::io(path, e))?;
    let is_gz = path.extension().map(|e| e == "gz").unwrap_or(false);
    let mut reader: Box<dyn Read> = if is_gz {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| SizerError::io(path, e))?;
    Ok(text)
}

/// Queryable cell catalog built from one or more Liberty files.
#[derive(Debug, Default)]
pub struct TimingLibrary {
    cells: HashMap<String, Cell>,
    families: BTreeMap<String, CellFamily>,
}

impl TimingLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(SizerError::data(
                "liberty inputs",
                "no liberty files provided",
            ));
        }
        let mut library = Self::new();
        for path in paths {
            let path = path.as_ref();
            let text = read_liberty_text(path)?;
            let added = library.add_library_text(&path.display().to_string(), &text)?;
            log::info!("Parsed {} cells from {}", added, path.display());
        }
        Ok(library)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        let mut library = Self::new();
        library.add_library_text("<string>", text)?;
        Ok(library)
    }

    /// Parses one library's text and adds its cells; returns how many cells
    /// were new. When a cell appears in several files the first definition
    /// is kept.
    pub fn add_library_text(&mut self, origin: &str, text: &str) -> Result<usize> {
        let root = LibertyParser::new(text)
            .parse()
            .map_err(|e| SizerError::data(origin, e))?;
        let reader = CellReader {
            origin,
            units: parse_units(&root, origin),
            templates: parse_templates(&root, origin)?,
        };
        let mut added = 0;
        for cell_block in root.sub_blocks_of_type("cell") {
            let Some(name) = cell_block.name() else {
                continue;
            };
            if self.cells.contains_key(&name) {
                log::debug!("{}: duplicate cell {} ignored", origin, name);
                continue;
            }
            let cell = reader.read_cell(cell_block, name.clone())?;
            let (base, strength) = split_cell_family(&name);
            self.families
                .entry(base.clone())
                .or_insert_with(|| CellFamily::new(base))
                .insert(strength, name.clone());
            self.cells.insert(name, cell);
            added += 1;
        }
        Ok(added)
    }

    pub fn get_cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn families(&self) -> impl Iterator<Item = &CellFamily> {
        self.families.values()
    }

    pub fn family_of(&self, cell_name: &str) -> Option<&CellFamily> {
        let (base, _) = split_cell_family(cell_name);
        self.families.get(&base)
    }

    /// Interchangeable variants of `cell_name` in ascending drive strength.
    /// A cell with no detected family is its own singleton family.
    pub fn family_variants(&self, cell_name: &str) -> Vec<String> {
        match self.family_of(cell_name) {
            Some(family) if !family.variants.is_empty() => family.cell_names(),
            _ => vec![cell_name.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SMALL_LIB: &str = r#"
library ("test_lib") {
    time_unit : "1ns";
    capacitive_load_unit (1, pf);
    lu_table_template ("del_2_2") {
        variable_1 : input_net_transition;
        variable_2 : total_output_net_capacitance;
        index_1 ("0.01, 0.1");
        index_2 ("0.001, 0.1");
    }
    lu_table_template ("load_major") {
        variable_1 : total_output_net_capacitance;
        variable_2 : input_net_transition;
    }
    cell ("lib__buf_1") {
        area : 3.75;
        pin ("A") {
            direction : input;
            capacitance : 0.0023;
        }
        pin ("X") {
            direction : output;
            timing () {
                related_pin : "A";
                timing_type : "combinational";
                cell_rise ("del_2_2") {
                    values ("0.10, 0.30", \
                            "0.20, 0.40");
                }
                cell_fall ("del_2_2") {
                    values ("0.12, 0.25", \
                            "0.22, 0.35");
                }
            }
        }
    }
    cell ("lib__buf_2") {
        area : 5.0;
        pin ("A") {
            direction : input;
            capacitance : 0.0046;
        }
        pin ("X") {
            direction : output;
            timing () {
                related_pin : "A";
                cell_rise ("load_major") {
                    index_1 ("0.001, 0.1");
                    index_2 ("0.01, 0.1");
                    values ("0.08, 0.10", "0.20, 0.24");
                }
            }
        }
    }
    cell ("lib__buf") {
        pin ("A") { direction : input; }
        pin ("X") {
            direction : output;
            timing () {
                related_pin : "A";
                cell_fall ("del_2_2") {
                    values ("0.1, 0.1", "0.1, 0.1");
                }
            }
        }
    }
}
"#;

    #[test]
    fn builds_cells_pins_and_tables() {
        let lib = TimingLibrary::parse_str(SMALL_LIB).unwrap();
        assert_eq!(lib.cell_count(), 3);
        let buf1 = lib.get_cell("lib__buf_1").unwrap();
        assert_eq!(buf1.area, Some(3.75));
        assert_eq!(buf1.pin_capacitance("A"), Some(0.0023));
        assert_eq!(buf1.pins["X"].direction, PinDirection::Output);
        let arc = buf1.find_timing_arc("A", "X").unwrap();
        assert_eq!(arc.timing_type.as_deref(), Some("combinational"));
        let rise = arc.cell_rise.as_ref().unwrap();
        assert_eq!(rise.index_1(), &[0.01, 0.1]);
        assert_eq!(rise.index_2(), &[0.001, 0.1]);
        // Worst of rise (0.30) and fall (0.25) at the top load corner.
        assert_eq!(arc.worst_delay(0.01, 0.1), Some(0.30));
        assert_eq!(arc.best_delay(0.01, 0.1), Some(0.25));
    }

    #[test]
    fn load_major_tables_are_transposed() {
        let lib = TimingLibrary::parse_str(SMALL_LIB).unwrap();
        let arc = lib
            .get_cell("lib__buf_2")
            .unwrap()
            .find_timing_arc("A", "X")
            .unwrap();
        let rise = arc.cell_rise.as_ref().unwrap();
        assert_eq!(rise.index_1(), &[0.01, 0.1]);
        assert_eq!(rise.index_2(), &[0.001, 0.1]);
        // values[load=0.1][slew=0.01] in the file.
        assert_eq!(rise.lookup(0.01, 0.1), 0.20);
    }

    #[test]
    fn arc_without_rise_table_is_not_found() {
        let lib = TimingLibrary::parse_str(SMALL_LIB).unwrap();
        let err = lib
            .get_cell("lib__buf")
            .unwrap()
            .find_timing_arc("A", "X")
            .unwrap_err();
        assert!(err.is_recoverable());
        let err = lib
            .get_cell("lib__buf_1")
            .unwrap()
            .find_timing_arc("B", "X")
            .unwrap_err();
        assert!(matches!(err, SizerError::ArcNotFound { .. }));
    }

    #[test]
    fn families_sorted_by_strength() {
        let lib = TimingLibrary::parse_str(SMALL_LIB).unwrap();
        assert_eq!(
            lib.family_variants("lib__buf_2"),
            vec!["lib__buf", "lib__buf_1", "lib__buf_2"]
        );
        assert_eq!(lib.family_variants("other__inv"), vec!["other__inv"]);
    }

    #[test]
    fn picoseconds_and_femtofarads_are_normalized() {
        let text = r#"
library (ps_lib) {
    time_unit : "1ps";
    capacitive_load_unit (1, ff);
    cell (c_1) {
        pin (A) { direction : input; capacitance : 2.0; }
        pin (Y) {
            direction : output;
            timing () {
                related_pin : "A";
                cell_rise (scalar_2x1) {
                    index_1 ("10, 100");
                    index_2 ("1");
                    values ("50", "150");
                }
            }
        }
    }
}
"#;
        let lib = TimingLibrary::parse_str(text).unwrap();
        let cell = lib.get_cell("c_1").unwrap();
        assert!((cell.pin_capacitance("A").unwrap() - 0.002).abs() < 1e-15);
        let rise = cell.find_timing_arc("A", "Y").unwrap().cell_rise.as_ref().unwrap();
        assert!((rise.index_1()[1] - 0.1).abs() < 1e-15);
        assert!((rise.lookup(0.1, 0.001) - 0.15).abs() < 1e-12);
    }

    #[test]
    fn inconsistent_table_is_a_data_error() {
        let text = r#"
library (bad) {
    cell (c_1) {
        pin (Y) {
            timing () {
                related_pin : "A";
                cell_rise (t) {
                    index_1 ("0.1, 0.2");
                    index_2 ("0.1, 0.2");
                    values ("1.0, 2.0, 3.0");
                }
            }
        }
    }
}
"#;
        let err = TimingLibrary::parse_str(text).unwrap_err();
        assert!(matches!(err, SizerError::Data { .. }), "{}", err);
    }

    #[test]
    fn nan_axis_entry_is_a_data_error() {
        let text = r#"
library (bad) {
    cell (c_1) {
        pin (Y) {
            timing () {
                related_pin : "A";
                cell_rise (t) {
                    index_1 ("nan, 0.2");
                    index_2 ("0.1, 0.2");
                    values ("1.0, 2.0", "3.0, 4.0");
                }
            }
        }
    }
}
"#;
        let err = TimingLibrary::parse_str(text).unwrap_err();
        assert!(matches!(err, SizerError::Data { .. }), "{}", err);
        assert!(err.to_string().contains("non-finite"), "{}", err);
    }

    #[test]
    fn gzipped_library_is_read() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.lib.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(SMALL_LIB.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let lib = TimingLibrary::from_files(&[path]).unwrap();
        assert_eq!(lib.cell_count(), 3);
    }

    #[test]
    fn no_files_is_a_data_error() {
        let empty: Vec<std::path::PathBuf> = vec![];
        assert!(matches!(
            TimingLibrary::from_files(&empty).unwrap_err(),
            SizerError::Data { .. }
        ));
    }
}
