// SPDX-License-Identifier: Apache-2.0

//! Drive-strength families: cells that differ only in the numeric suffix of
//! their name, e.g. `sky130_fd_sc_hd__buf_1`, `..._buf_2`, `..._buf_4`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static STRENGTH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)_([0-9]+)$").expect("valid strength suffix regex"));

/// Splits a cell name into its family base and drive strength.
///
/// Names without a trailing `_<digits>` suffix have no strength and are their
/// own base.
pub fn split_cell_family(cell_name: &str) -> (String, Option<u32>) {
    if let Some(caps) = STRENGTH_SUFFIX.captures(cell_name) {
        if let Ok(strength) = caps[2].parse::<u32>() {
            return (caps[1].to_string(), Some(strength));
        }
    }
    (cell_name.to_string(), None)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellFamily {
    pub base: String,
    /// Sorted: unnamed strengths first, then ascending strength, then name.
    pub variants: Vec<(Option<u32>, String)>,
}

fn variant_order(a: &(Option<u32>, String), b: &(Option<u32>, String)) -> Ordering {
    // `Option`'s ordering already puts `None` before any `Some`.
    a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1))
}

impl CellFamily {
    pub fn new(base: String) -> Self {
        Self {
            base,
            variants: Vec::new(),
        }
    }

    pub fn insert(&mut self, strength: Option<u32>, cell_name: String) {
        let entry = (strength, cell_name);
        let at = self
            .variants
            .binary_search_by(|probe| variant_order(probe, &entry))
            .unwrap_or_else(|i| i);
        self.variants.insert(at, entry);
    }

    pub fn cell_names(&self) -> Vec<String> {
        self.variants.iter().map(|(_, name)| name.clone()).collect()
    }

    pub fn strength_of(&self, cell_name: &str) -> Option<u32> {
        self.variants
            .iter()
            .find(|(_, name)| name == cell_name)
            .and_then(|(strength, _)| *strength)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("sky130_fd_sc_hd__buf_4", "sky130_fd_sc_hd__buf", Some(4))]
    #[test_case("sky130_fd_sc_hd__clkbuf_16", "sky130_fd_sc_hd__clkbuf", Some(16))]
    #[test_case("sky130_fd_sc_hd__buf", "sky130_fd_sc_hd__buf", None)]
    #[test_case("BUF_X2", "BUF_X2", None)]
    #[test_case("INV", "INV", None)]
    fn splits_family_names(name: &str, base: &str, strength: Option<u32>) {
        assert_eq!(split_cell_family(name), (base.to_string(), strength));
    }

    #[test]
    fn variants_sorted_with_unnamed_first() {
        let mut family = CellFamily::new("x__buf".to_string());
        family.insert(Some(8), "x__buf_8".to_string());
        family.insert(Some(1), "x__buf_1".to_string());
        family.insert(None, "x__buf".to_string());
        family.insert(Some(2), "x__buf_2".to_string());
        assert_eq!(
            family.cell_names(),
            vec!["x__buf", "x__buf_1", "x__buf_2", "x__buf_8"]
        );
        assert_eq!(family.strength_of("x__buf_2"), Some(2));
        assert_eq!(family.strength_of("x__buf"), None);
    }
}
