// SPDX-License-Identifier: Apache-2.0

//! The solution artifact: one `<stage_id> <cell>` line per stage, in path
//! order. This is the file the timing tool's apply command reads.

use crate::error::{Result, SizerError};
use crate::path_model::PathModel;
use crate::solver::Assignment;
use std::path::Path;

pub fn format_solution(model: &PathModel, assignment: &Assignment) -> String {
    let mut out = String::new();
    for (stage, cell) in model.stages.iter().zip(assignment.cells(model)) {
        out.push_str(&stage.instance);
        out.push(' ');
        out.push_str(cell);
        out.push('\n');
    }
    out
}

pub fn write_solution(path: &Path, model: &PathModel, assignment: &Assignment) -> Result<()> {
    std::fs::write(path, format_solution(model, assignment)).map_err(|e| SizerError::io(path, e))
}

/// Reads back `(stage_id, cell)` pairs. Blank lines and `#` comments are
/// skipped.
pub fn parse_solution(text: &str) -> Result<Vec<(String, String)>> {
    let mut entries = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 2 {
            return Err(SizerError::data(
                format!("solution line {}", i + 1),
                format!("expected `<stage_id> <cell>`, got {:?}", line),
            ));
        }
        entries.push((parts[0].to_string(), parts[1].to_string()));
    }
    Ok(entries)
}

/// Maps solution entries back onto `model`'s choice indices. Every stage must
/// be named exactly once.
pub fn resolve_solution(model: &PathModel, entries: &[(String, String)]) -> Result<Assignment> {
    let mut choices: Vec<Option<usize>> = vec![None; model.stages.len()];
    for (stage_id, cell) in entries {
        let stage = model
            .stages
            .iter()
            .position(|s| &s.instance == stage_id)
            .ok_or_else(|| {
                SizerError::data("solution", format!("unknown stage {}", stage_id))
            })?;
        let choice = model.stages[stage].choice_index(cell).ok_or_else(|| {
            SizerError::data(
                "solution",
                format!("{} is not a choice at stage {}", cell, stage_id),
            )
        })?;
        if choices[stage].replace(choice).is_some() {
            return Err(SizerError::data(
                "solution",
                format!("stage {} listed twice", stage_id),
            ));
        }
    }
    let mut resolved = Vec::with_capacity(choices.len());
    for (stage, choice) in model.stages.iter().zip(choices) {
        resolved.push(choice.ok_or_else(|| {
            SizerError::data("solution", format!("stage {} is not assigned", stage.instance))
        })?);
    }
    Ok(Assignment::new(resolved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{two_stage_model, X1, X2};
    use pretty_assertions::assert_eq;

    #[test]
    fn one_line_per_stage() {
        let model = two_stage_model(1.0);
        let text = format_solution(&model, &Assignment::new(vec![X1, X2]));
        assert_eq!(text, "u1 BUF_X1\nu2 BUF_X2\n");
    }

    #[test]
    fn written_file_reads_back() {
        let model = two_stage_model(1.0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffers.sol");
        let assignment = Assignment::new(vec![X2, X1]);
        write_solution(&path, &model, &assignment).unwrap();
        let entries = parse_solution(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(resolve_solution(&model, &entries).unwrap(), assignment);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let err = parse_solution("# header\nu1 BUF_X1\nu2\n").unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
    }

    #[test]
    fn incomplete_or_unknown_entries_are_rejected() {
        let model = two_stage_model(1.0);
        let only_one = vec![("u1".to_string(), "BUF_X1".to_string())];
        assert!(resolve_solution(&model, &only_one).is_err());
        let bad_cell = vec![
            ("u1".to_string(), "BUF_X9".to_string()),
            ("u2".to_string(), "BUF_X1".to_string()),
        ];
        assert!(resolve_solution(&model, &bad_cell).is_err());
    }
}
