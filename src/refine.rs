// SPDX-License-Identifier: Apache-2.0

//! Counterexample-guided refinement: solve under the linear model, check the
//! candidate against the oracle, block it if the oracle disagrees, repeat.
//!
//! Each rejected candidate is blocked exactly, so the loop runs at most once
//! per point of the (finite) choice space.

use crate::error::Result;
use crate::oracle::{MeasuredSlack, TimingOracle};
use crate::solver::{SizingModel, SizingSolver, SolveOutcome};

/// `iterations` counts oracle rounds, so it never exceeds the size of the
/// choice space.
#[derive(Debug, Clone, PartialEq)]
pub enum RefineOutcome {
    /// The oracle accepted `model`.
    Converged {
        model: SizingModel,
        measured: MeasuredSlack,
        iterations: usize,
    },
    /// No assignment left that the model believes meets timing after
    /// `iterations` rejected candidates.
    Exhausted { iterations: usize },
}

pub fn refine(
    solver: &mut SizingSolver<'_>,
    oracle: &mut dyn TimingOracle,
) -> Result<RefineOutcome> {
    let path = solver.model();
    let mut iterations = 0;
    loop {
        let model = match solver.solve()? {
            SolveOutcome::Satisfied(model) => model,
            SolveOutcome::Unsatisfiable => {
                log::info!(
                    "no assignment meets timing under the model after {} rejected candidate(s)",
                    iterations
                );
                return Ok(RefineOutcome::Exhausted { iterations });
            }
        };
        iterations += 1;
        let measured = oracle.measure(path, &model.assignment)?;
        log::info!(
            "iteration {}: {:?} modeled setup {:.4} hold {:.4}, measured setup {:.4} hold {:.4}",
            iterations,
            model.assignment.cells(path),
            model.timing.setup_slack,
            model.timing.hold_slack,
            measured.setup,
            measured.hold
        );
        if measured.is_met() {
            return Ok(RefineOutcome::Converged {
                model,
                measured,
                iterations,
            });
        }
        solver.add_conflict(&model.assignment)?;
    }
}
