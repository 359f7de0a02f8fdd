// SPDX-License-Identifier: Apache-2.0

use crate::sizer_config::SizerConfig;
use anyhow::Context;
use clap::ArgMatches;
use pathsizer::oracle::{ModelOracle, StaSession};
use pathsizer::path_model::PathModel;
use pathsizer::refine::{refine, RefineOutcome};
use pathsizer::solution::{parse_solution, resolve_solution, write_solution};
use pathsizer::solver::{estimate_timing, SizingSolver};
use std::path::PathBuf;

fn load_model(matches: &ArgMatches) -> anyhow::Result<PathModel> {
    let path = matches
        .get_one::<String>("model")
        .context("--model is required")?;
    let text = std::fs::read_to_string(path).with_context(|| format!("read path model {}", path))?;
    Ok(PathModel::from_json(&text)?)
}

pub fn handle_solve(matches: &ArgMatches, config: &Option<SizerConfig>) -> anyhow::Result<()> {
    let model = load_model(matches)?;
    let mut solver = SizingSolver::new(&model)?;
    let oracle_config = if matches.get_flag("dry_run") {
        None
    } else {
        config.as_ref().and_then(|c| c.oracle.clone())
    };
    let solution_path = matches
        .get_one::<String>("solution")
        .map(PathBuf::from)
        .or_else(|| oracle_config.as_ref().map(|c| c.solution_path.clone()))
        .unwrap_or_else(|| PathBuf::from("buffers.sol"));

    let outcome = match oracle_config {
        Some(mut oracle_config) => {
            if matches.get_one::<String>("solution").is_some() {
                oracle_config.solution_path = solution_path.clone();
            }
            let mut session = StaSession::spawn(&oracle_config)?;
            let outcome = refine(&mut solver, &mut session);
            session.close()?;
            outcome?
        }
        None => {
            log::warn!("no timing oracle in use; trusting the linear model");
            refine(&mut solver, &mut ModelOracle)?
        }
    };

    match outcome {
        RefineOutcome::Converged {
            model: found,
            measured,
            iterations,
        } => {
            write_solution(&solution_path, &model, &found.assignment)?;
            println!(
                "converged after {} iteration(s); wrote {}",
                iterations,
                solution_path.display()
            );
            for (stage, cell) in model.stages.iter().zip(found.assignment.cells(&model)) {
                println!("  {} {}", stage.instance, cell);
            }
            println!(
                "setup slack {:.4} ns (modeled {:.4}), hold slack {:.4} ns (modeled {:.4})",
                measured.setup, found.timing.setup_slack, measured.hold, found.timing.hold_slack
            );
            Ok(())
        }
        RefineOutcome::Exhausted { iterations } => Err(anyhow::anyhow!(
            "no assignment meets timing; search exhausted after {} rejected candidate(s) and {} timing lemma(s)",
            iterations,
            solver.lemma_count()
        )),
    }
}

/// Prints the modeled timing of an existing solution file.
pub fn handle_estimate(matches: &ArgMatches) -> anyhow::Result<()> {
    let model = load_model(matches)?;
    let solution = matches
        .get_one::<String>("solution")
        .context("--solution is required")?;
    let text =
        std::fs::read_to_string(solution).with_context(|| format!("read solution {}", solution))?;
    let assignment = resolve_solution(&model, &parse_solution(&text)?)?;
    let timing = estimate_timing(&model, &assignment);
    for ((stage, cell), t) in model
        .stages
        .iter()
        .zip(assignment.cells(&model))
        .zip(&timing.stages)
    {
        println!(
            "  {} {}: c_out {:.5} pF, cell {:.4} ns, wire {:.4} ns",
            stage.instance, cell, t.c_out, t.d_cell, t.d_net
        );
    }
    println!(
        "arrival {:.4} ns, setup slack {:.4} ns, hold slack {:.4} ns",
        timing.arrival_max, timing.setup_slack, timing.hold_slack
    );
    Ok(())
}
