// SPDX-License-Identifier: Apache-2.0

//! Choice selection under the linear timing model.
//!
//! Every (stage, choice) pair gets one boolean. The SAT solver only sees the
//! boolean skeleton: one-hot groups, blocking clauses from refinement, and
//! the timing lemmas learned here. Once the booleans are fixed the
//! capacitances and delays are fully determined, so each SAT model is
//! evaluated directly; a model that misses setup or hold produces a lemma
//! and the SAT solver is run again.
//!
//! Lemmas are generalized before they are added. Starting from the full
//! assignment, each stage is released in turn and the arrival bound over all
//! of its choices is recomputed; if the bound still violates, the stage
//! stays out of the lemma. The clause then forbids only the stages that are
//! responsible for the violation.

use crate::error::{Result, SizerError};
use crate::path_model::{NetSink, PathModel};
use std::collections::HashSet;
use std::fmt;
use varisat::{ExtendFormula, Lit};

/// Tolerance for the slack comparisons.
const SLACK_EPSILON: f64 = 1e-12;

/// Identifies one choice boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChoiceKey {
    pub stage: usize,
    pub choice: usize,
}

/// One selected choice index per stage, in path order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Assignment {
    choices: Vec<usize>,
}

impl Assignment {
    pub fn new(choices: Vec<usize>) -> Self {
        Self { choices }
    }

    pub fn choice(&self, stage: usize) -> usize {
        self.choices[stage]
    }

    pub fn choices(&self) -> &[usize] {
        &self.choices
    }

    pub fn keys(&self) -> impl Iterator<Item = ChoiceKey> + '_ {
        self.choices
            .iter()
            .enumerate()
            .map(|(stage, &choice)| ChoiceKey { stage, choice })
    }

    /// Chosen cell name per stage.
    pub fn cells<'m>(&self, model: &'m PathModel) -> Vec<&'m str> {
        self.keys()
            .map(|k| model.stages[k.stage].choices[k.choice].cell.as_str())
            .collect()
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.choices.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageTiming {
    pub c_in: f64,
    pub c_out: f64,
    /// Cell delay on the late (setup) corner.
    pub d_cell: f64,
    /// Cell delay on the early (hold) corner; equals `d_cell` for nominal
    /// models.
    pub d_cell_min: f64,
    pub d_net: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingEstimate {
    pub stages: Vec<StageTiming>,
    pub arrival_max: f64,
    pub arrival_min: f64,
    pub setup_slack: f64,
    pub hold_slack: f64,
}

impl TimingEstimate {
    pub fn meets_setup(&self) -> bool {
        self.setup_slack >= -SLACK_EPSILON
    }

    pub fn meets_hold(&self) -> bool {
        self.hold_slack >= -SLACK_EPSILON
    }

    pub fn is_met(&self) -> bool {
        self.meets_setup() && self.meets_hold()
    }
}

/// Load seen beyond the wire of stage `i`'s net: the next stage's input
/// capacitance or the terminal's fixed capacitance.
fn downstream_load(model: &PathModel, stage: usize, next_choice: Option<usize>) -> f64 {
    match model.nets[stage].sink {
        NetSink::Stage(next) => {
            let choice = next_choice.unwrap_or(0);
            model.stages[next].choices[choice].c_in.value()
        }
        NetSink::Terminal { fixed_capacitance } => fixed_capacitance.unwrap_or(0.0),
    }
}

/// Cell plus Elmore wire delay of stage `i` given its own choice and the
/// choice at the next stage, as `(late, early)`.
fn stage_delay(
    model: &PathModel,
    stage: usize,
    choice: usize,
    next_choice: Option<usize>,
) -> (f64, f64) {
    let net = &model.nets[stage];
    let downstream = downstream_load(model, stage, next_choice);
    let c_out = net.wire_capacitance + downstream;
    let d_net = net.wire_resistance * (net.wire_capacitance / 2.0 + downstream);
    let delay = &model.stages[stage].choices[choice].delay;
    (delay.max().at(c_out) + d_net, delay.min().at(c_out) + d_net)
}

/// Evaluates the linear timing model for one complete assignment.
pub fn estimate_timing(model: &PathModel, assignment: &Assignment) -> TimingEstimate {
    let n = model.stages.len();
    let mut stages = Vec::with_capacity(n);
    let mut arrival_max = model.timing.clock_to_output.max();
    let mut arrival_min = model.timing.clock_to_output.min();
    for i in 0..n {
        let choice = &model.stages[i].choices[assignment.choice(i)];
        let next_choice = (i + 1 < n).then(|| assignment.choice(i + 1));
        let net = &model.nets[i];
        let downstream = downstream_load(model, i, next_choice);
        let c_out = net.wire_capacitance + downstream;
        let d_net = net.wire_resistance * (net.wire_capacitance / 2.0 + downstream);
        let d_cell = choice.delay.max().at(c_out);
        let d_cell_min = choice.delay.min().at(c_out);
        arrival_max += d_cell + d_net;
        arrival_min += d_cell_min + d_net;
        stages.push(StageTiming {
            c_in: choice.c_in.value(),
            c_out,
            d_cell,
            d_cell_min,
            d_net,
        });
    }
    TimingEstimate {
        stages,
        arrival_max,
        arrival_min,
        setup_slack: model.timing.setup_required() - arrival_max,
        hold_slack: arrival_min - model.timing.hold_required(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Constructed,
    Solving,
    Satisfied,
    Unsatisfiable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SizingModel {
    pub assignment: Assignment,
    pub timing: TimingEstimate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Satisfied(SizingModel),
    Unsatisfiable,
}

#[derive(Clone, Copy)]
enum Check {
    Setup,
    Hold,
}

pub struct SizingSolver<'m> {
    model: &'m PathModel,
    sat: varisat::Solver<'static>,
    /// `lits[stage][choice]`
    lits: Vec<Vec<Lit>>,
    state: SolverState,
    conflicts: usize,
    lemmas: usize,
}

impl<'m> SizingSolver<'m> {
    /// Encodes the one-hot groups for `model`. Fails on a model whose nets do
    /// not form a chain ending in a terminal with a known load.
    pub fn new(model: &'m PathModel) -> Result<Self> {
        model.validate()?;
        let mut sat = varisat::Solver::new();
        let mut lits = Vec::with_capacity(model.stages.len());
        for stage in &model.stages {
            let group: Vec<Lit> = stage.choices.iter().map(|_| sat.new_lit()).collect();
            sat.add_clause(&group);
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    sat.add_clause(&[!*a, !*b]);
                }
            }
            lits.push(group);
        }
        Ok(Self {
            model,
            sat,
            lits,
            state: SolverState::Constructed,
            conflicts: 0,
            lemmas: 0,
        })
    }

    pub fn model(&self) -> &'m PathModel {
        self.model
    }

    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Blocking clauses added through [`SizingSolver::add_conflict`].
    pub fn conflict_count(&self) -> usize {
        self.conflicts
    }

    /// Timing lemmas learned while solving.
    pub fn lemma_count(&self) -> usize {
        self.lemmas
    }

    pub fn lit(&self, key: ChoiceKey) -> Lit {
        self.lits[key.stage][key.choice]
    }

    pub fn evaluate(&self, assignment: &Assignment) -> TimingEstimate {
        estimate_timing(self.model, assignment)
    }

    /// Finds an assignment whose modeled setup and hold slacks are both
    /// non-negative and that no earlier conflict excludes.
    pub fn solve(&mut self) -> Result<SolveOutcome> {
        self.state = SolverState::Solving;
        loop {
            if !self.sat.solve()? {
                self.state = SolverState::Unsatisfiable;
                return Ok(SolveOutcome::Unsatisfiable);
            }
            let assignment = self.extract_assignment()?;
            let timing = self.evaluate(&assignment);
            if timing.is_met() {
                self.state = SolverState::Satisfied;
                return Ok(SolveOutcome::Satisfied(SizingModel { assignment, timing }));
            }
            if !timing.meets_setup() {
                self.learn(&assignment, Check::Setup);
            }
            if !timing.meets_hold() {
                self.learn(&assignment, Check::Hold);
            }
        }
    }

    /// Forbids exactly this combination of choices from now on.
    pub fn add_conflict(&mut self, assignment: &Assignment) -> Result<()> {
        if assignment.choices().len() != self.lits.len() {
            return Err(SizerError::Solver(format!(
                "assignment covers {} stages, model has {}",
                assignment.choices().len(),
                self.lits.len()
            )));
        }
        let mut clause = Vec::with_capacity(self.lits.len());
        for key in assignment.keys() {
            let lit = self
                .lits
                .get(key.stage)
                .and_then(|group| group.get(key.choice))
                .ok_or_else(|| {
                    SizerError::Solver(format!(
                        "stage {} has no choice {}",
                        key.stage, key.choice
                    ))
                })?;
            clause.push(!*lit);
        }
        self.sat.add_clause(&clause);
        self.conflicts += 1;
        log::debug!("blocking clause for assignment {}", assignment);
        Ok(())
    }

    fn extract_assignment(&self) -> Result<Assignment> {
        let model = self
            .sat
            .model()
            .ok_or_else(|| SizerError::Solver("no model after a satisfiable solve".to_string()))?;
        let true_lits: HashSet<Lit> = model.into_iter().collect();
        let mut choices = Vec::with_capacity(self.lits.len());
        for (stage, group) in self.lits.iter().enumerate() {
            let choice = group
                .iter()
                .position(|l| true_lits.contains(l))
                .ok_or_else(|| {
                    SizerError::Solver(format!("no choice selected at stage {}", stage))
                })?;
            choices.push(choice);
        }
        Ok(Assignment::new(choices))
    }

    /// Bound on the chosen corner's arrival when every stage whose `fixed`
    /// entry is false may take any of its choices: the smallest late arrival
    /// for setup, the largest early arrival for hold.
    fn arrival_bound(&self, assignment: &Assignment, fixed: &[bool], check: Check) -> f64 {
        let model = self.model;
        let n = model.stages.len();
        let options = |stage: usize| -> Vec<usize> {
            if fixed[stage] {
                vec![assignment.choice(stage)]
            } else {
                (0..model.stages[stage].choices.len()).collect()
            }
        };
        let mut bound = match check {
            Check::Setup => model.timing.clock_to_output.max(),
            Check::Hold => model.timing.clock_to_output.min(),
        };
        for i in 0..n {
            let next_options = if i + 1 < n { options(i + 1) } else { vec![0] };
            let mut best: Option<f64> = None;
            for choice in options(i) {
                for &next in &next_options {
                    let next_choice = (i + 1 < n).then_some(next);
                    let (late, early) = stage_delay(model, i, choice, next_choice);
                    best = Some(match (check, best) {
                        (Check::Setup, Some(b)) => b.min(late),
                        (Check::Setup, None) => late,
                        (Check::Hold, Some(b)) => b.max(early),
                        (Check::Hold, None) => early,
                    });
                }
            }
            bound += best.unwrap_or(0.0);
        }
        bound
    }

    fn violates(&self, assignment: &Assignment, fixed: &[bool], check: Check) -> bool {
        let bound = self.arrival_bound(assignment, fixed, check);
        match check {
            Check::Setup => bound - self.model.timing.setup_required() > SLACK_EPSILON,
            Check::Hold => self.model.timing.hold_required() - bound > SLACK_EPSILON,
        }
    }

    fn learn(&mut self, assignment: &Assignment, check: Check) {
        let n = self.model.stages.len();
        let mut fixed = vec![true; n];
        for stage in 0..n {
            fixed[stage] = false;
            if !self.violates(assignment, &fixed, check) {
                fixed[stage] = true;
            }
        }
        let clause: Vec<Lit> = (0..n)
            .filter(|&stage| fixed[stage])
            .map(|stage| {
                !self.lit(ChoiceKey {
                    stage,
                    choice: assignment.choice(stage),
                })
            })
            .collect();
        log::debug!(
            "{} lemma from {}: blocks {} of {} stages",
            match check {
                Check::Setup => "setup",
                Check::Hold => "hold",
            },
            assignment,
            clause.len(),
            n
        );
        self.sat.add_clause(&clause);
        self.lemmas += 1;
    }
}
