//! Path analysis
//!
//! A couple's observable state is sampled after every batch. The sequence of
//! distinct states from the moment the source starts an attempt until it
//! returns to `Waiting` forms a trajectory, which is matched against the
//! configured reference paths.
//!
//! - **Exact match**: the trajectory equals a reference path. The reference
//!   counts a hit and accumulates the residence time of every step.
//! - **Partial match**: one of the two is a proper prefix of the other.

use crate::core::time::SimTime;
use crate::stats::Accumulator;
use serde::{Deserialize, Serialize};

/// Coarse phase of the source, as seen by path analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    Waiting,
    Communicating,
    CallingServer,
    WaitingServer,
}

/// Observable state of one couple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathState {
    /// Hops taken by the message in flight, zero when none
    pub hop_count: u32,
    /// Agent is migrating or reporting to the server
    pub agent_busy: bool,
    pub source_phase: SourcePhase,
    /// The message is waiting for the agent (forwarder not yet installed, or
    /// tensioning)
    pub ambiguity: bool,
}

/// One reference path and what was observed against it
#[derive(Debug, Clone)]
pub struct ReferencePath {
    states: Vec<PathState>,
    hits: u64,
    partial_hits: u64,
    residence: Vec<Accumulator>,
}

impl ReferencePath {
    pub fn new(states: Vec<PathState>) -> Self {
        let residence = vec![Accumulator::new(); states.len()];
        Self {
            states,
            hits: 0,
            partial_hits: 0,
            residence,
        }
    }

    pub fn states(&self) -> &[PathState] {
        &self.states
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn partial_hits(&self) -> u64 {
        self.partial_hits
    }

    /// Mean residence time (ms) in each step of the path
    pub fn mean_residence(&self) -> Vec<Option<f64>> {
        self.residence.iter().map(Accumulator::average).collect()
    }

    fn matches_exactly(&self, trajectory: &[PathState]) -> bool {
        self.states == trajectory
    }

    fn matches_partially(&self, trajectory: &[PathState]) -> bool {
        let (shorter, longer) = if trajectory.len() < self.states.len() {
            (trajectory, self.states.as_slice())
        } else {
            (self.states.as_slice(), trajectory)
        };
        shorter.len() < longer.len() && longer.starts_with(shorter)
    }
}

/// Summary of one reference path, as reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSummary {
    pub states: Vec<PathState>,
    pub hits: u64,
    pub partial_hits: u64,
    pub mean_residence: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default)]
struct Trajectory {
    states: Vec<PathState>,
    entered_at: Vec<SimTime>,
}

impl Trajectory {
    fn is_active(&self) -> bool {
        !self.states.is_empty()
    }

    fn push(&mut self, state: PathState, now: SimTime) {
        self.states.push(state);
        self.entered_at.push(now);
    }

    /// Residence time of each step, the last one ending at `now`
    fn residence_times(&self, now: SimTime) -> Vec<f64> {
        let mut exits: Vec<SimTime> = self.entered_at.iter().skip(1).copied().collect();
        exits.push(now);
        self.entered_at
            .iter()
            .zip(exits)
            .map(|(entered, left)| left - *entered)
            .collect()
    }
}

/// Follows every couple's trajectory and matches it on completion
#[derive(Debug, Clone)]
pub struct PathTracker {
    references: Vec<ReferencePath>,
    trajectories: Vec<Trajectory>,
    completed: u64,
    unmatched: u64,
}

impl PathTracker {
    pub fn new(references: &[Vec<PathState>], couples: usize) -> Self {
        Self {
            references: references.iter().cloned().map(ReferencePath::new).collect(),
            trajectories: vec![Trajectory::default(); couples],
            completed: 0,
            unmatched: 0,
        }
    }

    /// False when no reference path is configured
    pub fn is_enabled(&self) -> bool {
        !self.references.is_empty()
    }

    /// Record the state of `couple` at `now`
    pub fn observe(&mut self, couple: usize, state: PathState, now: SimTime) {
        let trajectory = &mut self.trajectories[couple];

        if !trajectory.is_active() {
            if state.source_phase != SourcePhase::Waiting {
                trajectory.push(state, now);
            }
            return;
        }

        if trajectory.states.last() == Some(&state) {
            return;
        }

        if state.source_phase == SourcePhase::Waiting {
            let finished = std::mem::take(trajectory);
            self.complete(&finished, now);
        } else {
            trajectory.push(state, now);
        }
    }

    fn complete(&mut self, trajectory: &Trajectory, now: SimTime) {
        self.completed += 1;
        let mut matched = false;

        for reference in &mut self.references {
            if reference.matches_exactly(&trajectory.states) {
                reference.hits += 1;
                for (acc, time) in reference
                    .residence
                    .iter_mut()
                    .zip(trajectory.residence_times(now))
                {
                    acc.add(time);
                }
                matched = true;
            } else if reference.matches_partially(&trajectory.states) {
                reference.partial_hits += 1;
                matched = true;
            }
        }

        if !matched {
            self.unmatched += 1;
        }
    }

    pub fn references(&self) -> &[ReferencePath] {
        &self.references
    }

    /// Trajectories completed so far, over all couples
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Completed trajectories that matched no reference, not even partially
    pub fn unmatched(&self) -> u64 {
        self.unmatched
    }

    pub fn summaries(&self) -> Vec<PathSummary> {
        self.references
            .iter()
            .map(|reference| PathSummary {
                states: reference.states.clone(),
                hits: reference.hits,
                partial_hits: reference.partial_hits,
                mean_residence: reference.mean_residence(),
            })
            .collect()
    }
}
