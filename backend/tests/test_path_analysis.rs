//! Tests for path analysis
//!
//! Trajectories run from the start of an attempt until the source is back
//! to waiting, and are matched exactly or by prefix against reference paths.

use location_simulator_core_rs::stats::{PathState, PathTracker, SourcePhase};
use location_simulator_core_rs::{Orchestrator, SimTime, SimulationConfig};

fn at(millis: f64) -> SimTime {
    SimTime::from_millis(millis)
}

fn communicating(hop_count: u32, agent_busy: bool) -> PathState {
    PathState {
        hop_count,
        agent_busy,
        source_phase: SourcePhase::Communicating,
        ambiguity: false,
    }
}

fn waiting() -> PathState {
    PathState {
        hop_count: 0,
        agent_busy: false,
        source_phase: SourcePhase::Waiting,
        ambiguity: false,
    }
}

#[test]
fn test_exact_match_accumulates_residence() {
    let reference = vec![communicating(1, false), communicating(2, false)];
    let mut tracker = PathTracker::new(&[reference], 2);

    for (couple, offset) in [(0, 0.0), (1, 100.0)] {
        tracker.observe(couple, communicating(1, false), at(offset));
        tracker.observe(couple, communicating(2, false), at(offset + 4.0));
        tracker.observe(couple, waiting(), at(offset + 10.0));
    }

    let path = &tracker.references()[0];
    assert_eq!(path.hits(), 2);
    assert_eq!(path.partial_hits(), 0);
    assert_eq!(path.mean_residence(), vec![Some(4.0), Some(6.0)]);
    assert_eq!(tracker.completed(), 2);
    assert_eq!(tracker.unmatched(), 0);
}

#[test]
fn test_prefix_match_in_both_directions() {
    let reference = vec![
        communicating(1, false),
        communicating(2, false),
        communicating(3, false),
    ];
    let mut tracker = PathTracker::new(&[reference], 1);

    // trajectory shorter than the reference
    tracker.observe(0, communicating(1, false), at(0.0));
    tracker.observe(0, communicating(2, false), at(1.0));
    tracker.observe(0, waiting(), at(2.0));

    // trajectory longer than the reference
    for (step, hops) in (1..=4).enumerate() {
        tracker.observe(0, communicating(hops, false), at(10.0 + step as f64));
    }
    tracker.observe(0, waiting(), at(20.0));

    let path = &tracker.references()[0];
    assert_eq!(path.hits(), 0);
    assert_eq!(path.partial_hits(), 2);
    assert_eq!(path.mean_residence(), vec![None, None, None]);
}

#[test]
fn test_diverging_trajectory_is_unmatched() {
    let reference = vec![communicating(1, false), communicating(2, false)];
    let mut tracker = PathTracker::new(&[reference], 1);

    tracker.observe(0, communicating(1, false), at(0.0));
    tracker.observe(0, communicating(1, true), at(1.0));
    tracker.observe(0, waiting(), at(2.0));

    assert_eq!(tracker.completed(), 1);
    assert_eq!(tracker.unmatched(), 1);
}

#[test]
fn test_trajectories_are_per_couple() {
    let reference = vec![communicating(1, false)];
    let mut tracker = PathTracker::new(&[reference], 2);

    tracker.observe(0, communicating(1, false), at(0.0));
    // couple 1 stays idle; its sample must not end couple 0's trajectory
    tracker.observe(1, waiting(), at(1.0));
    assert_eq!(tracker.completed(), 0);

    tracker.observe(0, waiting(), at(3.0));
    assert_eq!(tracker.completed(), 1);
    assert_eq!(tracker.references()[0].hits(), 1);
}

#[test]
fn test_disabled_without_references() {
    let tracker = PathTracker::new(&[], 3);
    assert!(!tracker.is_enabled());
    assert!(tracker.summaries().is_empty());
}

#[test]
fn test_orchestrator_reports_direct_deliveries() {
    let direct = vec![communicating(1, false)];
    let config = SimulationConfig {
        couples: 2,
        run_length: 100_000.0,
        seed: 2718,
        reference_paths: vec![direct],
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.paths.len(), 1);
    let summary = &report.paths[0];
    assert!(summary.hits > 0, "no attempt reached the agent in one hop");
    assert!(summary.mean_residence[0].map_or(false, |mean| mean > 0.0));

    // one reference: every completed trajectory is counted exactly once
    assert_eq!(
        summary.hits + summary.partial_hits + report.unmatched_trajectories,
        report.completed_trajectories
    );
}

#[test]
fn test_empty_reference_path_rejected() {
    let config = SimulationConfig {
        reference_paths: vec![vec![communicating(1, false)], vec![]],
        ..Default::default()
    };
    assert!(Orchestrator::new(config).is_err());
}
