//! Tests for the Orchestrator
//!
//! End-to-end runs: determinism, the one-pending-event rule, the server
//! fallback after a broken chain, and the report.

use location_simulator_core_rs::orchestrator::ForwarderLifetime;
use location_simulator_core_rs::{
    EntityRef, Orchestrator, RequestOrigin, ServerMode, SimEvent, SimTime, SimulationConfig,
    SimulationEntity, SimulationError, SourceState,
};
use std::collections::HashMap;
use tracing_test::traced_test;

fn config(couples: usize, run_length: f64, seed: u64) -> SimulationConfig {
    SimulationConfig {
        couples,
        run_length,
        seed,
        ..Default::default()
    }
}

#[traced_test]
#[test]
fn test_same_seed_same_report() {
    let mut first = Orchestrator::new(config(3, 20_000.0, 4242)).unwrap();
    let mut second = Orchestrator::new(config(3, 20_000.0, 4242)).unwrap();

    let a = first.run().unwrap();
    let b = second.run().unwrap();

    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    assert_eq!(first.config_hash(), second.config_hash());
    assert!(logs_contain("starting simulation"));
    assert!(logs_contain("simulation finished"));
}

#[test]
fn test_different_seed_different_run() {
    let a = Orchestrator::new(config(2, 20_000.0, 1))
        .unwrap()
        .run()
        .unwrap();
    let b = Orchestrator::new(config(2, 20_000.0, 2))
        .unwrap()
        .run()
        .unwrap();

    assert_ne!(a.config_hash, b.config_hash);
    assert_ne!(a.aggregate.mean_latency, b.aggregate.mean_latency);
}

#[test]
fn test_step_by_step_matches_run() {
    let mut stepped = Orchestrator::new(config(2, 10_000.0, 77)).unwrap();
    let mut times = Vec::new();
    loop {
        let result = stepped.step().unwrap();
        times.push(result.time);
        if result.finished {
            break;
        }
    }
    let mut ran = Orchestrator::new(config(2, 10_000.0, 77)).unwrap();
    let report = ran.run().unwrap();

    assert!(times.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(stepped.report().to_json().unwrap(), report.to_json().unwrap());
    assert_eq!(stepped.batches(), ran.batches());
}

#[traced_test]
#[test]
fn test_at_most_one_pending_event_per_entity() {
    let config = SimulationConfig {
        server_mode: ServerMode::SingleQueue,
        forwarder_lifetime: ForwarderLifetime::Fixed { ttl: 300.0 },
        ..config(4, 30_000.0, 99)
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();

    while !orchestrator.step().unwrap().finished {
        let mut owners: HashMap<EntityRef, usize> = HashMap::new();
        for event in orchestrator.calendar().iter() {
            *owners.entry(event.owner).or_default() += 1;
        }
        for (owner, count) in owners {
            assert_eq!(count, 1, "{} has {} pending events", owner, count);
        }
    }
    assert!(logs_contain("attempt started"));
}

#[test]
fn test_clock_never_moves_backwards() {
    let mut orchestrator = Orchestrator::new(config(3, 15_000.0, 5)).unwrap();
    let mut last = SimTime::ZERO;

    while !orchestrator.step().unwrap().finished {
        let now = orchestrator.now();
        assert!(now >= last);
        if let Some(next) = orchestrator.calendar().peek_time() {
            assert!(next >= now);
        }
        last = now;
    }
    assert_eq!(orchestrator.now().as_millis(), 15_000.0);
}

#[test]
fn test_every_failure_sends_one_query() {
    let config = SimulationConfig {
        forwarder_lifetime: ForwarderLifetime::Fixed { ttl: 100.0 },
        record_events: true,
        ..config(2, 40_000.0, 31)
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.run().unwrap();

    let state = orchestrator.state();
    let log = state.event_log();
    let mut total_failures = 0;
    for (couple, source) in state.sources().iter().enumerate() {
        let failed = log
            .events_for_couple(couple)
            .iter()
            .filter(|e| matches!(e, SimEvent::TraversalFailed { .. }))
            .count() as u64;
        let queries = log
            .events_for_couple(couple)
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SimEvent::RequestEnqueued {
                        origin: RequestOrigin::Source,
                        ..
                    }
                )
            })
            .count() as u64;

        assert_eq!(failed, source.stats().failures);
        // the last query may still be on its way when the run ends
        let in_flight = u64::from(source.state() == SourceState::CallingServer);
        assert_eq!(queries + in_flight, failed);
        total_failures += failed;
    }
    assert!(total_failures > 0, "run never exercised the server fallback");
}

#[test]
fn test_server_reply_restarts_traversal() {
    let config = SimulationConfig {
        forwarders_born_alive: false,
        record_events: true,
        ..config(1, 20_000.0, 8)
    };
    let mut orchestrator = Orchestrator::new(config).unwrap();
    orchestrator.run().unwrap();

    let log = orchestrator.state().event_log();
    let replies = log.events_of_type("ServerReplied").len();
    assert!(replies > 0);

    let source = orchestrator.state().source(0).unwrap();
    // each reply starts one more traversal on top of the first try
    assert!(source.stats().successes + source.stats().failures >= replies as u64);
}

#[test]
fn test_no_agent_updates_when_disabled() {
    let config = SimulationConfig {
        agent_calls_server: false,
        ..config(2, 20_000.0, 12)
    };
    let report = Orchestrator::new(config).unwrap().run().unwrap();

    assert_eq!(report.server.agent_updates_served, 0);
    assert_eq!(report.aggregate.location_updates, 0);
    assert!(report.aggregate.migrations > 0);
}

#[test]
fn test_report_aggregates_couples() {
    let mut orchestrator = Orchestrator::new(config(3, 20_000.0, 55)).unwrap();
    let report = orchestrator.run().unwrap();

    assert_eq!(report.couples.len(), 3);
    assert_eq!(report.aggregate.couple, None);
    assert_eq!(
        report.aggregate.attempts,
        report.couples.iter().map(|c| c.attempts).sum::<u64>()
    );
    assert_eq!(
        report.aggregate.successes + report.aggregate.failures,
        report
            .couples
            .iter()
            .map(|c| c.successes + c.failures)
            .sum::<u64>()
    );
    assert_eq!(report.elapsed, 20_000.0);
    assert!((0.0..=1.0).contains(&report.server.utilization));

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["couples"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_mid_run_report() {
    let mut orchestrator = Orchestrator::new(config(1, 50_000.0, 3)).unwrap();
    for _ in 0..200 {
        orchestrator.step().unwrap();
    }
    let report = orchestrator.report();

    assert!(!orchestrator.is_finished());
    assert_eq!(report.elapsed, orchestrator.now().as_millis());
    assert_eq!(report.batches, 200);
}

#[test]
fn test_invalid_rate_rejected() {
    let mut config = config(1, 1_000.0, 1);
    config.rates.hop_communication = 0.0;

    assert!(matches!(
        Orchestrator::new(config),
        Err(SimulationError::InvalidConfig(_))
    ));
}

#[test]
fn test_initial_entities() {
    let orchestrator = Orchestrator::new(config(2, 1_000.0, 1)).unwrap();
    let state = orchestrator.state();

    assert_eq!(state.num_couples(), 2);
    for couple in 0..2 {
        let agent = state.agent(couple).unwrap();
        assert_eq!(agent.site(), 0);
        assert!(agent.pending_event().is_some());
        assert_eq!(state.source(couple).unwrap().known_hop(), 0);
        assert!(state.chain(couple).unwrap().forwarders().is_empty());
    }
    assert!(state.agent(2).is_none());
    assert!(state.server().is_idle());
}
