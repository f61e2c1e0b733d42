//! Tests for deterministic random streams
//!
//! One root seed determines every duration of a run, and each rate
//! parameter draws from its own stream.

use location_simulator_core_rs::orchestrator::Rates;
use location_simulator_core_rs::rng::{DurationGenerators, RateParameter};
use location_simulator_core_rs::RngManager;

#[test]
fn test_same_seed_same_sequence() {
    let mut a = RngManager::new(98765);
    let mut b = RngManager::new(98765);

    for _ in 0..1000 {
        assert_eq!(a.next(), b.next());
    }
}

#[test]
fn test_different_seeds_diverge() {
    let mut a = RngManager::new(1);
    let mut b = RngManager::new(2);

    let first: Vec<u64> = (0..10).map(|_| a.next()).collect();
    let second: Vec<u64> = (0..10).map(|_| b.next()).collect();
    assert_ne!(first, second);
}

#[test]
fn test_zero_seed_behaves_like_one() {
    let mut zero = RngManager::new(0);
    let mut one = RngManager::new(1);
    assert_eq!(zero.next(), one.next());
}

#[test]
fn test_fork_is_reproducible() {
    let mut root_a = RngManager::new(42);
    let mut root_b = RngManager::new(42);

    let mut child_a = root_a.fork();
    let mut child_b = root_b.fork();

    assert_eq!(child_a.next(), child_b.next());
    assert_eq!(root_a.next(), root_b.next());
}

#[test]
fn test_generators_reproduce_durations() {
    let rates = Rates::default();
    let mut a = DurationGenerators::new(2024, &rates, Some(0.5));
    let mut b = DurationGenerators::new(2024, &rates, Some(0.5));

    for parameter in RateParameter::ALL {
        for _ in 0..50 {
            assert_eq!(a.sample(parameter), b.sample(parameter));
        }
    }
}

#[test]
fn test_streams_are_independent() {
    let rates = Rates::default();
    let mut quiet = DurationGenerators::new(7, &rates, Some(0.5));
    let mut busy = DurationGenerators::new(7, &rates, Some(0.5));

    // draining one stream must not shift another
    for _ in 0..100 {
        busy.sample(RateParameter::Arrival);
    }

    for _ in 0..20 {
        assert_eq!(
            quiet.sample(RateParameter::Wait),
            busy.sample(RateParameter::Wait)
        );
    }
    assert_eq!(busy.samples(RateParameter::Arrival), 100);
    assert_eq!(quiet.samples(RateParameter::Arrival), 0);
}

#[test]
fn test_lifetime_model_does_not_shift_other_streams() {
    let rates = Rates::default();
    let mut exponential = DurationGenerators::new(99, &rates, Some(0.5));
    let mut fixed = DurationGenerators::new(99, &rates, None);

    assert_eq!(fixed.rate(RateParameter::ForwarderLifetime), None);
    for _ in 0..20 {
        assert_eq!(
            exponential.sample(RateParameter::Migration),
            fixed.sample(RateParameter::Migration)
        );
    }
}

#[test]
#[should_panic(expected = "no generator configured")]
fn test_missing_lifetime_generator_panics() {
    let mut generators = DurationGenerators::new(1, &Rates::default(), None);
    generators.sample(RateParameter::ForwarderLifetime);
}

#[test]
fn test_exponential_mean_follows_rate() {
    let rates = Rates {
        hop_communication: 40.0,
        ..Rates::default()
    };
    let mut generators = DurationGenerators::new(31337, &rates, None);

    let samples = 40_000;
    let total: f64 = (0..samples)
        .map(|_| generators.sample(RateParameter::HopCommunication))
        .sum();
    let mean = total / samples as f64;

    // 40 hops per second means 25ms per hop
    assert!((mean - 25.0).abs() < 1.0, "mean was {}", mean);
    assert!(generators.rate(RateParameter::HopCommunication) == Some(40.0));
}
