//! Simulation entity contract
//!
//! Every stateful participant owns a [`Timer`]: at most one pending event in
//! the shared calendar. Re-arming cancels the previous event first, so a
//! stale transition can never fire.
//!
//! Transitions receive a [`Scheduler`]: the calendar and the duration
//! generators, pinned to the current instant.

use crate::core::calendar::{Calendar, EntityRef, EventKey};
use crate::core::time::SimTime;
use crate::rng::{DurationGenerators, RateParameter};
use std::fmt::Debug;

/// The single pending event of one entity
#[derive(Debug, Clone)]
pub struct Timer {
    owner: EntityRef,
    pending: Option<EventKey>,
}

impl Timer {
    pub fn new(owner: EntityRef) -> Self {
        Self {
            owner,
            pending: None,
        }
    }

    pub fn owner(&self) -> EntityRef {
        self.owner
    }

    /// Cancel any armed event and schedule a new one at `now + remaining`.
    pub fn arm(
        &mut self,
        calendar: &mut Calendar,
        now: SimTime,
        remaining: f64,
        label: &'static str,
    ) -> EventKey {
        self.disarm(calendar);
        let key = calendar.insert(now + remaining, self.owner, label);
        self.pending = Some(key);
        key
    }

    /// Cancel the armed event, if any. Returns true if one was removed.
    pub fn disarm(&mut self, calendar: &mut Calendar) -> bool {
        match self.pending.take() {
            Some(key) => calendar.cancel(&key),
            None => false,
        }
    }

    /// Consume a fired event.
    ///
    /// Returns false when `key` is not this timer's pending event; the
    /// caller must then drop the event as stale.
    pub fn fire(&mut self, key: EventKey) -> bool {
        if self.pending == Some(key) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> Option<EventKey> {
        self.pending
    }

    /// Milliseconds until the armed event fires, zero when unarmed
    pub fn remaining_time(&self, now: SimTime) -> f64 {
        self.pending
            .map(|key| (key.time - now).max(0.0))
            .unwrap_or(0.0)
    }
}

/// Contract shared by agents, sources, chains, forwarders and the server.
pub trait SimulationEntity {
    type State: Copy + Debug + PartialEq;

    /// Current discrete state
    fn state(&self) -> Self::State;

    fn timer(&self) -> &Timer;

    fn timer_mut(&mut self) -> &mut Timer;

    fn entity_ref(&self) -> EntityRef {
        self.timer().owner()
    }

    fn pending_event(&self) -> Option<EventKey> {
        self.timer().pending()
    }

    fn remaining_time(&self, now: SimTime) -> f64 {
        self.timer().remaining_time(now)
    }

    /// Arm this entity's timer, replacing any previously armed event
    fn arm(
        &mut self,
        calendar: &mut Calendar,
        now: SimTime,
        remaining: f64,
        label: &'static str,
    ) -> EventKey {
        self.timer_mut().arm(calendar, now, remaining, label)
    }
}

/// Scheduling context handed to entity transitions for one instant
pub struct Scheduler<'a> {
    calendar: &'a mut Calendar,
    generators: &'a mut DurationGenerators,
    now: SimTime,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        calendar: &'a mut Calendar,
        generators: &'a mut DurationGenerators,
        now: SimTime,
    ) -> Self {
        Self {
            calendar,
            generators,
            now,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn sample(&mut self, parameter: RateParameter) -> f64 {
        self.generators.sample(parameter)
    }

    /// Arm `timer` to fire `delay` milliseconds from now
    pub fn arm(&mut self, timer: &mut Timer, delay: f64, label: &'static str) -> EventKey {
        timer.arm(self.calendar, self.now, delay, label)
    }

    /// Arm `timer` with a duration drawn from `parameter`
    pub fn arm_sampled(
        &mut self,
        timer: &mut Timer,
        parameter: RateParameter,
        label: &'static str,
    ) -> EventKey {
        let delay = self.generators.sample(parameter);
        self.arm(timer, delay, label)
    }

    pub fn disarm(&mut self, timer: &mut Timer) -> bool {
        timer.disarm(self.calendar)
    }

    pub fn calendar(&self) -> &Calendar {
        self.calendar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rearm_cancels_previous_event() {
        let mut calendar = Calendar::new();
        let mut timer = Timer::new(EntityRef::Agent(0));

        let first = timer.arm(&mut calendar, SimTime::ZERO, 10.0, "wait");
        let second = timer.arm(&mut calendar, SimTime::ZERO, 4.0, "wait");

        assert!(!calendar.contains(&first));
        assert!(calendar.contains(&second));
        assert_eq!(calendar.pending_for(EntityRef::Agent(0)), 1);
    }

    #[test]
    fn test_fire_rejects_stale_key() {
        let mut calendar = Calendar::new();
        let mut timer = Timer::new(EntityRef::Source(2));

        let stale = timer.arm(&mut calendar, SimTime::ZERO, 1.0, "arrival");
        let live = timer.arm(&mut calendar, SimTime::ZERO, 2.0, "arrival");

        assert!(!timer.fire(stale));
        assert!(timer.fire(live));
        assert!(timer.pending().is_none());
    }

    #[test]
    fn test_remaining_time() {
        let mut calendar = Calendar::new();
        let mut timer = Timer::new(EntityRef::Server);
        timer.arm(&mut calendar, SimTime::from_millis(5.0), 20.0, "service");

        assert_eq!(timer.remaining_time(SimTime::from_millis(10.0)), 15.0);
        timer.disarm(&mut calendar);
        assert_eq!(timer.remaining_time(SimTime::from_millis(10.0)), 0.0);
        assert!(calendar.is_empty());
    }

    #[test]
    fn test_scheduler_arms_sampled_duration() {
        use crate::orchestrator::config::Rates;

        let mut calendar = Calendar::new();
        let mut generators = DurationGenerators::new(7, &Rates::default(), None);
        let mut timer = Timer::new(EntityRef::Chain(0));

        let now = SimTime::from_millis(100.0);
        let mut sched = Scheduler::new(&mut calendar, &mut generators, now);
        let key = sched.arm_sampled(&mut timer, RateParameter::HopCommunication, "hop");

        assert!(key.time >= now);
        assert_eq!(calendar.pending_for(EntityRef::Chain(0)), 1);
        assert_eq!(generators.samples(RateParameter::HopCommunication), 1);
    }
}
