//! Forwarder model
//!
//! A forwarder is the breadcrumb an agent leaves on the site it departs
//! from. While alive it relays any message for the agent to the next site.
//!
//! # Lifecycle
//!
//! ```text
//! Actif ──(lifetime expires)──► UpdatingServer ──(update sent)──► Dead
//!   └──────(expires, no server update)───────────────────────────► Dead
//! ```
//!
//! A forwarder can also be born `Dead` when the model disables them.
//! A forwarder with an infinite lifetime never arms a timer.

use crate::core::calendar::EntityRef;
use crate::core::entity::{SimulationEntity, Timer};
use crate::core::time::SimTime;
use serde::{Deserialize, Serialize};

/// Discrete state of a forwarder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwarderState {
    /// Relays messages to `site + 1`
    Actif,
    /// Expired; reporting the last known hop to the server
    UpdatingServer,
    Dead,
}

#[derive(Debug, Clone)]
pub struct Forwarder {
    site: u64,
    state: ForwarderState,
    born_at: SimTime,
    timer: Timer,
}

impl Forwarder {
    pub fn new(couple: usize, site: u64, alive: bool, born_at: SimTime) -> Self {
        Self {
            site,
            state: if alive {
                ForwarderState::Actif
            } else {
                ForwarderState::Dead
            },
            born_at,
            timer: Timer::new(EntityRef::Forwarder { couple, site }),
        }
    }

    /// Site this forwarder was left at
    pub fn site(&self) -> u64 {
        self.site
    }

    /// Site a message is relayed to
    pub fn next_site(&self) -> u64 {
        self.site + 1
    }

    pub fn born_at(&self) -> SimTime {
        self.born_at
    }

    /// Only an `Actif` forwarder relays messages
    pub fn is_live(&self) -> bool {
        self.state == ForwarderState::Actif
    }

    pub fn is_dead(&self) -> bool {
        self.state == ForwarderState::Dead
    }

    /// Lifetime ran out. Returns the new state.
    pub fn expire(&mut self, calls_server: bool) -> ForwarderState {
        if self.state == ForwarderState::Actif {
            self.state = if calls_server {
                ForwarderState::UpdatingServer
            } else {
                ForwarderState::Dead
            };
        }
        self.state
    }

    /// The server update left; the forwarder is gone for good
    pub fn finish_update(&mut self) {
        self.state = ForwarderState::Dead;
    }
}

impl SimulationEntity for Forwarder {
    type State = ForwarderState;

    fn state(&self) -> ForwarderState {
        self.state
    }

    fn timer(&self) -> &Timer {
        &self.timer
    }

    fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }
}
