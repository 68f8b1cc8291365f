use std::collections::HashMap;

use parking_lot::Mutex;
use relaycraft_core::{Address, ServiceMetrics};

/// Counters for one (chain, servicer) pair
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainMetrics {
    pub relays: u64,
    pub challenges: u64,
    pub timed_relays: u64,
    pub total_relay_millis: f64,
}

impl ChainMetrics {
    pub fn average_relay_millis(&self) -> Option<f64> {
        if self.timed_relays == 0 {
            return None;
        }
        Some(self.total_relay_millis / self.timed_relays as f64)
    }
}

/// In-process [`ServiceMetrics`] sink
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<(String, Address), ChainMetrics>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chain: &str, servicer: &Address) -> ChainMetrics {
        self.counters
            .lock()
            .get(&(chain.to_string(), *servicer))
            .cloned()
            .unwrap_or_default()
    }

    pub fn relays_for(&self, chain: &str, servicer: &Address) -> u64 {
        self.get(chain, servicer).relays
    }

    pub fn challenges_for(&self, chain: &str, servicer: &Address) -> u64 {
        self.get(chain, servicer).challenges
    }

    fn update(&self, chain: &str, servicer: &Address, f: impl FnOnce(&mut ChainMetrics)) {
        let mut counters = self.counters.lock();
        f(counters.entry((chain.to_string(), *servicer)).or_default());
    }
}

impl ServiceMetrics for InMemoryMetrics {
    fn add_relay_timing_for(&self, chain: &str, millis: f64, servicer: &Address) {
        self.update(chain, servicer, |m| {
            m.timed_relays += 1;
            m.total_relay_millis += millis;
        });
    }

    fn add_relay_for(&self, chain: &str, servicer: &Address) {
        self.update(chain, servicer, |m| m.relays += 1);
    }

    fn add_challenge_for(&self, chain: &str, servicer: &Address) {
        self.update(chain, servicer, |m| m.challenges += 1);
    }
}
