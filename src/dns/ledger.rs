//! Known and pending host bookkeeping.
//!
//! The ledger is shared between the sniffer thread, which only ever adds
//! blackholed hosts to `pending`, and the resolution engine, which moves
//! resolved hosts from `pending` to `known`. Both sets are always disjoint.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use parking_lot::Mutex;

use super::wire::{DnsAnswer, DnsQuestion};
use crate::hosts::is_valid_hostname;

/// Answer address used by the upstream resolver to null a host.
pub const BLACKHOLE_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Ledger handle shared by the sniffer and the resolution engine.
pub type SharedLedger = Arc<Mutex<HostLedger>>;

/// Outcome of observing one decoded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// No single A question or no IPv4 answer.
    Ignored,
    /// The host resolved to a real address.
    Benign,
    /// The host was blackholed and is now pending.
    Blackholed,
    /// The host was blackholed but is already known or pending.
    AlreadyTracked,
}

#[derive(Debug, Default)]
pub struct HostLedger {
    known: HashSet<String>,
    pending: HashSet<String>,
}

impl HostLedger {
    /// Create a ledger from the hosts already present in the hosts file.
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
            pending: HashSet::new(),
        }
    }

    /// Wrap the ledger for sharing between tasks.
    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Apply the signal of one sniffed response.
    ///
    /// The hostname is only taken from messages with exactly one question,
    /// and only if it fits a hosts line (see [`is_valid_hostname`]).
    /// The address is the first IPv4 answer in declared order.
    pub fn observe(&mut self, questions: &[Option<DnsQuestion>], answers: &[DnsAnswer]) -> Observation {
        let host = match questions {
            [Some(question)] if is_valid_hostname(&question.name) => question.name.as_str(),
            _ => return Observation::Ignored,
        };

        let Some(address) = answers.iter().find_map(|answer| answer.address) else {
            return Observation::Ignored;
        };

        if address != BLACKHOLE_ADDRESS {
            return Observation::Benign;
        }

        if self.known.contains(host) || self.pending.contains(host) {
            return Observation::AlreadyTracked;
        }

        self.pending.insert(host.to_string());
        Observation::Blackholed
    }

    /// Move a resolved host from `pending` to `known`.
    ///
    /// Returns false if the host was not pending.
    pub fn mark_resolved(&mut self, host: &str) -> bool {
        let was_pending = self.pending.remove(host);
        self.known.insert(host.to_string());
        was_pending
    }

    /// Copy of the pending hosts, for one resolution cycle.
    pub fn pending_snapshot(&self) -> Vec<String> {
        self.pending.iter().cloned().collect()
    }

    pub fn is_known(&self, host: &str) -> bool {
        self.known.contains(host)
    }

    pub fn is_pending(&self, host: &str) -> bool {
        self.pending.contains(host)
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
