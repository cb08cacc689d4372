//! DNS decoding, host bookkeeping and out-of-band lookup.

pub mod ledger;
pub mod lookup;
pub mod wire;

pub use ledger::{BLACKHOLE_ADDRESS, HostLedger, Observation, SharedLedger};
pub use lookup::{HostLookup, NslookupClient};
pub use wire::{DnsAnswer, DnsQuestion, SniffedPacket, TYPE_A, decode};
