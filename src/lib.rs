//! Hostpatch - Pins blackholed hosts into the local hosts file.
//!
//! Hostpatch passively sniffs DNS responses on a network interface. When the
//! upstream resolver answers an A query with `0.0.0.0`, the hostname is
//! resolved through an out-of-band HTTP lookup service and the real address
//! is appended to the hosts file, after which the OS resolver cache is
//! flushed so the new mapping takes effect.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`dns`]: Wire decoding, host ledger, and out-of-band lookup
//! - [`hosts`]: Hosts file parsing and appending
//! - [`flush`]: OS resolver cache flushing
//! - [`network`]: Packet capture and DNS payload extraction
//! - [`sniffer`]: Capture loop feeding the ledger
//! - [`engine`]: Periodic resolution of pending hosts
//! - [`error`]: Error types
//!
//! # Testing
//!
//! The capture, lookup, record store and flusher sit behind traits so every
//! component can be tested without network access or root privileges:
//!
//! ```rust
//! use hostpatch::dns::{BLACKHOLE_ADDRESS, DnsAnswer, DnsQuestion, HostLedger, Observation, TYPE_A};
//!
//! let mut ledger = HostLedger::new(["already.example"]);
//! let question = DnsQuestion { name: "ads.example".into(), qtype: TYPE_A };
//! let answer = DnsAnswer { rtype: TYPE_A, address: Some(BLACKHOLE_ADDRESS) };
//!
//! assert_eq!(ledger.observe(&[Some(question)], &[answer]), Observation::Blackholed);
//! assert!(ledger.is_pending("ads.example"));
//! ```

pub mod config;
pub mod dns;
pub mod engine;
pub mod error;
pub mod flush;
pub mod hosts;
pub mod metrics;
pub mod network;
pub mod sniffer;

pub use config::Config;
pub use error::{Error, Result};
