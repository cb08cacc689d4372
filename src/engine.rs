//! Resolution of pending hosts.
//!
//! Every cycle looks up all pending hosts concurrently. Results are consumed
//! one at a time, in completion order, by the engine itself: it alone writes
//! the hosts file and moves hosts from `pending` to `known`, so each outcome
//! produces at most one append and one ledger update. Failed hosts stay
//! pending and are retried on the next cycle, without limit.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::dns::{HostLookup, SharedLedger};
use crate::flush::CacheFlusher;
use crate::hosts::{HostRecord, RecordStore};
use crate::metrics as m;

/// Outcome of one `resolve_pending` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub attempted: usize,
    pub resolved: usize,
    pub failed: usize,
}

pub struct ResolutionEngine<L, S, F>
where
    L: HostLookup,
    S: RecordStore,
    F: CacheFlusher,
{
    ledger: SharedLedger,
    store: Arc<Mutex<S>>,
    lookup: L,
    flusher: F,
    interval: Duration,
    dirty: bool,
}

impl<L, S, F> ResolutionEngine<L, S, F>
where
    L: HostLookup,
    S: RecordStore,
    F: CacheFlusher,
{
    pub fn new(ledger: SharedLedger, store: S, lookup: L, flusher: F, interval: Duration) -> Self {
        Self {
            ledger,
            store: Arc::new(Mutex::new(store)),
            lookup,
            flusher,
            interval,
            dirty: false,
        }
    }

    /// Whether records were appended since the last cache flush.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn store(&self) -> MutexGuard<'_, S> {
        self.store.lock()
    }

    /// Look up every pending host and record the successful ones.
    ///
    /// Returns once all lookups of this pass have finished.
    #[instrument(skip(self))]
    pub async fn resolve_pending(&mut self) -> CycleReport {
        let hosts = self.ledger.lock().pending_snapshot();
        let mut report = CycleReport {
            attempted: hosts.len(),
            ..CycleReport::default()
        };
        if hosts.is_empty() {
            return report;
        }

        let mut lookups = JoinSet::new();
        for host in hosts {
            debug!(%host, "looking up");
            let lookup = self.lookup.clone();
            lookups.spawn(async move {
                let result = lookup.lookup(&host).await;
                (host, result)
            });
        }

        while let Some(joined) = lookups.join_next().await {
            let (host, result) = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "lookup task failed");
                    report.failed += 1;
                    continue;
                }
            };

            match result {
                Ok(address) => {
                    metrics::counter!(m::LOOKUPS_TOTAL, "outcome" => "success").increment(1);
                    if self.commit(&host, address).await {
                        report.resolved += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Err(err) => {
                    metrics::counter!(m::LOOKUPS_TOTAL, "outcome" => "failure").increment(1);
                    warn!(%host, error = %err, "lookup failed, will retry");
                    report.failed += 1;
                }
            }
        }

        metrics::gauge!(m::PENDING_HOSTS).set(self.ledger.lock().pending_len() as f64);
        report
    }

    /// Append the record and mark the host known.
    ///
    /// The append runs on the blocking pool. The host stays pending if it
    /// fails.
    async fn commit(&mut self, host: &str, address: Ipv4Addr) -> bool {
        if self.ledger.lock().is_known(host) {
            debug!(%host, "already known, skipping append");
            return false;
        }

        let record = HostRecord::new(host, address);
        let store = Arc::clone(&self.store);
        let appended = tokio::task::spawn_blocking(move || store.lock().append(&record)).await;
        match appended {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(%host, error = %err, "failed to write hosts record, will retry");
                return false;
            }
            Err(err) => {
                warn!(%host, error = %err, "hosts append task failed, will retry");
                return false;
            }
        }

        self.ledger.lock().mark_resolved(host);
        self.dirty = true;
        metrics::counter!(m::RECORDS_APPENDED_TOTAL).increment(1);
        info!(%host, %address, "pinned host");
        true
    }

    /// Flush the resolver cache if records were written since the last flush.
    ///
    /// A failed flush is logged and not retried.
    pub async fn flush_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }

        let outcome = if self.flusher.flush().await {
            "success"
        } else {
            warn!("resolver cache flush failed");
            "failure"
        };
        metrics::counter!(m::CACHE_FLUSHES_TOTAL, "outcome" => outcome).increment(1);
        self.dirty = false;
    }

    /// One full cycle: resolve, wait, flush.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let report = self.resolve_pending().await;
        if report.attempted > 0 {
            debug!(?report, "resolution pass finished");
        }
        tokio::time::sleep(self.interval).await;
        self.flush_if_dirty().await;
        report
    }

    /// Run cycles until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        info!(interval = ?self.interval, "resolution engine started");
        while running.load(Ordering::SeqCst) {
            self.run_cycle().await;
        }
        info!("resolution engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    use crate::dns::lookup::tests::MockLookup;
    use crate::dns::{BLACKHOLE_ADDRESS, DnsAnswer, DnsQuestion, HostLedger, TYPE_A};
    use crate::flush::tests::MockFlusher;
    use crate::hosts::HostsFile;
    use crate::hosts::tests::FailingStore;

    fn blackhole(ledger: &SharedLedger, host: &str) {
        ledger.lock().observe(
            &[Some(DnsQuestion {
                name: host.to_string(),
                qtype: TYPE_A,
            })],
            &[DnsAnswer {
                rtype: TYPE_A,
                address: Some(BLACKHOLE_ADDRESS),
            }],
        );
    }

    fn hosts_file(content: &str) -> (NamedTempFile, HostsFile) {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), content).unwrap();
        let hosts = HostsFile::open(temp.path()).unwrap();
        (temp, hosts)
    }

    fn engine<S: RecordStore>(
        ledger: &SharedLedger,
        store: S,
        lookup: &MockLookup,
        flusher: &MockFlusher,
    ) -> ResolutionEngine<MockLookup, S, MockFlusher> {
        ResolutionEngine::new(
            Arc::clone(ledger),
            store,
            lookup.clone(),
            flusher.clone(),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn should_append_resolved_host_and_mark_known() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "example.com");
        let lookup =
            MockLookup::new().with_address("example.com", Ipv4Addr::new(93, 184, 216, 34));
        let flusher = MockFlusher::new();
        let (temp, store) = hosts_file("127.0.0.1 localhost\n");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        let report = engine.resolve_pending().await;

        assert_eq!(
            report,
            CycleReport {
                attempted: 1,
                resolved: 1,
                failed: 0
            }
        );
        assert!(engine.is_dirty());
        assert!(ledger.lock().is_known("example.com"));
        assert!(!ledger.lock().is_pending("example.com"));
        assert_eq!(
            std::fs::read_to_string(temp.path()).unwrap(),
            "127.0.0.1 localhost\n\t93.184.216.34\texample.com\n"
        );
    }

    #[tokio::test]
    async fn should_keep_host_pending_when_lookup_fails() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "example.com");
        let lookup = MockLookup::new();
        let flusher = MockFlusher::new();
        let (temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        let report = engine.resolve_pending().await;

        assert_eq!(report.failed, 1);
        assert!(!engine.is_dirty());
        assert!(ledger.lock().is_pending("example.com"));
        assert!(std::fs::read_to_string(temp.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_retry_pending_host_on_next_cycle() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "flaky.com");
        let lookup = MockLookup::new();
        let flusher = MockFlusher::new();
        let (temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        engine.run_cycle().await;
        engine.run_cycle().await;
        assert!(ledger.lock().is_pending("flaky.com"));
        assert_eq!(lookup.lookup_count(), 2);

        lookup.set_address("flaky.com", Ipv4Addr::new(10, 0, 0, 1));
        engine.run_cycle().await;

        assert!(ledger.lock().is_known("flaky.com"));
        assert_eq!(lookup.lookup_count(), 3);
        assert_eq!(
            std::fs::read_to_string(temp.path()).unwrap(),
            "\t10.0.0.1\tflaky.com\n"
        );

        // resolved hosts are not looked up again
        engine.run_cycle().await;
        assert_eq!(lookup.lookup_count(), 3);
    }

    #[tokio::test]
    async fn should_keep_host_pending_when_append_fails() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "example.com");
        let lookup = MockLookup::new().with_address("example.com", Ipv4Addr::new(1, 2, 3, 4));
        let flusher = MockFlusher::new();
        let mut engine = engine(&ledger, FailingStore::default(), &lookup, &flusher);

        let report = engine.resolve_pending().await;
        engine.resolve_pending().await;

        assert_eq!(report.failed, 1);
        assert_eq!(engine.store().attempts, 2);
        assert!(ledger.lock().is_pending("example.com"));
        assert!(!ledger.lock().is_known("example.com"));
        assert!(!engine.is_dirty());
    }

    /// Lookup that marks the host known behind the engine's back.
    #[derive(Clone)]
    struct ResolvedElsewhere {
        ledger: SharedLedger,
    }

    impl HostLookup for ResolvedElsewhere {
        async fn lookup(&self, host: &str) -> Result<Ipv4Addr, crate::error::LookupError> {
            self.ledger.lock().mark_resolved(host);
            Ok(Ipv4Addr::new(1, 2, 3, 4))
        }
    }

    #[tokio::test]
    async fn should_not_append_host_known_before_lookup_completes() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "example.com");
        let lookup = ResolvedElsewhere {
            ledger: Arc::clone(&ledger),
        };
        let mut engine = ResolutionEngine::new(
            Arc::clone(&ledger),
            FailingStore::default(),
            lookup,
            MockFlusher::new(),
            Duration::ZERO,
        );

        let report = engine.resolve_pending().await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.resolved, 0);
        assert_eq!(engine.store().attempts, 0);
        assert!(!engine.is_dirty());
        assert!(ledger.lock().is_known("example.com"));
    }

    #[tokio::test]
    async fn should_resolve_many_hosts_in_one_cycle() {
        let ledger = HostLedger::default().shared();
        let lookup = MockLookup::new();
        for i in 0..20u8 {
            let host = format!("host{i}.example");
            blackhole(&ledger, &host);
            if i % 2 == 0 {
                lookup.set_address(&host, Ipv4Addr::new(10, 0, 0, i));
            }
        }
        let flusher = MockFlusher::new();
        let (temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        let report = engine.resolve_pending().await;

        assert_eq!(report.attempted, 20);
        assert_eq!(report.resolved, 10);
        assert_eq!(report.failed, 10);
        assert_eq!(ledger.lock().pending_len(), 10);
        assert_eq!(ledger.lock().known_len(), 10);

        let mut reloaded = HostsFile::open(temp.path()).unwrap();
        let known = reloaded.load().unwrap();
        assert_eq!(known.len(), 10);
        assert!(known.contains("host0.example"));
        assert!(!known.contains("host1.example"));
        let content = std::fs::read_to_string(temp.path()).unwrap();
        assert_eq!(content.lines().count(), 10);
    }

    #[tokio::test]
    async fn should_do_nothing_without_pending_hosts() {
        let ledger = HostLedger::new(["known.com"]).shared();
        let lookup = MockLookup::new();
        let flusher = MockFlusher::new();
        let (_temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        let report = engine.run_cycle().await;

        assert_eq!(report, CycleReport::default());
        assert_eq!(lookup.lookup_count(), 0);
        assert_eq!(flusher.flush_count(), 0);
    }

    #[tokio::test]
    async fn should_flush_once_after_successful_cycle() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "a.com");
        blackhole(&ledger, "b.com");
        let lookup = MockLookup::new()
            .with_address("a.com", Ipv4Addr::new(1, 1, 1, 1))
            .with_address("b.com", Ipv4Addr::new(2, 2, 2, 2));
        let flusher = MockFlusher::new();
        let (_temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        engine.run_cycle().await;
        assert_eq!(flusher.flush_count(), 1);
        assert!(!engine.is_dirty());

        engine.run_cycle().await;
        assert_eq!(flusher.flush_count(), 1);
    }

    #[tokio::test]
    async fn should_clear_dirty_even_when_flush_fails() {
        let ledger = HostLedger::default().shared();
        blackhole(&ledger, "a.com");
        let lookup = MockLookup::new().with_address("a.com", Ipv4Addr::new(1, 1, 1, 1));
        let flusher = MockFlusher::new();
        flusher.fail.store(true, Ordering::SeqCst);
        let (_temp, store) = hosts_file("");
        let mut engine = engine(&ledger, store, &lookup, &flusher);

        engine.run_cycle().await;

        assert_eq!(flusher.flush_count(), 1);
        assert!(!engine.is_dirty());
    }

    #[tokio::test]
    async fn should_stop_when_flag_cleared() {
        let ledger = HostLedger::default().shared();
        let lookup = MockLookup::new();
        let flusher = MockFlusher::new();
        let (_temp, store) = hosts_file("");
        let engine = engine(&ledger, store, &lookup, &flusher);

        engine.run(Arc::new(AtomicBool::new(false))).await;

        assert_eq!(lookup.lookup_count(), 0);
    }
}
