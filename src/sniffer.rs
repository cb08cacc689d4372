//! Capture loop feeding sniffed DNS responses into the ledger.
//!
//! Runs on a blocking thread. Per frame it extracts the UDP payload, decodes
//! it and updates the ledger; it never touches the hosts file or the network
//! beyond the capture itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::dns::{HostLedger, Observation, decode};
use crate::error::{DecodeError, Result};
use crate::metrics as m;
use crate::network::{CaptureEvent, PacketCapture, extract_dns_response};

/// Counters for one sniffer run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SniffStats {
    pub frames: u64,
    pub responses: u64,
    pub decode_errors: u64,
    pub blackholed: u64,
}

/// Decode one DNS payload and apply it to the ledger.
///
/// Payloads without questions or answers are ignored.
pub fn process_payload(
    payload: &[u8],
    ledger: &Mutex<HostLedger>,
) -> std::result::Result<Observation, DecodeError> {
    let packet = decode(payload)?;
    if packet.is_empty() {
        return Ok(Observation::Ignored);
    }

    let observation = ledger.lock().observe(&packet.questions, &packet.answers);

    if let [Some(question)] = packet.questions.as_slice() {
        match observation {
            Observation::Blackholed => {
                info!(host = %question.name, "blackholed host observed");
                metrics::counter!(m::BLACKHOLED_TOTAL).increment(1);
            }
            Observation::Benign => trace!(host = %question.name, "host resolved normally"),
            Observation::AlreadyTracked | Observation::Ignored => {}
        }
    }

    Ok(observation)
}

/// Run the capture loop until `running` is cleared or the capture ends.
///
/// The capture is consumed and released on every exit path. Capture errors
/// end the loop and are returned; malformed payloads are counted and dropped.
pub fn run_sniffer<C>(
    mut capture: C,
    ledger: Arc<Mutex<HostLedger>>,
    running: Arc<AtomicBool>,
) -> Result<SniffStats>
where
    C: PacketCapture,
{
    let mut stats = SniffStats::default();

    while running.load(Ordering::SeqCst) {
        let frame = match capture.next_packet()? {
            CaptureEvent::Frame(frame) => frame,
            CaptureEvent::Idle => continue,
            CaptureEvent::Closed => {
                info!("capture closed");
                break;
            }
        };
        stats.frames += 1;

        let Some(payload) = extract_dns_response(&frame) else {
            continue;
        };
        stats.responses += 1;
        metrics::counter!(m::PACKETS_TOTAL).increment(1);

        match process_payload(&payload, &ledger) {
            Ok(Observation::Blackholed) => stats.blackholed += 1,
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "dropping malformed DNS payload");
                stats.decode_errors += 1;
                metrics::counter!(m::DECODE_ERRORS_TOTAL).increment(1);
            }
        }
    }

    Ok(stats)
}
