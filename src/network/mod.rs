//! Network capture of DNS responses.

mod capture;

pub use capture::{
    CaptureEvent, DNS_PORT, PacketCapture, PnetCapture, READ_TIMEOUT, extract_dns_response,
    find_interface, interface_names,
};

#[cfg(test)]
pub use capture::tests::{MockCapture, ipv4_udp_frame};
