//! Packet capture abstraction.
//!
//! Provides a trait-based abstraction over packet capture to enable:
//! - Testing without real network interfaces
//! - Different capture backends

use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;

use crate::error::NetworkError;

/// DNS server port.
pub const DNS_PORT: u16 = 53;

/// How long a read may block before the capture loop rechecks its stop flag.
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// What a capture produced on one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    /// A raw link-layer frame.
    Frame(Vec<u8>),
    /// Nothing arrived within the read timeout.
    Idle,
    /// The capture has ended.
    Closed,
}

/// Trait for packet capture implementations.
pub trait PacketCapture: Send {
    /// Receive the next frame.
    ///
    /// Errors are unrecoverable for this capture.
    fn next_packet(&mut self) -> Result<CaptureEvent, NetworkError>;
}

/// Names of all interfaces pnet can see.
pub fn interface_names() -> Vec<String> {
    datalink::interfaces()
        .into_iter()
        .map(|iface| iface.name)
        .collect()
}

/// Find a suitable network interface.
///
/// Returns the named interface, or else the first interface that is:
/// - Up (active)
/// - Not a loopback interface
/// - Has at least one IP address
pub fn find_interface(name: Option<&str>) -> Result<NetworkInterface, NetworkError> {
    let interfaces = datalink::interfaces();

    if let Some(name) = name {
        interfaces
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or(NetworkError::NoInterface)
    } else {
        interfaces
            .into_iter()
            .find(|iface| iface.is_up() && !iface.is_loopback() && !iface.ips.is_empty())
            .ok_or(NetworkError::NoInterface)
    }
}

/// Production packet capture using pnet.
///
/// The interface is opened in promiscuous mode. The channel is closed when
/// the capture is dropped.
pub struct PnetCapture {
    rx: Box<dyn DataLinkReceiver>,
}

impl PnetCapture {
    /// Open a capture on the given interface.
    pub fn new(interface: &NetworkInterface) -> Result<Self, NetworkError> {
        let config = datalink::Config {
            read_timeout: Some(READ_TIMEOUT),
            promiscuous: true,
            ..datalink::Config::default()
        };

        let rx = match datalink::channel(interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => rx,
            Ok(_) => return Err(NetworkError::UnsupportedChannel),
            Err(e) => return Err(NetworkError::ChannelOpen(e.to_string())),
        };

        Ok(Self { rx })
    }
}

impl PacketCapture for PnetCapture {
    fn next_packet(&mut self) -> Result<CaptureEvent, NetworkError> {
        match self.rx.next() {
            Ok(frame) => Ok(CaptureEvent::Frame(frame.to_vec())),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(CaptureEvent::Idle)
            }
            Err(err) => Err(NetworkError::Receive(err)),
        }
    }
}

/// Extract the DNS payload of a response frame.
///
/// Returns None if:
/// - The frame is not Ethernet carrying IPv4 or IPv6
/// - The packet is not UDP, or is a non-first IPv4 fragment
/// - The source port is not 53 (DNS)
pub fn extract_dns_response(frame: &[u8]) -> Option<Vec<u8>> {
    let ethernet = EthernetPacket::new(frame)?;

    let ip_payload = match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ipv4 = Ipv4Packet::new(ethernet.payload())?;
            if ipv4.get_next_level_protocol() != IpNextHeaderProtocols::Udp
                || ipv4.get_fragment_offset() != 0
            {
                return None;
            }
            ipv4.payload().to_vec()
        }
        EtherTypes::Ipv6 => {
            let ipv6 = Ipv6Packet::new(ethernet.payload())?;
            if ipv6.get_next_header() != IpNextHeaderProtocols::Udp {
                return None;
            }
            ipv6.payload().to_vec()
        }
        _ => return None,
    };

    let udp = UdpPacket::new(&ip_payload)?;

    if udp.get_source() != DNS_PORT {
        return None;
    }

    Some(udp.payload().to_vec())
}
