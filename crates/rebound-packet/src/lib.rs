//! Wire format views for the packets exchanged with a device under test.
//!
//! The following packets are supported:
//! - `IPv4`
//! - `UDP`
//! - `ICMPv4` error messages (Destination Unreachable, Time Exceeded)
//!
//! # Endianness
//!
//! The internal representation is held in network byte order (big-endian) and
//! all accessor methods take and return data in host byte order, converting as
//! necessary for the given architecture.
//!
//! # Example
//!
//! The following example parses a `UDP` datagram and asserts its fields:
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use rebound_packet::udp::UdpPacket;
//!
//! let buf = hex_literal::hex!("9c 40 c3 50 00 0f dd f8 72 65 62 6f 75 6e 64");
//! let packet = UdpPacket::new_view(&buf)?;
//! assert_eq!(40000, packet.get_source());
//! assert_eq!(50000, packet.get_destination());
//! assert_eq!(15, packet.get_length());
//! assert_eq!(b"rebound", packet.payload());
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]

mod buffer;

/// Packet errors.
pub mod error;

/// Functions for calculating network checksums.
pub mod checksum;

/// `ICMPv4` packets.
pub mod icmpv4;

/// `IPv4` packets.
pub mod ipv4;

/// `UDP` packets.
pub mod udp;

/// The IP packet next layer protocol.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IpProtocol {
    Icmp,
    Udp,
    Other(u8),
}

impl IpProtocol {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Udp => 17,
            Self::Other(id) => id,
        }
    }
}

impl From<u8> for IpProtocol {
    fn from(id: u8) -> Self {
        match id {
            1 => Self::Icmp,
            17 => Self::Udp,
            p => Self::Other(p),
        }
    }
}

/// Format a payload as a hexadecimal string.
#[must_use]
pub fn fmt_payload(bytes: &[u8]) -> String {
    use itertools::Itertools as _;
    format!("{:02x}", bytes.iter().format(" "))
}
