use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::fmt_payload;
use std::fmt::{Debug, Formatter};

/// The type of an `ICMPv4` message.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IcmpType {
    DestinationUnreachable,
    TimeExceeded,
    Other(u8),
}

impl IcmpType {
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::DestinationUnreachable => 3,
            Self::TimeExceeded => 11,
            Self::Other(id) => id,
        }
    }
}

impl From<u8> for IcmpType {
    fn from(val: u8) -> Self {
        match val {
            3 => Self::DestinationUnreachable,
            11 => Self::TimeExceeded,
            id => Self::Other(id),
        }
    }
}

/// The code of an `ICMPv4` message, interpreted relative to its type.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IcmpCode(pub u8);

impl From<u8> for IcmpCode {
    fn from(val: u8) -> Self {
        Self(val)
    }
}

const TYPE_OFFSET: usize = 0;
const CODE_OFFSET: usize = 1;
const CHECKSUM_OFFSET: usize = 2;
const REST_OF_HEADER_OFFSET: usize = 4;

/// An `ICMPv4` error message view.
///
/// Destination Unreachable and Time Exceeded share this layout: type, code, checksum, four bytes
/// of type specific data, followed by the offending datagram's `IPv4` header and leading payload.
pub struct IcmpErrorPacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> IcmpErrorPacket<'a> {
    pub fn new(packet: &'a mut [u8]) -> Result<Self> {
        Self::check_len(packet.len())?;
        Ok(Self {
            buf: Buffer::Mutable(packet),
        })
    }

    pub fn new_view(packet: &'a [u8]) -> Result<Self> {
        Self::check_len(packet.len())?;
        Ok(Self {
            buf: Buffer::Immutable(packet),
        })
    }

    fn check_len(len: usize) -> Result<()> {
        if len < Self::minimum_packet_size() {
            return Err(Error::InsufficientPacketBuffer(
                String::from("IcmpErrorPacket"),
                Self::minimum_packet_size(),
                len,
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        8
    }

    #[must_use]
    pub fn get_icmp_type(&self) -> IcmpType {
        IcmpType::from(self.buf.read(TYPE_OFFSET))
    }

    #[must_use]
    pub fn get_icmp_code(&self) -> IcmpCode {
        IcmpCode(self.buf.read(CODE_OFFSET))
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    /// The type specific word (unused, or next hop MTU for fragmentation needed).
    #[must_use]
    pub fn get_rest_of_header(&self) -> [u8; 4] {
        self.buf.read_array(REST_OF_HEADER_OFFSET)
    }

    pub fn set_icmp_type(&mut self, val: IcmpType) {
        self.buf.write(TYPE_OFFSET, val.id());
    }

    pub fn set_icmp_code(&mut self, val: IcmpCode) {
        self.buf.write(CODE_OFFSET, val.0);
    }

    pub fn set_checksum(&mut self, val: u16) {
        self.buf.write_u16(CHECKSUM_OFFSET, val);
    }

    pub fn set_rest_of_header(&mut self, val: [u8; 4]) {
        self.buf.write_array(REST_OF_HEADER_OFFSET, val);
    }

    /// The embedded copy of the offending datagram.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf.as_slice()[Self::minimum_packet_size()..]
    }

    pub fn set_payload(&mut self, vals: &[u8]) {
        let start = Self::minimum_packet_size();
        self.buf.as_slice_mut()[start..start + vals.len()].copy_from_slice(vals);
    }

    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl Debug for IcmpErrorPacket<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpErrorPacket")
            .field("icmp_type", &self.get_icmp_type())
            .field("icmp_code", &self.get_icmp_code())
            .field("checksum", &self.get_checksum())
            .field("payload", &fmt_payload(self.payload()))
            .finish()
    }
}
