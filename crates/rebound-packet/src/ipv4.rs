use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::{fmt_payload, IpProtocol};
use std::fmt::{Debug, Formatter};
use std::net::Ipv4Addr;

const VERSION_IHL_OFFSET: usize = 0;
const TOS_OFFSET: usize = 1;
const TOTAL_LENGTH_OFFSET: usize = 2;
const IDENTIFICATION_OFFSET: usize = 4;
const FLAGS_AND_FRAGMENT_OFFSET: usize = 6;
const TTL_OFFSET: usize = 8;
const PROTOCOL_OFFSET: usize = 9;
const CHECKSUM_OFFSET: usize = 10;
const SOURCE_OFFSET: usize = 12;
const DESTINATION_OFFSET: usize = 16;

/// An `IPv4` packet view.
///
/// Fields are held in network byte order; accessors convert to and from host byte order.
pub struct Ipv4Packet<'a> {
    buf: Buffer<'a>,
}

impl<'a> Ipv4Packet<'a> {
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
                String::from("Ipv4Packet"),
                Self::minimum_packet_size(),
                len,
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn minimum_packet_size() -> usize {
        20
    }

    #[must_use]
    pub fn get_version(&self) -> u8 {
        self.buf.read(VERSION_IHL_OFFSET) >> 4
    }

    /// The header length in 32 bit words.
    #[must_use]
    pub fn get_header_length(&self) -> u8 {
        self.buf.read(VERSION_IHL_OFFSET) & 0x0f
    }

    #[must_use]
    pub fn get_tos(&self) -> u8 {
        self.buf.read(TOS_OFFSET)
    }

    #[must_use]
    pub fn get_total_length(&self) -> u16 {
        self.buf.read_u16(TOTAL_LENGTH_OFFSET)
    }

    #[must_use]
    pub fn get_identification(&self) -> u16 {
        self.buf.read_u16(IDENTIFICATION_OFFSET)
    }

    #[must_use]
    pub fn get_flags_and_fragment_offset(&self) -> u16 {
        self.buf.read_u16(FLAGS_AND_FRAGMENT_OFFSET)
    }

    #[must_use]
    pub fn get_ttl(&self) -> u8 {
        self.buf.read(TTL_OFFSET)
    }

    #[must_use]
    pub fn get_protocol(&self) -> IpProtocol {
        IpProtocol::from(self.buf.read(PROTOCOL_OFFSET))
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    #[must_use]
    pub fn get_source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.buf.read_array::<4>(SOURCE_OFFSET))
    }

    #[must_use]
    pub fn get_destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.buf.read_array::<4>(DESTINATION_OFFSET))
    }

    pub fn set_version(&mut self, val: u8) {
        let ihl = self.buf.read(VERSION_IHL_OFFSET) & 0x0f;
        self.buf.write(VERSION_IHL_OFFSET, (val << 4) | ihl);
    }

    pub fn set_header_length(&mut self, val: u8) {
        let version = self.buf.read(VERSION_IHL_OFFSET) & 0xf0;
        self.buf.write(VERSION_IHL_OFFSET, version | (val & 0x0f));
    }

    pub fn set_tos(&mut self, val: u8) {
        self.buf.write(TOS_OFFSET, val);
    }

    pub fn set_total_length(&mut self, val: u16) {
        self.buf.write_u16(TOTAL_LENGTH_OFFSET, val);
    }

    pub fn set_identification(&mut self, val: u16) {
        self.buf.write_u16(IDENTIFICATION_OFFSET, val);
    }

    pub fn set_flags_and_fragment_offset(&mut self, val: u16) {
        self.buf.write_u16(FLAGS_AND_FRAGMENT_OFFSET, val);
    }

    pub fn set_ttl(&mut self, val: u8) {
        self.buf.write(TTL_OFFSET, val);
    }

    pub fn set_protocol(&mut self, val: IpProtocol) {
        self.buf.write(PROTOCOL_OFFSET, val.id());
    }

    pub fn set_checksum(&mut self, val: u16) {
        self.buf.write_u16(CHECKSUM_OFFSET, val);
    }

    pub fn set_source(&mut self, val: Ipv4Addr) {
        self.buf.write_array(SOURCE_OFFSET, val.octets());
    }

    pub fn set_destination(&mut self, val: Ipv4Addr) {
        self.buf.write_array(DESTINATION_OFFSET, val.octets());
    }

    /// The header length in bytes, clamped to the buffer.
    #[must_use]
    pub fn header_len(&self) -> usize {
        let len = self.buf.as_slice().len();
        (usize::from(self.get_header_length()) * 4).clamp(Self::minimum_packet_size(), len)
    }

    /// The header bytes, including any options.
    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.buf.as_slice()[..self.header_len()]
    }

    /// The packet bytes, up to the smaller of the total length field and the buffer size.
    #[must_use]
    pub fn packet(&self) -> &[u8] {
        let len = self.buf.as_slice().len();
        let end = usize::from(self.get_total_length()).clamp(self.header_len(), len);
        &self.buf.as_slice()[..end]
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.packet()[self.header_len()..]
    }

    pub fn set_payload(&mut self, vals: &[u8]) {
        let start = self.header_len();
        self.buf.as_slice_mut()[start..start + vals.len()].copy_from_slice(vals);
    }

    /// Check that the header length and total length fields fit the buffer.
    pub fn validate(&self) -> Result<()> {
        let len = self.buf.as_slice().len();
        let header_len = usize::from(self.get_header_length()) * 4;
        if header_len < Self::minimum_packet_size() || header_len > len {
            return Err(Error::InvalidLength(
                String::from("Ipv4Packet header"),
                header_len,
                len,
            ));
        }
        let total_len = usize::from(self.get_total_length());
        if total_len < header_len || total_len > len {
            return Err(Error::InvalidLength(
                String::from("Ipv4Packet total"),
                total_len,
                len,
            ));
        }
        Ok(())
    }
}

impl Debug for Ipv4Packet<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ipv4Packet")
            .field("version", &self.get_version())
            .field("header_length", &self.get_header_length())
            .field("tos", &self.get_tos())
            .field("total_length", &self.get_total_length())
            .field("identification", &self.get_identification())
            .field(
                "flags_and_fragment_offset",
                &self.get_flags_and_fragment_offset(),
            )
            .field("ttl", &self.get_ttl())
            .field("protocol", &self.get_protocol())
            .field("checksum", &self.get_checksum())
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("payload", &fmt_payload(self.payload()))
            .finish()
    }
}
