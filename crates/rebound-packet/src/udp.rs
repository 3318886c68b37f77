use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::fmt_payload;
use std::fmt::{Debug, Formatter};

const SOURCE_PORT_OFFSET: usize = 0;
const DESTINATION_PORT_OFFSET: usize = 2;
const LENGTH_OFFSET: usize = 4;
const CHECKSUM_OFFSET: usize = 6;

/// A `UDP` datagram view.
pub struct UdpPacket<'a> {
    buf: Buffer<'a>,
}

impl<'a> UdpPacket<'a> {
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
                String::from("UdpPacket"),
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
    pub fn get_source(&self) -> u16 {
        self.buf.read_u16(SOURCE_PORT_OFFSET)
    }

    #[must_use]
    pub fn get_destination(&self) -> u16 {
        self.buf.read_u16(DESTINATION_PORT_OFFSET)
    }

    #[must_use]
    pub fn get_length(&self) -> u16 {
        self.buf.read_u16(LENGTH_OFFSET)
    }

    #[must_use]
    pub fn get_checksum(&self) -> u16 {
        self.buf.read_u16(CHECKSUM_OFFSET)
    }

    pub fn set_source(&mut self, val: u16) {
        self.buf.write_u16(SOURCE_PORT_OFFSET, val);
    }

    pub fn set_destination(&mut self, val: u16) {
        self.buf.write_u16(DESTINATION_PORT_OFFSET, val);
    }

    pub fn set_length(&mut self, val: u16) {
        self.buf.write_u16(LENGTH_OFFSET, val);
    }

    pub fn set_checksum(&mut self, val: u16) {
        self.buf.write_u16(CHECKSUM_OFFSET, val);
    }

    /// The payload, bounded by the length field when it fits the buffer.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        let end = usize::from(self.get_length())
            .clamp(Self::minimum_packet_size(), self.buf.as_slice().len());
        &self.buf.as_slice()[Self::minimum_packet_size()..end]
    }

    pub fn set_payload(&mut self, vals: &[u8]) {
        let start = Self::minimum_packet_size();
        self.buf.as_slice_mut()[start..start + vals.len()].copy_from_slice(vals);
    }

    /// The whole datagram, header included.
    #[must_use]
    pub fn packet(&self) -> &[u8] {
        self.buf.as_slice()
    }
}

impl Debug for UdpPacket<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpPacket")
            .field("source", &self.get_source())
            .field("destination", &self.get_destination())
            .field("length", &self.get_length())
            .field("checksum", &self.get_checksum())
            .field("payload", &fmt_payload(self.payload()))
            .finish()
    }
}
