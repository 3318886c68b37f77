use crate::error::{Error, Result};
use crate::types::IcmpErrorKind;
use rebound_packet::checksum::{icmp_ipv4_checksum, ipv4_header_checksum, udp_ipv4_checksum};
use rebound_packet::icmpv4::{IcmpCode, IcmpErrorPacket, IcmpType};
use rebound_packet::ipv4::Ipv4Packet;
use rebound_packet::udp::UdpPacket;
use rebound_packet::IpProtocol;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::ops::Range;

/// The value for the `IPv4` `flags_and_fragment_offset` field to set the `Don't fragment` bit.
///
/// 0100 0000 0000 0000
pub const DONT_FRAGMENT: u16 = 0x4000;

/// The TTL of packets sent by a peer.
pub const DEFAULT_TTL: u8 = 64;

/// The TTL written into the embedded header of a time exceeded error.
pub const EXPIRED_TTL: u8 = 1;

/// The largest ICMP error packet a host may originate (RFC 1812 section 4.3.2.3).
pub const MAX_ICMP_ERROR_PACKET: usize = 576;

/// The largest `UDP` payload that fits in an `IPv4` packet without options.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// The minimum number of bytes of the offending datagram after its header (RFC 792).
pub const MIN_EMBEDDED_DATA: usize = 8;

const IPV4_VERSION: u8 = 4;

/// Header length in words of the packets we build, which never carry options.
const IPV4_HEADER_WORDS: u8 = 5;

/// The addressing of a `UDP` datagram found in an `IPv4` packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UdpHeaderInfo {
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
    /// Where the `UDP` payload lies within the packet.
    pub payload: Range<usize>,
}

/// Extract the `UDP` addressing of an `IPv4` packet.
///
/// Returns `None` for anything other than a well formed unfragmented `IPv4` / `UDP` packet.
pub fn extract_udp(packet: &[u8]) -> Result<Option<UdpHeaderInfo>> {
    let ipv4 = Ipv4Packet::new_view(packet)?;
    if ipv4.get_version() != IPV4_VERSION || ipv4.get_protocol() != IpProtocol::Udp {
        return Ok(None);
    }
    ipv4.validate()?;
    if ipv4.get_flags_and_fragment_offset() & 0x3fff != 0 {
        return Ok(None);
    }
    let header_len = ipv4.header_len();
    let udp = UdpPacket::new_view(ipv4.payload())?;
    let start = header_len + UdpPacket::minimum_packet_size();
    let end = header_len + usize::from(udp.get_length()).min(ipv4.payload().len());
    Ok(Some(UdpHeaderInfo {
        source: SocketAddrV4::new(ipv4.get_source(), udp.get_source()),
        destination: SocketAddrV4::new(ipv4.get_destination(), udp.get_destination()),
        payload: start..end.max(start),
    }))
}

/// Build an `IPv4` / `UDP` packet.
pub fn make_udp_packet(
    source: SocketAddrV4,
    destination: SocketAddrV4,
    identification: u16,
    ttl: u8,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let udp_len = UdpPacket::minimum_packet_size() + payload.len();
    let udp_len_field = u16::try_from(udp_len).map_err(|_| Error::PacketTooLarge(udp_len))?;
    let mut udp_buf = vec![0_u8; udp_len];
    let mut udp = UdpPacket::new(&mut udp_buf)?;
    udp.set_source(source.port());
    udp.set_destination(destination.port());
    udp.set_length(udp_len_field);
    udp.set_payload(payload);
    udp.set_checksum(udp_ipv4_checksum(udp.packet(), *source.ip(), *destination.ip()));
    make_ipv4_packet(
        *source.ip(),
        *destination.ip(),
        identification,
        ttl,
        IpProtocol::Udp,
        &udp_buf,
    )
}

/// Build an `IPv4` / `ICMP` error of `kind` in response to the `offending` packet.
pub fn make_icmp_error(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    identification: u16,
    kind: IcmpErrorKind,
    offending: &[u8],
) -> Result<Vec<u8>> {
    let embedded = embedded_copy(kind, offending)?;
    let mut icmp_buf = vec![0_u8; IcmpErrorPacket::minimum_packet_size() + embedded.len()];
    let mut icmp = IcmpErrorPacket::new(&mut icmp_buf)?;
    icmp.set_icmp_type(IcmpType::from(kind.icmp_type()));
    icmp.set_icmp_code(IcmpCode(kind.icmp_code()));
    icmp.set_payload(&embedded);
    icmp.set_checksum(icmp_ipv4_checksum(icmp.packet()));
    make_ipv4_packet(
        source,
        destination,
        identification,
        DEFAULT_TTL,
        IpProtocol::Icmp,
        &icmp_buf,
    )
}

/// The copy of the offending packet carried by an ICMP error.
///
/// The copy is the offending header plus as much of its data as keeps the error within
/// [`MAX_ICMP_ERROR_PACKET`], and never less than [`MIN_EMBEDDED_DATA`] bytes of it. The
/// header's total length is left as received. For a time exceeded error the embedded TTL is set
/// to [`EXPIRED_TTL`] and the embedded header checksum recomputed.
pub fn embedded_copy(kind: IcmpErrorKind, offending: &[u8]) -> Result<Vec<u8>> {
    let ipv4 = Ipv4Packet::new_view(offending)?;
    ipv4.validate()?;
    let header_len = ipv4.header_len();
    let budget = MAX_ICMP_ERROR_PACKET
        - Ipv4Packet::minimum_packet_size()
        - IcmpErrorPacket::minimum_packet_size();
    let len = ipv4
        .packet()
        .len()
        .min(budget.max(header_len + MIN_EMBEDDED_DATA));
    let mut embedded = ipv4.packet()[..len].to_vec();
    if kind == IcmpErrorKind::TimeToLiveExceeded {
        let mut header = Ipv4Packet::new(&mut embedded)?;
        header.set_ttl(EXPIRED_TTL);
        header.set_checksum(ipv4_header_checksum(header.header()));
    }
    Ok(embedded)
}

fn make_ipv4_packet(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    identification: u16,
    ttl: u8,
    protocol: IpProtocol,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let total_len = Ipv4Packet::minimum_packet_size() + payload.len();
    let total_len_field = u16::try_from(total_len).map_err(|_| Error::PacketTooLarge(total_len))?;
    let mut buf = vec![0_u8; total_len];
    let mut ipv4 = Ipv4Packet::new(&mut buf)?;
    ipv4.set_version(IPV4_VERSION);
    ipv4.set_header_length(IPV4_HEADER_WORDS);
    ipv4.set_total_length(total_len_field);
    ipv4.set_identification(identification);
    ipv4.set_flags_and_fragment_offset(DONT_FRAGMENT);
    ipv4.set_ttl(ttl);
    ipv4.set_protocol(protocol);
    ipv4.set_source(source);
    ipv4.set_destination(destination);
    ipv4.set_payload(payload);
    ipv4.set_checksum(ipv4_header_checksum(ipv4.header()));
    tracing::trace!(?ipv4);
    Ok(buf)
}
