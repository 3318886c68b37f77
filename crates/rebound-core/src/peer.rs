use crate::error::Result;
use crate::net::ipv4::{self, UdpHeaderInfo};
use crate::types::IcmpErrorKind;
use std::net::SocketAddrV4;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Raw `IPv4` packet I/O for one peer endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait Link {
    /// The address and port this endpoint sends from and receives on.
    fn local_addr(&self) -> SocketAddrV4;
    /// Transmit one complete `IPv4` packet.
    fn send_packet(&self, packet: &[u8]) -> Result<()>;
    /// Wait up to `timeout` for the next `IPv4` packet addressed to this endpoint.
    fn recv_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Optional `UDP` fields layered over a connection's defaults.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct UdpFields {
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub payload: Option<Vec<u8>>,
}

impl UdpFields {
    #[must_use]
    pub fn src_port(src_port: u16) -> Self {
        Self {
            src_port: Some(src_port),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn dst_port(dst_port: u16) -> Self {
        Self {
            dst_port: Some(dst_port),
            ..Self::default()
        }
    }

    /// Fields of `self`, falling back to `base` where unset.
    #[must_use]
    pub fn merged_over(&self, base: &Self) -> Self {
        Self {
            src_port: self.src_port.or(base.src_port),
            dst_port: self.dst_port.or(base.dst_port),
            payload: self.payload.clone().or_else(|| base.payload.clone()),
        }
    }

    fn matches(&self, info: &UdpHeaderInfo, packet: &[u8]) -> bool {
        self.src_port
            .map_or(true, |port| port == info.source.port())
            && self
                .dst_port
                .map_or(true, |port| port == info.destination.port())
            && self
                .payload
                .as_ref()
                .map_or(true, |payload| payload[..] == packet[info.payload.clone()])
    }
}

/// One `UDP` datagram captured from the DUT, with its enclosing `IPv4` packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CapturedDatagram {
    packet: Vec<u8>,
    source: SocketAddrV4,
    destination: SocketAddrV4,
    payload: Range<usize>,
}

impl CapturedDatagram {
    /// The whole `IPv4` packet as received.
    #[must_use]
    pub fn ip_packet(&self) -> &[u8] {
        &self.packet
    }

    #[must_use]
    pub const fn source(&self) -> SocketAddrV4 {
        self.source
    }

    #[must_use]
    pub const fn destination(&self) -> SocketAddrV4 {
        self.destination
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.packet[self.payload.clone()]
    }
}

/// The far end of a `UDP` flow with the DUT.
///
/// Outgoing datagrams default to this endpoint's port as source and the DUT's port as
/// destination. Incoming datagrams must come from the DUT's address and, unless overridden, from
/// the DUT's port to this endpoint's port.
pub struct PeerConnection<L: Link> {
    link: L,
    remote: SocketAddrV4,
    outgoing: UdpFields,
    incoming: UdpFields,
    ttl: u8,
    identification: u16,
}

impl<L: Link> PeerConnection<L> {
    pub fn new(link: L, remote: SocketAddrV4, payload: &[u8]) -> Self {
        let local = link.local_addr();
        Self {
            link,
            remote,
            outgoing: UdpFields {
                src_port: Some(local.port()),
                dst_port: Some(remote.port()),
                payload: Some(payload.to_vec()),
            },
            incoming: UdpFields {
                src_port: Some(remote.port()),
                dst_port: Some(local.port()),
                payload: None,
            },
            ttl: ipv4::DEFAULT_TTL,
            identification: 0,
        }
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddrV4 {
        self.link.local_addr()
    }

    /// Send one datagram to the DUT.
    #[instrument(skip(self), level = "trace")]
    pub fn send(&mut self, fields: &UdpFields) -> Result<()> {
        let fields = fields.merged_over(&self.outgoing);
        let local = self.local_addr();
        let source = SocketAddrV4::new(*local.ip(), fields.src_port.unwrap_or(local.port()));
        let destination = SocketAddrV4::new(
            *self.remote.ip(),
            fields.dst_port.unwrap_or(self.remote.port()),
        );
        let packet = ipv4::make_udp_packet(
            source,
            destination,
            self.next_identification(),
            self.ttl,
            fields.payload.as_deref().unwrap_or_default(),
        )?;
        tracing::debug!(%source, %destination, "peer send");
        self.link.send_packet(&packet)
    }

    /// Wait for a datagram from the DUT matching `fields`.
    ///
    /// Datagrams that do not match are discarded. Returns `None` if nothing matched in time.
    #[instrument(skip(self), level = "trace")]
    pub fn expect(
        &mut self,
        fields: &UdpFields,
        timeout: Duration,
    ) -> Result<Option<CapturedDatagram>> {
        let filter = fields.merged_over(&self.incoming);
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let remaining = match deadline {
                Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
                    Some(remaining) => remaining,
                    None => return Ok(None),
                },
                None => timeout,
            };
            let Some(packet) = self.link.recv_packet(remaining)? else {
                return Ok(None);
            };
            let info = match ipv4::extract_udp(&packet) {
                Ok(Some(info)) => info,
                Ok(None) => {
                    tracing::debug!(len = packet.len(), "discarding non udp packet");
                    continue;
                }
                Err(err) => {
                    tracing::debug!(%err, "discarding malformed packet");
                    continue;
                }
            };
            if info.source.ip() != self.remote.ip() || !filter.matches(&info, &packet) {
                tracing::debug!(
                    source = %info.source,
                    destination = %info.destination,
                    "discarding unexpected datagram"
                );
                continue;
            }
            tracing::debug!(
                source = %info.source,
                destination = %info.destination,
                "peer captured"
            );
            return Ok(Some(CapturedDatagram {
                source: info.source,
                destination: info.destination,
                payload: info.payload,
                packet,
            }));
        }
    }

    /// Send an ICMP error of `kind` quoting `captured` back to the DUT.
    #[instrument(skip(self, captured), level = "trace")]
    pub fn send_icmp_error(
        &mut self,
        kind: IcmpErrorKind,
        captured: &CapturedDatagram,
    ) -> Result<()> {
        let packet = ipv4::make_icmp_error(
            *self.local_addr().ip(),
            *captured.source().ip(),
            self.next_identification(),
            kind,
            captured.ip_packet(),
        )?;
        tracing::debug!(%kind, dut = %captured.source(), "peer injects icmp error");
        self.link.send_packet(&packet)
    }

    fn next_identification(&mut self) -> u16 {
        let identification = self.identification;
        self.identification = self.identification.wrapping_add(1);
        identification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use hex_literal::hex;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::net::Ipv4Addr;

    const DUT: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 40000);
    const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 50000);

    const FROM_DUT: [u8; 35] = hex!(
        "45 00 00 23 1c 46 40 00 40 11 0a 82 0a 00 00 01
         0a 00 00 02 9c 40 c3 50 00 0f dd f8 72 65 62 6f
         75 6e 64"
    );

    fn link() -> MockLink {
        let mut link = MockLink::new();
        link.expect_local_addr().return_const(PEER);
        link
    }

    #[test]
    fn test_send_uses_connection_identity() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_send_packet()
            .with(eq(hex!(
                "45 00 00 23 00 00 40 00 40 11 26 c8 0a 00 00 02
                 0a 00 00 01 c3 50 9c 40 00 0f dd f8 72 65 62 6f
                 75 6e 64"
            )
            .to_vec()))
            .times(1)
            .returning(|_| Ok(()));
        let mut peer = PeerConnection::new(link, DUT, b"rebound");
        peer.send(&UdpFields::default())?;
        Ok(())
    }

    #[test]
    fn test_send_overrides_destination_port() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_send_packet()
            .withf(|packet: &[u8]| packet[22..24] == 40001_u16.to_be_bytes())
            .times(1)
            .returning(|_| Ok(()));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        peer.send(&UdpFields::dst_port(40001))?;
        Ok(())
    }

    #[test]
    fn test_expect_captures_matching_datagram() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_recv_packet()
            .times(1)
            .returning(|_| Ok(Some(FROM_DUT.to_vec())));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let captured = peer
            .expect(&UdpFields::default(), Duration::from_secs(1))?
            .expect("captured");
        assert_eq!(DUT, captured.source());
        assert_eq!(PEER, captured.destination());
        assert_eq!(b"rebound", captured.payload());
        assert_eq!(&FROM_DUT[..], captured.ip_packet());
        Ok(())
    }

    #[test]
    fn test_expect_discards_other_flows() -> anyhow::Result<()> {
        let mut link = link();
        let mut seq = Sequence::new();
        let other_port = ipv4::make_udp_packet(
            SocketAddrV4::new(*DUT.ip(), 40001),
            PEER,
            0,
            64,
            &[],
        )?;
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(other_port.clone())));
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(vec![0x45, 0x00])));
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(FROM_DUT.to_vec())));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let captured = peer.expect(&UdpFields::default(), Duration::from_secs(1))?;
        assert_eq!(Some(DUT), captured.map(|c| c.source()));
        Ok(())
    }

    #[test]
    fn test_expect_with_source_port_override() -> anyhow::Result<()> {
        let mut link = link();
        let clean = ipv4::make_udp_packet(SocketAddrV4::new(*DUT.ip(), 40001), PEER, 0, 64, &[])?;
        link.expect_recv_packet()
            .times(1)
            .returning(move |_| Ok(Some(clean.clone())));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let captured = peer.expect(&UdpFields::src_port(40001), Duration::from_secs(1))?;
        assert_eq!(Some(40001), captured.map(|c| c.source().port()));
        Ok(())
    }

    #[test]
    fn test_expect_times_out() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_recv_packet().returning(|_| Ok(None));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        assert_eq!(
            None,
            peer.expect(&UdpFields::default(), Duration::from_millis(10))?
        );
        Ok(())
    }

    #[test]
    fn test_expect_with_unrepresentable_timeout() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_recv_packet()
            .with(eq(Duration::MAX))
            .times(1)
            .returning(|_| Ok(Some(FROM_DUT.to_vec())));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let captured = peer.expect(&UdpFields::default(), Duration::MAX)?;
        assert_eq!(Some(DUT), captured.map(|c| c.source()));
        Ok(())
    }

    #[test]
    fn test_expect_propagates_link_errors() {
        let mut link = link();
        link.expect_recv_packet()
            .returning(|_| Err(Error::NetworkClosed));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let err = peer
            .expect(&UdpFields::default(), Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, Error::NetworkClosed));
    }

    #[test]
    fn test_send_icmp_error_quotes_captured_datagram() -> anyhow::Result<()> {
        let mut link = link();
        link.expect_recv_packet()
            .times(1)
            .returning(|_| Ok(Some(FROM_DUT.to_vec())));
        link.expect_send_packet()
            .with(eq(hex!(
                "45 00 00 3f 00 00 40 00 40 01 26 bc 0a 00 00 02
                 0a 00 00 01 03 03 11 20 00 00 00 00 45 00 00 23
                 1c 46 40 00 40 11 0a 82 0a 00 00 01 0a 00 00 02
                 9c 40 c3 50 00 0f dd f8 72 65 62 6f 75 6e 64"
            )
            .to_vec()))
            .times(1)
            .returning(|_| Ok(()));
        let mut peer = PeerConnection::new(link, DUT, &[]);
        let captured = peer
            .expect(&UdpFields::default(), Duration::from_secs(1))?
            .expect("captured");
        peer.send_icmp_error(IcmpErrorKind::PortUnreachable, &captured)?;
        Ok(())
    }

    #[test]
    fn test_merged_over() {
        let base = UdpFields {
            src_port: Some(1),
            dst_port: Some(2),
            payload: Some(vec![3]),
        };
        let merged = UdpFields::dst_port(9).merged_over(&base);
        assert_eq!(
            UdpFields {
                src_port: Some(1),
                dst_port: Some(9),
                payload: Some(vec![3]),
            },
            merged
        );
    }
}
