//! Internet checksums (RFC 1071) for `IPv4` headers, `ICMPv4` messages and `UDP` over `IPv4`.

use crate::IpProtocol;
use std::net::Ipv4Addr;

const IPV4_CHECKSUM_WORD: usize = 5;
const ICMP_CHECKSUM_WORD: usize = 1;
const UDP_CHECKSUM_WORD: usize = 3;

/// Checksum of an `IPv4` header, ignoring the current value of the checksum field.
#[must_use]
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    if header.is_empty() {
        return 0;
    }
    fold(word_sum(header, Some(IPV4_CHECKSUM_WORD)))
}

/// Checksum of an `ICMPv4` message, ignoring the current value of the checksum field.
#[must_use]
pub fn icmp_ipv4_checksum(message: &[u8]) -> u16 {
    if message.is_empty() {
        return 0;
    }
    fold(word_sum(message, Some(ICMP_CHECKSUM_WORD)))
}

/// Checksum of a `UDP` datagram carried over `IPv4`, including the pseudo header.
///
/// A computed value of zero is transmitted as all ones (RFC 768).
#[must_use]
pub fn udp_ipv4_checksum(datagram: &[u8], source: Ipv4Addr, destination: Ipv4Addr) -> u16 {
    let pseudo = word_sum(&source.octets(), None)
        + word_sum(&destination.octets(), None)
        + u32::from(IpProtocol::Udp.id())
        + datagram.len() as u32;
    match fold(pseudo + word_sum(datagram, Some(UDP_CHECKSUM_WORD))) {
        0 => 0xffff,
        sum => sum,
    }
}

/// Sum the big-endian 16 bit words of `data`, optionally skipping one word.
///
/// A trailing odd byte is padded with zero.
fn word_sum(data: &[u8], skip: Option<usize>) -> u32 {
    data.chunks(2)
        .enumerate()
        .filter(|(index, _)| Some(*index) != skip)
        .map(|(_, word)| match *word {
            [hi, lo] => u32::from(u16::from_be_bytes([hi, lo])),
            [hi] => u32::from(hi) << 8,
            _ => 0,
        })
        .sum()
}

/// Fold carries back into 16 bits and take the ones' complement.
const fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xffff);
    }
    !sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const DATAGRAM: [u8; 35] = hex!(
        "45 00 00 23 1c 46 40 00 40 11 0a 82 0a 00 00 01
         0a 00 00 02 9c 40 c3 50 00 0f dd f8 72 65 62 6f
         75 6e 64"
    );

    #[test]
    fn test_empty_checksums() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        assert_eq!(0, ipv4_header_checksum(&[]));
        assert_eq!(0, icmp_ipv4_checksum(&[]));
        assert_eq!(60395, udp_ipv4_checksum(&[], src, dst));
    }

    #[test]
    fn test_ipv4_header_checksum() {
        assert_eq!(0x0a82, ipv4_header_checksum(&DATAGRAM[..20]));
    }

    #[test]
    fn test_ipv4_header_checksum_ignores_stored_value() {
        let mut header = DATAGRAM;
        header[10] = 0xde;
        header[11] = 0xad;
        assert_eq!(0x0a82, ipv4_header_checksum(&header[..20]));
    }

    #[test]
    fn test_udp_ipv4_checksum() {
        let src = Ipv4Addr::new(10, 0, 0, 1);
        let dst = Ipv4Addr::new(10, 0, 0, 2);
        assert_eq!(0xddf8, udp_ipv4_checksum(&DATAGRAM[20..], src, dst));
    }

    #[test]
    fn test_icmp_ipv4_checksum() {
        let message = hex!(
            "03 03 00 00 00 00 00 00 45 00 00 23 1c 46 40 00
             40 11 0a 82 0a 00 00 01 0a 00 00 02 9c 40 c3 50
             00 0f dd f8 72 65 62 6f 75 6e 64"
        );
        assert_eq!(0x1120, icmp_ipv4_checksum(&message));
    }

    #[test]
    fn test_odd_length_is_zero_padded() {
        assert_eq!(fold(0x0100), icmp_ipv4_checksum(&[0x01]));
    }
}
