//! Match incoming ICMP packets to the echo requests of one probe run

use pnet::packet::Packet;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use std::net::Ipv4Addr;

const IPPROTO_ICMP: u8 = 1;
const ICMP_ECHO_REQUEST: u8 = 8;

/// What kind of answer a hop gave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Intermediate router; keep going
    TimeExceeded,
    /// Destination reached
    EchoReply,
    /// Route ends here (code carried for logging)
    Unreachable(u8),
}

impl ReplyKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::TimeExceeded)
    }
}

/// ICMP reply correlated to one of our probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub responder: Ipv4Addr,
    pub kind: ReplyKind,
    /// Sequence of the probe that triggered it (we use the TTL)
    pub sequence: u16,
    /// Destination quoted in an error reply
    pub original_dest: Option<Ipv4Addr>,
}

/// RFC 1071 checksum check. Sums to 0xFFFF when valid.
fn validate_icmp_checksum(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    let mut sum: u32 = data
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]) as u32)
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum == 0xFFFF || sum == 0x0000
}

/// Identifier and sequence echoed in our payload bytes 0-3
fn id_from_payload(payload: &[u8], identifier: u16) -> Option<u16> {
    if payload.len() < 4 {
        return None;
    }
    let id = u16::from_be_bytes([payload[0], payload[1]]);
    let seq = u16::from_be_bytes([payload[2], payload[3]]);
    (id == identifier).then_some(seq)
}

/// Parse a packet and keep it only if it answers a probe with `identifier`.
///
/// RAW sockets deliver the IPv4 header; DGRAM sockets start at ICMP.
pub fn parse_reply(data: &[u8], responder: Ipv4Addr, identifier: u16, is_dgram: bool) -> Option<ParsedReply> {
    let icmp_data = if is_dgram {
        data
    } else {
        let ip = Ipv4Packet::new(data)?;
        let ihl = (ip.get_header_length() as usize) * 4;
        data.get(ihl..)?
    };
    if icmp_data.len() < 8 {
        return None;
    }
    let icmp = IcmpPacket::new(icmp_data)?;

    match icmp.get_icmp_type() {
        IcmpTypes::EchoReply => {
            if !validate_icmp_checksum(icmp_data) {
                return None;
            }
            let id = u16::from_be_bytes([icmp_data[4], icmp_data[5]]);
            let seq = u16::from_be_bytes([icmp_data[6], icmp_data[7]]);
            let sequence = if id == identifier {
                seq
            } else {
                // Kernel may have rewritten the header identifier
                id_from_payload(icmp_data.get(8..)?, identifier)?
            };
            Some(ParsedReply {
                responder,
                kind: ReplyKind::EchoReply,
                sequence,
                original_dest: Some(responder),
            })
        }
        IcmpTypes::TimeExceeded => parse_error_payload(icmp.payload(), responder, identifier, ReplyKind::TimeExceeded),
        IcmpTypes::DestinationUnreachable => {
            let code = icmp.get_icmp_code().0;
            parse_error_payload(icmp.payload(), responder, identifier, ReplyKind::Unreachable(code))
        }
        _ => None,
    }
}

/// ICMP error body: 4 unused bytes, then the quoted IP header and at least
/// 8 bytes of our echo request.
fn parse_error_payload(payload: &[u8], responder: Ipv4Addr, identifier: u16, kind: ReplyKind) -> Option<ParsedReply> {
    let quoted = payload.get(4..)?;
    let original = Ipv4Packet::new(quoted)?;
    if original.get_next_level_protocol().0 != IPPROTO_ICMP {
        return None;
    }
    let ihl = (original.get_header_length() as usize) * 4;
    let echo = quoted.get(ihl..)?;
    if echo.len() < 8 || echo[0] != ICMP_ECHO_REQUEST {
        return None;
    }

    let id = u16::from_be_bytes([echo[4], echo[5]]);
    let seq = u16::from_be_bytes([echo[6], echo[7]]);
    let sequence = if id == identifier {
        seq
    } else {
        id_from_payload(echo.get(8..)?, identifier)?
    };

    Some(ParsedReply {
        responder,
        kind,
        sequence,
        original_dest: Some(original.get_destination()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::icmp::build_echo_request;

    const ID: u16 = 0x4242;

    fn ipv4_header(protocol: u8, src: Ipv4Addr, dst: Ipv4Addr, total_len: usize) -> Vec<u8> {
        let mut h = vec![0u8; 20];
        h[0] = 0x45;
        h[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
        h[8] = 1;
        h[9] = protocol;
        h[12..16].copy_from_slice(&src.octets());
        h[16..20].copy_from_slice(&dst.octets());
        h
    }

    fn with_checksum(mut icmp: Vec<u8>) -> Vec<u8> {
        icmp[2] = 0;
        icmp[3] = 0;
        let cksum = pnet::packet::util::checksum(&icmp, 1);
        icmp[2..4].copy_from_slice(&cksum.to_be_bytes());
        icmp
    }

    fn time_exceeded(router: Ipv4Addr, dest: Ipv4Addr, id: u16, seq: u16) -> Vec<u8> {
        let echo = build_echo_request(id, seq);
        let quoted_ip = ipv4_header(IPPROTO_ICMP, Ipv4Addr::new(10, 0, 0, 2), dest, 20 + echo.len());
        let mut icmp = vec![11, 0, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted_ip);
        icmp.extend_from_slice(&echo);
        let icmp = with_checksum(icmp);
        let mut packet = ipv4_header(IPPROTO_ICMP, router, Ipv4Addr::new(10, 0, 0, 2), 20 + icmp.len());
        packet.extend_from_slice(&icmp);
        packet
    }

    fn echo_reply(target: Ipv4Addr, id: u16, seq: u16) -> Vec<u8> {
        let mut icmp = build_echo_request(id, seq);
        icmp[0] = 0;
        let icmp = with_checksum(icmp);
        let mut packet = ipv4_header(IPPROTO_ICMP, target, Ipv4Addr::new(10, 0, 0, 2), 20 + icmp.len());
        packet.extend_from_slice(&icmp);
        packet
    }

    #[test]
    fn test_time_exceeded_matches() {
        let router = Ipv4Addr::new(59, 43, 80, 1);
        let dest = Ipv4Addr::new(219, 141, 140, 10);
        let packet = time_exceeded(router, dest, ID, 5);
        let reply = parse_reply(&packet, router, ID, false).unwrap();
        assert_eq!(reply.kind, ReplyKind::TimeExceeded);
        assert_eq!(reply.sequence, 5);
        assert_eq!(reply.original_dest, Some(dest));
        assert!(!reply.kind.is_terminal());
    }

    #[test]
    fn test_echo_reply_matches() {
        let target = Ipv4Addr::new(202, 96, 209, 133);
        let reply = parse_reply(&echo_reply(target, ID, 12), target, ID, false).unwrap();
        assert_eq!(reply.kind, ReplyKind::EchoReply);
        assert_eq!(reply.sequence, 12);
        assert!(reply.kind.is_terminal());
    }

    #[test]
    fn test_dgram_echo_reply_without_ip_header() {
        let target = Ipv4Addr::new(1, 1, 1, 1);
        let packet = echo_reply(target, ID, 3);
        let reply = parse_reply(&packet[20..], target, ID, true).unwrap();
        assert_eq!(reply.sequence, 3);
    }

    #[test]
    fn test_foreign_identifier_rejected() {
        let router = Ipv4Addr::new(1, 2, 3, 4);
        let packet = time_exceeded(router, Ipv4Addr::new(8, 8, 8, 8), ID + 1, 5);
        assert_eq!(parse_reply(&packet, router, ID, false), None);
        let packet = echo_reply(router, ID + 1, 5);
        assert_eq!(parse_reply(&packet, router, ID, false), None);
    }

    #[test]
    fn test_bad_checksum_rejected() {
        let target = Ipv4Addr::new(1, 1, 1, 1);
        let mut packet = echo_reply(target, ID, 3);
        packet[22] ^= 0xFF;
        assert_eq!(parse_reply(&packet, target, ID, false), None);
    }

    #[test]
    fn test_short_packets_return_none() {
        for size in 0..28 {
            let data = vec![0x45u8; size];
            assert_eq!(parse_reply(&data, Ipv4Addr::LOCALHOST, ID, false), None);
        }
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn proptest_parse_reply_no_panic(data in prop::collection::vec(0u8..=255, 0..1500), dgram in any::<bool>()) {
            let _ = parse_reply(&data, Ipv4Addr::LOCALHOST, ID, dgram);
        }
    }
}
