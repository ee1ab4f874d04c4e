use pnet::packet::MutablePacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;
/// Payload size; identifier, sequence and timestamp plus a marker
pub const PAYLOAD_SIZE: usize = 24;

const MARKER: &[u8] = b"HELLO-R-U-THERE";

/// Identifier for the probe to destination `index`.
///
/// Every destination gets its own identifier so concurrent raw sockets,
/// which all see every ICMP packet, can tell their replies apart.
pub fn identifier_for(index: usize) -> u16 {
    (std::process::id() as u16).wrapping_add(index as u16)
}

/// Build an ICMP Echo Request.
///
/// Payload layout:
/// - Bytes 0-1: identifier (backup for kernels that rewrite the header on DGRAM sockets)
/// - Bytes 2-3: sequence
/// - Bytes 4-7: timestamp (lower 32 bits of microseconds)
/// - Bytes 8+: marker text
pub fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ICMP_HEADER_SIZE + PAYLOAD_SIZE];

    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode::new(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);

        let payload = packet.payload_mut();
        payload[0..2].copy_from_slice(&identifier.to_be_bytes());
        payload[2..4].copy_from_slice(&sequence.to_be_bytes());

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as u32)
            .unwrap_or_default();
        payload[4..8].copy_from_slice(&timestamp.to_be_bytes());
        let end = (8 + MARKER.len()).min(payload.len());
        payload[8..end].copy_from_slice(&MARKER[..end - 8]);
    }

    // Checksum word is index 1
    let cksum = pnet::packet::util::checksum(&buffer, 1);
    buffer[2..4].copy_from_slice(&cksum.to_be_bytes());

    buffer
}
