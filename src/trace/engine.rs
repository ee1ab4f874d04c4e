use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::ProbeError;
use crate::probe::{IcmpTransport, ReplyKind, build_echo_request, identifier_for, is_timeout, open_channel, parse_reply};
use crate::state::HopAddress;

/// Hard ceiling on probe distance
pub const MAX_TTL: u8 = 30;

/// TTL-incrementing ICMP traceroute for one destination
#[derive(Debug, Clone)]
pub struct IcmpTracer {
    pub max_ttl: u8,
    /// How long to wait for the reply to each TTL
    pub hop_timeout: Duration,
}

impl Default for IcmpTracer {
    fn default() -> Self {
        Self {
            max_ttl: MAX_TTL,
            hop_timeout: Duration::from_secs(2),
        }
    }
}

impl IcmpTracer {
    /// Probe `target` on a blocking thread.
    ///
    /// `index` picks the ICMP identifier so concurrent runs don't steal each
    /// other's replies.
    pub async fn discover(
        &self,
        target: Ipv4Addr,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<HopAddress>, ProbeError> {
        let tracer = self.clone();
        let cancel = cancel.clone();
        let identifier = identifier_for(index);
        tokio::task::spawn_blocking(move || {
            let channel = open_channel()?;
            tracer.run_blocking(&channel, target, identifier, &cancel)
        })
        .await
        .map_err(|e| ProbeError::Socket(format!("probe thread failed: {}", e)))?
    }

    /// The TTL loop. Cancellation is checked between TTLs only.
    fn run_blocking<T: IcmpTransport>(
        &self,
        channel: &T,
        target: Ipv4Addr,
        identifier: u16,
        cancel: &CancellationToken,
    ) -> Result<Vec<HopAddress>, ProbeError> {
        let max_ttl = self.max_ttl.clamp(1, MAX_TTL);
        let mut hops = Vec::with_capacity(max_ttl as usize);
        let mut buffer = [0u8; 1500];

        for ttl in 1..=max_ttl {
            if cancel.is_cancelled() {
                return Err(ProbeError::Cancelled);
            }

            channel.set_ttl(ttl)?;
            let packet = build_echo_request(identifier, ttl as u16);
            let sent_at = Instant::now();
            channel.send(&packet, target)?;

            match self.await_reply(channel, &mut buffer, target, identifier, ttl, sent_at)? {
                Some((addr, kind)) => {
                    let rtt = sent_at.elapsed();
                    trace!(%target, ttl, %addr, ?kind, ?rtt, "hop");
                    hops.push(HopAddress::new(ttl, addr, Some(rtt)));
                    if kind.is_terminal() {
                        break;
                    }
                }
                None => {
                    trace!(%target, ttl, "silent hop");
                    hops.push(HopAddress::silent(ttl));
                }
            }
        }

        if hops.iter().all(HopAddress::is_silent) {
            return Err(ProbeError::NoHops);
        }
        debug!(%target, hops = hops.len(), "icmp trace complete");
        Ok(hops)
    }

    /// Read until a reply for (`identifier`, `ttl`) arrives or the hop deadline
    /// passes. Packets for other probes are skipped.
    fn await_reply<T: IcmpTransport>(
        &self,
        channel: &T,
        buffer: &mut [u8],
        target: Ipv4Addr,
        identifier: u16,
        ttl: u8,
        sent_at: Instant,
    ) -> Result<Option<(Ipv4Addr, ReplyKind)>, ProbeError> {
        let deadline = sent_at + self.hop_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (len, from) = match channel.recv(buffer, deadline - now) {
                Ok(received) => received,
                Err(e) if is_timeout(&e) => return Ok(None),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let Some(reply) = parse_reply(&buffer[..len], from, identifier, channel.is_dgram()) else {
                continue;
            };
            if reply.sequence != ttl as u16 {
                continue;
            }
            if reply.original_dest.is_some_and(|dest| dest != target) {
                continue;
            }
            return Ok(Some((reply.responder, reply.kind)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io;

    const ID: u16 = 0x5151;
    const TARGET: Ipv4Addr = Ipv4Addr::new(202, 96, 209, 133);

    /// What arrives after the echo request for one TTL
    #[derive(Debug, Clone, Copy)]
    enum Event {
        /// Time Exceeded from a router
        Router(Ipv4Addr),
        /// Time Exceeded quoting a different probe's sequence
        Stale(Ipv4Addr),
        /// Echo Reply from the target
        Reached,
        /// Unreachable from the last router
        Unreachable(Ipv4Addr),
        /// A hard socket failure
        Broken,
    }

    /// Transport that answers each TTL from a script. TTLs without an
    /// entry stay silent.
    #[derive(Default)]
    struct ScriptedTransport {
        script: HashMap<u8, Vec<Event>>,
        state: Mutex<ScriptState>,
    }

    #[derive(Default)]
    struct ScriptState {
        ttl: u8,
        sent: Vec<(u8, Vec<u8>)>,
        queue: Vec<Event>,
    }

    impl ScriptedTransport {
        fn new(script: &[(u8, &[Event])]) -> Self {
            Self {
                script: script.iter().map(|(ttl, events)| (*ttl, events.to_vec())).collect(),
                ..Default::default()
            }
        }

        fn sent_ttls(&self) -> Vec<u8> {
            self.state.lock().sent.iter().map(|(ttl, _)| *ttl).collect()
        }
    }

    fn with_checksum(mut icmp: Vec<u8>) -> Vec<u8> {
        icmp[2] = 0;
        icmp[3] = 0;
        let cksum = pnet::packet::util::checksum(&icmp, 1);
        icmp[2..4].copy_from_slice(&cksum.to_be_bytes());
        icmp
    }

    /// ICMP error (DGRAM view) quoting `echo` as sent to `dest`
    fn icmp_error(kind: u8, code: u8, dest: Ipv4Addr, echo: &[u8]) -> Vec<u8> {
        let mut quoted = vec![0u8; 20];
        quoted[0] = 0x45;
        quoted[2..4].copy_from_slice(&((20 + echo.len()) as u16).to_be_bytes());
        quoted[8] = 1;
        quoted[9] = 1;
        quoted[16..20].copy_from_slice(&dest.octets());

        let mut icmp = vec![kind, code, 0, 0, 0, 0, 0, 0];
        icmp.extend_from_slice(&quoted);
        icmp.extend_from_slice(echo);
        with_checksum(icmp)
    }

    impl IcmpTransport for ScriptedTransport {
        fn set_ttl(&self, ttl: u8) -> io::Result<()> {
            self.state.lock().ttl = ttl;
            Ok(())
        }

        fn send(&self, packet: &[u8], _target: Ipv4Addr) -> io::Result<usize> {
            let mut state = self.state.lock();
            let ttl = state.ttl;
            state.sent.push((ttl, packet.to_vec()));
            let mut events = self.script.get(&ttl).cloned().unwrap_or_default();
            events.reverse();
            state.queue = events;
            Ok(packet.len())
        }

        fn recv(&self, buffer: &mut [u8], _wait: Duration) -> io::Result<(usize, Ipv4Addr)> {
            let mut state = self.state.lock();
            let Some(event) = state.queue.pop() else {
                return Err(io::ErrorKind::WouldBlock.into());
            };
            let (ttl, echo) = state.sent.last().cloned().unwrap_or_default();
            let (packet, from) = match event {
                Event::Router(router) => (icmp_error(11, 0, TARGET, &echo), router),
                Event::Stale(router) => (icmp_error(11, 0, TARGET, &build_echo_request(ID, ttl as u16 + 1)), router),
                Event::Unreachable(router) => (icmp_error(3, 1, TARGET, &echo), router),
                Event::Reached => {
                    let mut reply = echo;
                    reply[0] = 0;
                    (with_checksum(reply), TARGET)
                }
                Event::Broken => return Err(io::ErrorKind::PermissionDenied.into()),
            };
            buffer[..packet.len()].copy_from_slice(&packet);
            Ok((packet.len(), from))
        }

        fn is_dgram(&self) -> bool {
            true
        }
    }

    fn run(tracer: &IcmpTracer, transport: &ScriptedTransport) -> Result<Vec<HopAddress>, ProbeError> {
        tracer.run_blocking(transport, TARGET, ID, &CancellationToken::new())
    }

    fn addrs(hops: &[HopAddress]) -> Vec<Option<Ipv4Addr>> {
        hops.iter().map(|h| h.addr).collect()
    }

    const R1: Ipv4Addr = Ipv4Addr::new(59, 43, 80, 1);
    const R3: Ipv4Addr = Ipv4Addr::new(202, 97, 1, 1);

    #[test]
    fn test_defaults() {
        let tracer = IcmpTracer::default();
        assert_eq!(tracer.max_ttl, 30);
        assert_eq!(tracer.hop_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_silent_hop_recorded_and_loop_continues() {
        let transport = ScriptedTransport::new(&[
            (1, &[Event::Router(R1)]),
            (3, &[Event::Router(R3)]),
            (4, &[Event::Reached]),
        ]);
        let hops = run(&IcmpTracer::default(), &transport).unwrap();
        assert_eq!(addrs(&hops), vec![Some(R1), None, Some(R3), Some(TARGET)]);
        assert!(hops[1].is_silent());
        assert_eq!(hops[1].ttl, 2);
        assert!(hops[0].rtt.is_some());
    }

    #[test]
    fn test_echo_reply_terminates() {
        let transport = ScriptedTransport::new(&[(1, &[Event::Router(R1)]), (2, &[Event::Reached])]);
        let hops = run(&IcmpTracer::default(), &transport).unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(transport.sent_ttls(), vec![1, 2]);
    }

    #[test]
    fn test_unreachable_terminates() {
        let transport = ScriptedTransport::new(&[(1, &[Event::Router(R1)]), (2, &[Event::Unreachable(R3)])]);
        let hops = run(&IcmpTracer::default(), &transport).unwrap();
        assert_eq!(addrs(&hops), vec![Some(R1), Some(R3)]);
        assert_eq!(transport.sent_ttls(), vec![1, 2]);
    }

    #[test]
    fn test_replies_for_other_sequences_skipped() {
        let transport = ScriptedTransport::new(&[(1, &[Event::Stale(R3), Event::Router(R1)]), (2, &[Event::Reached])]);
        let hops = run(&IcmpTracer::default(), &transport).unwrap();
        assert_eq!(addrs(&hops), vec![Some(R1), Some(TARGET)]);
    }

    #[test]
    fn test_socket_error_aborts() {
        let transport = ScriptedTransport::new(&[(1, &[Event::Router(R1)]), (2, &[Event::Broken])]);
        let err = run(&IcmpTracer::default(), &transport).unwrap_err();
        assert!(matches!(err, ProbeError::Socket(_)), "{:?}", err);
        assert_eq!(transport.sent_ttls(), vec![1, 2]);
    }

    #[test]
    fn test_all_silent_is_no_hops() {
        let transport = ScriptedTransport::default();
        let tracer = IcmpTracer {
            max_ttl: 5,
            ..IcmpTracer::default()
        };
        assert_eq!(run(&tracer, &transport).unwrap_err(), ProbeError::NoHops);
        assert_eq!(transport.sent_ttls(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_ttl_ceiling() {
        let transport = ScriptedTransport::new(&[(30, &[Event::Router(R1)]), (31, &[Event::Reached])]);
        let tracer = IcmpTracer {
            max_ttl: u8::MAX,
            ..IcmpTracer::default()
        };
        let hops = run(&tracer, &transport).unwrap();
        assert_eq!(hops.len(), 30);
        assert_eq!(hops.last().and_then(|h| h.addr), Some(R1));
        assert_eq!(transport.sent_ttls(), (1..=MAX_TTL).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancelled_before_first_ttl() {
        let transport = ScriptedTransport::new(&[(1, &[Event::Reached])]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = IcmpTracer::default()
            .run_blocking(&transport, TARGET, ID, &cancel)
            .unwrap_err();
        assert_eq!(err, ProbeError::Cancelled);
        assert!(transport.sent_ttls().is_empty());
    }
}
