use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::debug;

use crate::error::ProbeError;

/// Socket capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketCapability {
    /// Full raw socket access
    Raw,
    /// Unprivileged ICMP socket (limited functionality)
    Dgram,
}

/// Socket with metadata about type (for DGRAM-aware parsing)
#[derive(Debug)]
pub struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets)
    pub is_dgram: bool,
}

/// Send/receive pair for one destination's probe run
#[derive(Debug)]
pub struct IcmpChannel {
    pub send: SocketInfo,
    pub recv: SocketInfo,
}

/// Send and receive side of a probe run, as the TTL loop sees it
pub trait IcmpTransport {
    fn set_ttl(&self, ttl: u8) -> io::Result<()>;
    fn send(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize>;
    /// Next packet and its sender, waiting at most `wait`
    fn recv(&self, buffer: &mut [u8], wait: Duration) -> io::Result<(usize, Ipv4Addr)>;
    /// Received packets start at the ICMP header
    fn is_dgram(&self) -> bool;
}

impl IcmpTransport for IcmpChannel {
    fn set_ttl(&self, ttl: u8) -> io::Result<()> {
        set_ttl(&self.send.socket, ttl)
    }

    fn send(&self, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
        send_icmp(&self.send.socket, packet, target)
    }

    fn recv(&self, buffer: &mut [u8], wait: Duration) -> io::Result<(usize, Ipv4Addr)> {
        recv_icmp(&self.recv.socket, buffer, wait)
    }

    fn is_dgram(&self) -> bool {
        self.recv.is_dgram
    }
}

/// Create a raw ICMP socket
pub fn create_raw_icmp_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Create an unprivileged ICMP socket (SOCK_DGRAM)
pub fn create_dgram_icmp_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}

/// Check socket permissions and return capability level
pub fn check_permissions() -> Result<SocketCapability, ProbeError> {
    if create_raw_icmp_socket().is_ok() {
        return Ok(SocketCapability::Raw);
    }
    if create_dgram_icmp_socket().is_ok() {
        return Ok(SocketCapability::Dgram);
    }
    Err(ProbeError::Socket(
        "insufficient permissions for ICMP sockets; run with sudo or grant cap_net_raw".into(),
    ))
}

/// Open the sockets for one probe run.
///
/// On macOS the send side is DGRAM (RAW ignores IP_TTL) and the receive side
/// must be RAW to see Time Exceeded. Elsewhere one RAW socket is preferred,
/// with DGRAM as the unprivileged fallback.
pub fn open_channel() -> Result<IcmpChannel, ProbeError> {
    #[cfg(target_os = "macos")]
    {
        let send = create_dgram_icmp_socket()?;
        let recv = create_raw_icmp_socket()?;
        let _ = recv.set_recv_buffer_size(256 * 1024);
        Ok(IcmpChannel {
            send: SocketInfo {
                socket: send,
                is_dgram: true,
            },
            recv: SocketInfo {
                socket: recv,
                is_dgram: false,
            },
        })
    }

    #[cfg(not(target_os = "macos"))]
    {
        let (socket, is_dgram) = match create_raw_icmp_socket() {
            Ok(socket) => (socket, false),
            Err(e) => {
                debug!(error = %e, "raw ICMP socket unavailable, trying DGRAM");
                (create_dgram_icmp_socket()?, true)
            }
        };
        let _ = socket.set_recv_buffer_size(256 * 1024);
        let recv = socket.try_clone()?;
        Ok(IcmpChannel {
            send: SocketInfo { socket, is_dgram },
            recv: SocketInfo {
                socket: recv,
                is_dgram,
            },
        })
    }
}

/// Set TTL on a socket
pub fn set_ttl(socket: &Socket, ttl: u8) -> io::Result<()> {
    socket.set_ttl_v4(ttl as u32)
}

/// Send ICMP packet to target
pub fn send_icmp(socket: &Socket, packet: &[u8], target: Ipv4Addr) -> io::Result<usize> {
    let addr = SockAddr::from(SocketAddr::new(IpAddr::V4(target), 0));
    socket.send_to(packet, &addr)
}

/// True for the error kinds a read timeout surfaces as
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Block for at most `wait` and return the next packet with its sender
pub fn recv_icmp(socket: &Socket, buffer: &mut [u8], wait: Duration) -> io::Result<(usize, Ipv4Addr)> {
    // A zero timeout means "block forever" to the kernel
    socket.set_read_timeout(Some(wait.max(Duration::from_millis(1))))?;

    let mut raw = [MaybeUninit::<u8>::uninit(); 1500];
    let (len, from) = socket.recv_from(&mut raw)?;
    let len = len.min(buffer.len());
    for (dst, src) in buffer[..len].iter_mut().zip(raw[..len].iter()) {
        // SAFETY: recv_from initialised the first `len` bytes
        *dst = unsafe { src.assume_init() };
    }

    match from.as_socket_ipv4() {
        Some(v4) => Ok((len, *v4.ip())),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "non-IPv4 sender")),
    }
}
