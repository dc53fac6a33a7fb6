//! STUN binding probes over UDP (RFC 5389 / RFC 5780)
//!
//! Minimal codec: binding request (optionally with CHANGE-REQUEST), binding
//! response with XOR-MAPPED-ADDRESS or MAPPED-ADDRESS. The prober owns one
//! non-blocking socket driven by mio, so every probe from a peer leaves
//! from the same local transport address.

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::nat::{ChangeRequest, ProbeError, StunProber};

// ============================================================================
// Wire Constants
// ============================================================================

const STUN_BINDING_REQUEST: u16 = 0x0001;
const STUN_BINDING_RESPONSE: u16 = 0x0101;
const STUN_MAGIC_COOKIE: u32 = 0x2112A442;

const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
const ATTR_CHANGE_REQUEST: u16 = 0x0003;
const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const CHANGE_IP_FLAG: u32 = 0x04;
const CHANGE_PORT_FLAG: u32 = 0x02;

const FAMILY_IPV4: u8 = 0x01;
const FAMILY_IPV6: u8 = 0x02;

/// STUN header size
pub const HEADER_LEN: usize = 20;

/// Receive buffer size
const MAX_DATAGRAM: usize = 1500;

/// mio token for the probe socket
const PROBE_SOCKET_TOKEN: Token = Token(0);

/// 96-bit STUN transaction ID
pub type TransactionId = [u8; 12];

// ============================================================================
// Codec
// ============================================================================

/// Generate a random transaction ID
pub fn generate_transaction_id(rng: &SystemRandom) -> Result<TransactionId, ProbeError> {
    let mut txn = [0u8; 12];
    rng.fill(&mut txn)
        .map_err(|_| ProbeError::Io("random generator unavailable".into()))?;
    Ok(txn)
}

/// Encode a binding request, optionally asking for a changed response source
pub fn encode_binding_request(txn: &TransactionId, change: Option<ChangeRequest>) -> Vec<u8> {
    let attrs = match change {
        Some(change) => {
            let flags = match change {
                ChangeRequest::IpAndPort => CHANGE_IP_FLAG | CHANGE_PORT_FLAG,
                ChangeRequest::PortOnly => CHANGE_PORT_FLAG,
            };
            let mut attr = Vec::with_capacity(8);
            attr.extend_from_slice(&ATTR_CHANGE_REQUEST.to_be_bytes());
            attr.extend_from_slice(&4u16.to_be_bytes());
            attr.extend_from_slice(&flags.to_be_bytes());
            attr
        }
        None => Vec::new(),
    };

    let mut msg = Vec::with_capacity(HEADER_LEN + attrs.len());
    msg.extend_from_slice(&STUN_BINDING_REQUEST.to_be_bytes());
    msg.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    msg.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(txn);
    msg.extend_from_slice(&attrs);
    msg
}

/// A decoded binding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    pub transaction_id: TransactionId,
    pub change: Option<ChangeRequest>,
}

/// Decode a binding request (server side of a probe)
pub fn decode_binding_request(data: &[u8]) -> Result<BindingRequest, StunDecodeError> {
    let (msg_type, body, txn) = split_message(data)?;
    if msg_type != STUN_BINDING_REQUEST {
        return Err(StunDecodeError::UnexpectedType(msg_type));
    }

    let mut change = None;
    for (attr_type, value) in attributes(body) {
        if attr_type == ATTR_CHANGE_REQUEST && value.len() >= 4 {
            let flags = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
            change = if flags & CHANGE_IP_FLAG != 0 {
                Some(ChangeRequest::IpAndPort)
            } else if flags & CHANGE_PORT_FLAG != 0 {
                Some(ChangeRequest::PortOnly)
            } else {
                None
            };
        }
    }

    Ok(BindingRequest {
        transaction_id: txn,
        change,
    })
}

/// Encode a binding success response carrying XOR-MAPPED-ADDRESS
pub fn encode_binding_response(txn: &TransactionId, mapped: SocketAddr) -> Vec<u8> {
    let xor_port = mapped.port() ^ (STUN_MAGIC_COOKIE >> 16) as u16;
    let mut value = vec![0u8];
    match mapped.ip() {
        IpAddr::V4(ip) => {
            value.push(FAMILY_IPV4);
            value.extend_from_slice(&xor_port.to_be_bytes());
            let xor_ip = u32::from(ip) ^ STUN_MAGIC_COOKIE;
            value.extend_from_slice(&xor_ip.to_be_bytes());
        }
        IpAddr::V6(ip) => {
            value.push(FAMILY_IPV6);
            value.extend_from_slice(&xor_port.to_be_bytes());
            let key = ipv6_xor_key(txn);
            let octets = ip.octets();
            value.extend(octets.iter().zip(key.iter()).map(|(a, k)| a ^ k));
        }
    }

    let mut msg = Vec::with_capacity(HEADER_LEN + 4 + value.len());
    msg.extend_from_slice(&STUN_BINDING_RESPONSE.to_be_bytes());
    msg.extend_from_slice(&((4 + value.len()) as u16).to_be_bytes());
    msg.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    msg.extend_from_slice(txn);
    msg.extend_from_slice(&ATTR_XOR_MAPPED_ADDRESS.to_be_bytes());
    msg.extend_from_slice(&(value.len() as u16).to_be_bytes());
    msg.extend_from_slice(&value);
    msg
}

/// Decode a binding response and return the mapped address
///
/// XOR-MAPPED-ADDRESS wins over MAPPED-ADDRESS when both are present.
pub fn decode_binding_response(
    data: &[u8],
    expected: &TransactionId,
) -> Result<SocketAddr, StunDecodeError> {
    let (msg_type, body, txn) = split_message(data)?;
    if msg_type != STUN_BINDING_RESPONSE {
        return Err(StunDecodeError::UnexpectedType(msg_type));
    }
    if &txn != expected {
        return Err(StunDecodeError::TransactionMismatch);
    }

    let mut fallback = None;
    for (attr_type, value) in attributes(body) {
        match attr_type {
            ATTR_XOR_MAPPED_ADDRESS => return parse_address(value, Some(&txn)),
            ATTR_MAPPED_ADDRESS if fallback.is_none() => fallback = Some(value),
            _ => {}
        }
    }

    match fallback {
        Some(value) => parse_address(value, None),
        None => Err(StunDecodeError::NoAddress),
    }
}

/// Validate the header and split off type, attribute body and transaction ID
fn split_message(data: &[u8]) -> Result<(u16, &[u8], TransactionId), StunDecodeError> {
    if data.len() < HEADER_LEN {
        return Err(StunDecodeError::TooShort(data.len()));
    }

    let msg_type = u16::from_be_bytes([data[0], data[1]]);
    let msg_len = u16::from_be_bytes([data[2], data[3]]) as usize;
    let magic = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if magic != STUN_MAGIC_COOKIE {
        return Err(StunDecodeError::BadMagicCookie(magic));
    }
    if data.len() < HEADER_LEN + msg_len {
        return Err(StunDecodeError::Truncated {
            declared: msg_len,
            available: data.len() - HEADER_LEN,
        });
    }

    let mut txn = [0u8; 12];
    txn.copy_from_slice(&data[8..HEADER_LEN]);
    Ok((msg_type, &data[HEADER_LEN..HEADER_LEN + msg_len], txn))
}

/// Iterate TLV attributes, stopping at the first truncated one
fn attributes(body: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        if offset + 4 > body.len() {
            return None;
        }
        let attr_type = u16::from_be_bytes([body[offset], body[offset + 1]]);
        let attr_len = u16::from_be_bytes([body[offset + 2], body[offset + 3]]) as usize;
        let start = offset + 4;
        if start + attr_len > body.len() {
            return None;
        }
        // Attributes are padded to 4-byte boundaries
        offset = start + ((attr_len + 3) & !3);
        Some((attr_type, &body[start..start + attr_len]))
    })
}

fn ipv6_xor_key(txn: &TransactionId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[0..4].copy_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
    key[4..16].copy_from_slice(txn);
    key
}

/// Parse (XOR-)MAPPED-ADDRESS; `xor_txn` is set for the XOR variant
fn parse_address(
    value: &[u8],
    xor_txn: Option<&TransactionId>,
) -> Result<SocketAddr, StunDecodeError> {
    if value.len() < 8 {
        return Err(StunDecodeError::BadAttribute("address too short"));
    }

    let family = value[1];
    let mut port = u16::from_be_bytes([value[2], value[3]]);
    if xor_txn.is_some() {
        port ^= (STUN_MAGIC_COOKIE >> 16) as u16;
    }

    let ip = match family {
        FAMILY_IPV4 => {
            let mut raw = u32::from_be_bytes([value[4], value[5], value[6], value[7]]);
            if xor_txn.is_some() {
                raw ^= STUN_MAGIC_COOKIE;
            }
            IpAddr::V4(Ipv4Addr::from(raw))
        }
        FAMILY_IPV6 => {
            if value.len() < 20 {
                return Err(StunDecodeError::BadAttribute("IPv6 address too short"));
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[4..20]);
            if let Some(txn) = xor_txn {
                let key = ipv6_xor_key(txn);
                for (o, k) in octets.iter_mut().zip(key.iter()) {
                    *o ^= k;
                }
            }
            IpAddr::from(octets)
        }
        other => return Err(StunDecodeError::UnknownFamily(other)),
    };

    Ok(SocketAddr::new(ip, port))
}

/// STUN decoding failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunDecodeError {
    TooShort(usize),
    BadMagicCookie(u32),
    Truncated { declared: usize, available: usize },
    UnexpectedType(u16),
    /// Response for another (usually earlier, timed-out) transaction
    TransactionMismatch,
    NoAddress,
    UnknownFamily(u8),
    BadAttribute(&'static str),
}

impl fmt::Display for StunDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StunDecodeError::TooShort(n) => write!(f, "message too short ({} bytes)", n),
            StunDecodeError::BadMagicCookie(m) => write!(f, "bad magic cookie 0x{:08x}", m),
            StunDecodeError::Truncated { declared, available } => {
                write!(f, "declared {} attribute bytes, {} available", declared, available)
            }
            StunDecodeError::UnexpectedType(t) => write!(f, "unexpected message type 0x{:04x}", t),
            StunDecodeError::TransactionMismatch => write!(f, "transaction ID mismatch"),
            StunDecodeError::NoAddress => write!(f, "no mapped address attribute"),
            StunDecodeError::UnknownFamily(fam) => write!(f, "unknown address family {}", fam),
            StunDecodeError::BadAttribute(e) => write!(f, "bad attribute: {}", e),
        }
    }
}

impl std::error::Error for StunDecodeError {}

// ============================================================================
// UDP Prober
// ============================================================================

/// STUN prober bound to one local UDP socket
pub struct UdpStunProber {
    poll: Poll,
    events: Events,
    socket: UdpSocket,
    local_addr: SocketAddr,
    rng: SystemRandom,
    recv_buf: Vec<u8>,
}

impl UdpStunProber {
    /// Bind the probe socket to an explicit address
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let mut socket = UdpSocket::bind(addr)?;
        let local_addr = socket.local_addr()?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut socket, PROBE_SOCKET_TOKEN, Interest::READABLE)?;

        log::debug!("STUN probe socket bound to {}", local_addr);

        Ok(Self {
            poll,
            events: Events::with_capacity(16),
            socket,
            local_addr,
            rng: SystemRandom::new(),
            recv_buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Bind to the first non-loopback IPv4 interface on an ephemeral port
    ///
    /// The bound address is what gets compared against the mapped address,
    /// so a wildcard bind is only the last resort.
    pub fn bind_default() -> io::Result<Self> {
        let addr = enumerate_local_addresses(0)
            .into_iter()
            .next()
            .unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));
        Self::bind(addr)
    }

    fn transact(
        &mut self,
        server: SocketAddr,
        change: Option<ChangeRequest>,
        timeout: Duration,
    ) -> Result<SocketAddr, ProbeError> {
        let txn = generate_transaction_id(&self.rng)?;
        let request = encode_binding_request(&txn, change);
        let deadline = Instant::now() + timeout;

        // Anything already queued belongs to an earlier transaction
        self.discard_pending();

        self.socket
            .send_to(&request, server)
            .map_err(|e| ProbeError::Io(format!("send to {}: {}", server, e)))?;
        log::trace!("Sent STUN binding request to {} ({:?})", server, change);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProbeError::Timeout { server });
            }

            if let Err(e) = self.poll.poll(&mut self.events, Some(remaining)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ProbeError::Io(e.to_string()));
            }

            // Edge-triggered: drain until WouldBlock
            loop {
                let (len, from) = match self.socket.recv_from(&mut self.recv_buf) {
                    Ok(r) => r,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => return Err(ProbeError::Io(e.to_string())),
                };

                match decode_binding_response(&self.recv_buf[..len], &txn) {
                    Ok(mapped) => match change {
                        // A reply from the queried address says nothing about filtering
                        Some(change) if !change.accepts_source(server, from) => {
                            return Err(ProbeError::UnchangedSource { server, from });
                        }
                        _ => return Ok(mapped),
                    },
                    Err(StunDecodeError::TransactionMismatch) => {
                        log::debug!("Discarding late STUN response from {}", from);
                    }
                    Err(e) if from == server => {
                        return Err(ProbeError::Malformed(format!("{} from {}", e, server)));
                    }
                    Err(e) => {
                        log::debug!("Ignoring undecodable datagram from {}: {}", from, e);
                    }
                }
            }
        }
    }

    fn discard_pending(&mut self) {
        while let Ok((_, from)) = self.socket.recv_from(&mut self.recv_buf) {
            log::debug!("Discarding stale datagram from {}", from);
        }
    }
}

impl StunProber for UdpStunProber {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn binding_request(
        &mut self,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<SocketAddr, ProbeError> {
        self.transact(server, None, timeout)
    }

    fn change_request(
        &mut self,
        server: SocketAddr,
        change: ChangeRequest,
        timeout: Duration,
    ) -> Result<SocketAddr, ProbeError> {
        self.transact(server, Some(change), timeout)
    }
}

// ============================================================================
// Interface Enumeration
// ============================================================================

/// Non-loopback IPv4 interface addresses, each with the given port
#[cfg(unix)]
pub fn enumerate_local_addresses(port: u16) -> Vec<SocketAddr> {
    let mut addrs = Vec::new();

    // SAFETY: getifaddrs hands back a linked list we only read and then free
    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return addrs;
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;
            if !ifa.ifa_addr.is_null() && (*ifa.ifa_addr).sa_family as i32 == libc::AF_INET {
                let sockaddr_in = ifa.ifa_addr as *const libc::sockaddr_in;
                let ip = Ipv4Addr::from(u32::from_be((*sockaddr_in).sin_addr.s_addr));
                if !ip.is_loopback() {
                    addrs.push(SocketAddr::new(IpAddr::V4(ip), port));
                }
            }
            current = ifa.ifa_next;
        }

        libc::freeifaddrs(ifaddrs);
    }

    addrs
}

#[cfg(not(unix))]
pub fn enumerate_local_addresses(_port: u16) -> Vec<SocketAddr> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXN: TransactionId = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];

    #[test]
    fn test_binding_request_header() {
        let req = encode_binding_request(&TXN, None);
        assert_eq!(req.len(), HEADER_LEN);
        assert_eq!(&req[0..2], &[0x00, 0x01]);
        assert_eq!(&req[2..4], &[0x00, 0x00]);
        assert_eq!(&req[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert_eq!(&req[8..20], &TXN);
    }

    #[test]
    fn test_change_request_attribute() {
        let req = encode_binding_request(&TXN, Some(ChangeRequest::IpAndPort));
        assert_eq!(req.len(), HEADER_LEN + 8);
        assert_eq!(&req[20..22], &[0x00, 0x03]);
        assert_eq!(&req[24..28], &[0, 0, 0, 0x06]);

        let decoded = decode_binding_request(&req).unwrap();
        assert_eq!(decoded.transaction_id, TXN);
        assert_eq!(decoded.change, Some(ChangeRequest::IpAndPort));

        let port_only = encode_binding_request(&TXN, Some(ChangeRequest::PortOnly));
        assert_eq!(
            decode_binding_request(&port_only).unwrap().change,
            Some(ChangeRequest::PortOnly)
        );
    }

    #[test]
    fn test_xor_mapped_address_ipv4() {
        let mapped: SocketAddr = "203.0.113.4:61000".parse().unwrap();
        let resp = encode_binding_response(&TXN, mapped);

        // Port is XORed with the top half of the magic cookie
        let xor_port = u16::from_be_bytes([resp[26], resp[27]]);
        assert_eq!(xor_port, 61000 ^ 0x2112);

        assert_eq!(decode_binding_response(&resp, &TXN).unwrap(), mapped);
    }

    #[test]
    fn test_xor_mapped_address_ipv6() {
        let mapped: SocketAddr = "[2001:db8::42]:3478".parse().unwrap();
        let resp = encode_binding_response(&TXN, mapped);
        assert_eq!(decode_binding_response(&resp, &TXN).unwrap(), mapped);
    }

    #[test]
    fn test_plain_mapped_address_fallback() {
        let mut resp = Vec::new();
        resp.extend_from_slice(&STUN_BINDING_RESPONSE.to_be_bytes());
        resp.extend_from_slice(&12u16.to_be_bytes());
        resp.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
        resp.extend_from_slice(&TXN);
        resp.extend_from_slice(&ATTR_MAPPED_ADDRESS.to_be_bytes());
        resp.extend_from_slice(&8u16.to_be_bytes());
        resp.extend_from_slice(&[0, FAMILY_IPV4]);
        resp.extend_from_slice(&5000u16.to_be_bytes());
        resp.extend_from_slice(&[198, 51, 100, 7]);

        assert_eq!(
            decode_binding_response(&resp, &TXN).unwrap(),
            "198.51.100.7:5000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        let resp = encode_binding_response(&TXN, "203.0.113.4:1".parse().unwrap());

        let other_txn = [9u8; 12];
        assert_eq!(
            decode_binding_response(&resp, &other_txn),
            Err(StunDecodeError::TransactionMismatch)
        );
        assert_eq!(
            decode_binding_response(&resp[..10], &TXN),
            Err(StunDecodeError::TooShort(10))
        );
        assert!(matches!(
            decode_binding_response(&resp[..HEADER_LEN + 4], &TXN),
            Err(StunDecodeError::Truncated { .. })
        ));

        let req = encode_binding_request(&TXN, None);
        assert_eq!(
            decode_binding_response(&req, &TXN),
            Err(StunDecodeError::UnexpectedType(STUN_BINDING_REQUEST))
        );

        let mut bad_cookie = resp.clone();
        bad_cookie[4] = 0;
        assert!(matches!(
            decode_binding_response(&bad_cookie, &TXN),
            Err(StunDecodeError::BadMagicCookie(_))
        ));
    }

    #[test]
    fn test_response_without_address() {
        let mut resp = Vec::new();
        resp.extend_from_slice(&STUN_BINDING_RESPONSE.to_be_bytes());
        resp.extend_from_slice(&0u16.to_be_bytes());
        resp.extend_from_slice(&STUN_MAGIC_COOKIE.to_be_bytes());
        resp.extend_from_slice(&TXN);
        assert_eq!(decode_binding_response(&resp, &TXN), Err(StunDecodeError::NoAddress));
    }

    #[test]
    fn test_transaction_ids_differ() {
        let rng = SystemRandom::new();
        let a = generate_transaction_id(&rng).unwrap();
        let b = generate_transaction_id(&rng).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_enumerate_excludes_loopback() {
        for addr in enumerate_local_addresses(5000) {
            assert!(!addr.ip().is_loopback());
            assert_eq!(addr.port(), 5000);
        }
    }

    #[test]
    fn test_probe_times_out_against_silent_server() {
        let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let server = silent.local_addr().unwrap();

        let mut prober = UdpStunProber::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = prober
            .binding_request(server, Duration::from_millis(100))
            .unwrap_err();
        assert_eq!(err, ProbeError::Timeout { server });
    }

    #[test]
    fn test_probe_rejects_wrong_message_type() {
        // Bounces the request back unchanged
        let mirror = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let server = mirror.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1500];
            let (len, from) = mirror.recv_from(&mut buf).unwrap();
            mirror.send_to(&buf[..len], from).unwrap();
        });

        let mut prober = UdpStunProber::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = prober
            .binding_request(server, Duration::from_secs(2))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Malformed(_)));
        handle.join().unwrap();
    }

    #[test]
    fn test_change_request_answered_from_same_address() {
        // Plain RFC 5389 server: ignores CHANGE-REQUEST and answers from itself
        let plain = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let server = plain.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1500];
            let (len, from) = plain.recv_from(&mut buf).unwrap();
            let request = decode_binding_request(&buf[..len]).unwrap();
            assert_eq!(request.change, Some(ChangeRequest::IpAndPort));
            plain
                .send_to(&encode_binding_response(&request.transaction_id, from), from)
                .unwrap();
        });

        let mut prober = UdpStunProber::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let err = prober
            .change_request(server, ChangeRequest::IpAndPort, Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(err, ProbeError::UnchangedSource { server, from: server });
        handle.join().unwrap();
    }

    #[test]
    fn test_change_request_answered_from_other_port() {
        let primary = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let alternate = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let server = primary.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 1500];
            let (len, from) = primary.recv_from(&mut buf).unwrap();
            let request = decode_binding_request(&buf[..len]).unwrap();
            alternate
                .send_to(&encode_binding_response(&request.transaction_id, from), from)
                .unwrap();
        });

        let mut prober = UdpStunProber::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let local = prober.local_addr();
        let mapped = prober
            .change_request(server, ChangeRequest::PortOnly, Duration::from_secs(2))
            .unwrap();
        assert_eq!(mapped, local);
        handle.join().unwrap();
    }
}
