//! ICE candidate model
//!
//! Candidates are never gathered here. They are recorded as observed from the
//! media engine (browser-native gathering on the local side, the peer's
//! handshake payload on the remote side). Priorities follow RFC 8445.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

// ============================================================================
// Constants (RFC 8445 Section 5.1.2.1)
// ============================================================================

/// Type preference for host candidates (highest priority)
const HOST_TYPE_PREF: u32 = 126;

/// Type preference for server reflexive candidates
const SRFLX_TYPE_PREF: u32 = 100;

/// Type preference for relay candidates (lowest priority)
const RELAY_TYPE_PREF: u32 = 0;

/// Local preference for IPv4 addresses
const IPV4_LOCAL_PREF: u32 = 65535;

/// Local preference for IPv6 addresses
const IPV6_LOCAL_PREF: u32 = 65534;

/// Component ID for RTP (bundled media uses a single component)
pub const COMPONENT_RTP: u16 = 1;

// ============================================================================
// Identity
// ============================================================================

/// Identity of one endpoint taking part in the handshake
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(name: impl Into<String>) -> Self {
        PeerId(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(name: &str) -> Self {
        PeerId::new(name)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which side of a peer's view a candidate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Gathered by the peer itself
    Local,
    /// Received from the other peer through signaling
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

// ============================================================================
// Candidate Types
// ============================================================================

/// Type of ICE candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    /// Local network interface address
    Host,
    /// Server reflexive (public mapping learned from STUN)
    ServerReflexive,
    /// Relay candidate (allocated on a TURN server)
    Relay,
}

impl CandidateType {
    /// Get the type preference value for priority calculation
    pub fn type_preference(&self) -> u32 {
        match self {
            CandidateType::Host => HOST_TYPE_PREF,
            CandidateType::ServerReflexive => SRFLX_TYPE_PREF,
            CandidateType::Relay => RELAY_TYPE_PREF,
        }
    }

    /// Parse the `typ` token of an SDP candidate attribute
    pub fn from_sdp_name(name: &str) -> Option<Self> {
        match name {
            "host" => Some(CandidateType::Host),
            "srflx" => Some(CandidateType::ServerReflexive),
            "relay" => Some(CandidateType::Relay),
            _ => None,
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateType::Host => write!(f, "host"),
            CandidateType::ServerReflexive => write!(f, "srflx"),
            CandidateType::Relay => write!(f, "relay"),
        }
    }
}

/// Transport protocol of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    Udp,
    Tcp,
}

impl TransportProtocol {
    fn from_sdp_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("udp") {
            Some(TransportProtocol::Udp)
        } else if name.eq_ignore_ascii_case("tcp") {
            Some(TransportProtocol::Tcp)
        } else {
            None
        }
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportProtocol::Udp => write!(f, "udp"),
            TransportProtocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// IP, port and protocol of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportAddress {
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: TransportProtocol,
}

impl TransportAddress {
    pub fn new(addr: SocketAddr, protocol: TransportProtocol) -> Self {
        Self {
            ip: addr.ip(),
            port: addr.port(),
            protocol,
        }
    }

    pub fn udp(addr: SocketAddr) -> Self {
        Self::new(addr, TransportProtocol::Udp)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Two addresses can form a pair only within the same family and protocol
    pub fn is_compatible_with(&self, other: &TransportAddress) -> bool {
        self.ip.is_ipv4() == other.ip.is_ipv4() && self.protocol == other.protocol
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.socket_addr(), self.protocol)
    }
}

// ============================================================================
// Candidate
// ============================================================================

/// An ICE candidate as offered by one peer. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Peer that offered this candidate
    pub origin: PeerId,
    /// Side of the recording peer's view
    pub side: Side,
    /// Type of candidate (host, srflx, relay)
    pub candidate_type: CandidateType,
    /// Transport address
    pub address: TransportAddress,
    /// Foundation string for candidate pairing
    pub foundation: String,
    /// Component ID (1 = RTP)
    pub component_id: u16,
    /// Priority (higher = more preferred)
    pub priority: u32,
    /// Related address (e.g., host address for srflx)
    pub related_address: Option<SocketAddr>,
}

/// Key used to reject duplicate candidates within one set
pub type CandidateKey = (TransportAddress, CandidateType);

impl Candidate {
    /// Create a new UDP candidate with calculated priority and foundation
    pub fn new(
        origin: PeerId,
        side: Side,
        candidate_type: CandidateType,
        address: SocketAddr,
        related_address: Option<SocketAddr>,
    ) -> Self {
        let local_pref = local_preference(&address);
        let priority = calculate_priority(
            candidate_type.type_preference(),
            local_pref,
            COMPONENT_RTP as u32,
        );
        let foundation = generate_foundation(candidate_type, &address);

        Self {
            origin,
            side,
            candidate_type,
            address: TransportAddress::udp(address),
            foundation,
            component_id: COMPONENT_RTP,
            priority,
            related_address,
        }
    }

    pub fn host(origin: PeerId, side: Side, address: SocketAddr) -> Self {
        Self::new(origin, side, CandidateType::Host, address, None)
    }

    pub fn server_reflexive(
        origin: PeerId,
        side: Side,
        public_address: SocketAddr,
        base_address: SocketAddr,
    ) -> Self {
        Self::new(
            origin,
            side,
            CandidateType::ServerReflexive,
            public_address,
            Some(base_address),
        )
    }

    pub fn relay(
        origin: PeerId,
        side: Side,
        relay_address: SocketAddr,
        base_address: SocketAddr,
    ) -> Self {
        Self::new(origin, side, CandidateType::Relay, relay_address, Some(base_address))
    }

    /// Parse an SDP `candidate:` attribute as reported by the media engine
    ///
    /// Accepts the bare value, `candidate:...` and `a=candidate:...` forms:
    /// `<foundation> <component> <proto> <priority> <ip> <port> typ <type> [raddr <ip> rport <port>] ...`
    pub fn from_sdp_attribute(
        origin: PeerId,
        side: Side,
        raw: &str,
    ) -> Result<Self, CandidateParseError> {
        let raw = raw.trim();
        let raw = raw.strip_prefix("a=").unwrap_or(raw);
        let raw = raw.strip_prefix("candidate:").unwrap_or(raw);

        let split: Vec<&str> = raw.split_whitespace().collect();
        if split.len() < 8 {
            return Err(CandidateParseError::TooShort(split.len()));
        }
        if split[6] != "typ" {
            return Err(CandidateParseError::MissingType);
        }

        let foundation = split[0].to_owned();
        let component_id: u16 = split[1]
            .parse()
            .map_err(|_| CandidateParseError::InvalidField("component", split[1].to_owned()))?;
        let protocol = TransportProtocol::from_sdp_name(split[2])
            .ok_or_else(|| CandidateParseError::InvalidField("protocol", split[2].to_owned()))?;
        let priority: u32 = split[3]
            .parse()
            .map_err(|_| CandidateParseError::InvalidField("priority", split[3].to_owned()))?;
        let ip: IpAddr = split[4]
            .parse()
            .map_err(|_| CandidateParseError::InvalidField("address", split[4].to_owned()))?;
        let port: u16 = split[5]
            .parse()
            .map_err(|_| CandidateParseError::InvalidField("port", split[5].to_owned()))?;
        let candidate_type = CandidateType::from_sdp_name(split[7])
            .ok_or_else(|| CandidateParseError::UnsupportedType(split[7].to_owned()))?;

        // Extensions come as key/value pairs; only the related address matters here
        let mut rel_ip: Option<IpAddr> = None;
        let mut rel_port: Option<u16> = None;
        for kv in split[8..].chunks(2) {
            match kv {
                ["raddr", value] => {
                    rel_ip = Some(value.parse().map_err(|_| {
                        CandidateParseError::InvalidField("raddr", (*value).to_owned())
                    })?);
                }
                ["rport", value] => {
                    rel_port = Some(value.parse().map_err(|_| {
                        CandidateParseError::InvalidField("rport", (*value).to_owned())
                    })?);
                }
                _ => {}
            }
        }
        let related_address = match (rel_ip, rel_port) {
            (Some(ip), Some(port)) => Some(SocketAddr::new(ip, port)),
            _ => None,
        };

        Ok(Self {
            origin,
            side,
            candidate_type,
            address: TransportAddress { ip, port, protocol },
            foundation,
            component_id,
            priority,
            related_address,
        })
    }

    /// The same candidate as seen from another side of a peer's view
    ///
    /// A peer's local candidates become the other peer's remote candidates.
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    /// Duplicate-detection key (transport address + type)
    pub fn key(&self) -> CandidateKey {
        (self.address, self.candidate_type)
    }

    /// Check if this is a loopback candidate
    pub fn is_loopback(&self) -> bool {
        self.address.ip.is_loopback()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} priority {} foundation {}",
            self.candidate_type, self.address, self.priority, self.foundation
        )
    }
}

// ============================================================================
// Priority Calculation (RFC 8445 Section 5.1.2.1)
// ============================================================================

/// Calculate candidate priority per RFC 8445
///
/// Formula: priority = (2^24 * type_preference) + (2^8 * local_preference) + (256 - component_id)
pub fn calculate_priority(type_pref: u32, local_pref: u32, component_id: u32) -> u32 {
    let type_pref = type_pref.min(126);
    let local_pref = local_pref.min(65535);
    let component_id = component_id.clamp(1, 256);

    (type_pref << 24) | (local_pref << 8) | (256 - component_id)
}

fn local_preference(addr: &SocketAddr) -> u32 {
    match addr.ip() {
        IpAddr::V4(_) => IPV4_LOCAL_PREF,
        IpAddr::V6(_) => IPV6_LOCAL_PREF,
    }
}

/// Same foundation = same base address and type
fn generate_foundation(candidate_type: CandidateType, addr: &SocketAddr) -> String {
    format!("{}_{}", candidate_type, addr.ip())
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from parsing an SDP candidate attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateParseError {
    /// Fewer than the 8 mandatory fields
    TooShort(usize),
    /// The 7th field is not `typ`
    MissingType,
    /// A mandatory field failed to parse
    InvalidField(&'static str, String),
    /// Candidate type outside host/srflx/relay
    UnsupportedType(String),
}

impl fmt::Display for CandidateParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateParseError::TooShort(n) => {
                write!(f, "candidate attribute too short: {} fields (need 8)", n)
            }
            CandidateParseError::MissingType => write!(f, "candidate attribute missing 'typ'"),
            CandidateParseError::InvalidField(field, value) => {
                write!(f, "invalid candidate {}: '{}'", field, value)
            }
            CandidateParseError::UnsupportedType(t) => {
                write!(f, "unsupported candidate type '{}'", t)
            }
        }
    }
}

impl std::error::Error for CandidateParseError {}

// ============================================================================
// Tests
// ============================================================================
