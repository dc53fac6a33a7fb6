//! NAT behaviour detection from STUN binding results
//!
//! Classic binding-request comparison: the locally-bound address is compared
//! with the address the first STUN server reports; if they differ, a second
//! server is asked from the same socket and the two mappings are compared.
//!
//! ```text
//! local == mapped(S1)                  → none
//! mapped(S1) != mapped(S2)             → symmetric
//! mapped(S1) == mapped(S2)             → cone family
//!     filtering probe disabled         → cone (subtype undetermined)
//!     answer from changed IP+port      → fullCone
//!     answer from changed port only    → restrictedCone
//!     no answer to either              → portRestrictedCone
//! any binding probe failed             → unknown (hasNat = true)
//! ```
//!
//! Detection runs once per peer per session; the resulting `NatAssessment`
//! is attached to that peer's handshake and never revised.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use crate::candidate::PeerId;
use crate::config::InspectorConfig;

// ============================================================================
// Probe Seam
// ============================================================================

/// Which source the server is asked to answer from (RFC 5780 CHANGE-REQUEST)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeRequest {
    /// Answer from a different IP and port
    IpAndPort,
    /// Answer from the same IP but a different port
    PortOnly,
}

impl ChangeRequest {
    /// Whether a reply from `from` honours the request sent to `server`
    pub fn accepts_source(&self, server: SocketAddr, from: SocketAddr) -> bool {
        match self {
            ChangeRequest::IpAndPort => from.ip() != server.ip(),
            ChangeRequest::PortOnly => from.ip() == server.ip() && from.port() != server.port(),
        }
    }
}

/// Issues STUN binding requests from one fixed local socket
pub trait StunProber {
    /// Locally-bound transport address of the probe socket
    fn local_addr(&self) -> SocketAddr;

    /// Send a binding request and return the mapped address the server observed
    fn binding_request(
        &mut self,
        server: SocketAddr,
        timeout: Duration,
    ) -> Result<SocketAddr, ProbeError>;

    /// Binding request asking the server to answer from another address
    ///
    /// Success means an unsolicited source got through the NAT.
    fn change_request(
        &mut self,
        server: SocketAddr,
        change: ChangeRequest,
        timeout: Duration,
    ) -> Result<SocketAddr, ProbeError>;
}

/// Errors from a single STUN probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// No matching response within the probe budget
    Timeout { server: SocketAddr },
    /// Socket-level failure
    Io(String),
    /// Response could not be decoded
    Malformed(String),
    /// The server answered a CHANGE-REQUEST from an address it was not asked to use
    UnchangedSource { server: SocketAddr, from: SocketAddr },
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Timeout { server } => write!(f, "STUN probe to {} timed out", server),
            ProbeError::Io(e) => write!(f, "STUN probe I/O error: {}", e),
            ProbeError::Malformed(e) => write!(f, "malformed STUN response: {}", e),
            ProbeError::UnchangedSource { server, from } => write!(
                f,
                "{} ignored CHANGE-REQUEST and answered from {}",
                server, from
            ),
        }
    }
}

impl std::error::Error for ProbeError {}

// ============================================================================
// Assessment
// ============================================================================

/// NAT behaviour classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NatType {
    /// Mapped address equals the local address
    None,
    FullCone,
    RestrictedCone,
    PortRestrictedCone,
    /// Endpoint-independent mapping; filtering subtype not probed
    Cone,
    /// Mapping changes with the destination
    Symmetric,
    /// Probes were inconclusive
    Unknown,
}

impl NatType {
    pub fn is_cone(&self) -> bool {
        matches!(
            self,
            NatType::FullCone
                | NatType::RestrictedCone
                | NatType::PortRestrictedCone
                | NatType::Cone
        )
    }

    pub fn category(&self) -> NatCategory {
        match self {
            NatType::None => NatCategory::None,
            NatType::Symmetric => NatCategory::Symmetric,
            NatType::Unknown => NatCategory::Unknown,
            _ => NatCategory::Cone,
        }
    }
}

impl fmt::Display for NatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatType::None => write!(f, "none"),
            NatType::FullCone => write!(f, "fullCone"),
            NatType::RestrictedCone => write!(f, "restrictedCone"),
            NatType::PortRestrictedCone => write!(f, "portRestrictedCone"),
            NatType::Cone => write!(f, "cone (subtype undetermined)"),
            NatType::Symmetric => write!(f, "symmetric"),
            NatType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Coarse grouping used by the display layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NatCategory {
    None,
    Cone,
    Symmetric,
    Unknown,
}

impl fmt::Display for NatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatCategory::None => write!(f, "none"),
            NatCategory::Cone => write!(f, "cone"),
            NatCategory::Symmetric => write!(f, "symmetric"),
            NatCategory::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of NAT detection for one peer. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatAssessment {
    pub peer: PeerId,
    pub has_nat: bool,
    pub nat_type: NatType,
    pub local_address: SocketAddr,
    /// First mapped address reported, if any probe answered
    pub public_address: Option<SocketAddr>,
    pub detected_at: SystemTime,
    /// Why the result is `unknown`
    pub inconclusive_reason: Option<String>,
}

impl NatAssessment {
    fn new(
        peer: &PeerId,
        nat_type: NatType,
        local_address: SocketAddr,
        public_address: Option<SocketAddr>,
    ) -> Self {
        Self {
            peer: peer.clone(),
            has_nat: nat_type != NatType::None,
            nat_type,
            local_address,
            public_address,
            detected_at: SystemTime::now(),
            inconclusive_reason: None,
        }
    }

    fn inconclusive(
        peer: &PeerId,
        local_address: SocketAddr,
        public_address: Option<SocketAddr>,
        reason: String,
    ) -> Self {
        let mut assessment = Self::new(peer, NatType::Unknown, local_address, public_address);
        assessment.inconclusive_reason = Some(reason);
        assessment
    }

    pub fn category(&self) -> NatCategory {
        self.nat_type.category()
    }

    /// Human-readable sentence naming the addresses involved
    pub fn describe(&self) -> String {
        let public = self
            .public_address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "not detected".to_string());

        match self.nat_type {
            NatType::None => format!(
                "No NAT detected: {} is reachable as-is",
                self.local_address
            ),
            NatType::Symmetric => format!(
                "Symmetric NAT: {} maps to a different public address per destination (first seen as {})",
                self.local_address, public
            ),
            NatType::Unknown => format!(
                "NAT behaviour unknown for {} (public {}): {}",
                self.local_address,
                public,
                self.inconclusive_reason.as_deref().unwrap_or("probes inconclusive")
            ),
            cone => format!(
                "{} NAT: {} maps to {} for every destination",
                cone, self.local_address, public
            ),
        }
    }
}

// ============================================================================
// Detector
// ============================================================================

/// One-shot, peer-scoped NAT detection
#[derive(Debug, Clone)]
pub struct NatDetector {
    peer: PeerId,
    probe_timeout: Duration,
    filtering_probe: bool,
}

impl NatDetector {
    pub fn new(peer: PeerId, probe_timeout: Duration) -> Self {
        Self {
            peer,
            probe_timeout,
            filtering_probe: false,
        }
    }

    pub fn from_config(peer: PeerId, config: &InspectorConfig) -> Self {
        Self::new(peer, config.probe_timeout()).with_filtering_probe(config.filtering_probe)
    }

    /// Enable the CHANGE-REQUEST probe that distinguishes cone subtypes
    pub fn with_filtering_probe(mut self, enabled: bool) -> Self {
        self.filtering_probe = enabled;
        self
    }

    /// Classify the NAT in front of the prober's socket
    ///
    /// `stun_servers` is ordered; the first entry is primary. Never fails:
    /// inconclusive probing yields `NatType::Unknown` with `has_nat = true`.
    pub fn detect<P: StunProber + ?Sized>(
        &self,
        prober: &mut P,
        stun_servers: &[SocketAddr],
    ) -> NatAssessment {
        let local = prober.local_addr();

        let primary = match stun_servers.first() {
            Some(server) => *server,
            None => {
                log::warn!("NAT detection for {} skipped: no STUN servers", self.peer);
                return NatAssessment::inconclusive(
                    &self.peer,
                    local,
                    None,
                    "no STUN servers configured".into(),
                );
            }
        };

        let first = match prober.binding_request(primary, self.probe_timeout) {
            Ok(mapped) => mapped,
            Err(e) => {
                log::warn!("NAT detection for {}: {}", self.peer, e);
                return NatAssessment::inconclusive(&self.peer, local, None, e.to_string());
            }
        };
        log::debug!("{} mapped {} -> {} via {}", self.peer, local, first, primary);

        if first == local {
            return self.finish(NatAssessment::new(&self.peer, NatType::None, local, Some(first)));
        }

        let secondary = match stun_servers.get(1) {
            Some(server) => *server,
            None => {
                log::warn!(
                    "NAT detection for {}: mapping differs but only one STUN server to compare",
                    self.peer
                );
                return NatAssessment::inconclusive(
                    &self.peer,
                    local,
                    Some(first),
                    "a second STUN server is needed to compare mappings".into(),
                );
            }
        };

        let second = match prober.binding_request(secondary, self.probe_timeout) {
            Ok(mapped) => mapped,
            Err(e) => {
                log::warn!("NAT detection for {}: {}", self.peer, e);
                return NatAssessment::inconclusive(&self.peer, local, Some(first), e.to_string());
            }
        };
        log::debug!("{} mapped {} -> {} via {}", self.peer, local, second, secondary);

        let nat_type = if first != second {
            NatType::Symmetric
        } else if self.filtering_probe {
            self.probe_filtering(prober, primary)
        } else {
            NatType::Cone
        };

        self.finish(NatAssessment::new(&self.peer, nat_type, local, Some(first)))
    }

    /// Pick the cone subtype from which unsolicited sources get through
    ///
    /// A server that answers from its own address gives no filtering
    /// evidence, so the subtype stays undetermined.
    fn probe_filtering<P: StunProber + ?Sized>(
        &self,
        prober: &mut P,
        server: SocketAddr,
    ) -> NatType {
        match prober.change_request(server, ChangeRequest::IpAndPort, self.probe_timeout) {
            Ok(_) => return NatType::FullCone,
            Err(ProbeError::Timeout { .. }) => {}
            Err(e) => {
                log::warn!("Filtering probe for {} failed: {}", self.peer, e);
                return NatType::Cone;
            }
        }

        match prober.change_request(server, ChangeRequest::PortOnly, self.probe_timeout) {
            Ok(_) => NatType::RestrictedCone,
            Err(ProbeError::Timeout { .. }) => NatType::PortRestrictedCone,
            Err(e) => {
                log::warn!("Filtering probe for {} failed: {}", self.peer, e);
                NatType::Cone
            }
        }
    }

    fn finish(&self, assessment: NatAssessment) -> NatAssessment {
        log::info!("NAT for {}: {}", self.peer, assessment.describe());
        assessment
    }
}

// ============================================================================
// Traversal Outlook
// ============================================================================

/// Expected outcome of direct or STUN-assisted connectivity for two peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalOutlook {
    /// Direct or STUN-assisted path should succeed
    Likely,
    /// May succeed depending on filtering and timing
    Possible,
    /// Relay expected
    Unlikely,
}

impl fmt::Display for TraversalOutlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraversalOutlook::Likely => write!(f, "likely"),
            TraversalOutlook::Possible => write!(f, "possible"),
            TraversalOutlook::Unlikely => write!(f, "unlikely (relay expected)"),
        }
    }
}

/// Predict traversal from both peers' NAT behaviour
pub fn predict_traversal(a: &NatAssessment, b: &NatAssessment) -> TraversalOutlook {
    use NatType::*;

    match (a.nat_type, b.nat_type) {
        (None, _) | (_, None) | (FullCone, _) | (_, FullCone) => TraversalOutlook::Likely,
        (Symmetric, Symmetric)
        | (Symmetric, PortRestrictedCone)
        | (PortRestrictedCone, Symmetric) => TraversalOutlook::Unlikely,
        _ => TraversalOutlook::Possible,
    }
}
