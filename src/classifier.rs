//! Connection path classification
//!
//! A pure function over the selected pair and both frozen candidate sets.
//! Rules, first match wins:
//!
//! ```text
//! either side relay              → relayed
//! both sides host                → direct
//! any side srflx                 → stunAssisted
//! no usable selected pair        → none (with the gap that explains it)
//! ```
//!
//! Explanations are built from the candidates involved so the same inputs
//! always produce the same text.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::candidate::{Candidate, CandidateType, Side, TransportAddress};
use crate::collector::CandidateSet;
use crate::pair::{selected_pair, CandidatePair, PairState};

/// Connection path classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathClass {
    /// Host candidates on both sides
    Direct,
    /// At least one server-reflexive candidate, no relay
    StunAssisted,
    /// At least one relay candidate
    Relayed,
    /// No usable path
    None,
}

impl fmt::Display for PathClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathClass::Direct => write!(f, "direct"),
            PathClass::StunAssisted => write!(f, "stunAssisted"),
            PathClass::Relayed => write!(f, "relayed"),
            PathClass::None => write!(f, "none"),
        }
    }
}

/// Why no path could be classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GapReason {
    /// No local/remote combination shares address family and protocol
    NoCompatibleCandidates,
    /// Compatible candidates existed but no pair was selected or succeeded
    NoUsablePair,
    /// The selected pair names a candidate absent from its frozen set
    MissingCandidate {
        side: Side,
        candidate_type: CandidateType,
        address: TransportAddress,
    },
    /// The stats report flagged more than one pair as selected
    ConflictingSelection(String),
}

impl fmt::Display for GapReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapReason::NoCompatibleCandidates => write!(f, "no candidates of a compatible type"),
            GapReason::NoUsablePair => write!(f, "gathering produced no usable pair"),
            GapReason::MissingCandidate {
                side,
                candidate_type,
                address,
            } => write!(
                f,
                "selected pair references {} {} {} missing from the {} candidate set",
                side, candidate_type, address, side
            ),
            GapReason::ConflictingSelection(detail) => write!(f, "{}", detail),
        }
    }
}

/// Classification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathVerdict {
    pub class: PathClass,
    pub explanation: String,
    /// Set only when `class` is `None`
    pub gap: Option<GapReason>,
}

impl PathVerdict {
    fn path(class: PathClass, explanation: String) -> Self {
        Self {
            class,
            explanation,
            gap: None,
        }
    }

    fn gap(gap: GapReason, explanation: String) -> Self {
        Self {
            class: PathClass::None,
            explanation,
            gap: Some(gap),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.class != PathClass::None
    }
}

impl fmt::Display for PathVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.explanation)
    }
}

/// Classify the path through the selected pair
pub fn classify(
    selected: Option<&CandidatePair>,
    local: &CandidateSet,
    remote: &CandidateSet,
) -> PathVerdict {
    let pair = match selected {
        Some(pair) => pair,
        None => return explain_gap(local, remote, "no selected pair reported"),
    };

    if pair.state != PairState::Succeeded {
        return explain_gap(
            local,
            remote,
            &format!("selected pair {} is {}", endpoints(pair), pair.state),
        );
    }

    let sides = [
        (Side::Local, &pair.local, local),
        (Side::Remote, &pair.remote, remote),
    ];
    for (side, candidate, set) in sides {
        if !set.contains(candidate) {
            let gap = GapReason::MissingCandidate {
                side,
                candidate_type: candidate.candidate_type,
                address: candidate.address,
            };
            let explanation = format!(
                "{} ({} set of {} holds {})",
                gap,
                side,
                set.peer(),
                list(set.candidates())
            );
            return PathVerdict::gap(gap, explanation);
        }
    }

    let (l, r) = (pair.local.candidate_type, pair.remote.candidate_type);

    if l == CandidateType::Relay || r == CandidateType::Relay {
        let relaying = match (l, r) {
            (CandidateType::Relay, CandidateType::Relay) => "both sides",
            (CandidateType::Relay, _) => "local side",
            _ => "remote side",
        };
        return PathVerdict::path(
            PathClass::Relayed,
            format!("Relayed through TURN ({} relaying): {}", relaying, endpoints(pair)),
        );
    }

    if l == CandidateType::Host && r == CandidateType::Host {
        return PathVerdict::path(
            PathClass::Direct,
            format!("Direct host-to-host path: {}", endpoints(pair)),
        );
    }

    PathVerdict::path(
        PathClass::StunAssisted,
        format!(
            "STUN-assisted path through a NAT mapping: {}",
            endpoints(pair)
        ),
    )
}

/// Classify from a full pair report, locating the selected pair first
///
/// A report with more than one selected pair is inconsistent and yields
/// `none` instead of a guess.
pub fn classify_report(
    pairs: &[CandidatePair],
    local: &CandidateSet,
    remote: &CandidateSet,
) -> PathVerdict {
    match selected_pair(pairs) {
        Ok(selected) => classify(selected, local, remote),
        Err(e) => {
            let gap = GapReason::ConflictingSelection(e.to_string());
            PathVerdict::gap(gap, format!("Cannot classify: {}", e))
        }
    }
}

/// Extend a verdict with what the TURN configuration says about relaying
///
/// Only `relayed` and `none` verdicts change. The class and gap are kept.
pub fn with_relay_context(
    verdict: PathVerdict,
    turn_servers: &[String],
    local: &CandidateSet,
    remote: &CandidateSet,
) -> PathVerdict {
    let relay_offered = local
        .candidates()
        .iter()
        .chain(remote.candidates())
        .any(|c| c.candidate_type == CandidateType::Relay);

    let note = match verdict.class {
        PathClass::Relayed if turn_servers.is_empty() => {
            "relay allocated by a TURN server outside this configuration".to_string()
        }
        PathClass::Relayed => format!("TURN servers configured: {}", turn_servers.join(", ")),
        PathClass::None if relay_offered => return verdict,
        PathClass::None if turn_servers.is_empty() => {
            "no relay candidates, no TURN server configured".to_string()
        }
        PathClass::None => format!(
            "no relay candidates although {} TURN server(s) are configured",
            turn_servers.len()
        ),
        _ => return verdict,
    };

    PathVerdict {
        explanation: format!("{}; {}", verdict.explanation, note),
        ..verdict
    }
}

fn explain_gap(local: &CandidateSet, remote: &CandidateSet, context: &str) -> PathVerdict {
    let compatible = local.candidates().iter().any(|l| {
        remote
            .candidates()
            .iter()
            .any(|r| l.address.is_compatible_with(&r.address))
    });

    let gap = if compatible {
        GapReason::NoUsablePair
    } else {
        GapReason::NoCompatibleCandidates
    };

    let explanation = format!(
        "No path, {}: {}; local has {}, remote has {}",
        gap,
        context,
        list(local.candidates()),
        list(remote.candidates())
    );
    PathVerdict::gap(gap, explanation)
}

fn endpoints(pair: &CandidatePair) -> String {
    format!(
        "local {} {} <-> remote {} {}",
        pair.local.candidate_type,
        pair.local.address,
        pair.remote.candidate_type,
        pair.remote.address
    )
}

fn list(candidates: &[Candidate]) -> String {
    if candidates.is_empty() {
        return "no candidates".to_string();
    }
    let items: Vec<String> = candidates
        .iter()
        .map(|c| format!("{} {}", c.candidate_type, c.address))
        .collect();
    format!("[{}]", items.join(", "))
}
