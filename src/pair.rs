//! Candidate pairs as reported by the connectivity checks
//!
//! Pair state and selection come from the media engine's stats. Nothing here
//! runs connectivity checks or nominates a pair; the core only interprets
//! what it is told.
//!
//! # Candidate Pair Priority (RFC 8445 Section 6.1.2.3)
//!
//! ```text
//! pair_priority = 2^32 * MIN(G,D) + 2 * MAX(G,D) + (G > D ? 1 : 0)
//! ```
//! where G = controlling agent priority, D = controlled agent priority

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::candidate::{Candidate, PeerId};

/// State of a connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    /// Waiting to be scheduled
    Waiting,
    /// Request sent, awaiting response
    InProgress,
    /// Check succeeded
    Succeeded,
    /// Check failed
    Failed,
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::Waiting => write!(f, "waiting"),
            PairState::InProgress => write!(f, "in-progress"),
            PairState::Succeeded => write!(f, "succeeded"),
            PairState::Failed => write!(f, "failed"),
        }
    }
}

/// A pair of local and remote candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePair {
    /// Local candidate
    pub local: Candidate,
    /// Remote candidate
    pub remote: Candidate,
    /// Current state of the check
    pub state: PairState,
    /// Whether the media engine reports this pair as the selected one
    pub selected: bool,
}

impl CandidatePair {
    pub fn new(local: Candidate, remote: Candidate, state: PairState) -> Self {
        Self {
            local,
            remote,
            state,
            selected: false,
        }
    }

    /// A succeeded pair reported as selected
    pub fn selected(local: Candidate, remote: Candidate) -> Self {
        Self {
            local,
            remote,
            state: PairState::Succeeded,
            selected: true,
        }
    }

    /// Pair priority from the point of view of the given agent role
    pub fn priority(&self, is_controlling: bool) -> u64 {
        calculate_pair_priority(self.local.priority, self.remote.priority, is_controlling)
    }

    /// Peer whose view this pair belongs to
    pub fn owner(&self) -> &PeerId {
        &self.local.origin
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} <-> {} {} ({}{})",
            self.local.candidate_type,
            self.local.address,
            self.remote.candidate_type,
            self.remote.address,
            self.state,
            if self.selected { ", selected" } else { "" }
        )
    }
}

/// Calculate pair priority per RFC 8445 Section 6.1.2.3
pub fn calculate_pair_priority(
    local_priority: u32,
    remote_priority: u32,
    is_controlling: bool,
) -> u64 {
    let (g, d) = if is_controlling {
        (local_priority as u64, remote_priority as u64)
    } else {
        (remote_priority as u64, local_priority as u64)
    };

    let min = g.min(d);
    let max = g.max(d);
    let tie_breaker = if g > d { 1u64 } else { 0u64 };

    (1u64 << 32) * min + 2 * max + tie_breaker
}

/// Find the pair the media engine reported as selected
///
/// At most one pair per peer may carry the flag; a second one is an
/// inconsistent report and is rejected rather than guessed around.
pub fn selected_pair(pairs: &[CandidatePair]) -> Result<Option<&CandidatePair>, SelectionError> {
    let mut selected = pairs.iter().filter(|p| p.selected);
    let first = selected.next();
    if let Some(second) = selected.next() {
        return Err(SelectionError::MultipleSelected {
            first: first.map(|p| p.to_string()).unwrap_or_default(),
            second: second.to_string(),
        });
    }
    Ok(first)
}

/// Whether any reported pair reached `succeeded`
pub fn any_succeeded(pairs: &[CandidatePair]) -> bool {
    pairs.iter().any(|p| p.state == PairState::Succeeded)
}

/// Inconsistent selection reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    MultipleSelected { first: String, second: String },
}

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::MultipleSelected { first, second } => {
                write!(f, "more than one selected pair reported: [{}] and [{}]", first, second)
            }
        }
    }
}

impl std::error::Error for SelectionError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Side;

    fn host(peer: &str, side: Side, addr: &str) -> Candidate {
        Candidate::host(PeerId::new(peer), side, addr.parse().unwrap())
    }

    fn pair(state: PairState) -> CandidatePair {
        CandidatePair::new(
            host("alice", Side::Local, "192.168.1.5:5000"),
            host("bob", Side::Remote, "192.168.1.9:5000"),
            state,
        )
    }

    #[test]
    fn test_pair_priority_controlling() {
        let priority = calculate_pair_priority(100, 50, true);
        let expected = (1u64 << 32) * 50 + 2 * 100 + 1;
        assert_eq!(priority, expected);
    }

    #[test]
    fn test_pair_priority_controlled() {
        let priority = calculate_pair_priority(50, 100, false);
        let expected = (1u64 << 32) * 50 + 2 * 100 + 1;
        assert_eq!(priority, expected);
    }

    #[test]
    fn test_selected_pair_lookup() {
        let mut pairs = vec![pair(PairState::Failed), pair(PairState::Succeeded)];
        assert_eq!(selected_pair(&pairs).unwrap(), None);

        pairs[1].selected = true;
        let found = selected_pair(&pairs).unwrap().unwrap();
        assert_eq!(found.state, PairState::Succeeded);
    }

    #[test]
    fn test_multiple_selected_rejected() {
        let mut pairs = vec![pair(PairState::Succeeded), pair(PairState::Succeeded)];
        pairs[0].selected = true;
        pairs[1].selected = true;

        assert!(matches!(
            selected_pair(&pairs),
            Err(SelectionError::MultipleSelected { .. })
        ));
    }

    #[test]
    fn test_any_succeeded() {
        assert!(!any_succeeded(&[pair(PairState::Failed), pair(PairState::InProgress)]));
        assert!(any_succeeded(&[pair(PairState::Failed), pair(PairState::Succeeded)]));
        assert!(!any_succeeded(&[]));
    }

    #[test]
    fn test_pair_display() {
        let mut p = pair(PairState::Succeeded);
        p.selected = true;
        let display = p.to_string();
        assert!(display.contains("192.168.1.5:5000/udp"));
        assert!(display.contains("succeeded, selected"));
        assert_eq!(p.owner().as_str(), "alice");
    }
}
