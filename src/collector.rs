//! Candidate collection with gathering deadlines
//!
//! One collector accumulates the candidates of one (peer, side). Gathering
//! ends either when every gatherer has finished or when the role's deadline
//! passes; both end in `freeze`, which produces an immutable `CandidateSet`.
//!
//! # State Machine
//!
//! ```text
//! Collecting ──(all gatherers done)──► Frozen(Completed)
//!     │
//!     └────────(deadline passed)─────► Frozen(Timeout)
//! ```
//!
//! A partial set frozen on timeout is a valid result, not a failure.
//! Candidates arriving after the freeze are dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::candidate::{Candidate, CandidateKey, CandidateType, PeerId, Side, TransportAddress};

// ============================================================================
// Types
// ============================================================================

/// Role of a peer in the offer/answer exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatheringRole {
    /// Creates the offer; waits longer for its candidates
    Offerer,
    /// Reacts to an already-gathered offer
    Answerer,
}

impl fmt::Display for GatheringRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatheringRole::Offerer => write!(f, "offerer"),
            GatheringRole::Answerer => write!(f, "answerer"),
        }
    }
}

/// Why a collector stopped accepting candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreezeReason {
    Completed,
    Timeout,
}

impl fmt::Display for FreezeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FreezeReason::Completed => write!(f, "completed"),
            FreezeReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Frozen, insertion-ordered candidates of one (peer, side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSet {
    peer: PeerId,
    side: Side,
    reason: FreezeReason,
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn reason(&self) -> FreezeReason {
        self.reason
    }

    /// Candidates in collection order
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Whether a candidate with the same transport address and type was collected
    pub fn contains(&self, candidate: &Candidate) -> bool {
        let key = candidate.key();
        self.candidates.iter().any(|c| c.key() == key)
    }

    pub fn has_type(&self, candidate_type: CandidateType) -> bool {
        self.candidates.iter().any(|c| c.candidate_type == candidate_type)
    }

    /// The same candidates seen from the other peer's point of view
    ///
    /// Used on the receiving end of a handshake: the sender's local set is
    /// the receiver's remote set.
    pub fn into_remote_view(self) -> Vec<Candidate> {
        self.candidates
            .into_iter()
            .map(|c| c.with_side(Side::Remote))
            .collect()
    }
}

// ============================================================================
// Collector
// ============================================================================

/// Accumulates candidates for one (peer, side) until frozen
#[derive(Debug)]
pub struct CandidateCollector {
    peer: PeerId,
    side: Side,
    candidates: Vec<Candidate>,
    seen: HashSet<CandidateKey>,
    deadline: Instant,
    frozen: Option<CandidateSet>,
}

impl CandidateCollector {
    /// Start collecting with the given gathering budget
    pub fn start(peer: PeerId, side: Side, timeout: Duration) -> Self {
        Self::with_deadline(peer, side, Instant::now() + timeout)
    }

    pub fn with_deadline(peer: PeerId, side: Side, deadline: Instant) -> Self {
        log::debug!("Collecting {} candidates for {}", side, peer);
        Self {
            peer,
            side,
            candidates: Vec::new(),
            seen: HashSet::new(),
            deadline,
            frozen: None,
        }
    }

    /// Record a candidate
    ///
    /// Duplicates (same transport address and type) are ignored; anything
    /// arriving after the freeze or past the deadline is dropped.
    pub fn add(&mut self, candidate: Candidate) -> Result<(), CollectorError> {
        self.add_at(candidate, Instant::now())
    }

    pub fn add_at(&mut self, candidate: Candidate, now: Instant) -> Result<(), CollectorError> {
        if self.frozen.is_none() && now >= self.deadline {
            self.freeze(FreezeReason::Timeout);
        }

        if self.frozen.is_some() {
            log::warn!(
                "Dropping late {} candidate {} for {} (gathering frozen)",
                self.side,
                candidate,
                self.peer
            );
            return Err(CollectorError::StaleCandidate(
                candidate.address,
                candidate.candidate_type,
            ));
        }

        if !self.seen.insert(candidate.key()) {
            log::debug!("Ignoring duplicate candidate {} for {}", candidate, self.peer);
            return Err(CollectorError::DuplicateCandidate(
                candidate.address,
                candidate.candidate_type,
            ));
        }

        self.candidates.push(candidate);
        Ok(())
    }

    /// Stop collecting and return the frozen set
    ///
    /// Idempotent: a second call returns the set produced by the first,
    /// including its original reason.
    pub fn freeze(&mut self, reason: FreezeReason) -> CandidateSet {
        if let Some(set) = &self.frozen {
            return set.clone();
        }

        let set = CandidateSet {
            peer: self.peer.clone(),
            side: self.side,
            reason,
            candidates: std::mem::take(&mut self.candidates),
        };
        log::info!(
            "Gathering {} for {} ({} side): {} candidate(s)",
            reason,
            self.peer,
            self.side,
            set.len()
        );
        self.frozen = Some(set.clone());
        set
    }

    /// Drain candidates from concurrent gatherers until they finish or the deadline passes
    ///
    /// All senders dropped means gathering completed. Whatever is still in
    /// flight at the deadline is discarded with the receiver.
    pub fn drain(&mut self, rx: &Receiver<Candidate>) -> CandidateSet {
        self.drain_with(rx, |_| {})
    }

    /// Like `drain`, calling `on_accept` for every candidate that made it into the set
    pub fn drain_with<F>(&mut self, rx: &Receiver<Candidate>, mut on_accept: F) -> CandidateSet
    where
        F: FnMut(&Candidate),
    {
        loop {
            if let Some(set) = &self.frozen {
                return set.clone();
            }

            let now = Instant::now();
            if now >= self.deadline {
                return self.freeze(FreezeReason::Timeout);
            }

            match rx.recv_timeout(self.deadline - now) {
                Ok(candidate) => {
                    // Duplicate and stale candidates are logged by add
                    let accepted = candidate.clone();
                    if self.add(candidate).is_ok() {
                        on_accept(&accepted);
                    }
                }
                Err(RecvTimeoutError::Timeout) => return self.freeze(FreezeReason::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return self.freeze(FreezeReason::Completed)
                }
            }
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Number of candidates collected so far
    pub fn len(&self) -> usize {
        match &self.frozen {
            Some(set) => set.len(),
            None => self.candidates.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Recoverable insert failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// Same transport address and type already collected; insert ignored
    DuplicateCandidate(TransportAddress, CandidateType),
    /// Insert after the set was frozen; candidate dropped
    StaleCandidate(TransportAddress, CandidateType),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorError::DuplicateCandidate(addr, t) => {
                write!(f, "duplicate {} candidate {}", t, addr)
            }
            CollectorError::StaleCandidate(addr, t) => {
                write!(f, "{} candidate {} arrived after gathering was frozen", t, addr)
            }
        }
    }
}

impl std::error::Error for CollectorError {}
