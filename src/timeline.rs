//! Cross-peer timeline synchronization
//!
//! Each peer records events against its own clock. Clocks are not assumed
//! synchronized; the only cross-peer ordering evidence is the signaling
//! exchange: a peer can only receive a message after the other peer sent it.
//!
//! # Merge Rule
//!
//! ```text
//! 1. Within a peer: order by (local timestamp, sequence hint, record order)
//! 2. Across peers:  repeatedly emit the earliest stream head by timestamp
//!                   (ties broken by peer first-appearance order)
//! 3. Causality:     a head that receives message m is held back until the
//!                   event sending m has been emitted; holding it back is
//!                   recorded as a skew correction
//! ```
//!
//! The merge recomputes from the full log every time, so it can be called
//! repeatedly while events are still being recorded.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Instant;

use crate::candidate::PeerId;
use crate::config::ComponentNames;

/// Identifier of one signaling message, shared by its send and receive events
pub type MessageId = u64;

/// The five logical actors an event can be attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    WebClient,
    Signaling,
    StunServer,
    TurnServer,
    MediaServer,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ComponentNames::default().name(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventCategory {
    Gathering,
    Signaling,
    ConnectionState,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventCategory::Gathering => write!(f, "gathering"),
            EventCategory::Signaling => write!(f, "signaling"),
            EventCategory::ConnectionState => write!(f, "connection-state"),
        }
    }
}

/// Link between an event and a signaling message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalMark {
    Sent(MessageId),
    Received(MessageId),
}

/// One recorded event. Never mutated after recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub peer: PeerId,
    pub component: Component,
    pub label: String,
    pub category: EventCategory,
    /// Milliseconds on the recording peer's own clock
    pub local_ts_ms: u64,
    /// Tie-breaker for events sharing a timestamp
    pub sequence_hint: u64,
    pub signal: Option<SignalMark>,
}

impl TimelineEvent {
    pub fn new(
        peer: PeerId,
        component: Component,
        category: EventCategory,
        label: impl Into<String>,
        local_ts_ms: u64,
    ) -> Self {
        Self {
            peer,
            component,
            label: label.into(),
            category,
            local_ts_ms,
            sequence_hint: 0,
            signal: None,
        }
    }

    pub fn with_sequence(mut self, sequence_hint: u64) -> Self {
        self.sequence_hint = sequence_hint;
        self
    }

    /// Mark this event as the send of a signaling message
    pub fn sent(mut self, message: MessageId) -> Self {
        self.signal = Some(SignalMark::Sent(message));
        self
    }

    /// Mark this event as the receipt of a signaling message
    pub fn received(mut self, message: MessageId) -> Self {
        self.signal = Some(SignalMark::Received(message));
        self
    }

    fn received_message(&self) -> Option<MessageId> {
        match self.signal {
            Some(SignalMark::Received(m)) => Some(m),
            _ => None,
        }
    }

    fn sent_message(&self) -> Option<MessageId> {
        match self.signal {
            Some(SignalMark::Sent(m)) => Some(m),
            _ => None,
        }
    }
}

impl fmt::Display for TimelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} @{}ms] {} {}: {}",
            self.peer, self.local_ts_ms, self.component, self.category, self.label
        )
    }
}

// ============================================================================
// Per-peer Recording
// ============================================================================

/// Stamps events with one peer's local clock and a running sequence number
#[derive(Debug)]
pub struct PeerRecorder {
    peer: PeerId,
    epoch: Instant,
    offset_ms: u64,
    next_sequence: u64,
}

impl PeerRecorder {
    pub fn new(peer: PeerId) -> Self {
        Self::with_clock_offset(peer, 0)
    }

    /// Recorder whose clock reads `offset_ms` ahead of its start instant
    pub fn with_clock_offset(peer: PeerId, offset_ms: u64) -> Self {
        Self {
            peer,
            epoch: Instant::now(),
            offset_ms,
            next_sequence: 0,
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    /// Current reading of this peer's clock
    pub fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.saturating_add(elapsed)
    }

    pub fn event(
        &mut self,
        component: Component,
        category: EventCategory,
        label: impl Into<String>,
    ) -> TimelineEvent {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        TimelineEvent::new(self.peer.clone(), component, category, label, self.now_ms())
            .with_sequence(sequence)
    }
}

// ============================================================================
// Merge
// ============================================================================

/// A receive event held back behind the send it depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkewCorrection {
    pub peer: PeerId,
    pub label: String,
    pub message: MessageId,
    /// Position of the corrected event in the merged sequence
    pub position: usize,
    pub receive_ts_ms: u64,
    pub send_ts_ms: u64,
}

impl SkewCorrection {
    /// Lower bound on how far the receiver's clock trails the sender's
    pub fn apparent_skew_ms(&self) -> u64 {
        self.send_ts_ms.saturating_sub(self.receive_ts_ms)
    }
}

/// An event whose causal predecessor could never be emitted first
///
/// Only arises from inconsistent logs (a receive ordered before its own send).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CausalViolation {
    pub peer: PeerId,
    pub label: String,
    pub message: MessageId,
    pub position: usize,
}

/// Ordered, read-only view over all recorded events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedTimeline {
    pub events: Vec<TimelineEvent>,
    pub corrections: Vec<SkewCorrection>,
    pub violations: Vec<CausalViolation>,
}

impl MergedTimeline {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Position of the first event carrying the given signal mark
    pub fn position_of(&self, mark: SignalMark) -> Option<usize> {
        self.events.iter().position(|e| e.signal == Some(mark))
    }

    /// One display line per event, using the configured component names
    pub fn lines(&self, names: &ComponentNames) -> Vec<String> {
        self.events
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let corrected = self.corrections.iter().any(|c| c.position == i);
                format!(
                    "{:>3}. [{} @{}ms] {} ({}): {}{}",
                    i + 1,
                    e.peer,
                    e.local_ts_ms,
                    names.name(e.component),
                    e.category,
                    e.label,
                    if corrected { " [reordered after send]" } else { "" }
                )
            })
            .collect()
    }
}

/// Append-only event log across peers
#[derive(Debug, Clone, Default)]
pub struct TimelineSynchronizer {
    log: Vec<TimelineEvent>,
}

impl TimelineSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: TimelineEvent) {
        log::trace!("Recorded {}", event);
        self.log.push(event);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Merge the full log into one causally ordered sequence
    pub fn merge(&self) -> MergedTimeline {
        // Streams in peer first-appearance order; that order is the tie-breaker
        let mut rank: HashMap<&PeerId, usize> = HashMap::new();
        let mut streams: Vec<Vec<usize>> = Vec::new();
        for (idx, event) in self.log.iter().enumerate() {
            let r = *rank.entry(&event.peer).or_insert_with(|| {
                streams.push(Vec::new());
                streams.len() - 1
            });
            streams[r].push(idx);
        }
        for stream in &mut streams {
            stream.sort_by_key(|&idx| {
                let e = &self.log[idx];
                (e.local_ts_ms, e.sequence_hint, idx)
            });
        }

        // Sends present in the log; receives of unknown sends are unconstrained
        let mut send_ts: HashMap<MessageId, u64> = HashMap::new();
        for event in &self.log {
            if let Some(m) = event.sent_message() {
                send_ts.entry(m).or_insert(event.local_ts_ms);
            }
        }

        let mut heads = vec![0usize; streams.len()];
        let mut emitted_sends: HashSet<MessageId> = HashSet::new();
        let mut deferred: HashSet<usize> = HashSet::new();
        let mut merged = MergedTimeline {
            events: Vec::with_capacity(self.log.len()),
            ..MergedTimeline::default()
        };

        loop {
            let live: Vec<(usize, usize)> = heads
                .iter()
                .enumerate()
                .filter_map(|(r, &h)| streams[r].get(h).map(|&idx| (r, idx)))
                .collect();
            if live.is_empty() {
                break;
            }

            let blocked = |idx: usize| -> bool {
                match self.log[idx].received_message() {
                    Some(m) => send_ts.contains_key(&m) && !emitted_sends.contains(&m),
                    None => false,
                }
            };
            let order_key = |r: usize, idx: usize| (self.log[idx].local_ts_ms, r);

            let earliest = live
                .iter()
                .min_by_key(|&&(r, idx)| order_key(r, idx))
                .copied();
            let eligible = live
                .iter()
                .filter(|&&(_, idx)| !blocked(idx))
                .min_by_key(|&&(r, idx)| order_key(r, idx))
                .copied();

            if let Some((_, idx)) = earliest {
                if blocked(idx) {
                    deferred.insert(idx);
                }
            }

            let position = merged.events.len();
            let mut violated = false;
            let (stream, idx) = match (eligible, earliest) {
                (Some(pick), _) => pick,
                (None, Some(pick)) => {
                    let event = &self.log[pick.1];
                    let message = event.received_message().unwrap_or_default();
                    log::warn!(
                        "Causal cycle: {} receives message {} before it is sent; keeping timestamp order",
                        event,
                        message
                    );
                    merged.violations.push(CausalViolation {
                        peer: event.peer.clone(),
                        label: event.label.clone(),
                        message,
                        position,
                    });
                    violated = true;
                    pick
                }
                (None, None) => break,
            };

            let event = &self.log[idx];
            if let Some(m) = event.sent_message() {
                emitted_sends.insert(m);
            }
            if deferred.contains(&idx) && !violated {
                if let Some(m) = event.received_message() {
                    let correction = SkewCorrection {
                        peer: event.peer.clone(),
                        label: event.label.clone(),
                        message: m,
                        position,
                        receive_ts_ms: event.local_ts_ms,
                        send_ts_ms: send_ts.get(&m).copied().unwrap_or(event.local_ts_ms),
                    };
                    log::info!(
                        "Clock skew correction: '{}' on {} moved after send of message {} (apparent skew {}ms)",
                        correction.label,
                        correction.peer,
                        m,
                        correction.apparent_skew_ms()
                    );
                    merged.corrections.push(correction);
                }
            }

            merged.events.push(event.clone());
            heads[stream] += 1;
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(peer: &str, ts: u64, label: &str) -> TimelineEvent {
        TimelineEvent::new(
            PeerId::new(peer),
            Component::WebClient,
            EventCategory::Gathering,
            label,
            ts,
        )
    }

    fn labels(t: &MergedTimeline) -> Vec<&str> {
        t.events.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn test_interleaves_by_timestamp() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 10, "a1"));
        sync.record(ev("alice", 30, "a2"));
        sync.record(ev("bob", 20, "b1"));
        sync.record(ev("bob", 40, "b2"));

        let merged = sync.merge();
        assert_eq!(labels(&merged), vec!["a1", "b1", "a2", "b2"]);
        assert!(merged.corrections.is_empty());
    }

    #[test]
    fn test_stream_sorted_by_local_time_then_hint() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 50, "late"));
        sync.record(ev("alice", 10, "second").with_sequence(2));
        sync.record(ev("alice", 10, "first").with_sequence(1));

        assert_eq!(labels(&sync.merge()), vec!["first", "second", "late"]);
    }

    #[test]
    fn test_tie_broken_by_peer_first_appearance() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("bob", 10, "b"));
        sync.record(ev("alice", 10, "a"));

        assert_eq!(labels(&sync.merge()), vec!["b", "a"]);
    }

    #[test]
    fn test_receive_follows_send_despite_skew() {
        // Bob's clock trails Alice's by ~100ms
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 100, "gather"));
        sync.record(ev("alice", 150, "send offer").sent(1));
        sync.record(ev("alice", 160, "wait"));
        sync.record(ev("bob", 20, "bob starts"));
        sync.record(ev("bob", 60, "receive offer").received(1));
        sync.record(ev("bob", 70, "bob gathers"));

        let merged = sync.merge();
        let send = merged.position_of(SignalMark::Sent(1)).unwrap();
        let recv = merged.position_of(SignalMark::Received(1)).unwrap();
        assert!(send < recv);

        // Everything Alice did up to the send precedes the receive
        let gather = merged.events.iter().position(|e| e.label == "gather").unwrap();
        assert!(gather < recv);
        // Bob's later events stay after his receive
        let after = merged.events.iter().position(|e| e.label == "bob gathers").unwrap();
        assert!(recv < after);

        assert_eq!(merged.corrections.len(), 1);
        let correction = &merged.corrections[0];
        assert_eq!(correction.message, 1);
        assert_eq!(correction.position, recv);
        assert_eq!(correction.apparent_skew_ms(), 90);
        assert!(merged.violations.is_empty());
    }

    #[test]
    fn test_no_correction_when_clocks_agree() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 10, "send").sent(7));
        sync.record(ev("bob", 15, "recv").received(7));

        let merged = sync.merge();
        assert_eq!(labels(&merged), vec!["send", "recv"]);
        assert!(merged.corrections.is_empty());
    }

    #[test]
    fn test_round_trip_exchange() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 500, "send offer").sent(1));
        sync.record(ev("alice", 510, "receive answer").received(2));
        sync.record(ev("bob", 0, "receive offer").received(1));
        sync.record(ev("bob", 5, "send answer").sent(2));

        let merged = sync.merge();
        assert_eq!(
            labels(&merged),
            vec!["send offer", "receive offer", "send answer", "receive answer"]
        );
        assert_eq!(merged.corrections.len(), 1);
    }

    #[test]
    fn test_receive_without_recorded_send_is_unconstrained() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 50, "a"));
        sync.record(ev("bob", 10, "recv").received(99));

        let merged = sync.merge();
        assert_eq!(labels(&merged), vec!["recv", "a"]);
        assert!(merged.corrections.is_empty());
    }

    #[test]
    fn test_merge_idempotent_and_incremental() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 100, "send").sent(1));
        sync.record(ev("bob", 10, "recv").received(1));

        let first = sync.merge();
        assert_eq!(first, sync.merge());

        sync.record(ev("bob", 20, "more"));
        let second = sync.merge();
        assert_eq!(labels(&second), vec!["send", "recv", "more"]);
        assert_eq!(second, sync.merge());
    }

    #[test]
    fn test_causal_cycle_reported_not_hung() {
        // Each peer receives the other's message before sending its own
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 10, "a recv").received(2));
        sync.record(ev("alice", 20, "a send").sent(1));
        sync.record(ev("bob", 15, "b recv").received(1));
        sync.record(ev("bob", 25, "b send").sent(2));

        let merged = sync.merge();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.violations.len(), 1);
        assert_eq!(merged.violations[0].label, "a recv");
        assert_eq!(merged.violations[0].position, 0);
        assert_eq!(merged.corrections.len(), 1);
        assert_eq!(merged.corrections[0].label, "b recv");
    }

    #[test]
    fn test_recorder_sequences_events() {
        let mut recorder = PeerRecorder::with_clock_offset(PeerId::new("alice"), 1000);
        let a = recorder.event(Component::StunServer, EventCategory::Gathering, "probe");
        let b = recorder.event(Component::Signaling, EventCategory::Signaling, "send");

        assert!(a.local_ts_ms >= 1000);
        assert!(b.local_ts_ms >= a.local_ts_ms);
        assert_eq!(a.sequence_hint, 0);
        assert_eq!(b.sequence_hint, 1);
        assert_eq!(recorder.peer().as_str(), "alice");
    }

    #[test]
    fn test_huge_clock_offset_saturates() {
        let mut recorder = PeerRecorder::with_clock_offset(PeerId::new("alice"), u64::MAX);
        let event = recorder.event(Component::Signaling, EventCategory::Signaling, "send");

        assert_eq!(recorder.now_ms(), u64::MAX);
        assert_eq!(event.local_ts_ms, u64::MAX);
    }

    #[test]
    fn test_lines_use_configured_names() {
        let mut sync = TimelineSynchronizer::new();
        sync.record(ev("alice", 100, "send").sent(1));
        sync.record(ev("bob", 10, "recv").received(1));

        let names = ComponentNames {
            web_client: "Browser".to_string(),
            ..ComponentNames::default()
        };
        let lines = sync.merge().lines(&names);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Browser"));
        assert!(lines[1].contains("reordered after send"));
    }
}
