//! WebRTC Connection Path Inspector
//!
//! Explains why a two-peer WebRTC session ended up direct, STUN-assisted,
//! relayed, or without a path at all:
//! - Classifies the NAT in front of each peer with STUN binding probes
//! - Collects ICE candidates concurrently under per-role deadlines
//! - Exchanges offer/answer handshakes through an in-process signaling relay
//! - Merges both peers' event logs into one causally ordered timeline
//! - Classifies the selected candidate pair and names the gap when there is none
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Path Inspector Modules                     │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                                │
//! │  candidate.rs  - Candidates, transport addresses, priorities  │
//! │  pair.rs       - Candidate pairs and the selected pair        │
//! │  collector.rs  - Deadline-bounded candidate collection        │
//! │  stun.rs       - STUN codec and the mio UDP prober            │
//! │  nat.rs        - NAT classification and traversal outlook     │
//! │  handshake.rs  - Framed offer/answer messages                 │
//! │  stats.rs      - getStats report interpretation               │
//! │  state.rs      - ICE gathering/connection state tracking      │
//! │  timeline.rs   - Per-peer recording and causal merge          │
//! │  classifier.rs - Path classification                          │
//! │  session.rs    - Two-peer session run and report              │
//! │  config.rs     - Inspector configuration                      │
//! │                                                                │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod candidate;
pub mod classifier;
pub mod collector;
pub mod config;
pub mod handshake;
pub mod nat;
pub mod pair;
pub mod session;
pub mod state;
pub mod stats;
pub mod stun;
pub mod timeline;

// Re-export commonly used types
pub use candidate::{Candidate, CandidateType, PeerId, Side, TransportAddress, TransportProtocol};
pub use classifier::{
    classify, classify_report, with_relay_context, GapReason, PathClass, PathVerdict,
};
pub use collector::{CandidateCollector, CandidateSet, FreezeReason, GatheringRole};
pub use config::{ComponentNames, ConfigError, InspectorConfig};
pub use handshake::{HandshakeError, HandshakeKind, HandshakeMessage};
pub use nat::{
    predict_traversal, NatAssessment, NatCategory, NatDetector, NatType, StunProber,
    TraversalOutlook,
};
pub use pair::{CandidatePair, PairState};
pub use session::{
    run_session, CandidateGatherer, NatSource, PeerPlan, ReplayGatherer, SessionCapture,
    SessionOutcome, SessionReport,
};
pub use state::{GatheringState, IceConnectionState, StateTracker};
pub use stats::interpret_stats;
pub use stun::UdpStunProber;
pub use timeline::{
    Component, EventCategory, MergedTimeline, PeerRecorder, TimelineEvent, TimelineSynchronizer,
};
