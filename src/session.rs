//! Two-peer session assembly
//!
//! Each peer runs on its own thread and shares nothing with the other; the
//! only coupling is the signaling channel carrying encoded handshakes.
//!
//! ```text
//! Offerer thread                         Answerer thread
//!   NAT detection ┐                        wait for offer
//!   gathering     ┴─ join                  NAT detection ┐
//!   send offer ─────────────────────────►  gathering     ┴─ join
//!   wait for answer ◄────────────────────  send answer
//!   states, stats                          states, stats
//! ```
//!
//! Within a peer, NAT detection runs on a scoped thread while the collector
//! drains candidates from detached gatherer threads; both finish before the
//! outgoing handshake is built. The report is assembled once both peer
//! threads have returned.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crate::candidate::{Candidate, CandidateParseError, CandidateType, PeerId, Side};
use crate::classifier::{classify_report, with_relay_context, PathClass, PathVerdict};
use crate::collector::{CandidateCollector, CandidateSet, FreezeReason, GatheringRole};
use crate::config::{ComponentNames, InspectorConfig};
use crate::handshake::{generate_session_id, HandshakeError, HandshakeKind, HandshakeMessage};
use crate::nat::{predict_traversal, NatAssessment, NatDetector, StunProber, TraversalOutlook};
use crate::pair::{selected_pair, CandidatePair};
use crate::state::{GatheringState, IceConnectionState, StateTracker};
use crate::stats::interpret_stats;
use crate::timeline::{
    Component, EventCategory, MergedTimeline, MessageId, PeerRecorder, TimelineEvent,
    TimelineSynchronizer,
};

/// Message id of the offer within a session
pub const OFFER_MESSAGE_ID: MessageId = 1;

/// Message id of the answer within a session
pub const ANSWER_MESSAGE_ID: MessageId = 2;

/// Slack added to the signaling wait on top of gathering and probe budgets
const SIGNALING_SLACK_MS: u64 = 1000;

// ============================================================================
// Inputs
// ============================================================================

/// Discovers local candidates and reports each one as soon as it is found
pub trait CandidateGatherer: Send {
    fn name(&self) -> &str;

    /// Send candidates into `sink`; return when there is nothing left
    ///
    /// A failed send means gathering was frozen and the gatherer should stop.
    fn gather(self: Box<Self>, sink: Sender<Candidate>);
}

/// Replays candidates at fixed offsets from the start of gathering
#[derive(Debug, Clone)]
pub struct ReplayGatherer {
    name: String,
    items: Vec<(Duration, Candidate)>,
}

impl ReplayGatherer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn at(mut self, offset: Duration, candidate: Candidate) -> Self {
        self.items.push((offset, candidate));
        self.items.sort_by_key(|(offset, _)| *offset);
        self
    }
}

impl CandidateGatherer for ReplayGatherer {
    fn name(&self) -> &str {
        &self.name
    }

    fn gather(self: Box<Self>, sink: Sender<Candidate>) {
        let ReplayGatherer { name, items } = *self;
        let start = Instant::now();
        for (offset, candidate) in items {
            if let Some(wait) = offset.checked_sub(start.elapsed()) {
                thread::sleep(wait);
            }
            if sink.send(candidate).is_err() {
                log::debug!("Gatherer {} stopped: gathering already frozen", name);
                return;
            }
        }
    }
}

/// Where a peer's NAT assessment comes from
pub enum NatSource {
    /// Run live detection from the prober's socket
    Probe {
        prober: Box<dyn StunProber + Send>,
        servers: Vec<SocketAddr>,
    },
    /// Use an assessment captured earlier
    Recorded(NatAssessment),
    Disabled,
}

/// Everything one peer contributes to a session
pub struct PeerPlan {
    pub peer: PeerId,
    pub sdp: String,
    pub nat: NatSource,
    pub gatherers: Vec<Box<dyn CandidateGatherer>>,
    /// getStats-like report delivered after connectivity checks
    pub stats_json: Option<String>,
    /// Connection states reported by the media engine, in order
    pub connection_states: Vec<IceConnectionState>,
    pub clock_offset_ms: u64,
}

impl PeerPlan {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            sdp: String::new(),
            nat: NatSource::Disabled,
            gatherers: Vec::new(),
            stats_json: None,
            connection_states: Vec::new(),
            clock_offset_ms: 0,
        }
    }

    pub fn with_sdp(mut self, sdp: impl Into<String>) -> Self {
        self.sdp = sdp.into();
        self
    }

    pub fn with_nat(mut self, nat: NatSource) -> Self {
        self.nat = nat;
        self
    }

    pub fn with_gatherer(mut self, gatherer: impl CandidateGatherer + 'static) -> Self {
        self.gatherers.push(Box::new(gatherer));
        self
    }

    pub fn with_stats(mut self, json: impl Into<String>) -> Self {
        self.stats_json = Some(json.into());
        self
    }

    pub fn with_connection_states(mut self, states: Vec<IceConnectionState>) -> Self {
        self.connection_states = states;
        self
    }

    pub fn with_clock_offset(mut self, offset_ms: u64) -> Self {
        self.clock_offset_ms = offset_ms;
        self
    }
}

// ============================================================================
// Report
// ============================================================================

/// Everything known about one peer once the session ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReport {
    pub peer: PeerId,
    pub role: GatheringRole,
    pub nat: Option<NatAssessment>,
    pub local: CandidateSet,
    pub remote: CandidateSet,
    pub pairs: Vec<CandidatePair>,
    pub verdict: PathVerdict,
    pub connection: IceConnectionState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    Connected(PathClass),
    /// Carries a user-facing reason
    Failed(String),
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOutcome::Connected(class) => write!(f, "connected ({})", class),
            SessionOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Read-only snapshot handed to the display layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: u64,
    pub timeline: MergedTimeline,
    /// Offerer first, then answerer
    pub peers: Vec<PeerReport>,
    /// The offerer's verdict
    pub verdict: PathVerdict,
    pub outcome: SessionOutcome,
    pub outlook: Option<TraversalOutlook>,
}

impl SessionReport {
    pub fn peer(&self, peer: &PeerId) -> Option<&PeerReport> {
        self.peers.iter().find(|p| &p.peer == peer)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Multi-line summary using the configured component names
    pub fn render(&self, names: &ComponentNames) -> String {
        let mut out = Vec::new();
        out.push(format!("Session {:016x}: {}", self.session_id, self.outcome));
        out.push(format!("Path {}", self.verdict));
        if let Some(outlook) = self.outlook {
            out.push(format!("Traversal outlook: {}", outlook));
        }

        for p in &self.peers {
            let nat = p
                .nat
                .as_ref()
                .map(|n| n.describe())
                .unwrap_or_else(|| "NAT not assessed".to_string());
            out.push(format!(
                "{} ({}): {}; {} local candidate(s) (gathering {}), {} remote; ICE {}",
                p.peer,
                p.role,
                nat,
                p.local.len(),
                p.local.reason(),
                p.remote.len(),
                p.connection
            ));
        }

        out.push("Timeline:".to_string());
        out.extend(self.timeline.lines(names).into_iter().map(|l| format!("  {}", l)));
        out.join("\n")
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&ComponentNames::default()))
    }
}

// ============================================================================
// Session Run
// ============================================================================

/// Run both peers concurrently and assemble the report
pub fn run_session(
    config: &InspectorConfig,
    offerer: PeerPlan,
    answerer: PeerPlan,
) -> Result<SessionReport, SessionError> {
    let session_id = generate_session_id().map_err(SessionError::Handshake)?;
    log::info!(
        "Session {:016x}: {} offers to {}",
        session_id,
        offerer.peer,
        answerer.peer
    );

    let offerer_id = offerer.peer.clone();
    let answerer_id = answerer.peer.clone();
    let (to_answerer, answerer_inbox) = mpsc::channel::<Vec<u8>>();
    let (to_offerer, offerer_inbox) = mpsc::channel::<Vec<u8>>();

    let (offer_side, answer_side) = thread::scope(|s| {
        let (offerer_ref, answerer_ref) = (&offerer_id, &answerer_id);
        let o = s.spawn(move || {
            run_peer(
                config,
                session_id,
                GatheringRole::Offerer,
                offerer,
                answerer_ref,
                to_answerer,
                offerer_inbox,
            )
        });
        let a = s.spawn(move || {
            run_peer(
                config,
                session_id,
                GatheringRole::Answerer,
                answerer,
                offerer_ref,
                to_offerer,
                answerer_inbox,
            )
        });
        (o.join(), a.join())
    });

    let offer_side = offer_side.map_err(|_| SessionError::PeerFailed(offerer_id))?;
    let answer_side = answer_side.map_err(|_| SessionError::PeerFailed(answerer_id))?;

    let mut sync = TimelineSynchronizer::new();
    for event in offer_side.events.iter().chain(answer_side.events.iter()) {
        sync.record(event.clone());
    }
    let timeline = sync.merge();

    let peers = vec![
        offer_side.into_report(&config.turn_servers),
        answer_side.into_report(&config.turn_servers),
    ];
    let verdict = peers[0].verdict.clone();
    let outlook = match (&peers[0].nat, &peers[1].nat) {
        (Some(a), Some(b)) => Some(predict_traversal(a, b)),
        _ => None,
    };
    let outcome = session_outcome(&peers, &verdict);
    log::info!("Session {:016x} {}", session_id, outcome);

    Ok(SessionReport {
        session_id,
        timeline,
        peers,
        verdict,
        outcome,
        outlook,
    })
}

/// How long a peer waits for the other side's handshake
pub fn signaling_wait(config: &InspectorConfig) -> Duration {
    // Worst case: the other side gathers for its full budget and runs every probe
    Duration::from_millis(
        config.gathering.offerer_ms
            + config.gathering.answerer_ms
            + 4 * config.probe_timeout_ms
            + SIGNALING_SLACK_MS,
    )
}

fn session_outcome(peers: &[PeerReport], verdict: &PathVerdict) -> SessionOutcome {
    if let Some(p) = peers.iter().find(|p| p.connection.is_terminal_failure()) {
        return SessionOutcome::Failed(format!("ICE connection {} on {}", p.connection, p.peer));
    }
    if verdict.is_usable() {
        SessionOutcome::Connected(verdict.class)
    } else {
        SessionOutcome::Failed(verdict.explanation.clone())
    }
}

struct PeerRun {
    peer: PeerId,
    role: GatheringRole,
    nat: Option<NatAssessment>,
    local: CandidateSet,
    remote: CandidateSet,
    pairs: Vec<CandidatePair>,
    connection: IceConnectionState,
    events: Vec<TimelineEvent>,
}

impl PeerRun {
    fn into_report(self, turn_servers: &[String]) -> PeerReport {
        let verdict = classify_report(&self.pairs, &self.local, &self.remote);
        let verdict = with_relay_context(verdict, turn_servers, &self.local, &self.remote);
        log::info!("Path for {}: {}", self.peer, verdict);
        PeerReport {
            peer: self.peer,
            role: self.role,
            nat: self.nat,
            local: self.local,
            remote: self.remote,
            pairs: self.pairs,
            verdict,
            connection: self.connection,
        }
    }
}

fn run_peer(
    config: &InspectorConfig,
    session_id: u64,
    role: GatheringRole,
    plan: PeerPlan,
    remote_peer: &PeerId,
    outbox: Sender<Vec<u8>>,
    inbox: Receiver<Vec<u8>>,
) -> PeerRun {
    let PeerPlan {
        peer,
        sdp,
        nat,
        gatherers,
        stats_json,
        connection_states,
        clock_offset_ms,
    } = plan;

    let mut recorder = PeerRecorder::with_clock_offset(peer.clone(), clock_offset_ms);
    let mut tracker = StateTracker::new(peer.clone());
    let mut events = Vec::new();
    let wait = signaling_wait(config);

    events.push(recorder.event(
        Component::WebClient,
        EventCategory::ConnectionState,
        format!("Peer connection created as {}", role),
    ));

    let (kind, message_id, expected) = match role {
        GatheringRole::Offerer => (HandshakeKind::Offer, OFFER_MESSAGE_ID, HandshakeKind::Answer),
        GatheringRole::Answerer => (HandshakeKind::Answer, ANSWER_MESSAGE_ID, HandshakeKind::Offer),
    };

    let mut received = None;
    if role == GatheringRole::Answerer {
        received = receive_handshake(
            &peer,
            &inbox,
            wait,
            session_id,
            expected,
            &mut recorder,
            &mut events,
        );
    }

    let (local, nat) = gather_and_detect(
        config,
        &peer,
        role,
        nat,
        gatherers,
        &mut recorder,
        &mut tracker,
        &mut events,
    );

    let message = HandshakeMessage {
        kind,
        session_id,
        message_id,
        from: peer.clone(),
        sdp,
        candidates: local.clone(),
        nat: nat.clone(),
    };
    match message.encode() {
        Ok(bytes) => {
            events.push(
                recorder
                    .event(
                        Component::Signaling,
                        EventCategory::Signaling,
                        format!("Send {} with {} candidate(s)", kind, local.len()),
                    )
                    .sent(message_id),
            );
            if outbox.send(bytes).is_err() {
                log::warn!("{}: {} undeliverable, {} has gone away", peer, kind, remote_peer);
            }
        }
        Err(e) => log::warn!("{}: cannot encode {}: {}", peer, kind, e),
    }
    drop(outbox);

    if role == GatheringRole::Offerer {
        received = receive_handshake(
            &peer,
            &inbox,
            wait,
            session_id,
            expected,
            &mut recorder,
            &mut events,
        );
    }
    let remote = remote_set(&peer, received.as_ref(), wait);

    for state in connection_states {
        match tracker.connection_changed(state, &mut recorder) {
            Ok(event) => events.push(event),
            Err(e) => log::warn!("{}: {}", peer, e),
        }
    }

    let pairs = match stats_json {
        Some(json) => interpret_stats(&peer, remote_peer, &json).unwrap_or_else(|e| {
            log::warn!("{}: ignoring stats report: {}", peer, e);
            Vec::new()
        }),
        None => Vec::new(),
    };
    if let Ok(Some(pair)) = selected_pair(&pairs) {
        events.push(recorder.event(
            Component::MediaServer,
            EventCategory::ConnectionState,
            format!("Selected pair {}", pair),
        ));
    }

    PeerRun {
        peer,
        role,
        nat,
        local,
        remote,
        pairs,
        connection: tracker.connection(),
        events,
    }
}

/// NAT detection still running, or already known
enum PendingNat<'scope> {
    Probe(ScopedJoinHandle<'scope, NatAssessment>),
    Ready(Option<NatAssessment>),
}

#[allow(clippy::too_many_arguments)]
fn gather_and_detect(
    config: &InspectorConfig,
    peer: &PeerId,
    role: GatheringRole,
    nat: NatSource,
    gatherers: Vec<Box<dyn CandidateGatherer>>,
    recorder: &mut PeerRecorder,
    tracker: &mut StateTracker,
    events: &mut Vec<TimelineEvent>,
) -> (CandidateSet, Option<NatAssessment>) {
    if let Ok(event) = tracker.gathering_changed(GatheringState::Gathering, recorder) {
        events.push(event);
    }

    let (tx, rx) = mpsc::channel();
    for gatherer in gatherers {
        let tx = tx.clone();
        let name = gatherer.name().to_string();
        // Detached: a gatherer outliving the deadline must not hold up the freeze
        let spawned = thread::Builder::new()
            .name(format!("gather-{}", name))
            .spawn(move || gatherer.gather(tx));
        if let Err(e) = spawned {
            log::warn!("{}: cannot start gatherer {}: {}", peer, name, e);
        }
    }
    drop(tx);

    let mut collector =
        CandidateCollector::start(peer.clone(), Side::Local, config.gathering.for_role(role));
    let detector = NatDetector::from_config(peer.clone(), config);

    let (local, nat) = thread::scope(|s| {
        let pending = match nat {
            NatSource::Probe {
                mut prober,
                servers,
            } => {
                let targets: Vec<String> = servers.iter().map(|a| a.to_string()).collect();
                events.push(recorder.event(
                    Component::StunServer,
                    EventCategory::Gathering,
                    format!("STUN binding probes to {}", targets.join(", ")),
                ));
                PendingNat::Probe(s.spawn(move || detector.detect(prober.as_mut(), &servers)))
            }
            NatSource::Recorded(assessment) => PendingNat::Ready(Some(assessment)),
            NatSource::Disabled => PendingNat::Ready(None),
        };

        let local = collector.drain_with(&rx, |c| {
            events.push(recorder.event(
                component_for(c.candidate_type),
                EventCategory::Gathering,
                format!("Gathered {} candidate {}", c.candidate_type, c.address),
            ));
        });

        let nat = match pending {
            PendingNat::Probe(handle) => match handle.join() {
                Ok(assessment) => Some(assessment),
                Err(_) => {
                    log::warn!("{}: NAT detection thread failed", peer);
                    None
                }
            },
            PendingNat::Ready(assessment) => assessment,
        };
        (local, nat)
    });

    if local.reason() == FreezeReason::Timeout {
        events.push(recorder.event(
            Component::WebClient,
            EventCategory::Gathering,
            format!("Gathering timed out with {} candidate(s)", local.len()),
        ));
    }
    if let Ok(event) = tracker.gathering_changed(GatheringState::Complete, recorder) {
        events.push(event);
    }
    if let Some(assessment) = &nat {
        events.push(recorder.event(
            Component::StunServer,
            EventCategory::Gathering,
            format!("NAT {}", assessment.describe()),
        ));
    }

    (local, nat)
}

fn receive_handshake(
    peer: &PeerId,
    inbox: &Receiver<Vec<u8>>,
    wait: Duration,
    session_id: u64,
    expected: HandshakeKind,
    recorder: &mut PeerRecorder,
    events: &mut Vec<TimelineEvent>,
) -> Option<HandshakeMessage> {
    let bytes = match inbox.recv_timeout(wait) {
        Ok(bytes) => bytes,
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("{}: no {} within {:?}", peer, expected, wait);
            return None;
        }
        Err(RecvTimeoutError::Disconnected) => {
            log::warn!("{}: signaling closed before {} arrived", peer, expected);
            return None;
        }
    };

    let msg = match HandshakeMessage::decode(&bytes) {
        Ok((msg, _)) => msg,
        Err(e) => {
            log::warn!("{}: dropping {}: {}", peer, expected, e);
            return None;
        }
    };
    if msg.kind != expected || msg.session_id != session_id {
        log::warn!(
            "{}: expected {} for session {:016x}, got {} for {:016x}",
            peer,
            expected,
            session_id,
            msg.kind,
            msg.session_id
        );
        return None;
    }

    events.push(
        recorder
            .event(
                Component::Signaling,
                EventCategory::Signaling,
                format!(
                    "Receive {} from {} with {} candidate(s)",
                    msg.kind,
                    msg.from,
                    msg.candidates.len()
                ),
            )
            .received(msg.message_id),
    );
    Some(msg)
}

/// Freeze the other peer's candidates as this peer's remote set
fn remote_set(peer: &PeerId, msg: Option<&HandshakeMessage>, budget: Duration) -> CandidateSet {
    let mut collector = CandidateCollector::start(peer.clone(), Side::Remote, budget);
    match msg {
        Some(msg) => {
            for candidate in msg.remote_candidates() {
                // Duplicates are logged by the collector
                let _ = collector.add(candidate);
            }
            collector.freeze(FreezeReason::Completed)
        }
        None => collector.freeze(FreezeReason::Timeout),
    }
}

fn component_for(candidate_type: CandidateType) -> Component {
    match candidate_type {
        CandidateType::Host => Component::WebClient,
        CandidateType::ServerReflexive => Component::StunServer,
        CandidateType::Relay => Component::TurnServer,
    }
}

// ============================================================================
// Captures
// ============================================================================

/// One peer's side of a recorded session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapture {
    pub peer: PeerId,
    #[serde(default)]
    pub sdp: String,
    #[serde(default)]
    pub nat: Option<NatAssessment>,
    /// SDP candidate attributes with their discovery offsets
    #[serde(default)]
    pub candidates: Vec<CapturedCandidate>,
    /// getStats-like report, kept as raw JSON
    #[serde(default)]
    pub stats: Option<serde_json::Value>,
    #[serde(default)]
    pub connection_states: Vec<IceConnectionState>,
    #[serde(default)]
    pub clock_offset_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedCandidate {
    pub at_ms: u64,
    pub candidate: String,
}

/// A recorded two-peer session that can be replayed and explained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCapture {
    pub offerer: PeerCapture,
    pub answerer: PeerCapture,
}

impl SessionCapture {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, CaptureError> {
        serde_json::from_str(text).map_err(|e| CaptureError::Parse(e.to_string()))
    }

    /// Turn the capture into replayable peer plans
    pub fn into_plans(self) -> Result<(PeerPlan, PeerPlan), CaptureError> {
        Ok((plan_from_capture(self.offerer)?, plan_from_capture(self.answerer)?))
    }
}

fn plan_from_capture(capture: PeerCapture) -> Result<PeerPlan, CaptureError> {
    let mut gatherer = ReplayGatherer::new(format!("{}-replay", capture.peer));
    for item in &capture.candidates {
        let candidate =
            Candidate::from_sdp_attribute(capture.peer.clone(), Side::Local, &item.candidate)
                .map_err(|e| CaptureError::Candidate(capture.peer.clone(), e))?;
        gatherer = gatherer.at(Duration::from_millis(item.at_ms), candidate);
    }

    let nat = match capture.nat {
        Some(assessment) => NatSource::Recorded(assessment),
        None => NatSource::Disabled,
    };

    let mut plan = PeerPlan::new(capture.peer)
        .with_sdp(capture.sdp)
        .with_nat(nat)
        .with_gatherer(gatherer)
        .with_connection_states(capture.connection_states)
        .with_clock_offset(capture.clock_offset_ms);
    if let Some(stats) = capture.stats {
        plan = plan.with_stats(stats.to_string());
    }
    Ok(plan)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    Handshake(HandshakeError),
    /// A peer thread ended abnormally
    PeerFailed(PeerId),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Handshake(e) => write!(f, "{}", e),
            SessionError::PeerFailed(peer) => write!(f, "peer {} ended abnormally", peer),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    Io(String),
    Parse(String),
    Candidate(PeerId, CandidateParseError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Io(e) => write!(f, "cannot read capture: {}", e),
            CaptureError::Parse(e) => write!(f, "cannot parse capture: {}", e),
            CaptureError::Candidate(peer, e) => write!(f, "bad candidate for {}: {}", peer, e),
        }
    }
}

impl std::error::Error for CaptureError {}
