//! End-to-end tests against loopback STUN responders

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use path_inspector::config::InspectorConfig;
use path_inspector::nat::{ChangeRequest, NatDetector, NatType, StunProber, TraversalOutlook};
use path_inspector::session::{
    run_session, NatSource, PeerPlan, ReplayGatherer, SessionCapture, SessionOutcome,
};
use path_inspector::stun::{decode_binding_request, encode_binding_response, UdpStunProber};
use path_inspector::timeline::SignalMark;
use path_inspector::{Candidate, PathClass, PeerId, Side};

/// What the responder reports as the mapped address
#[derive(Clone, Copy)]
enum Mapping {
    /// The request's real source address
    Reflect,
    /// A fixed public address, as a NAT would produce
    Fixed(SocketAddr),
}

/// Where a responder sends its reply to a CHANGE-REQUEST from
#[derive(Clone, Copy, PartialEq)]
enum ChangeSource {
    /// A second socket with the requested port (and IP) changed
    Alternate,
    /// The queried socket itself, ignoring the request
    Same,
}

/// Minimal STUN responder on 127.0.0.1
///
/// Change-port replies leave from a second 127.0.0.1 socket. Change-IP
/// replies leave from 127.0.0.2, and go unanswered where that address
/// cannot be bound.
struct FakeStunServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeStunServer {
    fn start(mapping: Mapping) -> Self {
        Self::start_with(mapping, |_| true)
    }

    /// `answers_change` decides whether a CHANGE-REQUEST gets a response
    fn start_with(mapping: Mapping, answers_change: fn(ChangeRequest) -> bool) -> Self {
        Self::spawn(mapping, answers_change, ChangeSource::Alternate)
    }

    fn spawn(
        mapping: Mapping,
        answers_change: fn(ChangeRequest) -> bool,
        source: ChangeSource,
    ) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let other_port = UdpSocket::bind("127.0.0.1:0").unwrap();
        let other_ip = UdpSocket::bind("127.0.0.2:0").ok();
        let stop = Arc::new(AtomicBool::new(false));

        let flag = stop.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1500];
            while !flag.load(Ordering::Relaxed) {
                let (len, from) = match socket.recv_from(&mut buf) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let request = match decode_binding_request(&buf[..len]) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                let replier = match request.change {
                    Some(change) if !answers_change(change) => continue,
                    Some(_) if source == ChangeSource::Same => &socket,
                    Some(ChangeRequest::PortOnly) => &other_port,
                    Some(ChangeRequest::IpAndPort) => match &other_ip {
                        Some(s) => s,
                        None => continue,
                    },
                    None => &socket,
                };
                let mapped = match mapping {
                    Mapping::Reflect => from,
                    Mapping::Fixed(addr) => addr,
                };
                let response = encode_binding_response(&request.transaction_id, mapped);
                let _ = replier.send_to(&response, from);
            }
        });

        Self {
            addr,
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for FakeStunServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn public(addr: &str) -> Mapping {
    Mapping::Fixed(addr.parse().unwrap())
}

fn loopback_prober() -> UdpStunProber {
    UdpStunProber::bind("127.0.0.1:0".parse().unwrap()).unwrap()
}

fn test_config() -> InspectorConfig {
    let mut config = InspectorConfig::default();
    config.probe_timeout_ms = 200;
    config.gathering.offerer_ms = 500;
    config.gathering.answerer_ms = 300;
    config
}

fn detect(servers: &[&FakeStunServer], filtering: bool) -> path_inspector::NatAssessment {
    let mut prober = loopback_prober();
    let addrs: Vec<SocketAddr> = servers.iter().map(|s| s.addr).collect();
    NatDetector::new(PeerId::new("alice"), Duration::from_millis(200))
        .with_filtering_probe(filtering)
        .detect(&mut prober, &addrs)
}

#[test]
fn test_no_nat_when_mapping_matches_socket() {
    let server = FakeStunServer::start(Mapping::Reflect);
    let assessment = detect(&[&server], false);

    assert_eq!(assessment.nat_type, NatType::None);
    assert!(!assessment.has_nat);
    assert_eq!(assessment.public_address, Some(assessment.local_address));
}

#[test]
fn test_cone_nat_with_stable_mapping() {
    let a = FakeStunServer::start(public("203.0.113.4:6000"));
    let b = FakeStunServer::start(public("203.0.113.4:6000"));
    let assessment = detect(&[&a, &b], false);

    assert_eq!(assessment.nat_type, NatType::Cone);
    assert!(assessment.has_nat);
    assert_eq!(assessment.public_address, Some("203.0.113.4:6000".parse().unwrap()));
}

#[test]
fn test_symmetric_nat_with_per_destination_mapping() {
    let a = FakeStunServer::start(public("203.0.113.4:6000"));
    let b = FakeStunServer::start(public("203.0.113.4:6001"));
    let assessment = detect(&[&a, &b], false);

    assert_eq!(assessment.nat_type, NatType::Symmetric);
    assert!(assessment.describe().contains("203.0.113.4:6000"));
}

#[test]
fn test_filtering_probe_finds_restricted_cone() {
    fn port_only(change: ChangeRequest) -> bool {
        change == ChangeRequest::PortOnly
    }
    let a = FakeStunServer::start_with(public("203.0.113.4:6000"), port_only);
    let b = FakeStunServer::start(public("203.0.113.4:6000"));
    let assessment = detect(&[&a, &b], true);

    assert_eq!(assessment.nat_type, NatType::RestrictedCone);
}

#[test]
fn test_filtering_probe_finds_port_restricted_cone() {
    fn never(_: ChangeRequest) -> bool {
        false
    }
    let a = FakeStunServer::start_with(public("203.0.113.4:6000"), never);
    let b = FakeStunServer::start(public("203.0.113.4:6000"));
    let assessment = detect(&[&a, &b], true);

    assert_eq!(assessment.nat_type, NatType::PortRestrictedCone);
}

#[cfg(target_os = "linux")]
#[test]
fn test_filtering_probe_finds_full_cone() {
    let a = FakeStunServer::start(public("203.0.113.4:6000"));
    let b = FakeStunServer::start(public("203.0.113.4:6000"));
    let assessment = detect(&[&a, &b], true);

    assert_eq!(assessment.nat_type, NatType::FullCone);
}

#[test]
fn test_change_reply_from_queried_address_is_not_full_cone() {
    fn always(_: ChangeRequest) -> bool {
        true
    }
    let a = FakeStunServer::spawn(public("203.0.113.4:6000"), always, ChangeSource::Same);
    let b = FakeStunServer::start(public("203.0.113.4:6000"));
    let assessment = detect(&[&a, &b], true);

    assert_ne!(assessment.nat_type, NatType::FullCone);
    assert_eq!(assessment.nat_type, NatType::Cone);
    assert!(assessment.has_nat);
}

#[test]
fn test_silent_server_is_inconclusive() {
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut prober = loopback_prober();

    let assessment = NatDetector::new(PeerId::new("alice"), Duration::from_millis(100))
        .detect(&mut prober, &[silent.local_addr().unwrap()]);

    assert_eq!(assessment.nat_type, NatType::Unknown);
    assert!(assessment.has_nat);
    assert!(assessment.inconclusive_reason.is_some());
}

#[test]
fn test_prober_reuses_socket_across_probes() {
    let server = FakeStunServer::start(Mapping::Reflect);
    let mut prober = loopback_prober();
    let local = prober.local_addr();

    for _ in 0..3 {
        let mapped = prober
            .binding_request(server.addr, Duration::from_millis(200))
            .unwrap();
        assert_eq!(mapped, local);
    }
}

#[test]
fn test_live_session_through_nats() {
    let alice_a = FakeStunServer::start(public("203.0.113.4:6000"));
    let alice_b = FakeStunServer::start(public("203.0.113.4:6000"));
    let bob_a = FakeStunServer::start(public("198.51.100.7:7000"));
    let bob_b = FakeStunServer::start(public("198.51.100.7:7001"));

    let cand = |peer: &str, raw: &str| {
        Candidate::from_sdp_attribute(PeerId::new(peer), Side::Local, raw).unwrap()
    };

    let alice = PeerPlan::new(PeerId::new("alice"))
        .with_nat(NatSource::Probe {
            prober: Box::new(loopback_prober()),
            servers: vec![alice_a.addr, alice_b.addr],
        })
        .with_gatherer(
            ReplayGatherer::new("alice")
                .at(Duration::ZERO, cand("alice", "candidate:1 1 udp 2122260223 10.0.0.5 5000 typ host"))
                .at(
                    Duration::from_millis(50),
                    cand("alice", "candidate:2 1 udp 1686052607 203.0.113.4 6000 typ srflx raddr 10.0.0.5 rport 5000"),
                ),
        )
        .with_stats(
            r#"{
                "T1": { "type": "transport", "selectedCandidatePairId": "CP2" },
                "CP1": { "type": "candidate-pair", "id": "CP1", "localCandidateId": "L1",
                         "remoteCandidateId": "R1", "state": "failed" },
                "CP2": { "type": "candidate-pair", "id": "CP2", "localCandidateId": "L2",
                         "remoteCandidateId": "R2", "state": "succeeded" },
                "L1": { "type": "local-candidate", "id": "L1", "candidateType": "host",
                        "address": "10.0.0.5", "port": 5000 },
                "L2": { "type": "local-candidate", "id": "L2", "candidateType": "srflx",
                        "address": "203.0.113.4", "port": 6000 },
                "R1": { "type": "remote-candidate", "id": "R1", "candidateType": "host",
                        "address": "10.1.0.9", "port": 5000 },
                "R2": { "type": "remote-candidate", "id": "R2", "candidateType": "srflx",
                        "address": "198.51.100.7", "port": 7000 }
            }"#,
        )
        .with_connection_states(vec![
            path_inspector::IceConnectionState::Checking,
            path_inspector::IceConnectionState::Connected,
        ]);

    let bob = PeerPlan::new(PeerId::new("bob"))
        .with_nat(NatSource::Probe {
            prober: Box::new(loopback_prober()),
            servers: vec![bob_a.addr, bob_b.addr],
        })
        .with_gatherer(
            ReplayGatherer::new("bob")
                .at(Duration::ZERO, cand("bob", "candidate:1 1 udp 2122260223 10.1.0.9 5000 typ host"))
                .at(
                    Duration::from_millis(30),
                    cand("bob", "candidate:2 1 udp 1686052607 198.51.100.7 7000 typ srflx raddr 10.1.0.9 rport 5000"),
                ),
        )
        .with_clock_offset(3_000);

    let report = run_session(&test_config(), alice, bob).unwrap();

    assert_eq!(report.verdict.class, PathClass::StunAssisted);
    assert_eq!(report.outcome, SessionOutcome::Connected(PathClass::StunAssisted));
    assert_eq!(report.outlook, Some(TraversalOutlook::Possible));
    assert_eq!(report.peers[0].nat.as_ref().map(|n| n.nat_type), Some(NatType::Cone));
    assert_eq!(report.peers[1].nat.as_ref().map(|n| n.nat_type), Some(NatType::Symmetric));

    // The answerer's clock is ahead; the answer's receive still follows its send
    let timeline = &report.timeline;
    let answer_sent = timeline.position_of(SignalMark::Sent(2)).unwrap();
    let answer_received = timeline.position_of(SignalMark::Received(2)).unwrap();
    assert!(answer_sent < answer_received);
    assert!(timeline.violations.is_empty());

    let rendered = report.to_string();
    assert!(rendered.contains("stunAssisted"));
    assert!(rendered.contains("Traversal outlook: possible"));
}

#[test]
fn test_explain_capture_from_disk() {
    let capture = r#"{
        "offerer": {
            "peer": "alice",
            "candidates": [
                { "at_ms": 0, "candidate": "candidate:1 1 udp 2122260223 10.0.0.5 5000 typ host" }
            ],
            "stats": [
                { "id": "CP1", "type": "candidate-pair", "localCandidateId": "L1",
                  "remoteCandidateId": "R1", "state": "succeeded", "selected": true },
                { "id": "L1", "type": "local-candidate", "candidateType": "host",
                  "address": "10.0.0.5", "port": 5000 },
                { "id": "R1", "type": "remote-candidate", "candidateType": "relay",
                  "address": "198.51.100.2", "port": 3478 }
            ]
        },
        "answerer": {
            "peer": "bob",
            "candidates": [
                { "at_ms": 0, "candidate": "candidate:1 1 udp 2122260223 10.1.0.9 5000 typ host" }
            ]
        }
    }"#;

    let name = format!("path-inspector-capture-{}.json", std::process::id());
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, capture).unwrap();
    let loaded = SessionCapture::load(&path);
    let _ = std::fs::remove_file(&path);

    let (alice, bob) = loaded.unwrap().into_plans().unwrap();
    let report = run_session(&test_config(), alice, bob).unwrap();

    // Bob never offered a relay candidate, so the selected pair cannot be explained
    assert_eq!(report.verdict.class, PathClass::None);
    assert!(matches!(report.outcome, SessionOutcome::Failed(_)));
    assert!(report.verdict.explanation.contains("198.51.100.2:3478"));
}
