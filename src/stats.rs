//! Interpretation of a media-engine stats report
//!
//! The report is a getStats-like JSON document: an array (or an id-keyed
//! object) of entries tagged by `type`. Only `candidate-pair`,
//! `local-candidate`, `remote-candidate` and `transport` entries matter.
//!
//! ```json
//! [
//!   { "id": "CP1", "type": "candidate-pair", "localCandidateId": "L1",
//!     "remoteCandidateId": "R1", "state": "succeeded", "nominated": true },
//!   { "id": "L1", "type": "local-candidate", "candidateType": "host",
//!     "address": "192.168.1.5", "port": 5000, "protocol": "udp" },
//!   { "id": "T1", "type": "transport", "selectedCandidatePairId": "CP1" }
//! ]
//! ```
//!
//! Selection is taken as reported, either from a pair's `selected` flag or
//! from the transport's `selectedCandidatePairId`.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::candidate::{Candidate, CandidateType, PeerId, Side, TransportProtocol};
use crate::pair::{selected_pair, CandidatePair, PairState, SelectionError};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum StatsEntry {
    CandidatePair(PairEntry),
    LocalCandidate(CandidateEntry),
    RemoteCandidate(CandidateEntry),
    Transport(TransportEntry),
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairEntry {
    id: String,
    local_candidate_id: String,
    remote_candidate_id: String,
    state: String,
    #[serde(default)]
    selected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CandidateEntry {
    id: String,
    candidate_type: String,
    /// Chrome sends both `address` and the older `ip`; `address` wins
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    port: u16,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    priority: Option<u32>,
    #[serde(default)]
    foundation: Option<String>,
    #[serde(default)]
    related_address: Option<String>,
    #[serde(default)]
    related_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportEntry {
    #[serde(default)]
    selected_candidate_pair_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatsDocument {
    List(Vec<StatsEntry>),
    Keyed(HashMap<String, StatsEntry>),
}

/// Convert a stats report into candidate pairs from `owner`'s point of view
///
/// Candidates of types outside host/srflx/relay (peer-reflexive) and
/// unresolved hostnames are skipped along with their pairs.
pub fn interpret_stats(
    owner: &PeerId,
    remote: &PeerId,
    json: &str,
) -> Result<Vec<CandidatePair>, StatsError> {
    let document: StatsDocument =
        serde_json::from_str(json).map_err(|e| StatsError::Parse(e.to_string()))?;
    let entries: Vec<StatsEntry> = match document {
        StatsDocument::List(entries) => entries,
        StatsDocument::Keyed(map) => {
            // Keyed documents carry no order; sort by id for stable output
            let mut items: Vec<(String, StatsEntry)> = map.into_iter().collect();
            items.sort_by(|a, b| a.0.cmp(&b.0));
            items.into_iter().map(|(_, entry)| entry).collect()
        }
    };

    let mut pair_entries = Vec::new();
    let mut locals: HashMap<String, CandidateEntry> = HashMap::new();
    let mut remotes: HashMap<String, CandidateEntry> = HashMap::new();
    let mut transport_selected: Option<String> = None;

    for entry in entries {
        match entry {
            StatsEntry::CandidatePair(p) => pair_entries.push(p),
            StatsEntry::LocalCandidate(c) => {
                locals.insert(c.id.clone(), c);
            }
            StatsEntry::RemoteCandidate(c) => {
                remotes.insert(c.id.clone(), c);
            }
            StatsEntry::Transport(t) => {
                if t.selected_candidate_pair_id.is_some() {
                    transport_selected = t.selected_candidate_pair_id;
                }
            }
            StatsEntry::Other => {}
        }
    }

    let mut pairs = Vec::with_capacity(pair_entries.len());
    for entry in &pair_entries {
        let local_entry = locals.get(&entry.local_candidate_id).ok_or_else(|| {
            StatsError::UnknownCandidate {
                pair: entry.id.clone(),
                candidate: entry.local_candidate_id.clone(),
            }
        })?;
        let remote_entry = remotes.get(&entry.remote_candidate_id).ok_or_else(|| {
            StatsError::UnknownCandidate {
                pair: entry.id.clone(),
                candidate: entry.remote_candidate_id.clone(),
            }
        })?;

        let local = match to_candidate(owner, Side::Local, local_entry) {
            Ok(c) => c,
            Err(reason) => {
                log::warn!(
                    "Skipping pair {}: local candidate {}: {}",
                    entry.id,
                    local_entry.id,
                    reason
                );
                continue;
            }
        };
        let remote_candidate = match to_candidate(remote, Side::Remote, remote_entry) {
            Ok(c) => c,
            Err(reason) => {
                log::warn!(
                    "Skipping pair {}: remote candidate {}: {}",
                    entry.id,
                    remote_entry.id,
                    reason
                );
                continue;
            }
        };

        let state = parse_pair_state(&entry.state).ok_or_else(|| StatsError::InvalidField {
            id: entry.id.clone(),
            field: "state",
            value: entry.state.clone(),
        })?;

        let mut pair = CandidatePair::new(local, remote_candidate, state);
        pair.selected = entry.selected || transport_selected.as_deref() == Some(entry.id.as_str());
        pairs.push(pair);
    }

    selected_pair(&pairs).map_err(StatsError::Selection)?;
    log::debug!("Stats report for {}: {} candidate pair(s)", owner, pairs.len());
    Ok(pairs)
}

fn to_candidate(
    origin: &PeerId,
    side: Side,
    entry: &CandidateEntry,
) -> Result<Candidate, String> {
    let candidate_type = CandidateType::from_sdp_name(&entry.candidate_type)
        .ok_or_else(|| format!("unsupported candidate type '{}'", entry.candidate_type))?;
    let raw = entry
        .address
        .as_deref()
        .or(entry.ip.as_deref())
        .ok_or_else(|| "no address".to_string())?;
    let ip: IpAddr = raw
        .parse()
        .map_err(|_| format!("unresolved address '{}'", raw))?;

    let related = match (&entry.related_address, entry.related_port) {
        (Some(addr), Some(port)) => {
            addr.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, port))
        }
        _ => None,
    };

    let mut candidate = Candidate::new(
        origin.clone(),
        side,
        candidate_type,
        SocketAddr::new(ip, entry.port),
        related,
    );
    if let Some(protocol) = &entry.protocol {
        if protocol.eq_ignore_ascii_case("tcp") {
            candidate.address.protocol = TransportProtocol::Tcp;
        }
    }
    if let Some(priority) = entry.priority {
        candidate.priority = priority;
    }
    if let Some(foundation) = &entry.foundation {
        candidate.foundation = foundation.clone();
    }
    Ok(candidate)
}

fn parse_pair_state(state: &str) -> Option<PairState> {
    match state {
        "frozen" | "waiting" => Some(PairState::Waiting),
        "in-progress" => Some(PairState::InProgress),
        "succeeded" => Some(PairState::Succeeded),
        "failed" | "cancelled" => Some(PairState::Failed),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    /// Report is not a stats document
    Parse(String),
    /// A pair references a candidate id missing from the report
    UnknownCandidate { pair: String, candidate: String },
    InvalidField {
        id: String,
        field: &'static str,
        value: String,
    },
    /// More than one pair reported as selected
    Selection(SelectionError),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::Parse(e) => write!(f, "cannot parse stats report: {}", e),
            StatsError::UnknownCandidate { pair, candidate } => {
                write!(f, "pair {} references unknown candidate {}", pair, candidate)
            }
            StatsError::InvalidField { id, field, value } => {
                write!(f, "entry {} has invalid {} '{}'", id, field, value)
            }
            StatsError::Selection(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StatsError {}
