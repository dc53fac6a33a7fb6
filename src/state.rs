//! ICE gathering and connection states
//!
//! States are reported by the media engine. Each accepted transition becomes
//! a `connection-state` timeline event; transitions the engine could not
//! legitimately make are rejected and leave the tracked state unchanged.
//!
//! ```text
//! new ──► checking ──► connected ──► completed
//!            │  ▲          │
//!            ▼  │          ▼
//!          failed     disconnected
//!
//! any ──► closed (absorbing)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::candidate::PeerId;
use crate::timeline::{Component, EventCategory, PeerRecorder, TimelineEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatheringState {
    New,
    Gathering,
    Complete,
}

impl GatheringState {
    pub fn can_transition_to(&self, next: GatheringState) -> bool {
        use GatheringState::*;
        // Complete -> Gathering is an ICE restart
        matches!((self, next), (New, Gathering) | (Gathering, Complete) | (Complete, Gathering))
    }
}

impl fmt::Display for GatheringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatheringState::New => write!(f, "new"),
            GatheringState::Gathering => write!(f, "gathering"),
            GatheringState::Complete => write!(f, "complete"),
        }
    }
}

impl FromStr for GatheringState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(GatheringState::New),
            "gathering" => Ok(GatheringState::Gathering),
            "complete" => Ok(GatheringState::Complete),
            other => Err(StateError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, IceConnectionState::Connected | IceConnectionState::Completed)
    }

    /// States that end the session without a usable path
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Failed
                | IceConnectionState::Disconnected
                | IceConnectionState::Closed
        )
    }

    pub fn can_transition_to(&self, next: IceConnectionState) -> bool {
        use IceConnectionState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (New, Checking) => true,
            (Checking, Connected | Failed | Disconnected) => true,
            (Connected, Completed | Disconnected | Failed | Checking) => true,
            (Completed, Connected | Disconnected | Failed | Checking) => true,
            (Disconnected, Checking | Connected | Failed) => true,
            (Failed, Checking) => true,
            _ => false,
        }
    }
}

impl fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IceConnectionState::New => "new",
            IceConnectionState::Checking => "checking",
            IceConnectionState::Connected => "connected",
            IceConnectionState::Completed => "completed",
            IceConnectionState::Failed => "failed",
            IceConnectionState::Disconnected => "disconnected",
            IceConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl FromStr for IceConnectionState {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(IceConnectionState::New),
            "checking" => Ok(IceConnectionState::Checking),
            "connected" => Ok(IceConnectionState::Connected),
            "completed" => Ok(IceConnectionState::Completed),
            "failed" => Ok(IceConnectionState::Failed),
            "disconnected" => Ok(IceConnectionState::Disconnected),
            "closed" => Ok(IceConnectionState::Closed),
            other => Err(StateError::Unknown(other.to_string())),
        }
    }
}

/// Tracks one peer's reported states and turns transitions into events
#[derive(Debug)]
pub struct StateTracker {
    peer: PeerId,
    gathering: GatheringState,
    connection: IceConnectionState,
}

impl StateTracker {
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            gathering: GatheringState::New,
            connection: IceConnectionState::New,
        }
    }

    pub fn gathering(&self) -> GatheringState {
        self.gathering
    }

    pub fn connection(&self) -> IceConnectionState {
        self.connection
    }

    pub fn gathering_changed(
        &mut self,
        next: GatheringState,
        recorder: &mut PeerRecorder,
    ) -> Result<TimelineEvent, StateError> {
        if !self.gathering.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.gathering.to_string(),
                to: next.to_string(),
            });
        }
        log::debug!("{} ICE gathering {} -> {}", self.peer, self.gathering, next);
        self.gathering = next;
        Ok(recorder.event(
            Component::WebClient,
            EventCategory::ConnectionState,
            format!("ICE gathering state: {}", next),
        ))
    }

    pub fn connection_changed(
        &mut self,
        next: IceConnectionState,
        recorder: &mut PeerRecorder,
    ) -> Result<TimelineEvent, StateError> {
        if !self.connection.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.connection.to_string(),
                to: next.to_string(),
            });
        }
        if next.is_terminal_failure() {
            log::warn!("{} ICE connection {} -> {}", self.peer, self.connection, next);
        } else {
            log::info!("{} ICE connection {} -> {}", self.peer, self.connection, next);
        }
        self.connection = next;
        Ok(recorder.event(
            Component::WebClient,
            EventCategory::ConnectionState,
            format!("ICE connection state: {}", next),
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    Unknown(String),
    InvalidTransition { from: String, to: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::Unknown(s) => write!(f, "unknown ICE state '{}'", s),
            StateError::InvalidTransition { from, to } => {
                write!(f, "invalid ICE state transition {} -> {}", from, to)
            }
        }
    }
}

impl std::error::Error for StateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_failure_states() {
        assert!(IceConnectionState::Failed.is_terminal_failure());
        assert!(IceConnectionState::Disconnected.is_terminal_failure());
        assert!(IceConnectionState::Closed.is_terminal_failure());
        assert!(!IceConnectionState::Checking.is_terminal_failure());
        assert!(IceConnectionState::Completed.is_connected());
    }

    #[test]
    fn test_connection_transitions() {
        use IceConnectionState::*;
        assert!(New.can_transition_to(Checking));
        assert!(Checking.can_transition_to(Connected));
        assert!(Failed.can_transition_to(Checking));
        assert!(Connected.can_transition_to(Closed));
        assert!(!New.can_transition_to(Connected));
        assert!(!Closed.can_transition_to(Checking));
    }

    #[test]
    fn test_parse_states() {
        assert!("in-progress".parse::<IceConnectionState>().is_err());
        assert_eq!("checking".parse::<IceConnectionState>().unwrap(), IceConnectionState::Checking);
        assert_eq!("complete".parse::<GatheringState>().unwrap(), GatheringState::Complete);
    }

    #[test]
    fn test_tracker_emits_events() {
        let peer = PeerId::new("alice");
        let mut recorder = PeerRecorder::new(peer.clone());
        let mut tracker = StateTracker::new(peer);

        let event = tracker
            .gathering_changed(GatheringState::Gathering, &mut recorder)
            .unwrap();
        assert_eq!(event.category, EventCategory::ConnectionState);
        assert_eq!(event.label, "ICE gathering state: gathering");

        tracker
            .connection_changed(IceConnectionState::Checking, &mut recorder)
            .unwrap();
        let err = tracker
            .connection_changed(IceConnectionState::New, &mut recorder)
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { .. }));
        assert_eq!(tracker.connection(), IceConnectionState::Checking);

        let failed = tracker
            .connection_changed(IceConnectionState::Failed, &mut recorder)
            .unwrap();
        assert_eq!(failed.label, "ICE connection state: failed");
        assert!(tracker.connection().is_terminal_failure());
    }
}
