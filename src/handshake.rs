//! Handshake messages exchanged through the signaling relay
//!
//! The relay carries an opaque session description plus the sender's frozen
//! candidate set and, when available, its NAT assessment. The SDP body is
//! never parsed here.
//!
//! # Exchange
//!
//! ```text
//! Offerer               Signaling                Answerer
//!   │                       │                        │
//!   │──── Offer ───────────►│                        │
//!   │                       │──── Offer ────────────►│
//!   │                       │◄─── Answer ────────────│
//!   │◄─── Answer ───────────│                        │
//! ```
//!
//! # Framing
//!
//! ```text
//! ┌─────────────┬─────────────────────────────────┐
//! │ Length (4B) │ Payload (bincode-encoded)       │
//! └─────────────┴─────────────────────────────────┘
//! ```
//!
//! A JSON form of the same message is used for captures on disk.

use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

use crate::candidate::{Candidate, PeerId, Side};
use crate::collector::CandidateSet;
use crate::nat::NatAssessment;
use crate::timeline::MessageId;

/// Maximum encoded payload size
pub const MAX_MESSAGE_SIZE: u32 = 65536;

/// Length of the frame header
pub const HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeKind {
    Offer,
    Answer,
}

impl fmt::Display for HandshakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeKind::Offer => write!(f, "offer"),
            HandshakeKind::Answer => write!(f, "answer"),
        }
    }
}

/// One signaling message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeMessage {
    pub kind: HandshakeKind,
    /// Shared by the offer and its answer
    pub session_id: u64,
    /// Links the send and receive events on the timeline
    pub message_id: MessageId,
    pub from: PeerId,
    /// Opaque session description body
    pub sdp: String,
    /// Sender's frozen local candidates
    pub candidates: CandidateSet,
    /// Sender's NAT assessment, when detection finished in time
    pub nat: Option<NatAssessment>,
}

impl HandshakeMessage {
    /// Encode with a 4-byte big-endian length prefix
    pub fn encode(&self) -> Result<Vec<u8>, HandshakeError> {
        let payload = bincode::serialize(self).map_err(|e| HandshakeError::Encode(e.to_string()))?;

        if payload.len() > MAX_MESSAGE_SIZE as usize {
            return Err(HandshakeError::TooLarge(payload.len()));
        }

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one framed message, returning it and the bytes consumed
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), HandshakeError> {
        if buf.len() < HEADER_LEN {
            return Err(HandshakeError::Incomplete(HEADER_LEN - buf.len()));
        }

        let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if length > MAX_MESSAGE_SIZE as usize {
            return Err(HandshakeError::TooLarge(length));
        }

        let total = HEADER_LEN + length;
        if buf.len() < total {
            return Err(HandshakeError::Incomplete(total - buf.len()));
        }

        let msg: Self = bincode::deserialize(&buf[HEADER_LEN..total])
            .map_err(|e| HandshakeError::Decode(e.to_string()))?;
        msg.validate()?;
        Ok((msg, total))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let encoded = self
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(&encoded)
    }

    /// Blocks until one complete message has been read
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;

        let length = u32::from_be_bytes(header) as usize;
        if length > MAX_MESSAGE_SIZE as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                HandshakeError::TooLarge(length),
            ));
        }

        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload)?;

        let msg: Self = bincode::deserialize(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        msg.validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(msg)
    }

    pub fn to_json(&self) -> Result<String, HandshakeError> {
        serde_json::to_string_pretty(self).map_err(|e| HandshakeError::Encode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, HandshakeError> {
        let msg: Self =
            serde_json::from_str(text).map_err(|e| HandshakeError::Decode(e.to_string()))?;
        msg.validate()?;
        Ok(msg)
    }

    /// The sender's candidates as the receiver's remote candidates
    pub fn remote_candidates(&self) -> Vec<Candidate> {
        self.candidates.clone().into_remote_view()
    }

    /// The payload must describe the sender's own local candidates
    fn validate(&self) -> Result<(), HandshakeError> {
        if self.candidates.peer() != &self.from {
            return Err(HandshakeError::Decode(format!(
                "{} from {} carries candidates of {}",
                self.kind,
                self.from,
                self.candidates.peer()
            )));
        }
        if self.candidates.side() != Side::Local {
            return Err(HandshakeError::Decode(format!(
                "{} from {} carries {} candidates",
                self.kind,
                self.from,
                self.candidates.side()
            )));
        }
        if let Some(nat) = &self.nat {
            if nat.peer != self.from {
                return Err(HandshakeError::Decode(format!(
                    "{} from {} carries NAT assessment of {}",
                    self.kind, self.from, nat.peer
                )));
            }
        }
        Ok(())
    }
}

/// Random session identifier from the system CSPRNG
pub fn generate_session_id() -> Result<u64, HandshakeError> {
    let rng = SystemRandom::new();
    let mut buf = [0u8; 8];
    rng.fill(&mut buf).map_err(|_| HandshakeError::Random)?;
    Ok(u64::from_ne_bytes(buf))
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Serialization failed
    Encode(String),
    /// Payload did not decode or is inconsistent
    Decode(String),
    /// Not enough data (need N more bytes)
    Incomplete(usize),
    /// Payload exceeds `MAX_MESSAGE_SIZE`
    TooLarge(usize),
    /// System random generator failed
    Random,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::Encode(e) => write!(f, "handshake encode error: {}", e),
            HandshakeError::Decode(e) => write!(f, "handshake decode error: {}", e),
            HandshakeError::Incomplete(needed) => {
                write!(f, "incomplete handshake, need {} more bytes", needed)
            }
            HandshakeError::TooLarge(size) => write!(
                f,
                "handshake too large: {} bytes (max {})",
                size, MAX_MESSAGE_SIZE
            ),
            HandshakeError::Random => write!(f, "system random generator failed"),
        }
    }
}

impl std::error::Error for HandshakeError {}
