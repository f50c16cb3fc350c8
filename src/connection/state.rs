//! Connection state machine

use crate::{Error, Result};

/// Connection state
///
/// ```text
/// Initial → AwaitingGreeting → [NegotiatingSsl] → AwaitingCredential
///         → AwaitingAuthResult ⇄ AwaitingAuthSwitch → Ready
/// Ready → CommandInProgress → ReadingResults → Ready
/// any non-terminal → Failed;  Ready | Failed → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Initial state (not connected)
    Initial,

    /// Transport connected, waiting for the server greeting
    AwaitingGreeting,

    /// SSL request sent, TLS handshake in progress
    NegotiatingSsl,

    /// Waiting on the credential source
    AwaitingCredential,

    /// Auth response sent, waiting for OK / ERR / switch / more data
    AwaitingAuthResult,

    /// Server requested a different mechanism
    AwaitingAuthSwitch,

    /// Authenticated and idle
    Ready,

    /// Command written, no response read yet
    CommandInProgress,

    /// Streaming a command's results
    ReadingResults,

    /// Unrecoverable error; only closing is allowed
    Failed,

    /// Closed
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Initial, AwaitingGreeting)
                | (AwaitingGreeting, NegotiatingSsl)
                | (AwaitingGreeting, AwaitingCredential)
                | (NegotiatingSsl, AwaitingCredential)
                | (AwaitingCredential, AwaitingAuthResult)
                | (AwaitingAuthResult, AwaitingAuthSwitch)
                | (AwaitingAuthSwitch, AwaitingAuthResult)
                | (AwaitingAuthResult, Ready)
                | (Ready, CommandInProgress)
                | (CommandInProgress, ReadingResults)
                | (CommandInProgress, Ready)
                | (ReadingResults, Ready)
                | (Ready, Closed)
                | (Failed, Closed)
        ) || (next == Failed && !self.is_terminal())
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {}", self),
                actual: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }

    /// Failed or Closed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }

    /// Negotiation has not finished yet
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            Self::Initial
                | Self::AwaitingGreeting
                | Self::NegotiatingSsl
                | Self::AwaitingCredential
                | Self::AwaitingAuthResult
                | Self::AwaitingAuthSwitch
        )
    }

    /// A request is in flight
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::CommandInProgress | Self::ReadingResults)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::AwaitingGreeting => write!(f, "awaiting_greeting"),
            Self::NegotiatingSsl => write!(f, "negotiating_ssl"),
            Self::AwaitingCredential => write!(f, "awaiting_credential"),
            Self::AwaitingAuthResult => write!(f, "awaiting_auth_result"),
            Self::AwaitingAuthSwitch => write!(f, "awaiting_auth_switch"),
            Self::Ready => write!(f, "ready"),
            Self::CommandInProgress => write!(f, "command_in_progress"),
            Self::ReadingResults => write!(f, "reading_results"),
            Self::Failed => write!(f, "failed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
