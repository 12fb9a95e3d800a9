//! Domain types for the relay.
//!
//! This module contains the cipher, the bounded log, the pending and session
//! stores, configuration, and error handling. None of it knows about the
//! shared lock; `crate::relay` owns the state.

pub mod cipher;
pub mod config;
pub mod error;
pub mod ids;
pub mod message_log;
pub mod pending;
pub mod response_option;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use cipher::{Alphabet, ShiftCipher};
pub use config::{ConfigError, RelayConfig};
pub use error::{RelayError, RelayResult, ServiceError};
pub use ids::{PendingId, SessionId};
pub use message_log::MessageLog;
pub use pending::{PendingRegistry, PendingRequest, PendingStats, PendingWait};
pub use response_option::ResponseOption;
pub use session::{SessionPhase, SessionStore, StashedSubmission};
pub use types::*;
