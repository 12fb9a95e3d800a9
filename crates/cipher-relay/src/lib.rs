//! Cipher Relay - decodes shifted-cipher submissions and relays an
//! operator-controlled reply.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         CIPHER RELAY                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │   GET /        POST /send_data      GET|POST /set_response    │
//! │      │               │                       │                │
//! │  ┌───┴───────────────┴───────────────────────┴───┐            │
//! │  │      Middleware: Cors → Tracing → BodyLimit    │            │
//! │  └───────────────────────┬────────────────────────┘            │
//! │                          │                                     │
//! │  ┌───────────────────────┴────────────────────────┐            │
//! │  │                RelayCore (one lock)             │            │
//! │  │  ShiftCipher · MessageLog · ResponseOption      │            │
//! │  │  PendingRegistry · SessionStore                 │            │
//! │  └─────────────────────────────────────────────────┘            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Response policies
//!
//! - **Immediate**: decode, log, answer with the current response option.
//! - **Redirect**: park the submission under a `PendingId` and send the
//!   client to the operator form; the operator's update completes it.
//! - **Session**: stash the submission in the client's session until the
//!   operator sets the option from that session.
//!
//! # Usage
//!
//! ```ignore
//! use cipher_relay::{RelayConfig, RelayService};
//!
//! let service = RelayService::new(RelayConfig::from_env()?)?;
//! service.start().await?;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod http;
pub mod middleware;
pub mod relay;
pub mod service;

// Re-exports for public API
pub use domain::cipher::{Alphabet, ShiftCipher};
pub use domain::config::RelayConfig;
pub use domain::error::{RelayError, RelayResult, ServiceError};
pub use domain::types::*;
pub use relay::{OperatorOutcome, OperatorUpdate, RelayCore, SubmitOutcome};
pub use service::{build_router, RelayService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
