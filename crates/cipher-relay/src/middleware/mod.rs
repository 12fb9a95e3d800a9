//! Middleware stack for the relay.
//!
//! Layer order: Request → Cors → Tracing → BodyLimit → Handler

pub mod cors;
pub mod tracing;

pub use self::cors::create_cors_layer;
pub use self::tracing::TracingLayer;
