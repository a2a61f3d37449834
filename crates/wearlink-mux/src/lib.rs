//! Command Multiplexer for Wearable Devices
//!
//! One logical command channel carries many independent capabilities. This
//! crate routes it:
//!
//! - [`EnvelopeCodec`]: protobuf ([`ProtobufEnvelope`]) or tagged binary
//!   ([`TaggedEnvelope`]) command envelopes
//! - [`Service`]: a capability handling one command type
//! - [`ServiceRegistry`]: services keyed by command type, built once
//! - [`CommandMultiplexer`]: inbound routing, outbound writes, service
//!   lifecycle and configuration changes
//! - [`services`]: system, health, notification, music, schedule, weather
//!   and calendar
//! - [`SessionLink`] and [`SessionChannel`]: carry envelopes over an
//!   authenticated session driven by a
//!   [`SessionDriver`](wearlink_engine::SessionDriver)
//!
//! # Example
//!
//! ```rust,ignore
//! use wearlink_mux::{CommandMultiplexer, ProtobufEnvelope, ServiceRegistry, SessionChannel, SessionLink};
//!
//! let (driver, unsolicited) = SessionDriver::spawn(session, inbound);
//! let mux = CommandMultiplexer::new(
//!     ServiceRegistry::standard()?,
//!     ProtobufEnvelope,
//!     SessionChannel::new(driver.handle()),
//! )
//! .with_preferences(prefs)
//! .with_sink(records_tx);
//!
//! // services initialize once the handshake completes
//! let link = tokio::spawn(SessionLink::new(mux, driver.state(), unsolicited).with_events(events_tx).run());
//! driver.handshake(agreement).await?;
//! ```

mod channel;
mod envelope;
mod error;
mod mux;
pub mod proto;
mod registry;
mod service;
pub mod services;
mod session_link;
mod telemetry;

pub use channel::*;
pub use envelope::*;
pub use error::*;
pub use mux::*;
pub use registry::*;
pub use service::*;
pub use session_link::*;
pub use telemetry::*;
