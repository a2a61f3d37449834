//! Request/Response Engine for Wearable Devices
//!
//! This crate drives the command link of one device:
//!
//! - [`Request`]: an outbound command, built into frames when enqueued
//! - [`DeviceSession`]: FIFO request queue, self-queued requests, response
//!   matching, timeouts and the authenticated handshake
//! - [`TransactionBuilder`]: queue several requests all-or-nothing
//! - [`Response`]: tagged union every matched packet decodes into
//! - [`commands`]: typed vendor requests driven by preferences
//! - [`SessionDriver`]: tokio task owning a session
//!
//! # Example
//!
//! ```rust,ignore
//! use wearlink_engine::{commands, Blake2KeyAgreement, ChannelTransport, DeviceSession};
//!
//! let (transport, outbound) = ChannelTransport::pair();
//! let mut session = DeviceSession::new(transport, EngineConfig::default());
//! let mut handshake = session.start_handshake(Blake2KeyAgreement::new(secret));
//!
//! // feed device bytes until the handshake resolves
//! session.on_receive(&bytes);
//!
//! let handle = session.submit(commands::device_config::set_date_format(prefs.clone(), true));
//! ```

pub mod commands;
mod driver;
mod error;
mod handshake;
mod request;
mod response;
mod session;
mod transaction;
mod transport;

pub use driver::*;
pub use error::*;
pub use handshake::{Blake2KeyAgreement, HandshakeHandle, KeyAgreement, CLIENT_NONCE_LEN};
pub use request::{BuildContext, ClosedError, Completion, Expect, Request, RequestHandle, RequestState};
pub use response::*;
pub use session::{DeviceSession, SessionParams, SessionState};
pub use transaction::*;
pub use transport::*;
