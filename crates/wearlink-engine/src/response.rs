//! Decoded responses.
//!
//! Every inbound packet that matches a request is decoded into one
//! [`Response`] variant. Requests declare the [`ResponseKind`] they expect and
//! fail with a type mismatch when the device answers with something else.

use tracing::debug;
use wearlink_packet::{Packet, DEVICE_OK, TAG_ERROR};

use crate::commands::device_config::{self, LinkParams};

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Link parameters offered by the device.
    LinkParams(LinkParams),
    /// The device's answer to our authentication challenge.
    Auth {
        /// Device digest over both nonces.
        digest: Vec<u8>,
    },
    /// Success status with no further content.
    Ack,
    /// The device reported an error code.
    DeviceError(u32),
    /// Any other packet, undecoded.
    Raw(Packet),
    /// The request expected no response; its frames were written.
    Written,
}

/// Discriminant of [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    LinkParams,
    Auth,
    Ack,
    DeviceError,
    Raw,
    Written,
}

impl ResponseKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResponseKind::LinkParams => "link_params",
            ResponseKind::Auth => "auth",
            ResponseKind::Ack => "ack",
            ResponseKind::DeviceError => "device_error",
            ResponseKind::Raw => "raw",
            ResponseKind::Written => "written",
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::LinkParams(_) => ResponseKind::LinkParams,
            Response::Auth { .. } => ResponseKind::Auth,
            Response::Ack => ResponseKind::Ack,
            Response::DeviceError(_) => ResponseKind::DeviceError,
            Response::Raw(_) => ResponseKind::Raw,
            Response::Written => ResponseKind::Written,
        }
    }

    /// Decode a plaintext packet.
    ///
    /// Packets of a known command that fail to parse come back as
    /// [`Response::Raw`], which the expecting request reports as a mismatch.
    pub fn decode(packet: Packet) -> Response {
        if let Some(code) = packet.error_code() {
            if code != DEVICE_OK {
                return Response::DeviceError(code);
            }
            if packet.tlv.len() == 1 {
                return Response::Ack;
            }
        }

        match packet.key() {
            device_config::LINK_PARAMS => match LinkParams::from_tlv(&packet.tlv) {
                Ok(params) => Response::LinkParams(params),
                Err(e) => {
                    debug!("Response[{}]: bad link params: {}", packet, e);
                    Response::Raw(packet)
                }
            },
            device_config::AUTH => match packet.tlv.get_bytes(device_config::TAG_AUTH_DIGEST) {
                Some(digest) => Response::Auth {
                    digest: digest.to_vec(),
                },
                None => {
                    debug!("Response[{}]: auth answer without digest", packet);
                    Response::Raw(packet)
                }
            },
            _ => Response::Raw(packet),
        }
    }

    /// Check against the kind a request expects.
    pub fn expect(self, expected: ResponseKind) -> Result<Response, crate::RequestError> {
        let actual = self.kind();
        if actual == expected {
            Ok(self)
        } else {
            Err(crate::RequestError::ResponseTypeMismatch { expected, actual })
        }
    }
}
