//! DeviceConfig service (0x01): link parameters, authentication and
//! date/time display settings.

use wearlink_common::{DateOrder, Preferences, TimeFormat};
use wearlink_packet::{PacketError, Tlv};

use crate::{Request, ResponseKind};

pub const SERVICE_ID: u8 = 0x01;

pub const LINK_PARAMS_ID: u8 = 0x01;
pub const DATE_FORMAT_ID: u8 = 0x04;
pub const AUTH_ID: u8 = 0x13;

pub const LINK_PARAMS: (u8, u8) = (SERVICE_ID, LINK_PARAMS_ID);
pub const DATE_FORMAT: (u8, u8) = (SERVICE_ID, DATE_FORMAT_ID);
pub const AUTH: (u8, u8) = (SERVICE_ID, AUTH_ID);

// ============================================================================
// Link Parameters
// ============================================================================

pub const TAG_PROTOCOL_VERSION: u8 = 0x01;
pub const TAG_SLICE_SIZE: u8 = 0x02;
pub const TAG_MTU: u8 = 0x03;
pub const TAG_SERVER_NONCE: u8 = 0x07;
pub const TAG_AUTH_MODE: u8 = 0x08;
pub const TAG_BOND_STATE: u8 = 0x09;

/// Server nonce length: 2-byte auth version followed by 16 random bytes.
pub const SERVER_NONCE_LEN: usize = 18;

/// Parameters the device offers in its LinkParams response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub protocol_version: u8,
    pub slice_size: u16,
    pub mtu: u16,
    /// Taken from the first two bytes of the server nonce.
    pub auth_version: u16,
    pub server_nonce: Vec<u8>,
    pub auth_mode: u8,
    pub bond_state: u8,
}

impl LinkParams {
    pub fn from_tlv(tlv: &Tlv) -> Result<Self, PacketError> {
        let server_nonce = tlv.require_bytes(TAG_SERVER_NONCE)?;
        if server_nonce.len() != SERVER_NONCE_LEN {
            return Err(PacketError::invalid_format(format!(
                "server nonce is {} bytes, expected {}",
                server_nonce.len(),
                SERVER_NONCE_LEN
            )));
        }
        let slice_size = tlv.get_u16(TAG_SLICE_SIZE)?;
        if slice_size == 0 {
            return Err(PacketError::invalid_format("slice size is zero"));
        }
        Ok(LinkParams {
            protocol_version: tlv.get_u8(TAG_PROTOCOL_VERSION)?,
            slice_size,
            mtu: tlv.get_u16(TAG_MTU)?,
            auth_version: u16::from_be_bytes([server_nonce[0], server_nonce[1]]),
            server_nonce: server_nonce.to_vec(),
            auth_mode: tlv.get_u8(TAG_AUTH_MODE)?,
            bond_state: tlv.get_u8(TAG_BOND_STATE)?,
        })
    }

    /// Device-side encoding of the response body.
    pub fn to_tlv(&self) -> Tlv {
        Tlv::new()
            .put_u8(TAG_PROTOCOL_VERSION, self.protocol_version)
            .put_u16(TAG_SLICE_SIZE, self.slice_size)
            .put_u16(TAG_MTU, self.mtu)
            .put_bytes(TAG_SERVER_NONCE, self.server_nonce.clone())
            .put_u8(TAG_AUTH_MODE, self.auth_mode)
            .put_u8(TAG_BOND_STATE, self.bond_state)
    }
}

/// Ask the device for its link parameters. Always plaintext.
pub fn get_link_params() -> Request {
    Request::new(
        "get_link_params",
        SERVICE_ID,
        LINK_PARAMS_ID,
        ResponseKind::LinkParams,
        |_| {
            Ok(Tlv::new()
                .put_empty(TAG_PROTOCOL_VERSION)
                .put_empty(TAG_SLICE_SIZE)
                .put_empty(TAG_MTU)
                .put_empty(TAG_SERVER_NONCE)
                .put_empty(TAG_AUTH_MODE))
        },
    )
    .plaintext()
}

// ============================================================================
// Authentication
// ============================================================================

pub const TAG_AUTH_DIGEST: u8 = 0x01;
pub const TAG_AUTH_NONCE: u8 = 0x02;

/// Send our challenge digest and client nonce. Always plaintext.
pub fn auth(digest: Vec<u8>, client_nonce: Vec<u8>) -> Request {
    Request::new("auth", SERVICE_ID, AUTH_ID, ResponseKind::Auth, move |_| {
        Ok(Tlv::new()
            .put_bytes(TAG_AUTH_DIGEST, digest)
            .put_bytes(TAG_AUTH_NONCE, client_nonce))
    })
    .plaintext()
}

// ============================================================================
// Date Format
// ============================================================================

pub const TAG_DATE_ORDER: u8 = 0x01;
pub const TAG_TIME_FORMAT: u8 = 0x02;

pub const TIME_12H: u8 = 0x01;
pub const TIME_24H: u8 = 0x02;

pub const DATE_YEAR_FIRST: u8 = 0x01;
pub const DATE_MONTH_FIRST: u8 = 0x02;
pub const DATE_DAY_FIRST: u8 = 0x03;

/// Push the date order and clock format.
///
/// `system_24h` resolves the `auto` time format. The preferences are read
/// when the request is built, not when it is queued.
pub fn set_date_format<P>(prefs: P, system_24h: bool) -> Request
where
    P: Preferences + 'static,
{
    Request::new(
        "set_date_format",
        SERVICE_ID,
        DATE_FORMAT_ID,
        ResponseKind::Ack,
        move |_| {
            let time = if TimeFormat::from_preferences(&prefs).is_24h(system_24h) {
                TIME_24H
            } else {
                TIME_12H
            };
            let date = match DateOrder::from_preferences(&prefs) {
                DateOrder::YearFirst => DATE_YEAR_FIRST,
                DateOrder::MonthFirst => DATE_MONTH_FIRST,
                DateOrder::DayFirst => DATE_DAY_FIRST,
            };
            Ok(Tlv::new()
                .put_u8(TAG_DATE_ORDER, date)
                .put_u8(TAG_TIME_FORMAT, time))
        },
    )
}
