//! FitnessData service (0x07).

use tracing::debug;
use wearlink_common::{keys, Preferences};
use wearlink_packet::Tlv;

use crate::{Request, ResponseKind};

pub const SERVICE_ID: u8 = 0x07;

pub const ENABLE_AUTOMATIC_SPO_ID: u8 = 0x16;

pub const ENABLE_AUTOMATIC_SPO: (u8, u8) = (SERVICE_ID, ENABLE_AUTOMATIC_SPO_ID);

pub const TAG_ENABLE: u8 = 0x01;

/// Switch automatic SpO2 measurement on or off per [`keys::SPO_AUTOMATIC_ENABLE`].
///
/// The device does not answer this command.
pub fn set_automatic_spo(prefs: &dyn Preferences) -> Request {
    let enable = prefs.get_bool(keys::SPO_AUTOMATIC_ENABLE, false);
    if enable {
        debug!("SetAutomaticSpo: enabling automatic SpO2");
    } else {
        debug!("SetAutomaticSpo: disabling automatic SpO2");
    }
    Request::new(
        "set_automatic_spo",
        SERVICE_ID,
        ENABLE_AUTOMATIC_SPO_ID,
        ResponseKind::Written,
        move |_| Ok(Tlv::new().put_bool(TAG_ENABLE, enable)),
    )
    .no_response()
}
