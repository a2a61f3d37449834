//! Typed vendor requests.
//!
//! Each submodule covers one device service: its service id, command ids,
//! TLV tags and request constructors. Constructors take preferences
//! explicitly and return a [`Request`](crate::Request) ready to submit.

pub mod device_config;
pub mod fitness;
