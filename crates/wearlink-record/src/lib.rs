//! Wearable Telemetry Records
//!
//! This crate decodes self-describing binary telemetry records using per-schema
//! field tables. A schema maps a global message number to a set of field
//! definitions; the decoder validates a buffer against that schema and produces
//! an immutable [`Record`] indexed by field number.
//!
//! # Buffer Layout
//!
//! ```text
//! +------+-----------+-------+-----------------------------------------+
//! | arch | global_id | count | count x (field | base_type | size | data) |
//! +------+-----------+-------+-----------------------------------------+
//!    1        2          1
//! ```
//!
//! `arch` selects the byte order of multi-byte values (0 = little endian,
//! 1 = big endian). Base types follow the FIT base type codes.
//!
//! # Example
//!
//! ```rust,ignore
//! use wearlink_record::{decode, monitoring, MonitoringRecord};
//!
//! let schema = monitoring::schema();
//! let record = decode(&schema, &buffer)?;
//! let monitoring = MonitoringRecord::try_from(record)?;
//! let heart_rate = monitoring.heart_rate();
//! ```

mod computed;
mod decode;
mod error;
mod record;
mod schema;
mod value;

pub mod monitoring;

pub use computed::*;
pub use decode::*;
pub use error::*;
pub use monitoring::MonitoringRecord;
pub use record::*;
pub use schema::*;
pub use value::*;
