//! motor-drivers: CAN motor protocols on top of the dispatch registry
//!
//! Each receiving driver (`dji`, `ak`, `vesc`) registers itself on a
//! [`can_dispatch::BusRegistry`] at `init`, decodes its feedback frames into an
//! immutable state snapshot, and builds command frames that are sent through any
//! [`can_transport::BusTransport`]. `mlds` is command-only. A rig of motors can
//! be described in YAML and bound in one go with [`Rig::bind`].

pub mod codec;
pub use codec::{clamp, float_to_uint, uint_to_float, BufferReader, BufferWriter};

mod snapshot;
pub use snapshot::SnapshotCell;

mod error;
pub use error::{DriverError, Result};

pub mod ak;
pub mod dji;
pub mod mlds;
pub mod vesc;

mod config;
pub use config::{parse_id, Backend, BusConfig, BusesConfig, DriverConfig, MotorConfig, RigConfig};

mod loader;
pub use loader::{load_rig_file, parse_rig, validate};

mod rig;
pub use rig::{BoundMotor, MotorHandle, Rig, TelemetryRecord};

mod metrics;
pub use metrics::{BusMetrics, MeteredTransport, MetricsHub};
