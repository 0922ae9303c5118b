//! can-dispatch: route received CAN frames to the device that owns them
//!
//! A [`BusRegistry`] keeps one dispatch list per bus. Each entry pairs a
//! `(id_type, id, mask)` filter with a [`FrameHandler`]; a received frame is
//! delivered to the newest entry with `id == frame.id & mask` and matching
//! framing. Motor drivers register themselves at init and remove themselves at
//! deinit, so the receive path never needs to know which device types exist.
//!
//! [`pump_once`] and [`drain`] bridge a [`can_transport::CanBus`] receive call
//! into the registry for hosts without an RX interrupt.

mod error;
pub use error::{DecodeError, DispatchError};

mod handler;
pub use handler::FrameHandler;

mod registry;
pub use registry::{BusRegistry, DispatchOutcome, EntryInfo};

mod stats;
pub use stats::{DispatchStats, StatsSnapshot};

mod pump;
pub use pump::{drain, pump_once};
