//! can-transport: CAN frame types and bus backends
//!
//! This crate provides the frame/identifier types shared by the dispatch registry and the
//! motor drivers, the [`CanBus`] trait for one physical interface, and [`BusTransport`] for
//! sending on either of the two buses. The default build enables the in-process `mock`
//! backend so that binaries and tests run on any host without an adapter.

mod types;
pub use types::{BusInfo, BusSelector, CanFrame, CanId, IdType, Timestamp};

mod error;
pub use error::{Result, TransportError};

mod traits;
pub use traits::{BusTransport, CanBus};

mod pair;
pub use pair::BusPair;

#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use mock::MockBus;

#[cfg(feature = "slcan")]
mod slcan;

#[cfg(feature = "slcan")]
pub use slcan::{SlcanBitrate, SlcanBus};
