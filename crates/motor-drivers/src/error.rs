use can_dispatch::DispatchError;
use can_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Command frame id outside the groups the device listens on.
    #[error("0x{0:03X} is not a valid command group")]
    InvalidGroup(u16),
    #[error("motor id 0x{0:X} out of range")]
    InvalidMotorId(u32),
    #[error(transparent)]
    Registry(#[from] DispatchError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;
