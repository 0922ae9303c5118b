use can_transport::{BusSelector, IdType};
use thiserror::Error;

/// Registry configuration and bookkeeping failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{bus}: {id_type:?} id 0x{id:X} is already registered")]
    IdConflict {
        bus: BusSelector,
        id_type: IdType,
        id: u32,
    },
    #[error("{bus}: no matching dispatch entry")]
    NotFound { bus: BusSelector },
    #[error("{bus}: could not grow the dispatch list")]
    AllocFailure { bus: BusSelector },
    #[error("id 0x{id:X} does not fit {id_type:?} framing")]
    InvalidId { id_type: IdType, id: u32 },
}

/// Why a handler refused a frame. The frame is dropped and counted; device state is untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload too short: need {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unrecognized command 0x{0:02X}")]
    UnknownCommand(u8),
    #[error("unexpected {0:?} frame")]
    UnexpectedIdType(IdType),
}

impl DecodeError {
    /// Fails with [`DecodeError::TooShort`] unless `payload` has at least `expected` bytes.
    pub fn check_len(payload: &[u8], expected: usize) -> Result<(), DecodeError> {
        if payload.len() < expected {
            Err(DecodeError::TooShort {
                expected,
                actual: payload.len(),
            })
        } else {
            Ok(())
        }
    }
}
