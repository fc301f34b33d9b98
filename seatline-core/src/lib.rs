pub mod models;
pub mod key;
pub mod repository;
pub mod memory;
pub mod locks;
pub mod finalizer;
pub mod service;
pub mod assembler;

pub use key::DraftKey;
pub use models::{
    DraftStage, NewReservation, Reservation, ReservationDetails, ReservationDraft, SpotStatus, Ticket,
};
pub use service::ReservationService;
pub use assembler::{IdentityClaims, PayloadAssembler, TokenDecoder};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("External record missing: {0}")]
    ExternalRecordMissing(String),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("Reservation already finalized: {0}")]
    AlreadyFinalized(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
