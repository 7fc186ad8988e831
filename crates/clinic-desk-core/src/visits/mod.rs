//! Visit validation rules.
//!
//! A visit may only be marked validated with a well-formed fiche number that no
//! other visit holds. Walk-ins are registered as patients in a separate step
//! driven by the caller (see [`StatusChange::NeedsPatient`]).

mod fiche;
mod rules;

pub use fiche::*;
pub use rules::*;

use thiserror::Error;

/// Reasons a visit cannot be validated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("A fiche number is required to validate a visit")]
    MissingFicheNumber,

    #[error("Invalid fiche number format: {0} (expected FNN-NNNN)")]
    InvalidFormat(String),

    #[error("Fiche number {0} is already used by another visit")]
    DuplicateFicheNumber(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;
