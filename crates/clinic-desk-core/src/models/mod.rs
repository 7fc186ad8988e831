//! Domain models for the clinic desk.

mod patient;
mod visit;

pub use patient::*;
pub use visit::*;
