//! Export functionality for the front-desk register.

mod register;

pub use register::*;
