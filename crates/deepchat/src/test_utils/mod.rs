//! Shared doubles for the unit tests.

pub mod helpers;
pub mod mocks;

pub use helpers::*;
pub use mocks::*;
