//! Contraindication screening.
//!
//! Single-patient, synchronous evaluation of intake data against a fixed
//! catalog of absolute and relative contraindications.

pub mod catalog;
pub mod engine;
pub mod types;

pub use catalog::catalog_ids;
pub use engine::{screen, screen_at};
pub use types::*;
