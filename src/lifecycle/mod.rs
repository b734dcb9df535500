//! Process lifecycle.
//!
//! # Responsibilities
//! - Translate OS signals into the start of the drain sequence
//! - Let the acceptance loop and background tasks observe the drain state

pub mod shutdown;
pub mod signals;

pub use shutdown::{DrainController, DrainSignal};
