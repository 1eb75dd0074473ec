//! Schema module - Configuration, genome description and run record types.

mod config;
mod evolution;
mod genome;

pub use config::*;
pub use evolution::*;
pub use genome::*;
