//! Robot genome: module trees, controllers and the mutation engine.

mod controller;
mod genome;
mod individual;
mod module;
mod mutation;

pub use controller::Oscillator;
pub use genome::GenomeRng;
pub use individual::Individual;
pub use module::{
    Capacity, GenomeError, Growth, Module, ModuleId, ModuleKind, ModuleTree, mirror_angle,
};
pub use mutation::{MutationContext, MutationOperator};
