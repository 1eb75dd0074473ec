//! Modular Evo - Co-evolution of modular robot bodies and their controllers.
//!
//! Robots are trees of modules: a root, body joints forming a spine and
//! mirrored pairs of limb joints. Every module carries a coupled oscillator
//! driving its joint. Evolution mutates both the tree and the oscillators,
//! hands the resulting genome descriptions to external simulator sessions
//! and selects on the returned fitness.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Configuration, genome description and run record types
//! - `robot`: Module tree, individuals, controllers and structural mutation
//! - `evolution`: Selection, evaluation scheduling, the engine and archives
//!
//! # Example
//!
//! ```rust,no_run
//! use modular_evo::{
//!     robot::{GenomeRng, Individual, MutationContext},
//!     schema::{ControllerConfig, GenomeConstraints},
//! };
//!
//! let constraints = GenomeConstraints::default();
//! let controller = ControllerConfig::default();
//! let mut rng = GenomeRng::new(42);
//! let mut ctx = MutationContext::new(&constraints, &controller, &mut rng);
//!
//! let mut robot = Individual::new(0, &mut ctx);
//! robot.mutate_body(1.0, &mut ctx);
//!
//! println!("{}", robot.describe().to_json().unwrap());
//! ```

pub mod evolution;
pub mod robot;
pub mod schema;

// Re-export commonly used types
pub use evolution::{EvolutionEngine, Evaluator, SurrogateEvaluator};
pub use robot::{Individual, ModuleTree};
pub use schema::{EvolutionConfig, GenomeDescription};
