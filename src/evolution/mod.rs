//! Evolutionary search over modular robots.
//!
//! # Overview
//!
//! - **Selection** (`selection`): tournaments, remove tournaments and
//!   age-fitness Pareto fronts
//! - **Evaluation** (`fitness`): the evaluator seam, fitness sanitizing,
//!   genome repair and a deterministic surrogate simulator
//! - **Scheduling** (`scheduler`): a worker pool pairing every evaluator
//!   session with one thread
//! - **Engine** (`search`): reset/step/run over all selection strategies
//! - **Archive** (`archive`): hall of fame and JSON run artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use modular_evo::evolution::{EvolutionEngine, RunArchive, SurrogateEvaluator};
//! use modular_evo::schema::EvolutionConfig;
//!
//! let config = EvolutionConfig::default();
//! let sessions = (0..config.evaluation.workers)
//!     .map(|_| SurrogateEvaluator::default())
//!     .collect();
//!
//! let mut engine = EvolutionEngine::new(config, sessions).unwrap();
//! let result = engine
//!     .run(|record| println!("{}", record))
//!     .unwrap();
//! engine.close();
//!
//! let archive = RunArchive::create("runs").unwrap();
//! archive.save(&result).unwrap();
//! ```

mod archive;
mod fitness;
mod scheduler;
mod search;
mod selection;

pub use archive::{
    ArchiveError, HallOfFame, RunArchive, allocate_run_dir, load_genome, save_genome,
};
pub use fitness::{
    Evaluation, Evaluator, EvaluatorError, SurrogateEvaluator, apply_evaluation, sanitize_fitness,
};
pub use scheduler::{BatchReport, CancellationToken, EvaluationScheduler};
pub use search::{EvolutionEngine, EvolutionError, StepOutcome, fitness_stats};
pub use selection::{
    AgeFitness, best_indices, pareto_selection, pareto_tournament_growth, remove_tournament,
    tournament, truncate_best,
};
