//! Evolution configuration and run record types.
//!
//! This module provides the top-level configuration of an evolutionary run
//! (population, selection strategy, mutation settings) together with the
//! per-generation records and final results an engine produces.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    BodyMutationConfig, ConfigError, ControllerConfig, EvaluationConfig, GenomeConstraints,
    GenomeDescription,
};

/// Top-level configuration for an evolutionary run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Population and generation settings.
    #[serde(default)]
    pub population: PopulationConfig,
    /// Selection strategy driving each generation.
    #[serde(default)]
    pub strategy: SelectionStrategy,
    /// Controller parameter ranges and mutation settings.
    #[serde(default)]
    pub controller: ControllerConfig,
    /// Structural mutation settings.
    #[serde(default)]
    pub body: BodyMutationConfig,
    /// Genome limits.
    #[serde(default)]
    pub constraints: GenomeConstraints,
    /// Evaluation scheduler settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// Hall of fame and output settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

/// Population and generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Target number of individuals.
    #[serde(default = "default_population_size")]
    pub size: usize,
    /// Total generations of a run, generation 0 included.
    #[serde(default = "default_generations")]
    pub generations: usize,
    /// Best individuals carried over unchanged by generational strategies.
    #[serde(default)]
    pub elitism: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            size: default_population_size(),
            generations: default_generations(),
            elitism: 0,
        }
    }
}

fn default_population_size() -> usize {
    100
}
fn default_generations() -> usize {
    500
}

/// Selection strategy of a run.
///
/// Generational strategies replace the population with selected and mutated
/// offspring each generation. Steady-state strategies evaluate one mutated
/// copy of every parent and reduce parents plus offspring back to size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SelectionStrategy {
    /// Plain tournament selection.
    Tournament {
        #[serde(default = "default_tournament_size")]
        size: usize,
    },
    /// Age-fitness-pareto tournament that may grow the population.
    AgeFitnessPareto {
        #[serde(default = "default_tournament_size")]
        tournament_size: usize,
    },
    /// Remove tournament losers until the population is back at size.
    TournamentRemove {
        #[serde(default = "default_remove_tournament_size")]
        tournament_size: usize,
        /// Keep the sample's age-fitness front instead of only the winner.
        #[serde(default = "default_protection")]
        protection: bool,
    },
    /// Truncate to the best individuals every generation.
    Elitist {
        /// Truncate along age-fitness fronts instead of raw fitness.
        #[serde(default = "default_protection")]
        protection: bool,
    },
    /// Age-fitness-pareto tournament whose size grows over the run.
    IncreasingTournament(TournamentSchedule),
}

impl Default for SelectionStrategy {
    fn default() -> Self {
        Self::TournamentRemove {
            tournament_size: default_remove_tournament_size(),
            protection: default_protection(),
        }
    }
}

fn default_tournament_size() -> usize {
    3
}
fn default_remove_tournament_size() -> usize {
    2
}
fn default_protection() -> bool {
    true
}

impl SelectionStrategy {
    /// Label recorded in the run specification.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Tournament { .. } => "tournament",
            Self::AgeFitnessPareto { .. } => "tournament-add protection",
            Self::TournamentRemove {
                protection: true, ..
            } => "tournament-remove protection",
            Self::TournamentRemove {
                protection: false, ..
            } => "tournament-remove no protection",
            Self::Elitist { protection: true } => "elitist protection",
            Self::Elitist { protection: false } => "elitist no protection",
            Self::IncreasingTournament(_) => "protection increasing tournament",
        }
    }
}

/// Tournament size schedule: `round(ceiling - span / (1 + gen / half_life))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentSchedule {
    /// Size the schedule approaches as generations grow.
    #[serde(default = "default_schedule_ceiling")]
    pub ceiling: f64,
    /// Distance between the starting size and the ceiling.
    #[serde(default = "default_schedule_span")]
    pub span: f64,
    /// Generations after which half of the span is covered.
    #[serde(default = "default_schedule_half_life")]
    pub half_life: f64,
    /// Generations between two recomputations.
    #[serde(default = "default_schedule_interval")]
    pub interval: usize,
}

impl Default for TournamentSchedule {
    fn default() -> Self {
        Self {
            ceiling: default_schedule_ceiling(),
            span: default_schedule_span(),
            half_life: default_schedule_half_life(),
            interval: default_schedule_interval(),
        }
    }
}

fn default_schedule_ceiling() -> f64 {
    14.0
}
fn default_schedule_span() -> f64 {
    12.0
}
fn default_schedule_half_life() -> f64 {
    150.0
}
fn default_schedule_interval() -> usize {
    10
}

impl TournamentSchedule {
    /// Unrounded schedule value at `generation`.
    pub fn raw_size_at(&self, generation: usize) -> f64 {
        self.ceiling - self.span / (1.0 + generation as f64 / self.half_life)
    }

    /// Tournament size at `generation` (ties round to even, never below 1).
    pub fn size_at(&self, generation: usize) -> usize {
        self.raw_size_at(generation).round_ties_even().max(1.0) as usize
    }
}

/// Hall of fame and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Number of best individuals kept in the hall of fame.
    #[serde(default = "default_hall_of_fame_size")]
    pub hall_of_fame_size: usize,
    /// Root directory for run folders.
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            hall_of_fame_size: default_hall_of_fame_size(),
            output_dir: None,
        }
    }
}

fn default_hall_of_fame_size() -> usize {
    1
}

// ============================================================================
// Records
// ============================================================================

/// Diversity features of one genome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityFeatures {
    /// Body joints, root excluded.
    pub body_joints: usize,
    /// Limb joints.
    pub limb_joints: usize,
    /// Limb pairs mounted directly on a body joint or the root.
    pub limb_pairs: usize,
}

/// Earlier body of an individual, keyed by the age it had reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageRecord {
    pub age: u32,
    pub genome: GenomeDescription,
}

/// Serializable view of an individual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualSnapshot {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub fitness: f32,
    pub morph_age: u32,
    pub module_count: usize,
    pub diversity: DiversityFeatures,
    pub genome: GenomeDescription,
    pub lineage: Vec<LineageRecord>,
}

/// Fitness distribution of one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessStats {
    pub avg: f32,
    pub std: f32,
    pub min: f32,
    pub q1: f32,
    pub median: f32,
    pub q3: f32,
    pub max: f32,
}

/// Statistics recorded after each completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub population_size: usize,
    pub avg_age: f32,
    pub modules_mean: f32,
    pub modules_std: f32,
    pub fitness: FitnessStats,
    /// Fitness of every individual, population order.
    pub fitnesses: Vec<f32>,
    /// Diversity features of every individual, population order.
    pub diversity: Vec<DiversityFeatures>,
    /// Serial joint counts per body segment of every individual.
    pub joint_tables: Vec<Vec<usize>>,
    /// `(fitness, morph_age)` of the twenty fittest individuals.
    pub top: Vec<(f32, u32)>,
    /// Tournament size in effect, for strategies that use one.
    pub tournament_size: Option<usize>,
    pub elapsed_seconds: f64,
}

impl fmt::Display for GenerationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gen {:>4}  pop {:>4}  avg_age {:>7.2}  modules {:>5.2}±{:<5.2}  min {:>7.3}  median {:>7.3}  max {:>7.3}  time {:>6.2}s",
            self.generation,
            self.population_size,
            self.avg_age,
            self.modules_mean,
            self.modules_std,
            self.fitness.min,
            self.fitness.median,
            self.fitness.max,
            self.elapsed_seconds
        )
    }
}

/// Records of all completed generations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvolutionHistory {
    pub records: Vec<GenerationRecord>,
    pub best_of_each_gen: Vec<IndividualSnapshot>,
}

/// Description of a run's strategy and hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSpec {
    pub evolution: String,
    pub strategy: SelectionStrategy,
    pub controller_mutation_rate: f64,
    pub controller_mutation_sigma: f32,
    pub body_mutation_rate: f64,
    pub create_simple: bool,
    pub elitism: usize,
    pub population_size: usize,
    pub generations: usize,
    pub max_modules: usize,
    pub workers: usize,
    pub random_seed: Option<u64>,
}

/// Lifecycle state of an evolution engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No population yet.
    #[default]
    Uninitialized,
    /// Population evaluated, ready for the next step.
    Ready,
    /// A generation is in progress.
    Stepping,
    /// Cancelled; only a reset revives the engine.
    Terminated,
}

/// Reason a run stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Generation budget exhausted.
    MaxGenerations,
    /// Cancellation observed.
    Cancelled,
}

/// Summary statistics of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Completed generations, generation 0 included.
    pub generations: usize,
    pub total_evaluations: u64,
    pub best_fitness: f32,
    pub final_avg_fitness: f32,
    pub elapsed_seconds: f64,
    pub evaluations_per_second: f64,
    pub stop_reason: StopReason,
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    pub spec: RunSpec,
    pub population: Vec<IndividualSnapshot>,
    pub hall_of_fame: Vec<IndividualSnapshot>,
    pub history: EvolutionHistory,
    pub stats: EvolutionStats,
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionConfigError {
    #[error("Population size must be at least 2")]
    PopulationTooSmall,
    #[error("Elitism ({elitism}) must be smaller than the population size ({size})")]
    ElitismTooLarge { elitism: usize, size: usize },
    #[error("Invalid tournament size {size}: {reason}")]
    InvalidTournamentSize { size: usize, reason: &'static str },
    #[error("Invalid tournament schedule: {0}")]
    InvalidSchedule(String),
    #[error("Body mutation rate must lie in [0, 1], got {0}")]
    InvalidBodyMutationRate(f64),
    #[error("Hall of fame size must be non-zero")]
    EmptyHallOfFame,
    #[error("Component config validation failed: {0}")]
    ComponentConfigError(#[from] ConfigError),
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), EvolutionConfigError> {
        self.constraints.validate()?;
        self.controller.validate()?;
        if self.evaluation.workers == 0 {
            return Err(ConfigError::NoWorkers.into());
        }

        if self.population.size < 2 {
            return Err(EvolutionConfigError::PopulationTooSmall);
        }
        if self.population.elitism >= self.population.size {
            return Err(EvolutionConfigError::ElitismTooLarge {
                elitism: self.population.elitism,
                size: self.population.size,
            });
        }
        if !(0.0..=1.0).contains(&self.body.mutation_rate) {
            return Err(EvolutionConfigError::InvalidBodyMutationRate(
                self.body.mutation_rate,
            ));
        }
        if self.archive.hall_of_fame_size == 0 {
            return Err(EvolutionConfigError::EmptyHallOfFame);
        }

        match &self.strategy {
            SelectionStrategy::Tournament { size }
            | SelectionStrategy::AgeFitnessPareto {
                tournament_size: size,
            } if *size == 0 => Err(EvolutionConfigError::InvalidTournamentSize {
                size: *size,
                reason: "must be non-zero",
            }),
            SelectionStrategy::TournamentRemove {
                tournament_size, ..
            } if *tournament_size < 2 => Err(EvolutionConfigError::InvalidTournamentSize {
                size: *tournament_size,
                reason: "remove tournaments need at least two contestants",
            }),
            SelectionStrategy::IncreasingTournament(schedule) => {
                if schedule.interval == 0 {
                    return Err(EvolutionConfigError::InvalidSchedule(
                        "interval must be non-zero".to_string(),
                    ));
                }
                if schedule.half_life <= 0.0 {
                    return Err(EvolutionConfigError::InvalidSchedule(format!(
                        "half_life must be positive, got {}",
                        schedule.half_life
                    )));
                }
                if schedule.span < 0.0 || schedule.ceiling - schedule.span < 0.5 {
                    return Err(EvolutionConfigError::InvalidSchedule(format!(
                        "starting size {} is below one",
                        schedule.ceiling - schedule.span
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = EvolutionConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialization() {
        let config = EvolutionConfig {
            strategy: SelectionStrategy::IncreasingTournament(TournamentSchedule::default()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EvolutionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.population.size, config.population.size);
        assert_eq!(parsed.strategy, config.strategy);
    }

    #[test]
    fn test_strategy_tagged_json() {
        let strategy: SelectionStrategy =
            serde_json::from_str(r#"{"type": "Elitist", "protection": false}"#).unwrap();
        assert_eq!(strategy, SelectionStrategy::Elitist { protection: false });
        assert_eq!(strategy.label(), "elitist no protection");

        let strategy: SelectionStrategy =
            serde_json::from_str(r#"{"type": "IncreasingTournament"}"#).unwrap();
        assert_eq!(
            strategy,
            SelectionStrategy::IncreasingTournament(TournamentSchedule::default())
        );
    }

    #[test]
    fn test_remove_tournament_needs_two() {
        let config = EvolutionConfig {
            strategy: SelectionStrategy::TournamentRemove {
                tournament_size: 1,
                protection: true,
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::InvalidTournamentSize { size: 1, .. })
        ));
    }

    #[test]
    fn test_elitism_bounds() {
        let config = EvolutionConfig {
            population: PopulationConfig {
                size: 4,
                elitism: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EvolutionConfigError::ElitismTooLarge { .. })
        ));
    }

    #[test]
    fn test_schedule_starts_at_two() {
        let schedule = TournamentSchedule::default();
        assert_eq!(schedule.size_at(0), 2);
        assert_eq!(schedule.size_at(150), 8);
    }

    #[test]
    fn test_schedule_changes_shrink_towards_ceiling() {
        let schedule = TournamentSchedule::default();
        let mut previous_raw = schedule.raw_size_at(0);
        let mut previous_delta = f64::INFINITY;
        for generation in (10..2000).step_by(10) {
            let raw = schedule.raw_size_at(generation);
            let delta = raw - previous_raw;
            assert!(delta > 0.0);
            assert!(delta < previous_delta);
            assert!(raw < schedule.ceiling);
            previous_raw = raw;
            previous_delta = delta;
        }
        assert!(schedule.size_at(1_000_000) <= 14);
        assert_eq!(schedule.size_at(1_000_000), 14);
    }
}
