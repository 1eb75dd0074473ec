//! Configuration types for genome construction, mutation and evaluation.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Structural limits and growth parameters of a genome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeConstraints {
    /// Ceiling on the total number of modules (root included).
    #[serde(default = "default_max_modules")]
    pub max_modules: usize,
    /// Lower bound of the random module count of a grown initial genome.
    #[serde(default = "default_min_initial_modules")]
    pub min_initial_modules: usize,
    /// Maximum recursion depth of a single add mutation.
    #[serde(default = "default_max_add_depth")]
    pub max_add_depth: usize,
    /// Probability that an add mutation adds another module.
    #[serde(default = "default_repeat_add_prob")]
    pub repeat_add_prob: f64,
    /// Mounting angles (degrees) a new limb may be created with.
    #[serde(default = "default_rotations")]
    pub rotations: Vec<i32>,
    /// Start from Root + one body joint instead of a randomly grown body.
    #[serde(default = "default_create_simple")]
    pub create_simple: bool,
}

impl Default for GenomeConstraints {
    fn default() -> Self {
        Self {
            max_modules: default_max_modules(),
            min_initial_modules: default_min_initial_modules(),
            max_add_depth: default_max_add_depth(),
            repeat_add_prob: default_repeat_add_prob(),
            rotations: default_rotations(),
            create_simple: default_create_simple(),
        }
    }
}

fn default_max_modules() -> usize {
    30
}
fn default_min_initial_modules() -> usize {
    4
}
fn default_max_add_depth() -> usize {
    6
}
fn default_repeat_add_prob() -> f64 {
    0.5
}
fn default_rotations() -> Vec<i32> {
    vec![0, 90, 180, 270]
}
fn default_create_simple() -> bool {
    true
}

/// Coupled-oscillator parameter ranges and mutation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Per-parameter mutation probability.
    #[serde(default = "default_controller_mutation_rate")]
    pub mutation_rate: f64,
    /// Mutation sigma as a fraction of each parameter's range.
    #[serde(default = "default_controller_mutation_sigma")]
    pub mutation_sigma: f32,
    /// Oscillator angular frequency.
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    /// Allowed amplitude range.
    #[serde(default = "default_amplitude_bounds")]
    pub amplitude_bounds: (f32, f32),
    /// Range a fresh amplitude is drawn from.
    #[serde(default = "default_initial_amplitude_bounds")]
    pub initial_amplitude_bounds: (f32, f32),
    /// Phase offset range. Phase is circular, mutation wraps around it.
    #[serde(default = "default_phase_offset_bounds")]
    pub phase_offset_bounds: (f32, f32),
    /// Allowed offset range.
    #[serde(default = "default_offset_bounds")]
    pub offset_bounds: (f32, f32),
    /// Clamp range of the oscillator output.
    #[serde(default = "default_output_bounds")]
    pub output_bounds: (f32, f32),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_controller_mutation_rate(),
            mutation_sigma: default_controller_mutation_sigma(),
            frequency: default_frequency(),
            amplitude_bounds: default_amplitude_bounds(),
            initial_amplitude_bounds: default_initial_amplitude_bounds(),
            phase_offset_bounds: default_phase_offset_bounds(),
            offset_bounds: default_offset_bounds(),
            output_bounds: default_output_bounds(),
        }
    }
}

fn default_controller_mutation_rate() -> f64 {
    0.33
}
fn default_controller_mutation_sigma() -> f32 {
    0.2
}
fn default_frequency() -> f32 {
    4.0
}
fn default_amplitude_bounds() -> (f32, f32) {
    (0.0, 2.0)
}
fn default_initial_amplitude_bounds() -> (f32, f32) {
    (0.5, 2.0)
}
fn default_phase_offset_bounds() -> (f32, f32) {
    (-PI, PI)
}
fn default_offset_bounds() -> (f32, f32) {
    (-1.0, 1.0)
}
fn default_output_bounds() -> (f32, f32) {
    (-1.0, 1.0)
}

/// Structural (body) mutation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMutationConfig {
    /// Probability that an offspring receives a structural mutation.
    /// Zero evolves controllers only.
    #[serde(default = "default_body_mutation_rate")]
    pub mutation_rate: f64,
}

impl Default for BodyMutationConfig {
    fn default() -> Self {
        Self {
            mutation_rate: default_body_mutation_rate(),
        }
    }
}

fn default_body_mutation_rate() -> f64 {
    1.0
}

/// Settings of the evaluation scheduler and of fitness post-processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of evaluator sessions (and worker threads).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Fitness above this value is treated as a physics glitch and zeroed.
    #[serde(default = "default_max_fitness")]
    pub max_fitness: f32,
    /// Prune genome modules the simulator failed to build.
    #[serde(default = "default_clean_up_genomes")]
    pub clean_up_genomes: bool,
    /// Controller time step used by runtimes driving the oscillators.
    #[serde(default = "default_delta_time")]
    pub delta_time: f32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_fitness: default_max_fitness(),
            clean_up_genomes: default_clean_up_genomes(),
            delta_time: default_delta_time(),
        }
    }
}

fn default_workers() -> usize {
    1
}
fn default_max_fitness() -> f32 {
    80.0
}
fn default_clean_up_genomes() -> bool {
    true
}
fn default_delta_time() -> f32 {
    0.05
}

impl GenomeConstraints {
    /// Validate structural limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_modules < 2 {
            return Err(ConfigError::ModuleCeilingTooLow(self.max_modules));
        }
        if self.min_initial_modules > self.max_modules {
            return Err(ConfigError::InvalidInitialModules {
                min: self.min_initial_modules,
                max: self.max_modules,
            });
        }
        if !(0.0..=1.0).contains(&self.repeat_add_prob) {
            return Err(ConfigError::InvalidProbability {
                name: "repeat_add_prob",
                value: self.repeat_add_prob,
            });
        }
        if self.rotations.is_empty() {
            return Err(ConfigError::NoRotations);
        }
        Ok(())
    }
}

impl ControllerConfig {
    /// Validate parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::InvalidProbability {
                name: "controller.mutation_rate",
                value: self.mutation_rate,
            });
        }
        if self.mutation_sigma < 0.0 {
            return Err(ConfigError::NegativeSigma(self.mutation_sigma));
        }
        let check = |bounds: (f32, f32), name: &'static str| {
            if bounds.0 > bounds.1 {
                Err(ConfigError::InvalidBounds {
                    name,
                    min: bounds.0,
                    max: bounds.1,
                })
            } else {
                Ok(())
            }
        };
        check(self.amplitude_bounds, "amplitude")?;
        check(self.initial_amplitude_bounds, "initial_amplitude")?;
        check(self.phase_offset_bounds, "phase_offset")?;
        check(self.offset_bounds, "offset")?;
        check(self.output_bounds, "output")?;
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Module ceiling must be at least 2 (root + one body joint), got {0}")]
    ModuleCeilingTooLow(usize),
    #[error("Initial module count {min} exceeds the module ceiling {max}")]
    InvalidInitialModules { min: usize, max: usize },
    #[error("Probability {name} must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("At least one limb rotation is required")]
    NoRotations,
    #[error("Mutation sigma must be non-negative, got {0}")]
    NegativeSigma(f32),
    #[error("Invalid {name} bounds: min ({min}) > max ({max})")]
    InvalidBounds { name: &'static str, min: f32, max: f32 },
    #[error("At least one evaluation worker is required")]
    NoWorkers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(GenomeConstraints::default().validate().is_ok());
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ceiling() {
        let constraints = GenomeConstraints {
            max_modules: 1,
            ..Default::default()
        };
        assert!(matches!(
            constraints.validate(),
            Err(ConfigError::ModuleCeilingTooLow(1))
        ));
    }

    #[test]
    fn test_invalid_bounds() {
        let config = ControllerConfig {
            offset_bounds: (1.0, -1.0),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBounds { name: "offset", .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let constraints: GenomeConstraints =
            serde_json::from_str(r#"{"max_modules": 12}"#).unwrap();
        assert_eq!(constraints.max_modules, 12);
        assert_eq!(constraints.rotations, vec![0, 90, 180, 270]);
        assert!(constraints.create_simple);
    }
}
