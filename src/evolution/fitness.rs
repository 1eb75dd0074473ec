//! Evaluator seam between the evolution engine and a simulator.
//!
//! An evaluator session receives a genome description and reports the
//! achieved fitness together with the ids of the modules it managed to
//! build. Sessions are owned by exactly one worker for the lifetime of a
//! run, so they only need to be `Send`.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::robot::Individual;
use crate::schema::{ControllerParams, EvaluationConfig, GenomeDescription, JointType};

/// Outcome of one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub fitness: f32,
    /// Ids of the modules the simulator realized.
    pub realized_modules: HashSet<String>,
}

/// Evaluator session failures.
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("Evaluator session failed: {0}")]
    Session(String),
    #[error("Genome rejected by evaluator: {0}")]
    InvalidGenome(String),
}

/// A simulator session scoring genomes.
pub trait Evaluator: Send {
    fn evaluate(&mut self, genome: &GenomeDescription) -> Result<Evaluation, EvaluatorError>;

    /// Release the session's resources.
    fn close(&mut self) {}
}

/// Fitness after plausibility checks: non-finite values and values above
/// `max_fitness` are physics glitches and score zero. Kept values are
/// rounded to three decimals.
pub fn sanitize_fitness(fitness: f32, max_fitness: f32) -> f32 {
    if !fitness.is_finite() || fitness > max_fitness {
        warn!(
            "Implausible fitness {} (max {}), scoring 0",
            fitness, max_fitness
        );
        return 0.0;
    }
    (fitness * 1000.0).round() / 1000.0
}

/// Write an evaluation outcome onto `individual`, repairing its genome
/// when the simulator built fewer modules than requested. A failed
/// evaluation scores zero and leaves the genome untouched. Returns whether
/// the evaluation succeeded.
pub fn apply_evaluation(
    individual: &mut Individual,
    outcome: Result<Evaluation, EvaluatorError>,
    config: &EvaluationConfig,
) -> bool {
    match outcome {
        Ok(evaluation) => {
            individual.fitness = sanitize_fitness(evaluation.fitness, config.max_fitness);
            if config.clean_up_genomes && evaluation.realized_modules.len() != individual.len() {
                individual.clean_up_genome(&evaluation.realized_modules);
            } else {
                individual.reset_added();
            }
            true
        }
        Err(err) => {
            warn!("Individual {}: {}", individual.id, err);
            individual.fitness = 0.0;
            individual.reset_added();
            false
        }
    }
}

/// Deterministic stand-in for a physics simulator.
///
/// Realizes at most `max_realized_modules` modules in description order
/// and scores the result by driving the coupled oscillators for a fixed
/// number of steps: each realized limb contributes the distance its joint
/// target travels, weighted by how close to the body it sits, body joints
/// contribute a fraction of theirs.
#[derive(Debug, Clone)]
pub struct SurrogateEvaluator {
    max_realized_modules: usize,
    steps: usize,
    delta_time: f32,
    output_bounds: (f32, f32),
    evaluations: u64,
}

impl SurrogateEvaluator {
    pub fn new(max_realized_modules: usize, delta_time: f32) -> Self {
        Self {
            max_realized_modules,
            steps: 300,
            delta_time,
            output_bounds: (-1.0, 1.0),
            evaluations: 0,
        }
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_output_bounds(mut self, bounds: (f32, f32)) -> Self {
        self.output_bounds = bounds;
        self
    }

    /// Completed evaluations of this session.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

impl Default for SurrogateEvaluator {
    fn default() -> Self {
        Self::new(50, 0.05)
    }
}

struct Joint {
    params: ControllerParams,
    parent: Option<usize>,
    weight: f32,
}

impl Evaluator for SurrogateEvaluator {
    fn evaluate(&mut self, genome: &GenomeDescription) -> Result<Evaluation, EvaluatorError> {
        let root = genome
            .nodes
            .first()
            .ok_or_else(|| EvaluatorError::InvalidGenome("empty description".to_string()))?;
        if root.joint_type != JointType::Root {
            return Err(EvaluatorError::InvalidGenome(format!(
                "first module {} is not a root",
                root.id
            )));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        let mut depth: Vec<usize> = Vec::new();
        let mut joints: Vec<Joint> = Vec::new();
        for record in genome.nodes.iter().take(self.max_realized_modules) {
            let parent = if record.parent_id.is_empty() {
                None
            } else {
                match index.get(record.parent_id.as_str()) {
                    Some(&parent) => Some(parent),
                    // Parent was never built, neither is the child.
                    None => continue,
                }
            };
            let level = parent.map_or(0, |p| depth[p] + 1);
            let weight = if record.joint_type.is_limb() {
                1.0 / level.max(1) as f32
            } else {
                0.25
            };
            let params = record.controller.unwrap_or(ControllerParams {
                amplitude: 0.0,
                phase_offset: 0.0,
                offset: 0.0,
                frequency: 0.0,
            });
            index.insert(record.id.as_str(), joints.len());
            depth.push(level);
            joints.push(Joint {
                params,
                parent,
                weight,
            });
        }

        let (low, high) = self.output_bounds;
        let mut phase = vec![0.0f32; joints.len()];
        let mut previous = vec![0.0f32; joints.len()];
        let mut travel = 0.0f32;
        for step in 1..=self.steps {
            let time = step as f32 * self.delta_time;
            for (i, joint) in joints.iter().enumerate() {
                if let Some(parent) = joint.parent {
                    phase[i] = phase[parent] + joint.params.phase_offset;
                }
                let p = &joint.params;
                let target = (p.amplitude * (p.frequency * time + phase[i]).sin() + p.offset)
                    .clamp(low, high);
                if step > 1 {
                    travel += joint.weight * (target - previous[i]).abs();
                }
                previous[i] = target;
            }
        }

        self.evaluations += 1;
        let duration = self.steps as f32 * self.delta_time;
        let fitness = if duration > 0.0 { travel / duration } else { 0.0 };

        Ok(Evaluation {
            fitness,
            realized_modules: index.keys().map(|id| id.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{GenomeRng, MutationContext};
    use crate::schema::{ControllerConfig, GenomeConstraints};

    fn grown(seed: u64) -> Individual {
        let constraints = GenomeConstraints {
            create_simple: false,
            min_initial_modules: 10,
            ..Default::default()
        };
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(seed);
        let mut ctx = MutationContext::new(&constraints, &controller, &mut rng);
        Individual::new(0, &mut ctx)
    }

    #[test]
    fn test_sanitize_fitness() {
        assert_eq!(sanitize_fitness(81.0, 80.0), 0.0);
        assert_eq!(sanitize_fitness(f32::NAN, 80.0), 0.0);
        assert_eq!(sanitize_fitness(1.23456, 80.0), 1.235);
        assert_eq!(sanitize_fitness(-0.5, 80.0), -0.5);
    }

    #[test]
    fn test_surrogate_is_deterministic() {
        let individual = grown(30);
        let genome = individual.describe();
        let mut a = SurrogateEvaluator::default();
        let mut b = SurrogateEvaluator::default();
        let first = a.evaluate(&genome).unwrap();
        let second = b.evaluate(&genome).unwrap();
        assert_eq!(first.fitness, second.fitness);
        assert_eq!(first.realized_modules.len(), individual.len());
        assert_eq!(a.evaluations(), 1);
    }

    #[test]
    fn test_surrogate_realizes_prefix() {
        let individual = grown(31);
        let mut evaluator = SurrogateEvaluator::new(3, 0.05).with_steps(20);
        let evaluation = evaluator.evaluate(&individual.describe()).unwrap();
        assert_eq!(evaluation.realized_modules.len(), 3.min(individual.len()));
        assert!(evaluation.realized_modules.contains("root"));
    }

    #[test]
    fn test_surrogate_rejects_empty() {
        let mut evaluator = SurrogateEvaluator::default();
        assert!(matches!(
            evaluator.evaluate(&GenomeDescription::default()),
            Err(EvaluatorError::InvalidGenome(_))
        ));
    }

    #[test]
    fn test_apply_evaluation_repairs() {
        let mut individual = grown(32);
        let config = EvaluationConfig::default();
        let mut evaluator = SurrogateEvaluator::new(2, 0.05).with_steps(10);
        let outcome = evaluator.evaluate(&individual.describe());
        assert!(apply_evaluation(&mut individual, outcome, &config));
        assert!(individual.fitness >= 0.0);
        assert!(individual.len() <= 2);
        assert_eq!(individual.added(), 0);
    }

    #[test]
    fn test_apply_failed_evaluation() {
        let mut individual = grown(33);
        let modules = individual.len();
        let config = EvaluationConfig::default();
        let outcome = Err(EvaluatorError::Session("connection lost".to_string()));
        assert!(!apply_evaluation(&mut individual, outcome, &config));
        assert_eq!(individual.fitness, 0.0);
        assert_eq!(individual.len(), modules);
    }
}
