//! Generational loop driving selection, mutation and evaluation.
//!
//! One engine runs every selection strategy. Generational strategies
//! (tournament, age-fitness-pareto, increasing tournament) replace the
//! population with mutated copies of the selected parents plus elites.
//! Steady-state strategies (tournament-remove, elitist) evaluate one
//! mutated copy of every parent and reduce parents plus offspring back to
//! the target size.

use std::time::Instant;

use log::{debug, info, warn};

use crate::robot::{GenomeError, GenomeRng, Individual, MutationContext};
use crate::schema::{
    EngineState, EvolutionConfig, EvolutionConfigError, EvolutionHistory, EvolutionResult,
    EvolutionStats, FitnessStats, GenerationRecord, GenomeDescription, RunSpec,
    SelectionStrategy, StopReason,
};

use super::archive::HallOfFame;
use super::fitness::Evaluator;
use super::scheduler::{CancellationToken, EvaluationScheduler};
use super::selection::{
    best_indices, pareto_selection, pareto_tournament_growth, remove_tournament, tournament,
    truncate_best,
};

/// Number of `(fitness, age)` pairs kept per generation record.
const TOP_RECORDED: usize = 20;

/// Engine misuse and setup errors.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("Invalid evolution config: {0}")]
    Config(#[from] EvolutionConfigError),
    #[error("At least one evaluator session is required")]
    NoSessions,
    #[error("Cannot {operation} while the engine is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: EngineState,
    },
    #[error("Invalid seed genome: {0}")]
    Genome(#[from] GenomeError),
}

/// How a reset or step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The generation was evaluated and recorded.
    Completed,
    /// Cancellation was observed; the generation was discarded.
    Cancelled,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<E: Evaluator> {
    config: EvolutionConfig,
    seed: u64,
    rng: GenomeRng,
    scheduler: EvaluationScheduler<E>,
    seed_genome: Option<GenomeDescription>,
    population: Vec<Individual>,
    population_size: usize,
    elitism: usize,
    generations: usize,
    history: EvolutionHistory,
    state: EngineState,
    generation: usize,
    tournament_size: Option<usize>,
    next_id: u64,
    total_evaluations: u64,
    best_fitness: f32,
}

impl<E: Evaluator> EvolutionEngine<E> {
    /// Create an engine owning one evaluator session per worker.
    pub fn new(config: EvolutionConfig, sessions: Vec<E>) -> Result<Self, EvolutionError> {
        config.validate()?;
        if sessions.is_empty() {
            return Err(EvolutionError::NoSessions);
        }
        if sessions.len() != config.evaluation.workers {
            warn!(
                "Config asks for {} workers, running with {} sessions",
                config.evaluation.workers,
                sessions.len()
            );
        }

        let seed = config.random_seed.unwrap_or_else(rand::random);
        let scheduler = EvaluationScheduler::new(
            sessions,
            config.evaluation.clone(),
            config.archive.hall_of_fame_size,
        );

        Ok(Self {
            seed,
            rng: GenomeRng::new(seed),
            scheduler,
            seed_genome: None,
            population: Vec::new(),
            population_size: config.population.size,
            elitism: config.population.elitism,
            generations: config.population.generations,
            history: EvolutionHistory::default(),
            state: EngineState::Uninitialized,
            generation: 0,
            tournament_size: None,
            next_id: 0,
            total_evaluations: 0,
            best_fitness: f32::NEG_INFINITY,
            config,
        })
    }

    /// Start every run from copies of a stored genome instead of random
    /// bodies.
    pub fn with_seed_genome(mut self, genome: GenomeDescription) -> Result<Self, EvolutionError> {
        let mut ctx = MutationContext::new(
            &self.config.constraints,
            &self.config.controller,
            &mut self.rng,
        );
        Individual::from_description(0, &genome, &mut ctx)?;
        self.seed_genome = Some(genome);
        Ok(self)
    }

    /// Share an externally owned cancellation flag.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.scheduler = self.scheduler.with_token(token);
        self
    }

    /// Handle for cancelling the run from another thread.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.scheduler.token()
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Last completed generation.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn history(&self) -> &EvolutionHistory {
        &self.history
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        self.scheduler.hall_of_fame()
    }

    /// Tournament size in effect, for strategies that use one.
    pub fn tournament_size(&self) -> Option<usize> {
        self.tournament_size
    }

    /// Seed the generator was started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Replace the population with `population_size` fresh individuals,
    /// evaluate them and record generation 0.
    pub fn reset(&mut self, population_size: usize) -> Result<StepOutcome, EvolutionError> {
        if population_size < 2 {
            return Err(EvolutionConfigError::PopulationTooSmall.into());
        }
        let start = Instant::now();
        self.scheduler.token().reset();
        self.scheduler.hall_of_fame_mut().clear();
        self.history = EvolutionHistory::default();
        self.population.clear();
        self.population_size = population_size;
        self.generation = 0;
        self.next_id = 0;
        self.total_evaluations = 0;
        self.best_fitness = f32::NEG_INFINITY;
        self.tournament_size = self.initial_tournament_size();

        let mut population = self.spawn_population(population_size)?;
        if !self.evaluate(&mut population) {
            self.state = EngineState::Terminated;
            return Ok(StepOutcome::Cancelled);
        }
        self.population = population;
        self.record_generation(start.elapsed().as_secs_f64());
        self.state = EngineState::Ready;
        Ok(StepOutcome::Completed)
    }

    /// Advance one generation. Blocks until its evaluations are done.
    pub fn step(&mut self) -> Result<StepOutcome, EvolutionError> {
        if self.state != EngineState::Ready {
            return Err(EvolutionError::InvalidState {
                operation: "step",
                state: self.state,
            });
        }
        let start = Instant::now();
        self.state = EngineState::Stepping;
        self.generation += 1;
        let previous_tournament_size = self.tournament_size;

        let strategy = self.config.strategy.clone();
        if let SelectionStrategy::IncreasingTournament(schedule) = &strategy
            && self.generation % schedule.interval == 0
        {
            let size = schedule.size_at(self.generation);
            if self.tournament_size != Some(size) {
                debug!("Generation {}: tournament size {}", self.generation, size);
            }
            self.tournament_size = Some(size);
        }

        let next = match strategy {
            SelectionStrategy::Tournament { size } => {
                self.generational_step(|population, n, rng| tournament(population, n, size, rng))
            }
            SelectionStrategy::AgeFitnessPareto { tournament_size } => {
                self.generational_step(|population, n, rng| {
                    pareto_tournament_growth(population, n, tournament_size, rng)
                })
            }
            SelectionStrategy::IncreasingTournament(_) => {
                let size = self.tournament_size.unwrap_or(1);
                self.generational_step(|population, n, rng| {
                    pareto_tournament_growth(population, n, size, rng)
                })
            }
            SelectionStrategy::TournamentRemove {
                tournament_size,
                protection,
            } => self.steady_state_step(|population, n, rng| {
                remove_tournament(population, n, tournament_size, protection, rng)
            }),
            SelectionStrategy::Elitist { protection } => {
                self.steady_state_step(|population, n, _| {
                    if protection {
                        pareto_selection(population, n)
                    } else {
                        truncate_best(population, n)
                    }
                })
            }
        };

        match next {
            Some(population) => {
                self.population = population;
                self.record_generation(start.elapsed().as_secs_f64());
                self.state = EngineState::Ready;
                Ok(StepOutcome::Completed)
            }
            None => {
                self.generation -= 1;
                self.tournament_size = previous_tournament_size;
                self.state = EngineState::Terminated;
                info!(
                    "Run cancelled, keeping generation {} ({} individuals)",
                    self.generation,
                    self.population.len()
                );
                Ok(StepOutcome::Cancelled)
            }
        }
    }

    /// Run with the population settings of the config.
    pub fn run<F>(&mut self, callback: F) -> Result<EvolutionResult, EvolutionError>
    where
        F: FnMut(&GenerationRecord),
    {
        let population = &self.config.population;
        let (size, generations, elitism) =
            (population.size, population.generations, population.elitism);
        self.run_for(size, generations, elitism, callback)
    }

    /// Reset, then step until `generations` generations (generation 0
    /// included) are recorded or cancellation is observed. Every record is
    /// passed to `callback`.
    pub fn run_for<F>(
        &mut self,
        population_size: usize,
        generations: usize,
        elitism: usize,
        mut callback: F,
    ) -> Result<EvolutionResult, EvolutionError>
    where
        F: FnMut(&GenerationRecord),
    {
        if elitism >= population_size {
            return Err(EvolutionConfigError::ElitismTooLarge {
                elitism,
                size: population_size,
            }
            .into());
        }
        let start = Instant::now();
        self.elitism = elitism;
        self.generations = generations;
        info!(
            "Starting {} run: {} individuals, {} generations, {} workers",
            self.config.strategy.label(),
            population_size,
            generations,
            self.scheduler.workers()
        );

        let mut stop_reason = StopReason::MaxGenerations;
        if self.reset(population_size)? == StepOutcome::Cancelled {
            stop_reason = StopReason::Cancelled;
        } else {
            if let Some(record) = self.history.records.last() {
                callback(record);
            }
            for _ in 1..generations {
                if self.step()? == StepOutcome::Cancelled {
                    stop_reason = StopReason::Cancelled;
                    break;
                }
                if let Some(record) = self.history.records.last() {
                    callback(record);
                }
            }
        }

        Ok(self.result(stop_reason, start.elapsed().as_secs_f64()))
    }

    /// Close every evaluator session.
    pub fn close(&mut self) {
        self.scheduler.close();
    }

    fn initial_tournament_size(&self) -> Option<usize> {
        match &self.config.strategy {
            SelectionStrategy::Tournament { size } => Some(*size),
            SelectionStrategy::AgeFitnessPareto { tournament_size }
            | SelectionStrategy::TournamentRemove {
                tournament_size, ..
            } => Some(*tournament_size),
            SelectionStrategy::IncreasingTournament(schedule) => Some(schedule.size_at(0)),
            SelectionStrategy::Elitist { .. } => None,
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn spawn_population(&mut self, n: usize) -> Result<Vec<Individual>, EvolutionError> {
        let mut ctx = MutationContext::new(
            &self.config.constraints,
            &self.config.controller,
            &mut self.rng,
        );
        let mut population = Vec::with_capacity(n);
        for _ in 0..n {
            let id = self.next_id;
            self.next_id += 1;
            let individual = match &self.seed_genome {
                Some(genome) => Individual::from_description(id, genome, &mut ctx)?,
                None => Individual::new(id, &mut ctx),
            };
            population.push(individual);
        }
        Ok(population)
    }

    /// Evaluate `batch`; false when cancellation cut it short.
    fn evaluate(&mut self, batch: &mut [Individual]) -> bool {
        let report = self.scheduler.evaluate(batch);
        self.total_evaluations += report.evaluated as u64;
        !report.cancelled
    }

    fn generational_step<F>(&mut self, select: F) -> Option<Vec<Individual>>
    where
        F: FnOnce(&[Individual], usize, &mut GenomeRng) -> Vec<usize>,
    {
        let elitism = self.elitism.min(self.population.len());
        let picks = select(
            &self.population,
            self.population_size.saturating_sub(elitism),
            &mut self.rng,
        );

        let mut next = Vec::with_capacity(picks.len() + elitism);
        for i in picks {
            let id = self.next_id();
            next.push(self.population[i].offspring(id));
        }

        let body_rate = self.config.body.mutation_rate;
        let mut ctx = MutationContext::new(
            &self.config.constraints,
            &self.config.controller,
            &mut self.rng,
        );
        for child in &mut next {
            child.mutate_controller(&self.config.controller, ctx.rng);
            if body_rate > 0.0 {
                child.mutate_body(body_rate, &mut ctx);
            }
        }
        next.extend(
            best_indices(&self.population, elitism)
                .into_iter()
                .map(|i| self.population[i].clone()),
        );

        self.evaluate(&mut next).then_some(next)
    }

    fn steady_state_step<F>(&mut self, select: F) -> Option<Vec<Individual>>
    where
        F: FnOnce(Vec<Individual>, usize, &mut GenomeRng) -> Vec<Individual>,
    {
        let mut offspring = Vec::with_capacity(self.population.len());
        for i in 0..self.population.len() {
            let id = self.next_id();
            offspring.push(self.population[i].offspring(id));
        }

        let body_rate = self.config.body.mutation_rate;
        let mut ctx = MutationContext::new(
            &self.config.constraints,
            &self.config.controller,
            &mut self.rng,
        );
        for child in &mut offspring {
            if ctx.rng.chance(0.5) {
                child.mutate_controller(&self.config.controller, ctx.rng);
            } else {
                child.mutate_body(body_rate, &mut ctx);
            }
        }

        // Only the offspring need fitness.
        if !self.evaluate(&mut offspring) {
            return None;
        }

        let mut combined = std::mem::take(&mut self.population);
        for parent in &mut combined {
            parent.morph_age += 1;
        }
        combined.extend(offspring);
        Some(select(combined, self.population_size, &mut self.rng))
    }

    fn record_generation(&mut self, elapsed_seconds: f64) {
        let population = &self.population;
        let count = population.len().max(1) as f32;

        let fitnesses: Vec<f32> = population.iter().map(|i| i.fitness).collect();
        let fitness = fitness_stats(&fitnesses);
        let avg_age = population.iter().map(|i| i.morph_age as f32).sum::<f32>() / count;
        let modules: Vec<f32> = population.iter().map(|i| i.len() as f32).collect();
        let (modules_mean, modules_std) = mean_std(&modules);

        let ranked = best_indices(population, TOP_RECORDED);
        let top = ranked
            .iter()
            .map(|&i| (population[i].fitness, population[i].morph_age))
            .collect();
        if let Some(&best) = ranked.first() {
            self.history
                .best_of_each_gen
                .push(population[best].to_snapshot());
        }

        let record = GenerationRecord {
            generation: self.generation,
            population_size: population.len(),
            avg_age,
            modules_mean,
            modules_std,
            fitness,
            fitnesses,
            diversity: population.iter().map(Individual::diversity).collect(),
            joint_tables: population.iter().map(Individual::joint_table).collect(),
            top,
            tournament_size: self.tournament_size,
            elapsed_seconds,
        };
        info!("{}", record);

        self.best_fitness = self.best_fitness.max(record.fitness.max);
        self.history.records.push(record);
    }

    fn run_spec(&self) -> RunSpec {
        RunSpec {
            evolution: self.config.strategy.label().to_string(),
            strategy: self.config.strategy.clone(),
            controller_mutation_rate: self.config.controller.mutation_rate,
            controller_mutation_sigma: self.config.controller.mutation_sigma,
            body_mutation_rate: self.config.body.mutation_rate,
            create_simple: self.config.constraints.create_simple,
            elitism: self.elitism,
            population_size: self.population_size,
            generations: self.generations,
            max_modules: self.config.constraints.max_modules,
            workers: self.scheduler.workers(),
            random_seed: Some(self.seed),
        }
    }

    fn result(&self, stop_reason: StopReason, elapsed_seconds: f64) -> EvolutionResult {
        let final_avg_fitness = if self.population.is_empty() {
            0.0
        } else {
            self.population.iter().map(|i| i.fitness).sum::<f32>() / self.population.len() as f32
        };
        let evaluations_per_second = if elapsed_seconds > 0.0 {
            self.total_evaluations as f64 / elapsed_seconds
        } else {
            0.0
        };

        EvolutionResult {
            spec: self.run_spec(),
            population: self.population.iter().map(Individual::to_snapshot).collect(),
            hall_of_fame: self.hall_of_fame().members().to_vec(),
            history: self.history.clone(),
            stats: EvolutionStats {
                generations: self.history.records.len(),
                total_evaluations: self.total_evaluations,
                best_fitness: self.best_fitness,
                final_avg_fitness,
                elapsed_seconds,
                evaluations_per_second,
                stop_reason,
            },
        }
    }
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

/// Quantile of sorted values with linear interpolation between ranks.
fn quantile(sorted: &[f32], q: f32) -> f32 {
    let position = q * (sorted.len() - 1) as f32;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    sorted[low] + (sorted[high] - sorted[low]) * (position - low as f32)
}

/// Distribution summary of one generation's fitness values.
pub fn fitness_stats(values: &[f32]) -> FitnessStats {
    if values.is_empty() {
        return FitnessStats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let (avg, std) = mean_std(values);

    FitnessStats {
        avg,
        std,
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::evolution::fitness::{Evaluation, EvaluatorError, SurrogateEvaluator};
    use crate::schema::{GenomeConstraints, PopulationConfig, TournamentSchedule};

    fn config(strategy: SelectionStrategy) -> EvolutionConfig {
        EvolutionConfig {
            population: PopulationConfig {
                size: 6,
                generations: 4,
                elitism: 0,
            },
            strategy,
            constraints: GenomeConstraints {
                max_modules: 10,
                ..Default::default()
            },
            random_seed: Some(7),
            ..Default::default()
        }
    }

    fn sessions(n: usize) -> Vec<SurrogateEvaluator> {
        (0..n)
            .map(|_| SurrogateEvaluator::default().with_steps(20))
            .collect()
    }

    /// Surrogate that cancels the run on one specific call.
    struct CancellingEvaluator {
        inner: SurrogateEvaluator,
        calls: Arc<AtomicUsize>,
        cancel_on: usize,
        token: CancellationToken,
    }

    impl Evaluator for CancellingEvaluator {
        fn evaluate(&mut self, genome: &GenomeDescription) -> Result<Evaluation, EvaluatorError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.cancel_on {
                self.token.cancel();
            }
            self.inner.evaluate(genome)
        }
    }

    #[test]
    fn test_rejects_missing_sessions() {
        let result = EvolutionEngine::<SurrogateEvaluator>::new(
            config(SelectionStrategy::default()),
            Vec::new(),
        );
        assert!(matches!(result, Err(EvolutionError::NoSessions)));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut bad = config(SelectionStrategy::default());
        bad.population.size = 1;
        assert!(matches!(
            EvolutionEngine::new(bad, sessions(1)),
            Err(EvolutionError::Config(EvolutionConfigError::PopulationTooSmall))
        ));
    }

    #[test]
    fn test_step_requires_reset() {
        let mut engine = EvolutionEngine::new(config(SelectionStrategy::default()), sessions(1))
            .unwrap();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(
            engine.step(),
            Err(EvolutionError::InvalidState {
                operation: "step",
                state: EngineState::Uninitialized
            })
        ));
    }

    #[test]
    fn test_reset_records_generation_zero() {
        let mut engine =
            EvolutionEngine::new(config(SelectionStrategy::default()), sessions(1)).unwrap();
        assert_eq!(engine.reset(6).unwrap(), StepOutcome::Completed);
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.population().len(), 6);
        assert!(engine.population().iter().all(Individual::is_evaluated));

        let history = engine.history();
        assert_eq!(history.records.len(), 1);
        assert_eq!(history.records[0].generation, 0);
        assert_eq!(history.records[0].fitnesses.len(), 6);
        assert_eq!(history.best_of_each_gen.len(), 1);
        assert_eq!(engine.hall_of_fame().len(), 1);
    }

    #[test]
    fn test_generational_run() {
        let mut engine = EvolutionEngine::new(
            config(SelectionStrategy::Tournament { size: 3 }),
            sessions(2),
        )
        .unwrap();
        let mut streamed = Vec::new();
        let result = engine.run(|record| streamed.push(record.generation)).unwrap();

        assert_eq!(streamed, vec![0, 1, 2, 3]);
        assert_eq!(result.stats.generations, 4);
        assert_eq!(result.stats.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.stats.total_evaluations, 24);
        assert_eq!(result.population.len(), 6);
        assert_eq!(result.history.best_of_each_gen.len(), 4);
        assert_eq!(result.spec.evolution, "tournament");
        assert_eq!(result.spec.random_seed, Some(7));
        assert_eq!(engine.generation(), 3);
        assert!(result.population.iter().all(|i| i.parent_id.is_some()));
    }

    #[test]
    fn test_elites_survive() {
        let mut cfg = config(SelectionStrategy::Tournament { size: 2 });
        cfg.population.elitism = 1;
        let mut engine = EvolutionEngine::new(cfg, sessions(1)).unwrap();
        engine.reset(6).unwrap();

        for _ in 0..3 {
            let best = engine.population()[best_indices(engine.population(), 1)[0]].id;
            engine.step().unwrap();
            assert!(engine.population().iter().any(|i| i.id == best));
            assert_eq!(engine.population().len(), 6);
        }
    }

    #[test]
    fn test_steady_state_keeps_size() {
        for protection in [true, false] {
            let strategy = SelectionStrategy::TournamentRemove {
                tournament_size: 3,
                protection,
            };
            let mut engine = EvolutionEngine::new(config(strategy), sessions(1)).unwrap();
            let result = engine.run(|_| {}).unwrap();
            for record in &result.history.records {
                assert_eq!(record.population_size, 6);
            }
            // Generation 0 plus one offspring per parent and generation.
            assert_eq!(result.stats.total_evaluations, 6 * 4);
        }
    }

    #[test]
    fn test_elitist_best_never_drops() {
        let strategy = SelectionStrategy::Elitist { protection: false };
        let mut engine = EvolutionEngine::new(config(strategy), sessions(1)).unwrap();
        let result = engine.run(|_| {}).unwrap();
        let maxima: Vec<f32> = result
            .history
            .records
            .iter()
            .map(|r| r.fitness.max)
            .collect();
        assert!(maxima.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(result.stats.best_fitness, maxima[maxima.len() - 1]);
    }

    #[test]
    fn test_increasing_tournament_schedule() {
        let schedule = TournamentSchedule::default();
        let strategy = SelectionStrategy::IncreasingTournament(schedule.clone());
        let mut cfg = config(strategy);
        cfg.constraints.max_modules = 4;
        let mut engine = EvolutionEngine::new(cfg, sessions(1)).unwrap();
        engine.reset(4).unwrap();
        assert_eq!(engine.tournament_size(), Some(2));

        for _ in 0..10 {
            engine.step().unwrap();
        }
        assert_eq!(engine.generation(), 10);
        assert_eq!(engine.tournament_size(), Some(schedule.size_at(10)));
        assert_eq!(engine.tournament_size(), Some(3));
        assert_eq!(engine.history().records[10].tournament_size, Some(3));
    }

    #[test]
    fn test_cancellation_discards_generation() {
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let evaluator = CancellingEvaluator {
            inner: SurrogateEvaluator::default().with_steps(20),
            calls: Arc::clone(&calls),
            cancel_on: 9,
            token: token.clone(),
        };
        let mut engine = EvolutionEngine::new(
            config(SelectionStrategy::Tournament { size: 2 }),
            vec![evaluator],
        )
        .unwrap()
        .with_cancellation(token);

        let result = engine.run(|_| {}).unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.stats.generations, 1);
        assert_eq!(engine.state(), EngineState::Terminated);
        assert_eq!(engine.generation(), 0);

        let ids: HashSet<u64> = result.population.iter().map(|i| i.id).collect();
        assert_eq!(ids, (0..6).collect::<HashSet<u64>>());
        assert!(result.population.iter().all(|i| i.fitness >= 0.0));
        assert!(matches!(
            engine.step(),
            Err(EvolutionError::InvalidState {
                state: EngineState::Terminated,
                ..
            })
        ));

        // A reset revives the engine.
        assert_eq!(engine.reset(6).unwrap(), StepOutcome::Completed);
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.history().records.len(), 1);
    }

    #[test]
    fn test_interrupt_between_generations_keeps_completed_history() {
        let mut engine = EvolutionEngine::new(
            config(SelectionStrategy::Tournament { size: 2 }),
            vec![SurrogateEvaluator::default().with_steps(20)],
        )
        .unwrap();
        let interrupt = engine.cancel_handle();

        let result = engine
            .run(|record| {
                if record.generation == 1 {
                    interrupt.cancel();
                }
            })
            .unwrap();
        assert_eq!(result.stats.stop_reason, StopReason::Cancelled);
        assert_eq!(result.history.records.len(), 2);
        assert_eq!(engine.generation(), 1);
        assert!(result.population.iter().all(|i| i.fitness >= 0.0));

        let tmp = tempfile::tempdir().unwrap();
        let archive = crate::evolution::RunArchive::create(tmp.path()).unwrap();
        archive.save(&result).unwrap();
        let loaded = archive.load().unwrap();
        assert_eq!(loaded.history.records.len(), 2);
        assert_eq!(loaded.stats.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn test_seed_genome_population() {
        let cfg = config(SelectionStrategy::default());
        let mut rng = GenomeRng::new(3);
        let grown_constraints = GenomeConstraints {
            create_simple: false,
            max_modules: 8,
            min_initial_modules: 6,
            ..Default::default()
        };
        let mut ctx = MutationContext::new(&grown_constraints, &cfg.controller, &mut rng);
        let genome = Individual::new(0, &mut ctx).describe();

        let mut engine = EvolutionEngine::new(cfg, sessions(1))
            .unwrap()
            .with_seed_genome(genome.clone())
            .unwrap();
        engine.reset(4).unwrap();
        for individual in engine.population() {
            assert_eq!(individual.describe().id_set(), genome.id_set());
        }
    }

    #[test]
    fn test_seed_genome_rejected() {
        let engine = EvolutionEngine::new(config(SelectionStrategy::default()), sessions(1))
            .unwrap()
            .with_seed_genome(GenomeDescription::default());
        assert!(matches!(engine, Err(EvolutionError::Genome(_))));
    }

    #[test]
    fn test_fitness_stats_quantiles() {
        let stats = fitness_stats(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.median, 2.5);
        assert_eq!(stats.q1, 1.75);
        assert_eq!(stats.q3, 3.25);
        assert_eq!(stats.avg, 2.5);
        assert!((stats.std - 1.25f32.sqrt()).abs() < 1e-6);
        assert_eq!(fitness_stats(&[]), FitnessStats::default());
    }
}
