//! Evaluation scheduler: fans a batch of individuals out to a fixed pool of
//! evaluator sessions.
//!
//! Each session is paired with one worker thread for the duration of a
//! batch. Individuals travel through a crossbeam channel, so every one of
//! them is handed to exactly one worker, and the batch is only reported
//! after all workers have joined.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

use log::{debug, error, info};

use crate::robot::Individual;
use crate::schema::EvaluationConfig;

use super::archive::HallOfFame;
use super::fitness::{Evaluator, apply_evaluation};

/// Cooperative cancellation flag shared between the scheduler and its
/// callers. Workers check it before taking the next individual.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Clear the flag so a later run can proceed.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Summary of one evaluated batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Individuals that went through an evaluator, failures included.
    pub evaluated: usize,
    /// Evaluations that ended in an evaluator error.
    pub failed: usize,
    /// Cancellation was observed before the batch was exhausted.
    pub cancelled: bool,
}

/// Owns the evaluator sessions of a run.
pub struct EvaluationScheduler<E: Evaluator> {
    sessions: Vec<E>,
    config: EvaluationConfig,
    token: CancellationToken,
    hall_of_fame: HallOfFame,
}

impl<E: Evaluator> EvaluationScheduler<E> {
    /// `sessions` must not be empty.
    pub fn new(sessions: Vec<E>, config: EvaluationConfig, hall_of_fame_size: usize) -> Self {
        Self {
            sessions,
            config,
            token: CancellationToken::new(),
            hall_of_fame: HallOfFame::new(hall_of_fame_size),
        }
    }

    /// Share an externally owned cancellation flag.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Handle for cancelling from another thread.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn workers(&self) -> usize {
        self.sessions.len()
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn hall_of_fame_mut(&mut self) -> &mut HallOfFame {
        &mut self.hall_of_fame
    }

    /// Evaluate every individual of `batch` and update the hall of fame.
    /// Blocks until all workers are done. A cancelled batch is left out of
    /// the hall of fame.
    pub fn evaluate(&mut self, batch: &mut [Individual]) -> BatchReport {
        let start = Instant::now();
        let report = if self.sessions.len() <= 1 {
            self.evaluate_sequential(batch)
        } else {
            self.evaluate_parallel(batch)
        };
        if report.cancelled {
            info!(
                "Evaluation cancelled after {}/{} individuals",
                report.evaluated,
                batch.len()
            );
        } else {
            self.hall_of_fame.update(batch.iter());
            debug!(
                "Evaluated {} individuals on {} workers in {:.2}s ({} failed)",
                report.evaluated,
                self.sessions.len(),
                start.elapsed().as_secs_f64(),
                report.failed
            );
        }
        report
    }

    fn evaluate_sequential(&mut self, batch: &mut [Individual]) -> BatchReport {
        let mut report = BatchReport::default();
        let Some(session) = self.sessions.first_mut() else {
            report.cancelled = !batch.is_empty();
            return report;
        };
        let total = batch.len();
        let progress_every = (total / 10).max(1);

        for individual in batch.iter_mut() {
            if self.token.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let outcome = session.evaluate(&individual.describe());
            if !apply_evaluation(individual, outcome, &self.config) {
                report.failed += 1;
            }
            report.evaluated += 1;
            if report.evaluated % progress_every == 0 {
                debug!("Evaluating population: {}/{}", report.evaluated, total);
            }
        }
        report
    }

    fn evaluate_parallel(&mut self, batch: &mut [Individual]) -> BatchReport {
        let total = batch.len();
        let (tx, rx) = crossbeam_channel::unbounded::<&mut Individual>();
        for individual in batch.iter_mut() {
            if tx.send(individual).is_err() {
                break;
            }
        }
        drop(tx);

        let config = &self.config;
        let token = &self.token;
        let mut report = BatchReport::default();
        let mut panicked = false;

        thread::scope(|scope| {
            let handles: Vec<_> = self
                .sessions
                .iter_mut()
                .map(|session| {
                    let rx = rx.clone();
                    scope.spawn(move || {
                        let mut evaluated = 0;
                        let mut failed = 0;
                        while !token.is_cancelled() {
                            let Ok(individual) = rx.recv() else {
                                break;
                            };
                            let outcome = session.evaluate(&individual.describe());
                            if !apply_evaluation(individual, outcome, config) {
                                failed += 1;
                            }
                            evaluated += 1;
                        }
                        (evaluated, failed)
                    })
                })
                .collect();

            for (worker, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok((evaluated, failed)) => {
                        report.evaluated += evaluated;
                        report.failed += failed;
                    }
                    Err(_) => {
                        error!("Evaluation worker {} panicked", worker);
                        panicked = true;
                    }
                }
            }
        });

        if panicked && report.evaluated < total {
            error!(
                "{} of {} individuals left unevaluated",
                total - report.evaluated,
                total
            );
        }

        report.cancelled = self.token.is_cancelled() && report.evaluated < total;
        report
    }

    /// Close every session.
    pub fn close(&mut self) {
        for session in &mut self.sessions {
            session.close();
        }
    }
}
