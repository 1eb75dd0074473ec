//! Selection strategies over (fitness, morphological age).
//!
//! Fitness always dominates. Morphological age is the secondary Pareto
//! objective: among the survivors of a contest, a lower-fitness member is
//! kept only when it is strictly younger than the previous survivor.

use std::cmp::Ordering;

use crate::robot::{GenomeRng, Individual};

/// Rounds without a single removal after which a remove tournament drops
/// the least fit member other than the youngest.
const STALL_LIMIT: usize = 1000;

/// The two selection objectives.
pub trait AgeFitness {
    fn fitness(&self) -> f32;
    fn morph_age(&self) -> u32;
}

impl AgeFitness for Individual {
    #[inline]
    fn fitness(&self) -> f32 {
        self.fitness
    }

    #[inline]
    fn morph_age(&self) -> u32 {
        self.morph_age
    }
}

/// Descending fitness order.
#[inline]
fn by_fitness<T: AgeFitness>(a: &T, b: &T) -> Ordering {
    b.fitness().total_cmp(&a.fitness())
}

/// Sort `indices` into `population` by descending fitness, stable.
fn sort_indices<T: AgeFitness>(population: &[T], indices: &mut [usize]) {
    indices.sort_by(|&a, &b| by_fitness(&population[a], &population[b]));
}

/// Indices of the `k` fittest members, best first.
pub fn best_indices<T: AgeFitness>(population: &[T], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..population.len()).collect();
    sort_indices(population, &mut indices);
    indices.truncate(k);
    indices
}

/// `k` tournaments of `size` members drawn with replacement; returns the
/// index of each winner.
pub fn tournament<T: AgeFitness>(
    population: &[T],
    k: usize,
    size: usize,
    rng: &mut GenomeRng,
) -> Vec<usize> {
    if population.is_empty() {
        return Vec::new();
    }
    (0..k)
        .map(|_| {
            (0..size.max(1))
                .map(|_| rng.index(population.len()))
                .reduce(|best, i| {
                    if population[i].fitness() > population[best].fitness() {
                        i
                    } else {
                        best
                    }
                })
                .unwrap_or(0)
        })
        .collect()
}

/// Age-fitness Pareto tournaments until at least `n` picks exist.
///
/// Each round samples `size` members with replacement, keeps the fittest,
/// then every further member strictly younger than the previous survivor.
/// The result may exceed `n`.
pub fn pareto_tournament_growth<T: AgeFitness>(
    population: &[T],
    n: usize,
    size: usize,
    rng: &mut GenomeRng,
) -> Vec<usize> {
    let mut picks = Vec::with_capacity(n);
    if population.is_empty() {
        return picks;
    }
    while picks.len() < n {
        let mut sample: Vec<usize> = (0..size.max(1))
            .map(|_| rng.index(population.len()))
            .collect();
        sort_indices(population, &mut sample);

        let mut last = sample[0];
        picks.push(last);
        for &i in &sample[1..] {
            if population[i].morph_age() < population[last].morph_age() {
                picks.push(i);
                last = i;
            }
        }
    }
    picks
}

/// Reduce `population` to `target` members by repeated remove tournaments
/// sampled without replacement.
///
/// Without protection every member but the winner of a sample is removed.
/// With protection only members off the sample's age-fitness front are.
/// Removals never take the population below `target`, the least fit
/// candidates go first. When protection keeps every sample intact for too
/// long, the least fit member other than the youngest is dropped.
pub fn remove_tournament<T: AgeFitness>(
    mut population: Vec<T>,
    target: usize,
    size: usize,
    protection: bool,
    rng: &mut GenomeRng,
) -> Vec<T> {
    let mut stalled = 0;
    while population.len() > target {
        let mut sample = rng.sample_indices(population.len(), size.max(2));
        sort_indices(&population, &mut sample);

        let mut doomed: Vec<usize> = if protection {
            let mut last = sample[0];
            let mut doomed = Vec::new();
            for &i in &sample[1..] {
                if population[i].morph_age() < population[last].morph_age() {
                    last = i;
                } else {
                    doomed.push(i);
                }
            }
            doomed
        } else {
            sample[1..].to_vec()
        };

        if doomed.is_empty() {
            stalled += 1;
            if stalled < STALL_LIMIT {
                continue;
            }
            doomed.extend(stall_victim(&population));
        }
        stalled = 0;

        let excess = population.len() - target;
        if doomed.len() > excess {
            doomed.drain(..doomed.len() - excess);
        }
        doomed.sort_unstable_by(|a, b| b.cmp(a));
        for i in doomed {
            population.remove(i);
        }
    }
    population
}

/// Least fit member that is not the youngest of `population`, so the
/// youngest always survives a stalled remove tournament. A lone member is
/// its own victim.
fn stall_victim<T: AgeFitness>(population: &[T]) -> Option<usize> {
    let youngest = (0..population.len()).min_by_key(|&i| population[i].morph_age())?;
    (0..population.len())
        .filter(|&i| i != youngest)
        .min_by(|&a, &b| population[a].fitness().total_cmp(&population[b].fitness()))
        .or(Some(youngest))
}

/// Peel age-fitness fronts off `population` until `n` members are
/// collected. Members keep front order; the last front is cut to size.
pub fn pareto_selection<T: AgeFitness>(population: Vec<T>, n: usize) -> Vec<T> {
    if population.len() <= n {
        return population;
    }

    let mut remaining = population;
    remaining.sort_by(by_fitness);
    let mut selected = Vec::with_capacity(n);

    while selected.len() < n && !remaining.is_empty() {
        let mut front = Vec::new();
        let mut last_age = u32::MAX;
        for (i, member) in remaining.iter().enumerate() {
            if front.is_empty() || member.morph_age() < last_age {
                front.push(i);
                last_age = member.morph_age();
            }
        }

        let mut rest = Vec::with_capacity(remaining.len() - front.len());
        let mut front_members = Vec::with_capacity(front.len());
        let mut next = front.iter().peekable();
        for (i, member) in remaining.into_iter().enumerate() {
            if next.peek() == Some(&&i) {
                next.next();
                front_members.push(member);
            } else {
                rest.push(member);
            }
        }
        selected.extend(front_members);
        remaining = rest;
    }

    selected.truncate(n);
    selected
}

/// Keep the `n` fittest members, best first.
pub fn truncate_best<T: AgeFitness>(mut population: Vec<T>, n: usize) -> Vec<T> {
    population.sort_by(by_fitness);
    population.truncate(n);
    population
}
