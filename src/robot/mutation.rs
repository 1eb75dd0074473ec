//! Mutation engine: controller perturbation, structural mutation and genome
//! repair after partial construction.

use std::collections::HashSet;

use log::debug;

use crate::schema::{ControllerConfig, GenomeConstraints};

use super::{GenomeRng, Growth, Individual, ModuleId, ModuleKind};

/// Configuration and randomness shared by every genome operation.
pub struct MutationContext<'a> {
    pub constraints: &'a GenomeConstraints,
    pub controller: &'a ControllerConfig,
    pub rng: &'a mut GenomeRng,
}

impl<'a> MutationContext<'a> {
    pub fn new(
        constraints: &'a GenomeConstraints,
        controller: &'a ControllerConfig,
        rng: &'a mut GenomeRng,
    ) -> Self {
        Self {
            constraints,
            controller,
            rng,
        }
    }

    pub(super) fn growth(&mut self, init: bool) -> Growth<'_> {
        Growth {
            rng: &mut *self.rng,
            controller: self.controller,
            rotations: &self.constraints.rotations,
            init,
        }
    }
}

/// Structural mutation operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOperator {
    Add,
    Remove,
    Swap,
}

impl MutationOperator {
    pub const ALL: [MutationOperator; 3] = [
        MutationOperator::Add,
        MutationOperator::Remove,
        MutationOperator::Swap,
    ];
}

impl Individual {
    /// Perturb every module's controller and age the individual by one.
    pub fn mutate_controller(&mut self, config: &ControllerConfig, rng: &mut GenomeRng) {
        self.tree
            .for_each_controller_mut(|controller| controller.mutate(config, rng));
        self.morph_age += 1;
    }

    /// With probability `rate`, apply one structural operator.
    ///
    /// Operators are tried in random order until one succeeds. On success
    /// the pre-mutation body is appended to the lineage and the morphological
    /// age restarts at zero. Returns the operator that was applied.
    pub fn mutate_body(
        &mut self,
        rate: f64,
        ctx: &mut MutationContext<'_>,
    ) -> Option<MutationOperator> {
        if !ctx.rng.chance(rate) {
            return None;
        }

        let before = self.snapshot();
        let mut remaining = MutationOperator::ALL.to_vec();
        while !remaining.is_empty() {
            let operator = remaining.remove(ctx.rng.index(remaining.len()));
            let applied = match operator {
                MutationOperator::Add => self.add_module(1, false, ctx),
                MutationOperator::Remove => self.remove_module(ctx.rng),
                MutationOperator::Swap => self.swap_module(ctx),
            };
            if applied {
                self.prev_age = self.morph_age;
                self.morph_age = 0;
                self.record.push((self.prev_age, before));
                debug!(
                    "Individual {}: {:?} applied, {} modules",
                    self.id,
                    operator,
                    self.len()
                );
                return Some(operator);
            }
        }
        None
    }

    /// Attach a body joint or a limb pair, then with `repeat_add_prob`
    /// keep adding. Depth beyond `max_add_depth` counts as success.
    pub fn add_module(&mut self, depth: usize, init: bool, ctx: &mut MutationContext<'_>) -> bool {
        if depth > ctx.constraints.max_add_depth {
            return true;
        }
        let max_modules = ctx.constraints.max_modules;
        if self.len() >= max_modules {
            return false;
        }

        let body_slots: Vec<&ModuleId> = self
            .modules
            .iter()
            .filter(|id| self.tree.get(id.as_str()).is_some_and(|m| m.can_add_body()))
            .collect();
        let limb_slots: Vec<&ModuleId> = if self.len() + 2 <= max_modules {
            self.without_complementaries
                .iter()
                .filter(|id| self.tree.get(id.as_str()).is_some_and(|m| m.can_add_limb()))
                .collect()
        } else {
            Vec::new()
        };
        if body_slots.is_empty() && limb_slots.is_empty() {
            return false;
        }

        let body_connectors = body_slots.len();
        let limb_connectors: usize = if limb_slots.is_empty() {
            0
        } else {
            self.modules
                .iter()
                .filter_map(|id| self.tree.get(id.as_str()))
                .filter(|m| m.can_add_limb())
                .map(|m| if m.kind() == ModuleKind::Limb { 3 } else { 2 })
                .sum()
        };
        let chance_of_body = body_connectors as f64 / (body_connectors + limb_connectors) as f64;

        let attach_body = ctx.rng.chance(chance_of_body);
        let target = if attach_body {
            ctx.rng.choose(&body_slots)
        } else {
            ctx.rng.choose(&limb_slots)
        };
        let Some(target) = target.map(|id| (*id).clone()) else {
            return false;
        };

        let mut growth = ctx.growth(init);
        let attached = if attach_body {
            self.tree.add_body(target.as_str(), &mut growth)
        } else {
            self.tree.add_limb(target.as_str(), &mut growth)
        };
        if !attached {
            return false;
        }

        self.added += 1;
        self.regenerate_lists();
        if ctx.rng.chance(ctx.constraints.repeat_add_prob) {
            self.add_module(depth + 1, init, ctx);
        }
        true
    }

    /// Remove a random non-root module (a limb takes its peer along).
    pub fn remove_module(&mut self, rng: &mut GenomeRng) -> bool {
        let Some(target) = rng.choose(&self.without_complementaries[1..]).cloned() else {
            return false;
        };
        if !self.tree.remove(target.as_str()) {
            return false;
        }
        self.regenerate_lists();
        true
    }

    /// Re-roll a random non-root module.
    pub fn swap_module(&mut self, ctx: &mut MutationContext<'_>) -> bool {
        let Some(target) = ctx.rng.choose(&self.without_complementaries[1..]).cloned() else {
            return false;
        };
        self.tree.swap(target.as_str(), &mut ctx.growth(false))
    }

    /// Prune modules the evaluator could not build.
    ///
    /// Each representative of the collapsed module list that is missing from
    /// `realized`, or whose peer is, is removed with its peer and counts once.
    /// When exactly the modules added since the last evaluation failed, the
    /// last structural mutation is rolled back in the age bookkeeping. Returns
    /// the number of representatives removed.
    pub fn clean_up_genome(&mut self, realized: &HashSet<String>) -> usize {
        let candidates: Vec<(ModuleId, Option<ModuleId>)> = self
            .without_complementaries
            .iter()
            .skip(1)
            .filter_map(|id| self.tree.get(id.as_str()))
            .map(|m| (m.id().clone(), m.peer().cloned()))
            .collect();

        let mut removed = 0;
        for (id, peer) in candidates {
            let missing = !realized.contains(id.as_str())
                || peer.is_some_and(|peer| !realized.contains(peer.as_str()));
            if missing {
                self.tree.remove(id.as_str());
                removed += 1;
            }
        }

        if removed != 0 {
            if removed == self.added {
                self.record.pop();
                self.morph_age = self.prev_age + 1;
            }
            self.regenerate_lists();
            debug!(
                "Individual {}: removed {} unrealized modules, {} remain",
                self.id,
                removed,
                self.len()
            );
        }
        self.added = 0;
        removed
    }
}
