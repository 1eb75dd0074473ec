//! A population member: one module tree plus evolutionary bookkeeping.

use std::collections::HashSet;

use crate::schema::{
    DiversityFeatures, GenomeDescription, IndividualSnapshot, LineageRecord,
};

use super::{GenomeError, ModuleId, ModuleKind, ModuleTree, MutationContext, Oscillator};

/// Evolvable robot.
///
/// The module lists are derived from the tree and regenerated after every
/// structural change: `modules` in breadth-first order, and
/// `without_complementaries` keeping only the first-encountered limb of every
/// complementary pair.
#[derive(Debug)]
pub struct Individual {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub fitness: f32,
    pub morph_age: u32,
    pub(super) prev_age: u32,
    pub(super) added: usize,
    pub(super) tree: ModuleTree,
    pub(super) modules: Vec<ModuleId>,
    pub(super) without_complementaries: Vec<ModuleId>,
    pub(super) record: Vec<(u32, Individual)>,
    diversity: DiversityFeatures,
}

impl Individual {
    /// Fitness of an individual that has not been evaluated yet.
    pub const UNEVALUATED: f32 = -1.0;

    /// Root plus one mandatory body joint, grown to a random size unless
    /// `create_simple` is set.
    pub fn new(id: u64, ctx: &mut MutationContext<'_>) -> Self {
        let root = Oscillator::random(ctx.controller, ctx.rng);
        let mut tree = ModuleTree::new(root);
        tree.add_body(ModuleId::ROOT, &mut ctx.growth(false));

        let mut individual = Self::from_tree(id, tree);
        if !ctx.constraints.create_simple {
            let low = ctx.constraints.min_initial_modules.max(individual.len());
            let high = ctx.constraints.max_modules.max(low);
            let target = low + ctx.rng.index(high - low + 1);
            while individual.len() < target {
                if !individual.add_module(1, true, ctx) {
                    break;
                }
            }
            individual.added = 0;
        }
        individual
    }

    /// Individual built from a stored genome description.
    pub fn from_description(
        id: u64,
        description: &GenomeDescription,
        ctx: &mut MutationContext<'_>,
    ) -> Result<Self, GenomeError> {
        let tree = ModuleTree::from_description(description, ctx.controller, ctx.rng)?;
        let count = tree.len();
        if count > ctx.constraints.max_modules {
            return Err(GenomeError::TooManyModules {
                count,
                max: ctx.constraints.max_modules,
            });
        }
        Ok(Self::from_tree(id, tree))
    }

    fn from_tree(id: u64, tree: ModuleTree) -> Self {
        let mut individual = Self {
            id,
            parent_id: None,
            fitness: Self::UNEVALUATED,
            morph_age: 0,
            prev_age: 0,
            added: 0,
            tree,
            modules: Vec::new(),
            without_complementaries: Vec::new(),
            record: Vec::new(),
            diversity: DiversityFeatures::default(),
        };
        individual.regenerate_lists();
        individual
    }

    /// Copy that shares nothing with `self` and carries no lineage.
    pub fn snapshot(&self) -> Individual {
        Individual {
            id: self.id,
            parent_id: self.parent_id,
            fitness: self.fitness,
            morph_age: self.morph_age,
            prev_age: self.prev_age,
            added: self.added,
            tree: self.tree.deep_copy(),
            modules: self.modules.clone(),
            without_complementaries: self.without_complementaries.clone(),
            record: Vec::new(),
            diversity: self.diversity,
        }
    }

    /// Copy that becomes a new population member descending from `self`.
    /// The child starts unevaluated.
    pub fn offspring(&self, id: u64) -> Individual {
        let mut child = self.clone();
        child.parent_id = Some(self.id);
        child.id = id;
        child.fitness = Self::UNEVALUATED;
        child
    }

    pub fn tree(&self) -> &ModuleTree {
        &self.tree
    }

    /// Module ids in breadth-first order, root first.
    pub fn modules(&self) -> &[ModuleId] {
        &self.modules
    }

    /// Module ids with each complementary pair collapsed to one member.
    pub fn modules_without_complementaries(&self) -> &[ModuleId] {
        &self.without_complementaries
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Always false, the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn prev_age(&self) -> u32 {
        self.prev_age
    }

    /// Modules added since the last evaluation.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Forget the additions of the last structural mutation, once an
    /// evaluation has confirmed them.
    pub fn reset_added(&mut self) {
        self.added = 0;
    }

    /// Earlier bodies, oldest first, keyed by the age each had survived.
    pub fn record(&self) -> &[(u32, Individual)] {
        &self.record
    }

    pub fn diversity(&self) -> DiversityFeatures {
        self.diversity
    }

    /// Whether the individual has been evaluated.
    pub fn is_evaluated(&self) -> bool {
        self.fitness != Self::UNEVALUATED
    }

    /// Genome description in breadth-first order.
    pub fn describe(&self) -> GenomeDescription {
        self.tree.describe()
    }

    /// Serial joint count of every body segment, front to back.
    pub fn joint_table(&self) -> Vec<usize> {
        self.tree.joint_table()
    }

    /// Next joint targets of all modules, breadth-first order.
    pub fn next_actions(&mut self, delta_time: f32, output_bounds: (f32, f32), out: &mut Vec<f32>) {
        self.tree.drive(delta_time, output_bounds, out);
    }

    pub fn reset_controllers(&mut self) {
        self.tree.reset_controllers();
    }

    /// Serializable view including the lineage.
    pub fn to_snapshot(&self) -> IndividualSnapshot {
        IndividualSnapshot {
            id: self.id,
            parent_id: self.parent_id,
            fitness: self.fitness,
            morph_age: self.morph_age,
            module_count: self.len(),
            diversity: self.diversity,
            genome: self.describe(),
            lineage: self
                .record
                .iter()
                .map(|(age, earlier)| LineageRecord {
                    age: *age,
                    genome: earlier.describe(),
                })
                .collect(),
        }
    }

    /// Rebuild both module lists and the diversity counters from the tree.
    pub(super) fn regenerate_lists(&mut self) {
        let mut modules = Vec::new();
        let mut representatives = Vec::new();
        let mut seen: HashSet<&ModuleId> = HashSet::new();
        let mut diversity = DiversityFeatures::default();
        let mut mounted_limbs = 0;

        for module in self.tree.bfs() {
            modules.push(module.id().clone());
            match module.kind() {
                ModuleKind::Root => {
                    representatives.push(module.id().clone());
                    seen.insert(module.id());
                }
                ModuleKind::Body => {
                    diversity.body_joints += 1;
                    representatives.push(module.id().clone());
                    seen.insert(module.id());
                }
                ModuleKind::Limb => {
                    diversity.limb_joints += 1;
                    if !module.peer().is_some_and(|peer| seen.contains(peer)) {
                        representatives.push(module.id().clone());
                        seen.insert(module.id());
                    }
                    let on_body = module
                        .parent()
                        .and_then(|parent| self.tree.get(parent.as_str()))
                        .is_some_and(|parent| parent.kind() != ModuleKind::Limb);
                    if on_body {
                        mounted_limbs += 1;
                    }
                }
            }
        }
        diversity.limb_pairs = mounted_limbs / 2;

        self.modules = modules;
        self.without_complementaries = representatives;
        self.diversity = diversity;
    }
}

impl Clone for Individual {
    fn clone(&self) -> Self {
        let mut copy = self.snapshot();
        copy.record = self
            .record
            .iter()
            .map(|(age, earlier)| (*age, earlier.snapshot()))
            .collect();
        copy
    }
}
