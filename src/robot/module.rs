//! Module tree: the structural half of a genome.
//!
//! A robot is a rooted tree of modules. Every module owns its children; the
//! parent and the complementary peer of a limb are referenced by id only.
//! Per-kind capacities are resolved from the module kind:
//!
//! | kind | body children | limb children |
//! |------|---------------|---------------|
//! | Root | 2             | 2             |
//! | Body | 1             | 2             |
//! | Limb | 0             | 1             |
//!
//! Limbs are always created and destroyed as complementary pairs whose
//! angles mirror each other (see [`mirror_angle`]).

use std::borrow::Borrow;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{
    BODY_JOINTS, ControllerConfig, GenomeDescription, JointType, LIMB_JOINTS, ModuleRecord,
};

use super::{GenomeRng, Oscillator};

/// Identifier of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(String);

impl ModuleId {
    /// Name of the root module of freshly created genomes.
    pub const ROOT: &'static str = "root";

    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ModuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind discriminator of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Root,
    Body,
    Limb,
}

/// Child capacity of a module kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub body: usize,
    pub limb: usize,
}

impl ModuleKind {
    /// Capacity table.
    pub const fn capacity(self) -> Capacity {
        match self {
            ModuleKind::Root => Capacity { body: 2, limb: 2 },
            ModuleKind::Body => Capacity { body: 1, limb: 2 },
            ModuleKind::Limb => Capacity { body: 0, limb: 1 },
        }
    }

    /// Kind implied by a joint type tag.
    pub fn of(joint_type: JointType) -> Self {
        if joint_type == JointType::Root {
            ModuleKind::Root
        } else if joint_type.is_limb() {
            ModuleKind::Limb
        } else {
            ModuleKind::Body
        }
    }
}

/// Angle of the second limb of a pair, given the first limb's angle and the
/// connection site both occupy on limb parents. Pairs mounted on a body use
/// sites 0 and 1 and always mirror to `-angle`.
pub fn mirror_angle(connection_site: u8, angle: i32) -> i32 {
    if connection_site == 2 {
        -angle
    } else {
        -angle + 180
    }
}

/// Randomness and parameter ranges used when growing or re-rolling modules.
pub struct Growth<'a> {
    pub rng: &'a mut GenomeRng,
    pub controller: &'a ControllerConfig,
    pub rotations: &'a [i32],
    /// Draw fresh controller parameters instead of inheriting the parent's.
    pub init: bool,
}

impl Growth<'_> {
    fn controller_for(&mut self, parent: &Oscillator) -> Oscillator {
        if self.init {
            Oscillator::random(self.controller, self.rng)
        } else {
            Oscillator::inherit(parent)
        }
    }

    fn rotation(&mut self) -> i32 {
        self.rng.choose(self.rotations).copied().unwrap_or(0)
    }

    fn joint_type(&mut self, choices: &[JointType], exclude: Option<JointType>) -> JointType {
        let options: Vec<JointType> = choices
            .iter()
            .copied()
            .filter(|t| Some(*t) != exclude)
            .collect();
        self.rng
            .choose(&options)
            .copied()
            .unwrap_or(choices[0])
    }
}

/// One node of the module tree.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    kind: ModuleKind,
    joint_type: JointType,
    parent: Option<ModuleId>,
    peer: Option<ModuleId>,
    connection_site: u8,
    angle: i32,
    controller: Oscillator,
    children: Vec<Module>,
    body_children: usize,
    limb_children: usize,
}

impl Module {
    fn new(
        id: ModuleId,
        joint_type: JointType,
        parent: Option<ModuleId>,
        connection_site: u8,
        angle: i32,
        controller: Oscillator,
    ) -> Self {
        Self {
            id,
            kind: ModuleKind::of(joint_type),
            joint_type,
            parent,
            peer: None,
            connection_site,
            angle,
            controller,
            children: Vec::new(),
            body_children: 0,
            limb_children: 0,
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn joint_type(&self) -> JointType {
        self.joint_type
    }

    pub fn parent(&self) -> Option<&ModuleId> {
        self.parent.as_ref()
    }

    /// Complementary limb, if this is a limb.
    pub fn peer(&self) -> Option<&ModuleId> {
        self.peer.as_ref()
    }

    pub fn connection_site(&self) -> u8 {
        self.connection_site
    }

    pub fn angle(&self) -> i32 {
        self.angle
    }

    pub fn controller(&self) -> &Oscillator {
        &self.controller
    }

    pub(crate) fn controller_mut(&mut self) -> &mut Oscillator {
        &mut self.controller
    }

    pub fn children(&self) -> &[Module] {
        &self.children
    }

    pub fn body_children(&self) -> usize {
        self.body_children
    }

    pub fn limb_children(&self) -> usize {
        self.limb_children
    }

    #[inline]
    pub fn can_add_body(&self) -> bool {
        self.body_children < self.kind.capacity().body
    }

    #[inline]
    pub fn can_add_limb(&self) -> bool {
        self.limb_children < self.kind.capacity().limb
    }

    /// Number of modules in this subtree.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Module::subtree_len).sum::<usize>()
    }

    /// Find a module in this subtree.
    pub fn find(&self, id: &str) -> Option<&Module> {
        if self.id.as_str() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Module> {
        if self.id.as_str() == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Body segments reached by following the connection-site-2 child.
    pub fn body_chain<'a>(&'a self, out: &mut Vec<&'a Module>) {
        out.push(self);
        if let Some(next) = self.children.iter().find(|c| c.connection_site == 2) {
            next.body_chain(out);
        }
    }

    /// Length of the serial limb chain starting here, plus `n`.
    pub fn serial_len(&self, n: usize) -> usize {
        match self.children.first() {
            Some(child) => child.serial_len(n + 1),
            None => n + 1,
        }
    }

    /// Recursive structural copy of this subtree.
    pub fn deep_copy(&self) -> Module {
        Module {
            id: self.id.clone(),
            kind: self.kind,
            joint_type: self.joint_type,
            parent: self.parent.clone(),
            peer: self.peer.clone(),
            connection_site: self.connection_site,
            angle: self.angle,
            controller: self.controller.clone(),
            children: self.children.iter().map(Module::deep_copy).collect(),
            body_children: self.body_children,
            limb_children: self.limb_children,
        }
    }

    fn visit_mut(&mut self, f: &mut impl FnMut(&mut Module)) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    fn push_child(&mut self, child: Module) {
        match child.kind {
            ModuleKind::Limb => self.limb_children += 1,
            _ => self.body_children += 1,
        }
        self.children.push(child);
    }

    fn take_child(&mut self, id: &str) -> Option<Module> {
        let index = self.children.iter().position(|c| c.id.as_str() == id)?;
        let child = self.children.remove(index);
        match child.kind {
            ModuleKind::Limb => self.limb_children = self.limb_children.saturating_sub(1),
            _ => self.body_children = self.body_children.saturating_sub(1),
        }
        Some(child)
    }

    fn record(&self) -> ModuleRecord {
        ModuleRecord {
            id: self.id.to_string(),
            parent_id: self
                .parent
                .as_ref()
                .map(ModuleId::to_string)
                .unwrap_or_default(),
            connection_site: self.connection_site,
            joint_type: self.joint_type,
            angle: self.angle,
            controller: Some(self.controller.params()),
        }
    }
}

/// Errors raised while building a tree from a genome description.
#[derive(Debug, thiserror::Error)]
pub enum GenomeError {
    #[error("Genome description has no modules")]
    Empty,
    #[error("First module must be a Root with an empty parent id")]
    MissingRoot,
    #[error("Module {0} is a second root")]
    DuplicateRoot(String),
    #[error("Module id {0} appears twice")]
    DuplicateId(String),
    #[error("Module {id} references unknown parent {parent}")]
    UnknownParent { id: String, parent: String },
    #[error("Parent {parent} has no free {slot} slot for module {id}")]
    CapacityExceeded {
        id: String,
        parent: String,
        slot: &'static str,
    },
    #[error("Limb {0} has no complementary limb")]
    UnpairedLimb(String),
    #[error("Limbs {first} and {second} are not mirrored")]
    MirrorMismatch { first: String, second: String },
    #[error("Genome has {count} modules, the ceiling is {max}")]
    TooManyModules { count: usize, max: usize },
}

/// Rooted module tree.
#[derive(Debug)]
pub struct ModuleTree {
    root: Module,
}

impl ModuleTree {
    /// Tree holding only a root module.
    pub fn new(controller: Oscillator) -> Self {
        Self {
            root: Module::new(ModuleId::root(), JointType::Root, None, 0, 0, controller),
        }
    }

    pub fn root(&self) -> &Module {
        &self.root
    }

    pub fn get(&self, id: &str) -> Option<&Module> {
        self.root.find(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Module> {
        self.root.find_mut(id)
    }

    /// Total number of modules.
    pub fn len(&self) -> usize {
        self.root.subtree_len()
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Modules in breadth-first order, root first.
    pub fn bfs(&self) -> Vec<&Module> {
        let mut order = Vec::new();
        let mut queue = VecDeque::from([&self.root]);
        while let Some(module) = queue.pop_front() {
            order.push(module);
            queue.extend(module.children.iter());
        }
        order
    }

    /// Recursive structural copy.
    pub fn deep_copy(&self) -> ModuleTree {
        ModuleTree {
            root: self.root.deep_copy(),
        }
    }

    /// Apply `f` to every controller, depth first.
    pub fn for_each_controller_mut(&mut self, mut f: impl FnMut(&mut Oscillator)) {
        self.root.visit_mut(&mut |module| f(&mut module.controller));
    }

    /// Step every controller by `delta_time` in breadth-first order, each
    /// one coupled to its parent's freshly updated phase. Outputs are
    /// written to `out` in the same order as [`ModuleTree::bfs`].
    pub fn drive(&mut self, delta_time: f32, output_bounds: (f32, f32), out: &mut Vec<f32>) {
        out.clear();
        let mut queue: VecDeque<(&mut Module, Option<f32>)> = VecDeque::from([(&mut self.root, None)]);
        while let Some((module, parent_phase)) = queue.pop_front() {
            out.push(module.controller.update(delta_time, parent_phase, output_bounds));
            let phase = module.controller.phase_state();
            for child in &mut module.children {
                queue.push_back((child, Some(phase)));
            }
        }
    }

    /// Zero the runtime state of every controller.
    pub fn reset_controllers(&mut self) {
        self.for_each_controller_mut(Oscillator::reset);
    }

    /// Attach a body joint to `target`. The root uses whichever of sites 2
    /// and 3 is free, a body joint uses site 2.
    pub fn add_body(&mut self, target: &str, growth: &mut Growth<'_>) -> bool {
        let Some(parent) = self.get(target) else {
            return false;
        };
        if !parent.can_add_body() {
            return false;
        }
        let connection_site = match parent.kind {
            ModuleKind::Root => {
                if parent.children.iter().any(|c| c.connection_site == 2) {
                    3
                } else {
                    2
                }
            }
            _ => 2,
        };
        let controller = growth.controller_for(&parent.controller);
        let joint_type = growth.joint_type(&BODY_JOINTS, None);
        let id = growth.rng.module_id();
        let body = Module::new(
            id,
            joint_type,
            Some(parent.id.clone()),
            connection_site,
            0,
            controller,
        );
        match self.get_mut(target) {
            Some(parent) => {
                parent.push_child(body);
                true
            }
            None => false,
        }
    }

    /// Attach a complementary limb pair below `target`.
    ///
    /// On the root or a body joint both limbs hang off `target` at sites 0
    /// and 1. On a limb one limb hangs off `target` and its mirror off the
    /// peer, both at the same randomly chosen site.
    pub fn add_limb(&mut self, target: &str, growth: &mut Growth<'_>) -> bool {
        let Some(parent) = self.get(target) else {
            return false;
        };
        if !parent.can_add_limb() {
            return false;
        }
        let angle = growth.rotation();
        let joint_type = growth.joint_type(&LIMB_JOINTS, None);
        let parent_id = parent.id.clone();

        match parent.kind {
            ModuleKind::Limb => {
                let Some(peer_id) = parent.peer.clone() else {
                    return false;
                };
                let Some(peer) = self.get(peer_id.as_str()) else {
                    return false;
                };
                if !peer.can_add_limb() {
                    return false;
                }
                let first_controller = growth.controller_for(&parent.controller);
                let second_controller = growth.controller_for(&peer.controller);
                let connection_site = growth
                    .rng
                    .choose(&[0u8, 1, 2])
                    .copied()
                    .unwrap_or(0);

                let mut first = Module::new(
                    growth.rng.module_id(),
                    joint_type,
                    Some(parent_id.clone()),
                    connection_site,
                    angle,
                    first_controller,
                );
                let mut second = Module::new(
                    growth.rng.module_id(),
                    joint_type,
                    Some(peer_id.clone()),
                    connection_site,
                    mirror_angle(connection_site, angle),
                    second_controller,
                );
                first.peer = Some(second.id.clone());
                second.peer = Some(first.id.clone());

                if let Some(parent) = self.get_mut(parent_id.as_str()) {
                    parent.push_child(first);
                }
                if let Some(peer) = self.get_mut(peer_id.as_str()) {
                    peer.push_child(second);
                }
                true
            }
            ModuleKind::Root | ModuleKind::Body => {
                let first_controller = growth.controller_for(&parent.controller);
                let second_controller = growth.controller_for(&parent.controller);
                let mut first = Module::new(
                    growth.rng.module_id(),
                    joint_type,
                    Some(parent_id.clone()),
                    0,
                    angle,
                    first_controller,
                );
                let mut second = Module::new(
                    growth.rng.module_id(),
                    joint_type,
                    Some(parent_id.clone()),
                    1,
                    -angle,
                    second_controller,
                );
                first.peer = Some(second.id.clone());
                second.peer = Some(first.id.clone());

                match self.get_mut(parent_id.as_str()) {
                    Some(parent) => {
                        parent.push_child(first);
                        parent.push_child(second);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Re-roll a module in place. Limbs also re-roll their angle (and, on
    /// limb parents, their site) and carry the change over to the peer.
    pub fn swap(&mut self, target: &str, growth: &mut Growth<'_>) -> bool {
        let Some(module) = self.get(target) else {
            return false;
        };
        match module.kind {
            ModuleKind::Root => false,
            ModuleKind::Body => {
                let joint_type = growth.joint_type(&BODY_JOINTS, Some(module.joint_type));
                if let Some(module) = self.get_mut(target) {
                    module.joint_type = joint_type;
                }
                true
            }
            ModuleKind::Limb => {
                let Some(peer_id) = module.peer.clone() else {
                    return false;
                };
                let on_limb = module
                    .parent
                    .as_ref()
                    .and_then(|p| self.get(p.as_str()))
                    .is_some_and(|p| p.kind == ModuleKind::Limb);
                let joint_type = growth.joint_type(&LIMB_JOINTS, Some(module.joint_type));
                let angle = growth.rotation();
                let site = if on_limb {
                    growth.rng.choose(&[0u8, 1, 2]).copied()
                } else {
                    None
                };

                let peer_angle = match site {
                    Some(site) => mirror_angle(site, angle),
                    None => -angle,
                };
                if let Some(module) = self.get_mut(target) {
                    module.joint_type = joint_type;
                    module.angle = angle;
                    if let Some(site) = site {
                        module.connection_site = site;
                    }
                }
                if let Some(peer) = self.get_mut(peer_id.as_str()) {
                    peer.joint_type = joint_type;
                    peer.angle = peer_angle;
                    if let Some(site) = site {
                        peer.connection_site = site;
                    }
                }
                true
            }
        }
    }

    /// Detach a module and its subtree. A limb takes its peer with it.
    /// Returns false for the root or an id that is not attached.
    pub fn remove(&mut self, target: &str) -> bool {
        let Some(module) = self.get(target) else {
            return false;
        };
        let Some(parent_id) = module.parent.clone() else {
            return false;
        };
        let peer_id = match module.kind {
            ModuleKind::Limb => module.peer.clone(),
            _ => None,
        };

        let removed = self
            .get_mut(parent_id.as_str())
            .and_then(|parent| parent.take_child(target))
            .is_some();

        if let Some(peer_id) = peer_id {
            let peer_parent = self
                .get(peer_id.as_str())
                .and_then(|peer| peer.parent.clone());
            if let Some(peer_parent) = peer_parent
                && let Some(parent) = self.get_mut(peer_parent.as_str())
            {
                parent.take_child(peer_id.as_str());
            }
        }
        removed
    }

    /// Body segments ordered front to back: the chain behind the root's
    /// site 3 reversed, the root, then the chain behind site 2.
    pub fn ordered_body_joints(&self) -> Vec<&Module> {
        let mut front = Vec::new();
        let mut back = Vec::new();
        for child in &self.root.children {
            match child.connection_site {
                3 => child.body_chain(&mut front),
                2 => child.body_chain(&mut back),
                _ => {}
            }
        }
        front.reverse();
        front.push(&self.root);
        front.extend(back);
        front
    }

    /// Serial joint count per body segment: one for the segment plus the
    /// length of the limb chain hanging off its site-0 limb.
    pub fn joint_table(&self) -> Vec<usize> {
        self.ordered_body_joints()
            .into_iter()
            .map(|module| {
                let mut joints = 1;
                if module.children.len() > 1 {
                    for child in module.children.iter().filter(|c| c.connection_site == 0) {
                        joints += child.serial_len(0);
                    }
                }
                joints
            })
            .collect()
    }

    /// Genome description in breadth-first order.
    pub fn describe(&self) -> GenomeDescription {
        GenomeDescription {
            nodes: self.bfs().into_iter().map(Module::record).collect(),
        }
    }

    /// Build a tree from a description, re-pairing limbs.
    ///
    /// Records without controller parameters get fresh random ones.
    pub fn from_description(
        description: &GenomeDescription,
        controller: &ControllerConfig,
        rng: &mut GenomeRng,
    ) -> Result<Self, GenomeError> {
        let mut records = description.nodes.iter();
        let first = records.next().ok_or(GenomeError::Empty)?;
        if first.joint_type != JointType::Root || !first.parent_id.is_empty() {
            return Err(GenomeError::MissingRoot);
        }

        let oscillator = |record: &ModuleRecord, rng: &mut GenomeRng| match record.controller {
            Some(params) => Oscillator::from_params(params),
            None => Oscillator::random(controller, rng),
        };

        let root_controller = oscillator(first, rng);
        let mut tree = ModuleTree {
            root: Module::new(
                ModuleId::from(first.id.as_str()),
                JointType::Root,
                None,
                first.connection_site,
                first.angle,
                root_controller,
            ),
        };
        let mut seen: HashSet<&str> = HashSet::from([first.id.as_str()]);

        for record in records {
            if record.joint_type == JointType::Root {
                return Err(GenomeError::DuplicateRoot(record.id.clone()));
            }
            if !seen.insert(record.id.as_str()) {
                return Err(GenomeError::DuplicateId(record.id.clone()));
            }
            let controller = oscillator(record, rng);
            let parent = tree.get_mut(record.parent_id.as_str()).ok_or_else(|| {
                GenomeError::UnknownParent {
                    id: record.id.clone(),
                    parent: record.parent_id.clone(),
                }
            })?;
            let kind = ModuleKind::of(record.joint_type);
            let fits = match kind {
                ModuleKind::Limb => parent.can_add_limb(),
                _ => parent.can_add_body(),
            };
            if !fits {
                return Err(GenomeError::CapacityExceeded {
                    id: record.id.clone(),
                    parent: record.parent_id.clone(),
                    slot: if kind == ModuleKind::Limb { "limb" } else { "body" },
                });
            }
            let child = Module::new(
                ModuleId::from(record.id.as_str()),
                record.joint_type,
                Some(parent.id.clone()),
                record.connection_site,
                record.angle,
                controller,
            );
            parent.push_child(child);
        }

        let pairs = tree.pair_limbs()?;
        for (first, second) in pairs {
            if let Some(module) = tree.get_mut(first.as_str()) {
                module.peer = Some(second.clone());
            }
            if let Some(module) = tree.get_mut(second.as_str()) {
                module.peer = Some(first);
            }
        }
        Ok(tree)
    }

    /// Complementary pairs implied by the tree shape: the two limbs of a
    /// body segment, then recursively the limb children of paired limbs.
    fn pair_limbs(&self) -> Result<Vec<(ModuleId, ModuleId)>, GenomeError> {
        let mut pairs = Vec::new();
        let mut pending: VecDeque<(&Module, &Module)> = VecDeque::new();

        for module in self.bfs() {
            if module.kind == ModuleKind::Limb {
                continue;
            }
            let limbs: Vec<&Module> = module
                .children
                .iter()
                .filter(|c| c.kind == ModuleKind::Limb)
                .collect();
            match limbs.as_slice() {
                [] => {}
                [a, b] => {
                    if a.joint_type != b.joint_type || !same_angle(b.angle, -a.angle) {
                        return Err(GenomeError::MirrorMismatch {
                            first: a.id.to_string(),
                            second: b.id.to_string(),
                        });
                    }
                    pending.push_back((*a, *b));
                }
                [lone, ..] => return Err(GenomeError::UnpairedLimb(lone.id.to_string())),
            }
        }

        while let Some((a, b)) = pending.pop_front() {
            pairs.push((a.id.clone(), b.id.clone()));
            match (a.children.first(), b.children.first()) {
                (None, None) => {}
                (Some(ca), Some(cb)) => {
                    let mirrored = ca.connection_site == cb.connection_site
                        && ca.joint_type == cb.joint_type
                        && same_angle(cb.angle, mirror_angle(ca.connection_site, ca.angle));
                    if !mirrored {
                        return Err(GenomeError::MirrorMismatch {
                            first: ca.id.to_string(),
                            second: cb.id.to_string(),
                        });
                    }
                    pending.push_back((ca, cb));
                }
                (Some(lone), None) | (None, Some(lone)) => {
                    return Err(GenomeError::UnpairedLimb(lone.id.to_string()));
                }
            }
        }
        Ok(pairs)
    }
}

fn same_angle(a: i32, b: i32) -> bool {
    (a - b).rem_euclid(360) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn growth<'a>(
        rng: &'a mut GenomeRng,
        controller: &'a ControllerConfig,
        rotations: &'a [i32],
    ) -> Growth<'a> {
        Growth {
            rng,
            controller,
            rotations,
            init: false,
        }
    }

    fn tree_with_body(rng: &mut GenomeRng, controller: &ControllerConfig) -> (ModuleTree, ModuleId) {
        let mut tree = ModuleTree::new(Oscillator::random(controller, rng));
        let rotations = [0, 90, 180, 270];
        let mut g = growth(rng, controller, &rotations);
        assert!(tree.add_body(ModuleId::ROOT, &mut g));
        let body = tree.root().children()[0].id().clone();
        (tree, body)
    }

    #[test]
    fn test_capacity_table() {
        assert_eq!(ModuleKind::Root.capacity(), Capacity { body: 2, limb: 2 });
        assert_eq!(ModuleKind::Body.capacity(), Capacity { body: 1, limb: 2 });
        assert_eq!(ModuleKind::Limb.capacity(), Capacity { body: 0, limb: 1 });
    }

    #[test]
    fn test_root_add_body_uses_sites_two_and_three() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(1);
        let (mut tree, _) = tree_with_body(&mut rng, &controller);
        let rotations = [0];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_body(ModuleId::ROOT, &mut g));
        assert!(!tree.add_body(ModuleId::ROOT, &mut g));

        let mut sites: Vec<u8> = tree
            .root()
            .children()
            .iter()
            .map(Module::connection_site)
            .collect();
        sites.sort_unstable();
        assert_eq!(sites, vec![2, 3]);
        assert_eq!(tree.root().body_children(), 2);
    }

    #[test]
    fn test_add_limb_on_body_joint() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(2);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0, 90, 180, 270];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));

        let body = tree.get(body.as_str()).unwrap();
        assert_eq!(body.limb_children(), 2);
        let limbs = body.children();
        assert_eq!(limbs.len(), 2);
        assert_eq!(limbs[0].connection_site(), 0);
        assert_eq!(limbs[1].connection_site(), 1);
        assert_eq!(limbs[1].angle(), -limbs[0].angle());
        assert_eq!(limbs[0].joint_type(), limbs[1].joint_type());
        assert_eq!(limbs[0].peer(), Some(limbs[1].id()));
        assert_eq!(limbs[1].peer(), Some(limbs[0].id()));
        assert!(!body.can_add_limb());
    }

    #[test]
    fn test_add_limb_on_limb_mirrors_onto_peer() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(3);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0, 90, 180, 270];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let first = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        let second = tree.get(body.as_str()).unwrap().children()[1].id().clone();

        assert!(tree.add_limb(first.as_str(), &mut g));
        assert!(!tree.add_limb(first.as_str(), &mut g));
        assert!(!tree.add_limb(second.as_str(), &mut g));

        let a = &tree.get(first.as_str()).unwrap().children()[0];
        let b = &tree.get(second.as_str()).unwrap().children()[0];
        assert_eq!(a.connection_site(), b.connection_site());
        assert_eq!(b.angle(), mirror_angle(a.connection_site(), a.angle()));
        assert_eq!(a.peer(), Some(b.id()));
    }

    #[test]
    fn test_remove_limb_takes_peer() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(4);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [90];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let limb = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        assert_eq!(tree.len(), 4);

        assert!(tree.remove(limb.as_str()));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.get(body.as_str()).unwrap().limb_children(), 0);
        assert!(!tree.remove(ModuleId::ROOT));
    }

    #[test]
    fn test_remove_limb_on_limb_updates_both_parents() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(8);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0, 90, 180, 270];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let first = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        let second = tree.get(body.as_str()).unwrap().children()[1].id().clone();
        assert!(tree.add_limb(first.as_str(), &mut g));
        assert_eq!(tree.len(), 6);

        let child = tree.get(first.as_str()).unwrap().children()[0].id().clone();
        let peer = tree.get(child.as_str()).unwrap().peer().unwrap().clone();
        assert!(tree.get(second.as_str()).unwrap().find(peer.as_str()).is_some());

        assert!(tree.remove(child.as_str()));
        assert_eq!(tree.len(), 4);
        assert!(tree.get(child.as_str()).is_none());
        assert!(tree.get(peer.as_str()).is_none());
        assert_eq!(tree.get(first.as_str()).unwrap().limb_children(), 0);
        assert_eq!(tree.get(second.as_str()).unwrap().limb_children(), 0);
        assert!(tree.get(first.as_str()).unwrap().children().is_empty());
        assert!(tree.get(second.as_str()).unwrap().children().is_empty());
        assert_eq!(tree.get(body.as_str()).unwrap().limb_children(), 2);
    }

    #[test]
    fn test_swap_limb_keeps_mirror() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(5);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0, 90, 180, 270];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let limb = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        let before = tree.get(limb.as_str()).unwrap().joint_type();

        assert!(tree.swap(limb.as_str(), &mut g));
        let a = tree.get(limb.as_str()).unwrap();
        let b = tree.get(a.peer().unwrap().as_str()).unwrap();
        assert_ne!(a.joint_type(), before);
        assert_eq!(a.joint_type(), b.joint_type());
        assert_eq!(b.angle(), -a.angle());
    }

    #[test]
    fn test_description_round_trip_repairs_peers() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(6);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0, 90, 180, 270];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let limb = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        assert!(tree.add_limb(limb.as_str(), &mut g));

        let description = tree.describe();
        assert_eq!(description.nodes[0].parent_id, "");
        let loaded = ModuleTree::from_description(&description, &controller, &mut rng).unwrap();
        assert_eq!(loaded.len(), tree.len());
        for module in tree.bfs() {
            let copy = loaded.get(module.id().as_str()).unwrap();
            assert_eq!(copy.peer(), module.peer());
            assert_eq!(copy.controller().params(), module.controller().params());
        }
    }

    #[test]
    fn test_description_rejects_lone_limb() {
        let description = GenomeDescription::from_json(
            r#"{"nodes":[
                {"id":"root","parent_id":"","connection_site":0,"type":"Root","angle":0},
                {"id":"l","parent_id":"root","connection_site":0,"type":"LimbJoint1","angle":90}
            ]}"#,
        )
        .unwrap();
        let mut rng = GenomeRng::new(0);
        let err =
            ModuleTree::from_description(&description, &ControllerConfig::default(), &mut rng)
                .unwrap_err();
        assert!(matches!(err, GenomeError::UnpairedLimb(id) if id == "l"));
    }

    #[test]
    fn test_description_rejects_unknown_parent() {
        let description = GenomeDescription::from_json(
            r#"{"nodes":[
                {"id":"root","parent_id":"","connection_site":0,"type":"Root","angle":0},
                {"id":"b","parent_id":"nope","connection_site":2,"type":"BodyJoint1","angle":0}
            ]}"#,
        )
        .unwrap();
        let mut rng = GenomeRng::new(0);
        let err =
            ModuleTree::from_description(&description, &ControllerConfig::default(), &mut rng)
                .unwrap_err();
        assert!(matches!(err, GenomeError::UnknownParent { .. }));
    }

    #[test]
    fn test_joint_table_counts_limb_chains() {
        let controller = ControllerConfig::default();
        let mut rng = GenomeRng::new(8);
        let (mut tree, body) = tree_with_body(&mut rng, &controller);
        let rotations = [0];
        let mut g = growth(&mut rng, &controller, &rotations);
        assert!(tree.add_limb(body.as_str(), &mut g));
        let limb = tree.get(body.as_str()).unwrap().children()[0].id().clone();
        assert!(tree.add_limb(limb.as_str(), &mut g));

        let order: Vec<&str> = tree
            .ordered_body_joints()
            .iter()
            .map(|m| m.id().as_str())
            .collect();
        assert_eq!(order, vec![ModuleId::ROOT, body.as_str()]);
        assert_eq!(tree.joint_table(), vec![1, 3]);
    }
}
