//! Genome description types exchanged with the external simulator.
//!
//! A genome description is the ordered list of module records the simulator
//! needs to assemble a robot. The root record always comes first and carries
//! an empty parent id; every other record names a parent that precedes it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Joint type tag of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    Root,
    BodyJoint1,
    BodyJoint2,
    BodyJoint3,
    BodyJoint4,
    LimbJoint1,
    LimbJoint2,
    LimbJoint3,
    LimbJoint4,
}

/// Joint types available to body segments.
pub const BODY_JOINTS: [JointType; 4] = [
    JointType::BodyJoint1,
    JointType::BodyJoint2,
    JointType::BodyJoint3,
    JointType::BodyJoint4,
];

/// Joint types available to limbs.
pub const LIMB_JOINTS: [JointType; 4] = [
    JointType::LimbJoint1,
    JointType::LimbJoint2,
    JointType::LimbJoint3,
    JointType::LimbJoint4,
];

impl JointType {
    /// Whether this tag belongs to a body segment.
    #[inline]
    pub fn is_body(self) -> bool {
        BODY_JOINTS.contains(&self)
    }

    /// Whether this tag belongs to a limb.
    #[inline]
    pub fn is_limb(self) -> bool {
        LIMB_JOINTS.contains(&self)
    }
}

/// Oscillator parameters attached to a module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerParams {
    /// Oscillation amplitude.
    pub amplitude: f32,
    /// Phase offset relative to the parent's oscillator (radians).
    pub phase_offset: f32,
    /// Constant output offset.
    pub offset: f32,
    /// Angular frequency.
    pub frequency: f32,
}

/// One module of a genome description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Module identifier.
    pub id: String,
    /// Parent identifier (empty for the root).
    #[serde(default)]
    pub parent_id: String,
    /// Connection site on the parent.
    pub connection_site: u8,
    /// Joint type tag.
    #[serde(rename = "type")]
    pub joint_type: JointType,
    /// Mounting angle in degrees.
    pub angle: i32,
    /// Controller parameters. Missing parameters are drawn at random on load.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerParams>,
}

/// Ordered module list describing one robot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenomeDescription {
    pub nodes: Vec<ModuleRecord>,
}

impl GenomeDescription {
    /// Number of module records.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the description is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identifiers of every module, in record order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.id.as_str())
    }

    /// Set of all module identifiers (what a fully successful build realizes).
    pub fn id_set(&self) -> HashSet<String> {
        self.ids().map(str::to_owned).collect()
    }

    /// Serialize to the JSON string handed to a simulator.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joint_type_classes() {
        assert!(JointType::BodyJoint3.is_body());
        assert!(!JointType::BodyJoint3.is_limb());
        assert!(JointType::LimbJoint1.is_limb());
        assert!(!JointType::Root.is_body());
        assert!(!JointType::Root.is_limb());
    }

    #[test]
    fn test_description_wire_format() {
        let json = r#"{"nodes":[
            {"id":"root","parent_id":"","connection_site":0,"type":"Root","angle":0},
            {"id":"a","parent_id":"root","connection_site":2,"type":"BodyJoint2","angle":0}
        ]}"#;
        let desc = GenomeDescription::from_json(json).unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc.nodes[1].joint_type, JointType::BodyJoint2);
        assert!(desc.nodes[0].controller.is_none());

        let out = desc.to_json().unwrap();
        assert!(out.contains("\"type\":\"BodyJoint2\""));
        assert!(!out.contains("controller"));
    }
}
