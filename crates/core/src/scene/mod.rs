use std::fmt::Debug;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{
    script::{Axis, Color, GeometryKind, ObjectDefinition, TargetProperty, TransformGroup},
    Result,
};

/// Position, Euler rotation and scale of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn get(&self, property: TargetProperty) -> f32 {
        let vector = match property.group {
            TransformGroup::Position => &self.position,
            TransformGroup::Rotation => &self.rotation,
            TransformGroup::Scale => &self.scale,
        };
        match property.axis {
            Axis::X => vector.x,
            Axis::Y => vector.y,
            Axis::Z => vector.z,
        }
    }

    pub fn set(&mut self, property: TargetProperty, value: f32) {
        let vector = match property.group {
            TransformGroup::Position => &mut self.position,
            TransformGroup::Rotation => &mut self.rotation,
            TransformGroup::Scale => &mut self.scale,
        };
        match property.axis {
            Axis::X => vector.x = value,
            Axis::Y => vector.y = value,
            Axis::Z => vector.z = value,
        }
    }
}

/// Everything a renderer needs to build the mesh for one object.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshDescriptor {
    pub name: String,
    pub geometry: GeometryKind,
    pub color: Color,
    pub layer: Option<i32>,
    pub transform: Transform,
}

impl From<&ObjectDefinition> for MeshDescriptor {
    fn from(object: &ObjectDefinition) -> Self {
        Self {
            name: object.name.clone(),
            geometry: object.geometry,
            color: object.color,
            layer: object.layer,
            transform: Transform {
                position: object.position,
                rotation: object.rotation,
                scale: object.scale,
            },
        }
    }
}

/// Renderer capability consumed by the mapping engine.
///
/// The renderer owns meshes and their GPU resources. The engine only asks for
/// meshes to be created and disposed and writes into their transforms.
pub trait SceneBackend {
    type Handle: Copy + Eq + Debug;

    fn create_mesh(&mut self, descriptor: &MeshDescriptor) -> Result<Self::Handle>;

    /// Releases the mesh. Unknown handles are ignored.
    fn dispose_mesh(&mut self, handle: Self::Handle);

    fn transform_mut(&mut self, handle: Self::Handle) -> Option<&mut Transform>;
}
