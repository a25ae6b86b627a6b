use std::collections::BTreeMap;

use crate::{
    scene::{MeshDescriptor, SceneBackend, Transform},
    Result,
};

/// Identifier of a mesh held by [`HeadlessScene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(u64);

#[derive(Debug, Clone)]
pub struct MeshRecord {
    pub descriptor: MeshDescriptor,
    pub transform: Transform,
}

/// In-memory renderer. It keeps every live mesh with its current transform
/// and reports them through `tracing` instead of drawing.
#[derive(Debug, Default)]
pub struct HeadlessScene {
    meshes: BTreeMap<MeshId, MeshRecord>,
    next_id: u64,
    created: usize,
    disposed: usize,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// Total meshes created over the scene's lifetime.
    pub fn created(&self) -> usize {
        self.created
    }

    /// Total meshes released over the scene's lifetime.
    pub fn disposed(&self) -> usize {
        self.disposed
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshRecord> {
        self.meshes.get(&id)
    }

    /// Looks up a live mesh by object name.
    pub fn find(&self, name: &str) -> Option<&MeshRecord> {
        self.meshes
            .values()
            .find(|record| record.descriptor.name == name)
    }

    /// Live meshes in creation order.
    pub fn meshes(&self) -> impl Iterator<Item = &MeshRecord> {
        self.meshes.values()
    }

    pub fn draw(&self) -> Result<()> {
        for record in self.meshes.values() {
            tracing::trace!(
                name = %record.descriptor.name,
                geometry = %record.descriptor.geometry,
                position = ?record.transform.position,
                rotation = ?record.transform.rotation,
                scale = ?record.transform.scale,
                "draw mesh"
            );
        }
        Ok(())
    }
}

impl SceneBackend for HeadlessScene {
    type Handle = MeshId;

    fn create_mesh(&mut self, descriptor: &MeshDescriptor) -> Result<MeshId> {
        let id = MeshId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.meshes.insert(
            id,
            MeshRecord {
                descriptor: descriptor.clone(),
                transform: descriptor.transform,
            },
        );
        tracing::debug!(?id, name = %descriptor.name, "created mesh");
        Ok(id)
    }

    fn dispose_mesh(&mut self, handle: MeshId) {
        if let Some(record) = self.meshes.remove(&handle) {
            self.disposed += 1;
            tracing::debug!(id = ?handle, name = %record.descriptor.name, "disposed mesh");
        }
    }

    fn transform_mut(&mut self, handle: MeshId) -> Option<&mut Transform> {
        self.meshes.get_mut(&handle).map(|record| &mut record.transform)
    }
}
