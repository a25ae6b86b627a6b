use crate::{
    bus::FrameBus,
    scene::{MeshDescriptor, SceneBackend},
    AudioFrame, ObjectDefinition, Result,
};

/// Counts from one [`MappingEngine::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Mappings whose value was written to a transform.
    pub applied: usize,
    /// Mappings skipped because their audio property is not available.
    pub skipped: usize,
}

struct AttachedObject<H> {
    definition: ObjectDefinition,
    handle: H,
}

/// Applies compiled mappings to renderer-owned scene objects.
///
/// The engine owns the scene backend and the currently attached object set.
/// Each tick is a pure function of that set and the given frame.
pub struct MappingEngine<S: SceneBackend> {
    scene: S,
    attached: Vec<AttachedObject<S::Handle>>,
}

impl<S: SceneBackend> MappingEngine<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene,
            attached: Vec::new(),
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectDefinition> {
        self.attached.iter().map(|object| &object.definition)
    }

    pub fn handle(&self, name: &str) -> Option<S::Handle> {
        self.attached
            .iter()
            .find(|object| object.definition.name == name)
            .map(|object| object.handle)
    }

    /// Replaces the whole working set.
    ///
    /// Meshes for the new set are created first. If the renderer fails part
    /// way, the meshes already created are released and the previous set stays
    /// attached. On success every previous mesh is disposed.
    pub fn attach(&mut self, objects: Vec<ObjectDefinition>) -> Result<()> {
        let mut created = Vec::with_capacity(objects.len());

        for definition in objects {
            match self.scene.create_mesh(&MeshDescriptor::from(&definition)) {
                Ok(handle) => created.push(AttachedObject { definition, handle }),
                Err(err) => {
                    for object in created {
                        self.scene.dispose_mesh(object.handle);
                    }
                    return Err(err);
                }
            }
        }

        for previous in std::mem::replace(&mut self.attached, created) {
            self.scene.dispose_mesh(previous.handle);
        }

        for object in &self.attached {
            for mapping in &object.definition.mappings {
                if mapping.audio_property.feature().is_none() {
                    tracing::debug!(
                        object = %object.definition.name,
                        audio_property = %mapping.audio_property,
                        "mapping uses an unavailable audio feature and will be skipped"
                    );
                }
            }
        }

        tracing::info!(objects = self.attached.len(), "attached scene objects");
        Ok(())
    }

    /// Releases every attached mesh.
    pub fn detach(&mut self) {
        for object in self.attached.drain(..) {
            self.scene.dispose_mesh(object.handle);
        }
    }

    /// Evaluates every mapping against `frame` in declaration order. When two
    /// mappings target the same axis the later one wins.
    pub fn tick(&mut self, frame: &AudioFrame) -> TickStats {
        let mut stats = TickStats::default();

        for object in &self.attached {
            let Some(transform) = self.scene.transform_mut(object.handle) else {
                stats.skipped += object.definition.mappings.len();
                continue;
            };

            for mapping in &object.definition.mappings {
                match frame.get(&mapping.audio_property) {
                    Some(audio_value) => {
                        transform.set(mapping.target_property, mapping.map(audio_value));
                        stats.applied += 1;
                    }
                    None => stats.skipped += 1,
                }
            }
        }

        stats
    }

    /// Ticks with whatever frame was last published on `bus`, or silence if
    /// nothing has been published yet.
    pub fn tick_latest(&mut self, bus: &FrameBus) -> TickStats {
        let frame = bus.latest_or_silent();
        self.tick(&frame)
    }
}

impl<S: SceneBackend + std::fmt::Debug> std::fmt::Debug for MappingEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingEngine")
            .field("scene", &self.scene)
            .field("objects", &self.attached.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        render::{HeadlessScene, MeshId},
        scene::Transform,
        script::{self, GeometryKind},
        VisualiserError,
    };

    fn engine_with(source: &str) -> MappingEngine<HeadlessScene> {
        let mut engine = MappingEngine::new(HeadlessScene::new());
        engine.attach(script::compile(source).unwrap()).unwrap();
        engine
    }

    fn transform(engine: &MappingEngine<HeadlessScene>, name: &str) -> Transform {
        engine.scene().find(name).unwrap().transform
    }

    fn low_power(value: f32) -> AudioFrame {
        AudioFrame {
            low_power: value,
            ..Default::default()
        }
    }

    #[test]
    fn drives_rotation_from_low_power() {
        let mut engine = engine_with("Object1:cube{\n  rotation.z(0,90)<>lowPower(10,100)\n}");

        let stats = engine.tick(&AudioFrame {
            average_volume: 20.0,
            low_power: 55.0,
            mid_power: 3.0,
            high_power: 1.0,
        });

        assert_eq!(stats, TickStats { applied: 1, skipped: 0 });
        let rotation = transform(&engine, "Object1").rotation;
        assert!((rotation.z - 40.0).abs() < 1e-4);
        assert_eq!(rotation.x, 0.0);
        assert_eq!(rotation.y, 0.0);
    }

    #[test]
    fn extrapolates_beyond_the_audio_range() {
        let mut engine = engine_with("A:cube{\nrotation.z(0,90)<>lowPower(10,100)\n}");

        engine.tick(&low_power(130.0));

        assert!((transform(&engine, "A").rotation.z - 120.0).abs() < 1e-3);
    }

    #[test]
    fn later_mapping_on_the_same_axis_wins() {
        let mut engine = engine_with(
            "A:cube{\nrotation.z(0,90)<>lowPower(10,100)\nrotation.z(0,1)<>highPower(0,10)\n}",
        );

        engine.tick(&AudioFrame {
            low_power: 55.0,
            high_power: 5.0,
            ..Default::default()
        });

        assert!((transform(&engine, "A").rotation.z - 0.5).abs() < 1e-6);
    }

    #[test]
    fn unrecognized_features_are_skipped() {
        let mut engine = engine_with("A:cube{\nscale.x(1,2)<>tempo(0,200)\nscale.y(1,2)<>midPower(0,10)\n}");

        let stats = engine.tick(&AudioFrame {
            mid_power: 10.0,
            ..Default::default()
        });

        assert_eq!(stats, TickStats { applied: 1, skipped: 1 });
        let scale = transform(&engine, "A").scale;
        assert_eq!(scale.x, 1.0);
        assert!((scale.y - 2.0).abs() < 1e-6);
    }

    #[test]
    fn repeated_ticks_on_a_stale_frame_are_identical() {
        let mut engine = engine_with(
            "A:cube{\nposition.y(-3,3)<>midPower(0,100)\nscale.x(0.5,8)<>highPower(0,100)\n}",
        );
        let bus = FrameBus::new();
        bus.publish(AudioFrame {
            mid_power: 25.0,
            high_power: 80.0,
            ..Default::default()
        });

        engine.tick_latest(&bus);
        let first = transform(&engine, "A");
        for _ in 0..5 {
            engine.tick_latest(&bus);
            assert_eq!(transform(&engine, "A"), first);
        }
    }

    #[test]
    fn ticks_safely_with_nothing_attached_or_silence() {
        let mut empty = MappingEngine::new(HeadlessScene::new());
        assert_eq!(empty.tick(&AudioFrame::default()), TickStats::default());
        assert_eq!(empty.tick_latest(&FrameBus::new()), TickStats::default());

        let mut engine = engine_with("A:cube{\nscale.z(1,3)<>averageVolume(0,255)\n}");
        engine.tick(&AudioFrame::default());
        assert_eq!(transform(&engine, "A").scale.z, 1.0);
    }

    #[test]
    fn attach_replaces_and_disposes_previous_set() {
        let mut engine = engine_with("A:cube{\n}\nB:sphere{\n}");
        assert_eq!(engine.scene().len(), 2);

        engine
            .attach(vec![ObjectDefinition::new("C", GeometryKind::Cube)])
            .unwrap();

        let names: Vec<_> = engine.objects().map(|object| object.name.as_str()).collect();
        assert_eq!(names, ["C"]);
        assert_eq!(engine.scene().len(), 1);
        assert_eq!(engine.scene().disposed(), 2);
        assert!(engine.scene().find("A").is_none());
    }

    #[test]
    fn attach_uses_initial_transform_from_definition() {
        let engine = engine_with(
            r#"[{ "name": "Left", "position": [-4, 0, 0], "scale": [2, 2, 2] }]"#,
        );
        let placed = transform(&engine, "Left");
        assert_eq!(placed.position.x, -4.0);
        assert_eq!(placed.scale.y, 2.0);
    }

    #[derive(Debug, Default)]
    struct FlakyScene {
        inner: HeadlessScene,
        fail_on: Option<String>,
    }

    impl SceneBackend for FlakyScene {
        type Handle = MeshId;

        fn create_mesh(&mut self, descriptor: &MeshDescriptor) -> Result<MeshId> {
            if self.fail_on.as_deref() == Some(descriptor.name.as_str()) {
                return Err(VisualiserError::msg("out of GPU memory"));
            }
            self.inner.create_mesh(descriptor)
        }

        fn dispose_mesh(&mut self, handle: MeshId) {
            self.inner.dispose_mesh(handle)
        }

        fn transform_mut(&mut self, handle: MeshId) -> Option<&mut Transform> {
            self.inner.transform_mut(handle)
        }
    }

    #[test]
    fn failed_attach_keeps_previous_set() {
        let mut engine = MappingEngine::new(FlakyScene::default());
        engine
            .attach(script::compile("Old:cube{\nrotation.z(0,90)<>lowPower(10,100)\n}").unwrap())
            .unwrap();

        engine.scene_mut().fail_on = Some("Bad".to_string());
        let result = engine.attach(script::compile("New:cube{\n}\nBad:cube{\n}").unwrap());

        assert!(result.is_err());
        assert!(engine.handle("Old").is_some());
        assert_eq!(engine.scene().inner.len(), 1);
        assert_eq!(engine.scene().inner.created(), 2);
        assert_eq!(engine.scene().inner.disposed(), 1);

        engine.tick(&low_power(55.0));
        let rotation = engine.scene().inner.find("Old").unwrap().transform.rotation;
        assert!((rotation.z - 40.0).abs() < 1e-4);
    }

    #[test]
    fn detach_releases_everything() {
        let mut engine = engine_with("A:cube{\n}\nB:cube{\n}");
        engine.detach();
        assert!(engine.scene().is_empty());
        assert_eq!(engine.objects().count(), 0);
    }
}
