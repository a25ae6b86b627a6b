//! Core library for the DJ Visualiser.
//!
//! Three pieces make up the pipeline:
//!
//! * [`FeatureExtractor`] captures live audio, runs a [`FeatureAnalyzer`] on
//!   every block and publishes [`AudioFrame`]s on a [`FrameBus`].
//! * [`script::compile`] turns a mapping script into [`ObjectDefinition`]s.
//! * [`MappingEngine`] attaches those objects to a [`SceneBackend`] and, once
//!   per render tick, writes remapped feature values into their transforms.
//!
//! The audio callback and the render loop only share the bus, whose latest
//! frame slot can be read at any time without blocking either side.

pub mod analysis;
pub mod audio;
pub mod bus;
pub mod config;
pub mod error;
pub mod mapping;
pub mod render;
pub mod scene;
pub mod script;
pub mod timeline;

pub use analysis::{AudioFeature, AudioFrame, FeatureAnalyzer};
#[cfg(feature = "live-input")]
pub use audio::CpalBackend;
pub use audio::{CaptureStream, FeatureExtractor, InputBackend, InputDevice, DEFAULT_DEVICE};
pub use bus::{FrameBus, SubscriptionId};
pub use config::{AppConfig, AudioConfig, RenderConfig, SpectrumScale};
pub use error::{Location, Result, VisualiserError};
pub use mapping::{MappingEngine, TickStats};
pub use render::{HeadlessScene, MeshId};
pub use scene::{MeshDescriptor, SceneBackend, Transform};
pub use script::{AudioProperty, GeometryKind, ObjectDefinition, PropertyMapping, TargetProperty};
pub use timeline::{FrameTick, RenderClock};
