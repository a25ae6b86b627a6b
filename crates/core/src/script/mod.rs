//! Object and mapping definitions plus the two script front ends that produce
//! them.
//!
//! Scripts come in two surface forms that compile to the same
//! [`ObjectDefinition`] list:
//!
//! * the line grammar ([`parse`]), one construct per line:
//!
//!   ```text
//!   Object1:cube{
//!     rotation.z(0,90)<>lowPower(10,100)
//!   }
//!   ```
//!
//! * a JSON document ([`parse_document`]) that can additionally set colour,
//!   layer and the initial transform.
//!
//! Compilation is atomic: any error discards the whole script.

use std::{fmt, str::FromStr};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::{analysis::AudioFeature, error::Location, Result, VisualiserError};

mod document;
mod line;

pub use document::parse_document;
pub use line::parse;

/// Compiles either surface form. Input whose first non-blank character is
/// `[` is treated as a JSON document, anything else as the line grammar.
pub fn compile(source: &str) -> Result<Vec<ObjectDefinition>> {
    if source.trim_start().starts_with('[') {
        parse_document(source)
    } else {
        parse(source)
    }
}

/// Mesh shapes the renderer knows how to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Cube,
    Sphere,
}

impl GeometryKind {
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("cube") {
            Some(Self::Cube)
        } else if name.eq_ignore_ascii_case("sphere") {
            Some(Self::Sphere)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cube => "cube",
            Self::Sphere => "sphere",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 24-bit RGB material colour.
///
/// Deserializes from a number (`65280`) or a hex string (`"00ff00"`,
/// `"#00ff00"`, `"0x00ff00"`) and serializes as `"#rrggbb"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawColor", into = "String")]
pub struct Color(u32);

impl Color {
    pub const DEFAULT: Color = Color(0x00ff00);

    pub fn from_rgb(rgb: u32) -> Option<Self> {
        (rgb <= 0xff_ffff).then_some(Self(rgb))
    }

    pub fn rgb(self) -> u32 {
        self.0
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06x}", self.0)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix('#')
            .or_else(|| trimmed.strip_prefix("0x"))
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let rgb = u32::from_str_radix(digits, 16)
            .map_err(|_| format!("`{value}` is not a hex colour"))?;
        Self::from_rgb(rgb).ok_or_else(|| format!("colour `{value}` exceeds 24 bits"))
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColor {
    Number(u32),
    Text(String),
}

impl TryFrom<RawColor> for Color {
    type Error = String;

    fn try_from(value: RawColor) -> std::result::Result<Self, Self::Error> {
        match value {
            RawColor::Number(rgb) => {
                Color::from_rgb(rgb).ok_or_else(|| format!("colour {rgb:#x} exceeds 24 bits"))
            }
            RawColor::Text(text) => text.parse(),
        }
    }
}

/// Which transform vector a mapping writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformGroup {
    Position,
    Rotation,
    Scale,
}

impl TransformGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
        }
    }
}

/// A single transform axis such as `rotation.z`, resolved once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetProperty {
    pub group: TransformGroup,
    pub axis: Axis,
}

impl TargetProperty {
    pub const fn new(group: TransformGroup, axis: Axis) -> Self {
        Self { group, axis }
    }
}

impl FromStr for TargetProperty {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let unknown = || format!("unknown target property `{value}`");
        let (group, axis) = value.trim().split_once('.').ok_or_else(unknown)?;
        let group = match group {
            "position" => TransformGroup::Position,
            "rotation" => TransformGroup::Rotation,
            "scale" => TransformGroup::Scale,
            _ => return Err(unknown()),
        };
        let axis = match axis {
            "x" => Axis::X,
            "y" => Axis::Y,
            "z" => Axis::Z,
            _ => return Err(unknown()),
        };
        Ok(Self { group, axis })
    }
}

impl TryFrom<String> for TargetProperty {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetProperty> for String {
    fn from(value: TargetProperty) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TargetProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group.as_str(), self.axis.as_str())
    }
}

/// The audio side of a mapping.
///
/// Names outside the known feature set are kept rather than rejected; the
/// mapping engine treats them as a feature that is not available.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AudioProperty {
    Feature(AudioFeature),
    Unrecognized(String),
}

impl AudioProperty {
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        match AudioFeature::from_name(name) {
            Some(feature) => Self::Feature(feature),
            None => Self::Unrecognized(name.to_string()),
        }
    }

    pub fn feature(&self) -> Option<AudioFeature> {
        match self {
            Self::Feature(feature) => Some(*feature),
            Self::Unrecognized(_) => None,
        }
    }
}

impl From<AudioFeature> for AudioProperty {
    fn from(value: AudioFeature) -> Self {
        Self::Feature(value)
    }
}

impl From<String> for AudioProperty {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<AudioProperty> for String {
    fn from(value: AudioProperty) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AudioProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(feature) => f.write_str(feature.as_str()),
            Self::Unrecognized(name) => f.write_str(name),
        }
    }
}

/// Binds one audio feature, through a linear remap, to one transform axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyMapping {
    pub target_property: TargetProperty,
    /// May be inverted (`[90, 0]`) to flip the direction of the mapping.
    pub target_range: [f32; 2],
    pub audio_property: AudioProperty,
    /// Bounds are never equal; checked when the mapping is compiled.
    pub audio_range: [f32; 2],
}

impl PropertyMapping {
    /// Builds a mapping, rejecting non-finite bounds and audio ranges that
    /// would divide by zero.
    pub fn new(
        target_property: TargetProperty,
        target_range: [f32; 2],
        audio_property: AudioProperty,
        audio_range: [f32; 2],
        at: Location,
    ) -> Result<Self> {
        let mapping = Self {
            target_property,
            target_range,
            audio_property,
            audio_range,
        };

        // JSON numbers beyond the f32 range deserialize as infinities.
        if let Some(bound) = target_range
            .iter()
            .chain(&audio_range)
            .find(|bound| !bound.is_finite())
        {
            return Err(VisualiserError::MalformedMapping {
                at,
                text: mapping.to_string(),
                reason: format!("range bound `{bound}` is not a finite number"),
            });
        }

        if audio_range[0] == audio_range[1] {
            return Err(VisualiserError::DivisionRange {
                at,
                audio_property: mapping.audio_property.to_string(),
                bound: audio_range[0],
            });
        }

        Ok(mapping)
    }

    /// Linearly remaps `audio_value` from the audio range onto the target
    /// range. Values outside the audio range extrapolate; nothing is clamped.
    pub fn map(&self, audio_value: f32) -> f32 {
        let [audio_min, audio_max] = self.audio_range;
        let [target_min, target_max] = self.target_range;
        let t = (audio_value - audio_min) / (audio_max - audio_min);
        target_min + t * (target_max - target_min)
    }
}

impl fmt::Display for PropertyMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{})<>{}({},{})",
            self.target_property,
            self.target_range[0],
            self.target_range[1],
            self.audio_property,
            self.audio_range[0],
            self.audio_range[1]
        )
    }
}

/// One visual object declared by a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDefinition {
    pub name: String,
    pub geometry: GeometryKind,
    pub color: Color,
    pub position: Vec3,
    /// Euler angles.
    pub rotation: Vec3,
    pub scale: Vec3,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<i32>,
    pub mappings: Vec<PropertyMapping>,
}

impl ObjectDefinition {
    /// Creates an object with the identity transform, the default material
    /// and no mappings.
    pub fn new(name: impl Into<String>, geometry: GeometryKind) -> Self {
        Self {
            name: name.into(),
            geometry,
            color: Color::DEFAULT,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            layer: None,
            mappings: Vec::new(),
        }
    }
}

/// Object names are unique within one compiled set.
pub(crate) fn push_unique(
    objects: &mut Vec<ObjectDefinition>,
    object: ObjectDefinition,
    at: Location,
) -> Result<()> {
    if objects.iter().any(|existing| existing.name == object.name) {
        return Err(VisualiserError::DuplicateObject {
            at,
            name: object.name,
        });
    }
    objects.push(object);
    Ok(())
}
