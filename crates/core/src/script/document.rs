use glam::Vec3;
use serde::Deserialize;

use crate::{error::Location, Result, VisualiserError};

use super::{
    push_unique, AudioProperty, Color, GeometryKind, ObjectDefinition, PropertyMapping,
    TargetProperty,
};

#[derive(Debug, Deserialize)]
struct RawObject {
    name: String,
    #[serde(default)]
    geometry: Option<String>,
    #[serde(default)]
    color: Option<Color>,
    #[serde(default)]
    position: Option<Vec3>,
    #[serde(default)]
    rotation: Option<Vec3>,
    #[serde(default)]
    scale: Option<Vec3>,
    #[serde(default)]
    layer: Option<i32>,
    #[serde(default)]
    mappings: Vec<RawMapping>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMapping {
    #[serde(alias = "property")]
    target_property: String,
    #[serde(alias = "range")]
    target_range: [f32; 2],
    audio_property: String,
    audio_range: [f32; 2],
}

impl RawMapping {
    fn source_text(&self) -> String {
        format!(
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

/// Parses the structured form: a JSON array of objects.
///
/// ```json
/// [{
///   "name": "Object1",
///   "geometry": "sphere",
///   "color": "#ff0000",
///   "position": [-4, 0, 0],
///   "mappings": [
///     { "targetProperty": "rotation.z", "targetRange": [0, 90],
///       "audioProperty": "lowPower", "audioRange": [10, 100] }
///   ]
/// }]
/// ```
///
/// Every field except `name` is optional and defaults like the line grammar.
/// `property`/`range` are accepted as aliases of `targetProperty`/`targetRange`.
pub fn parse_document(source: &str) -> Result<Vec<ObjectDefinition>> {
    let raw: Vec<RawObject> = serde_json::from_str(source)?;
    let mut objects = Vec::with_capacity(raw.len());

    for (index, raw_object) in raw.into_iter().enumerate() {
        let at = Location::Object(index + 1);
        let object = normalize(raw_object, at)?;
        push_unique(&mut objects, object, at)?;
    }

    Ok(objects)
}

fn normalize(raw: RawObject, at: Location) -> Result<ObjectDefinition> {
    if raw.name.trim().is_empty() {
        return Err(VisualiserError::Syntax {
            at,
            message: "object name must not be empty".to_string(),
        });
    }

    let geometry = match raw.geometry.as_deref().map(str::trim) {
        None | Some("") => GeometryKind::default(),
        Some(kind) => {
            GeometryKind::from_name(kind).ok_or_else(|| VisualiserError::UnsupportedGeometry {
                at,
                kind: kind.to_string(),
            })?
        }
    };

    let mut object = ObjectDefinition::new(raw.name.trim(), geometry);
    object.color = raw.color.unwrap_or_default();
    object.position = raw.position.unwrap_or(object.position);
    object.rotation = raw.rotation.unwrap_or(object.rotation);
    object.scale = raw.scale.unwrap_or(object.scale);
    if ![object.position, object.rotation, object.scale]
        .iter()
        .all(|vector| vector.is_finite())
    {
        return Err(VisualiserError::Syntax {
            at,
            message: format!("initial transform of `{}` is not finite", object.name),
        });
    }
    object.layer = raw.layer;
    object.mappings = raw
        .mappings
        .iter()
        .map(|mapping| normalize_mapping(mapping, at))
        .collect::<Result<_>>()?;

    Ok(object)
}

fn normalize_mapping(raw: &RawMapping, at: Location) -> Result<PropertyMapping> {
    let target_property: TargetProperty =
        raw.target_property
            .parse()
            .map_err(|reason| VisualiserError::MalformedMapping {
                at,
                text: raw.source_text(),
                reason,
            })?;

    PropertyMapping::new(
        target_property,
        raw.target_range,
        AudioProperty::from_name(&raw.audio_property),
        raw.audio_range,
        at,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;

    #[test]
    fn matches_the_line_grammar() {
        let document = r#"[
            {
                "name": "Object1",
                "geometry": "cube",
                "mappings": [
                    { "targetProperty": "rotation.z", "targetRange": [0, 90],
                      "audioProperty": "lowPower", "audioRange": [10, 100] }
                ]
            }
        ]"#;
        let line = "Object1:cube{\n  rotation.z(0,90)<>lowPower(10,100)\n}";

        assert_eq!(parse_document(document).unwrap(), parse(line).unwrap());
    }

    #[test]
    fn reads_explicit_fields() {
        let document = r#"[
            {
                "name": "Cube3",
                "geometry": "sphere",
                "color": "ff0000",
                "position": [4, 0, 0],
                "rotation": [0, 0.5, 0],
                "scale": [2, 2, 2],
                "layer": 3,
                "mappings": [
                    { "property": "scale.x", "range": [0.5, 8],
                      "audioProperty": "highPower", "audioRange": [0, 100] }
                ]
            }
        ]"#;

        let objects = parse_document(document).unwrap();
        let object = &objects[0];
        assert_eq!(object.geometry, GeometryKind::Sphere);
        assert_eq!(object.color.rgb(), 0xff0000);
        assert_eq!(object.position, Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(object.rotation, Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(object.scale, Vec3::splat(2.0));
        assert_eq!(object.layer, Some(3));
        assert_eq!(object.mappings[0].target_range, [0.5, 8.0]);
    }

    #[test]
    fn numeric_colours_are_accepted() {
        let objects = parse_document(r#"[{ "name": "A", "color": 255 }]"#).unwrap();
        assert_eq!(objects[0].color.rgb(), 0x0000ff);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let objects = parse_document(r#"[{ "name": "Plain" }]"#).unwrap();
        assert_eq!(objects[0], ObjectDefinition::new("Plain", GeometryKind::Cube));
    }

    #[test]
    fn unknown_geometry_is_rejected() {
        let err = parse_document(r#"[{ "name": "A" }, { "name": "B", "geometry": "torus" }]"#)
            .unwrap_err();
        match err {
            VisualiserError::UnsupportedGeometry { at, kind } => {
                assert_eq!(at, Location::Object(2));
                assert_eq!(kind, "torus");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn equal_audio_bounds_are_rejected() {
        let err = parse_document(
            r#"[{ "name": "A", "mappings": [
                { "targetProperty": "position.x", "targetRange": [0, 1],
                  "audioProperty": "midPower", "audioRange": [3, 3] } ] }]"#,
        )
        .unwrap_err();
        assert!(matches!(err, VisualiserError::DivisionRange { .. }));
    }

    #[test]
    fn out_of_range_bounds_are_rejected() {
        let err = parse_document(
            r#"[{ "name": "A", "mappings": [
                { "targetProperty": "rotation.z", "targetRange": [0, 90],
                  "audioProperty": "lowPower", "audioRange": [-1e39, 1e39] } ] }]"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            VisualiserError::MalformedMapping { at: Location::Object(1), .. }
        ));

        let err = parse_document(
            r#"[{ "name": "A", "mappings": [
                { "targetProperty": "rotation.z", "targetRange": [0, 1e40],
                  "audioProperty": "lowPower", "audioRange": [0, 1] } ] }]"#,
        )
        .unwrap_err();
        assert!(matches!(err, VisualiserError::MalformedMapping { .. }));
    }

    #[test]
    fn out_of_range_initial_transform_is_rejected() {
        let err = parse_document(r#"[{ "name": "A", "position": [1e39, 0, 0] }]"#).unwrap_err();
        assert!(matches!(err, VisualiserError::Syntax { .. }));
    }

    #[test]
    fn bad_target_property_is_a_malformed_mapping() {
        let err = parse_document(
            r#"[{ "name": "A", "mappings": [
                { "targetProperty": "opacity", "targetRange": [0, 1],
                  "audioProperty": "midPower", "audioRange": [0, 1] } ] }]"#,
        )
        .unwrap_err();
        match err {
            VisualiserError::MalformedMapping { text, .. } => {
                assert!(text.starts_with("opacity(0,1)<>midPower"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_json_is_a_document_error() {
        let err = parse_document("[{ \"name\": ").unwrap_err();
        assert!(matches!(err, VisualiserError::Document(_)));
        assert!(err.is_script_error());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse_document(r#"[{ "name": "A" }, { "name": "A" }]"#).unwrap_err();
        assert!(matches!(
            err,
            VisualiserError::DuplicateObject {
                at: Location::Object(2),
                ..
            }
        ));
    }
}
