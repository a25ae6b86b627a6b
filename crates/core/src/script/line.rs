use crate::{error::Location, Result, VisualiserError};

use super::{
    push_unique, AudioProperty, GeometryKind, ObjectDefinition, PropertyMapping, TargetProperty,
};

enum State {
    OutsideBlock,
    InsideBlock {
        object: ObjectDefinition,
        opened_at: Location,
    },
}

/// Parses the line grammar into object definitions.
///
/// ```text
/// objectBlock  := identifier ':' geometryKind? '{' mapping* '}'
/// mapping      := targetProperty '(' number ',' number ')' '<>' audioProperty '(' number ',' number ')'
/// ```
///
/// Each construct sits on its own line; blank lines and surrounding
/// whitespace are ignored. The geometry defaults to a cube when omitted.
pub fn parse(source: &str) -> Result<Vec<ObjectDefinition>> {
    let mut objects = Vec::new();
    let mut state = State::OutsideBlock;

    for (index, raw) in source.lines().enumerate() {
        let at = Location::Line(index + 1);
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        state = match state {
            State::OutsideBlock if line == "}" => {
                return Err(syntax(at, "`}` without an open object block"));
            }
            State::OutsideBlock if line.contains('{') => State::InsideBlock {
                object: parse_header(line, at)?,
                opened_at: at,
            },
            State::OutsideBlock => {
                return Err(syntax(
                    at,
                    format!("expected an object header such as `name:cube{{`, found `{line}`"),
                ));
            }
            State::InsideBlock { object, opened_at } if line == "}" => {
                push_unique(&mut objects, object, opened_at)?;
                State::OutsideBlock
            }
            State::InsideBlock { object, opened_at } if line.contains('{') => {
                return Err(syntax(
                    at,
                    format!(
                        "cannot open a block while `{}` (opened at {opened_at}) is still open",
                        object.name
                    ),
                ));
            }
            State::InsideBlock {
                mut object,
                opened_at,
            } => {
                object.mappings.push(parse_mapping(line, at)?);
                State::InsideBlock { object, opened_at }
            }
        };
    }

    if let State::InsideBlock { object, opened_at } = state {
        return Err(syntax(
            opened_at,
            format!("object block `{}` is never closed", object.name),
        ));
    }

    Ok(objects)
}

fn syntax(at: Location, message: impl Into<String>) -> VisualiserError {
    VisualiserError::Syntax {
        at,
        message: message.into(),
    }
}

fn parse_header(line: &str, at: Location) -> Result<ObjectDefinition> {
    let head = line
        .strip_suffix('{')
        .ok_or_else(|| syntax(at, "`{` must end the object header line"))?
        .trim();

    let (name, kind) = match head.split_once(':') {
        Some((name, kind)) => (name.trim(), kind.trim()),
        None => (head, ""),
    };

    if !is_identifier(name) {
        return Err(syntax(at, format!("invalid object name `{name}`")));
    }

    let geometry = if kind.is_empty() {
        GeometryKind::default()
    } else {
        GeometryKind::from_name(kind).ok_or_else(|| VisualiserError::UnsupportedGeometry {
            at,
            kind: kind.to_string(),
        })?
    };

    Ok(ObjectDefinition::new(name, geometry))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn parse_mapping(line: &str, at: Location) -> Result<PropertyMapping> {
    let malformed = |reason: String| VisualiserError::MalformedMapping {
        at,
        text: line.to_string(),
        reason,
    };

    let (target, audio) = line
        .split_once("<>")
        .ok_or_else(|| malformed("missing `<>` separator".to_string()))?;
    if audio.contains("<>") {
        return Err(malformed("more than one `<>` separator".to_string()));
    }

    let (target_name, target_range) = parse_call(target).map_err(&malformed)?;
    let target_property: TargetProperty = target_name.parse().map_err(&malformed)?;
    let (audio_name, audio_range) = parse_call(audio).map_err(&malformed)?;

    PropertyMapping::new(
        target_property,
        target_range,
        AudioProperty::from_name(audio_name),
        audio_range,
        at,
    )
}

/// Splits `name(a, b)` into its name and numeric pair.
fn parse_call(expr: &str) -> std::result::Result<(&str, [f32; 2]), String> {
    let expr = expr.trim();
    let open = expr
        .find('(')
        .ok_or_else(|| format!("`{expr}` is missing its `(min,max)` range"))?;
    let inner = expr[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| format!("`{expr}` is missing a closing `)`"))?;

    let name = expr[..open].trim();
    if name.is_empty() {
        return Err(format!("`{expr}` has no property name"));
    }

    let parts: Vec<&str> = inner.split(',').collect();
    let [min, max] = parts.as_slice() else {
        return Err(format!("`{expr}` needs exactly two numbers"));
    };

    Ok((name, [parse_number(min)?, parse_number(max)?]))
}

fn parse_number(token: &str) -> std::result::Result<f32, String> {
    let token = token.trim();
    token
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("`{token}` is not a number"))
}
