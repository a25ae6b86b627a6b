use std::fmt;

/// Result alias that carries the custom [`VisualiserError`] type.
pub type Result<T> = std::result::Result<T, VisualiserError>;

/// Where in a script a parse error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// 1-based line in the line-oriented grammar.
    Line(usize),
    /// 1-based position of an object in a structured document.
    Object(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Line(line) => write!(f, "line {line}"),
            Location::Object(index) => write!(f, "object #{index}"),
        }
    }
}

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualiserError {
    /// The audio input could not be opened (permission, missing hardware,
    /// unsupported stream format).
    #[error("cannot access audio input `{device}`: {reason}")]
    DeviceAccess { device: String, reason: String },
    /// A stream from another device is still active and must be stopped first.
    #[error("audio input `{active}` is still running, stop it before starting `{requested}`")]
    AlreadyRunning { active: String, requested: String },
    #[error("syntax error at {at}: {message}")]
    Syntax { at: Location, message: String },
    #[error("unsupported geometry `{kind}` at {at}")]
    UnsupportedGeometry { at: Location, kind: String },
    /// A mapping rule that does not follow `prop(a,b)<>feature(c,d)`. Carries
    /// the raw source text for diagnostics.
    #[error("malformed mapping at {at}: {reason} in `{text}`")]
    MalformedMapping {
        at: Location,
        text: String,
        reason: String,
    },
    /// An audio range with equal bounds; interpolating over it would divide
    /// by zero.
    #[error("audio range of `{audio_property}` at {at} has equal bounds ({bound})")]
    DivisionRange {
        at: Location,
        audio_property: String,
        bound: f32,
    },
    #[error("object `{name}` at {at} is already defined")]
    DuplicateObject { at: Location, name: String },
    #[error("invalid object document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("spectrum analysis failed: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl VisualiserError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Returns `true` for errors produced while compiling a script. These are
    /// always recoverable: the caller keeps its last compiled object set.
    pub fn is_script_error(&self) -> bool {
        matches!(
            self,
            Self::Syntax { .. }
                | Self::UnsupportedGeometry { .. }
                | Self::MalformedMapping { .. }
                | Self::DivisionRange { .. }
                | Self::DuplicateObject { .. }
                | Self::Document(_)
        )
    }
}

impl From<&str> for VisualiserError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualiserError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
