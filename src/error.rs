use std::fmt;

use ariadne::{Config, Label, Report, ReportKind, Source};

#[derive(Debug)]
pub enum StringMorphError {
    Config(ConfigError),
    Phrase(PhraseError),
    Asset(AssetError),
    UnknownParameter(String),
    UnknownMode(String),
}

/// Invalid engine construction input. Always fatal: no partial engine is built.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidSampleRate(f64),
    DegenerateFrequency { name: &'static str, value: f64 },
    InvalidBlockSize(usize),
    InvalidSmoothing(f64),
    InvalidFormant { index: usize, frequency: f64, q: f64 },
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PhraseError {
    NonPositivePeriod { id: u32, period: f64 },
    OffsetOutOfRange { id: u32, offset: f64, period: f64 },
    UnknownPitch { id: u32, pitch: String },
    DuplicateId(u32),
    UnknownPhrase(u32),
    Parse { message: String, line: usize, column: usize },
}

/// A single asset the sample provider could not deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetError {
    Missing { id: u32, reason: String },
}

impl fmt::Display for StringMorphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StringMorphError::Config(e) => write!(f, "Configuration error: {e}"),
            StringMorphError::Phrase(e) => write!(f, "Phrase error: {e}"),
            StringMorphError::Asset(e) => write!(f, "Asset error: {e}"),
            StringMorphError::UnknownParameter(name) => write!(f, "Unknown parameter '{name}'"),
            StringMorphError::UnknownMode(name) => write!(f, "Unknown excitation mode '{name}'"),
        }
    }
}

impl std::error::Error for StringMorphError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidSampleRate(sr) => {
                write!(f, "Sample rate must be positive and finite, got {sr}")
            }
            ConfigError::DegenerateFrequency { name, value } => {
                write!(f, "Frequency '{name}' must be positive, got {value}")
            }
            ConfigError::InvalidBlockSize(n) => write!(f, "Block size must be non-zero, got {n}"),
            ConfigError::InvalidSmoothing(t) => {
                write!(f, "Smoothing time must be positive and finite, got {t}")
            }
            ConfigError::InvalidFormant { index, frequency, q } => {
                write!(f, "Body formant #{index} is degenerate (f={frequency}, q={q})")
            }
            ConfigError::Parse(msg) => write!(f, "Invalid config JSON: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for PhraseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhraseError::NonPositivePeriod { id, period } => {
                write!(f, "Phrase {id}: base period must be > 0, got {period}")
            }
            PhraseError::OffsetOutOfRange { id, offset, period } => {
                write!(f, "Phrase {id}: event offset {offset} outside [0, {period})")
            }
            PhraseError::UnknownPitch { id, pitch } => {
                write!(f, "Phrase {id}: unrecognised pitch '{pitch}'")
            }
            PhraseError::DuplicateId(id) => write!(f, "Phrase id {id} defined twice"),
            PhraseError::UnknownPhrase(id) => write!(f, "No phrase with id {id}"),
            PhraseError::Parse { message, line, column } => {
                write!(f, "{message} at line {line} column {column}")
            }
        }
    }
}

impl std::error::Error for PhraseError {}

impl PhraseError {
    /// Render a diagnostic pointing into the JSON source the error came from.
    ///
    /// Only parse errors carry a position; every other variant falls back to
    /// its plain `Display` text.
    pub fn report(&self, source: &str) -> String {
        let PhraseError::Parse { message, line, column } = self else {
            return self.to_string();
        };

        let offset = byte_offset(source, *line, *column);
        let end = (offset + 1).min(source.len()).max(offset);
        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, ("phrases.json", offset..end))
            .with_config(Config::default().with_color(false))
            .with_message("invalid phrase definition")
            .with_label(Label::new(("phrases.json", offset..end)).with_message(message))
            .finish()
            .write(("phrases.json", Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// Convert a 1-based line/column pair into a byte offset, clamped to the source.
fn byte_offset(source: &str, line: usize, column: usize) -> usize {
    let mut offset = 0;
    for (i, text) in source.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            return (offset + column.saturating_sub(1)).min(source.len());
        }
        offset += text.len();
    }
    source.len()
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::Missing { id, reason } => write!(f, "Could not load loop {id}: {reason}"),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<ConfigError> for StringMorphError {
    fn from(e: ConfigError) -> Self {
        StringMorphError::Config(e)
    }
}

impl From<PhraseError> for StringMorphError {
    fn from(e: PhraseError) -> Self {
        StringMorphError::Phrase(e)
    }
}

impl From<AssetError> for StringMorphError {
    fn from(e: AssetError) -> Self {
        StringMorphError::Asset(e)
    }
}
