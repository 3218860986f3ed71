//! Phrase definitions: independently periodic loops of timed trigger events.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dsp::exciter::ExciterMode;
use crate::error::PhraseError;
use crate::pitch::note_to_frequency;

pub type PhraseId = u32;

fn default_intensity() -> f64 {
    1.0
}

/// What a fired event asks the sink to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcitationRef {
    /// Excitation mode; `None` lets the engine use its `impulse` control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExciterMode>,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
    /// Note name to tune the string to before exciting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<String>,
}

impl Default for ExcitationRef {
    fn default() -> Self {
        ExcitationRef {
            mode: None,
            intensity: 1.0,
            pitch: None,
        }
    }
}

impl ExcitationRef {
    pub fn frequency(&self) -> Option<f64> {
        self.pitch.as_deref().and_then(note_to_frequency)
    }
}

/// One event inside a phrase cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhraseEvent {
    /// Seconds after the start of each cycle, in `[0, basePeriodSeconds)`.
    pub offset_seconds: f64,
    #[serde(flatten)]
    pub excitation: ExcitationRef,
}

/// A self-looping set of events with its own period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phrase {
    pub id: PhraseId,
    pub base_period_seconds: f64,
    pub events: Vec<PhraseEvent>,
}

impl Phrase {
    /// A phrase with a single event at `offset` seconds.
    pub fn single(id: PhraseId, period: f64, offset: f64) -> Self {
        Phrase {
            id,
            base_period_seconds: period,
            events: vec![PhraseEvent {
                offset_seconds: offset,
                excitation: ExcitationRef::default(),
            }],
        }
    }

    /// Builder: tune every event to `pitch`.
    pub fn with_pitch(mut self, pitch: &str) -> Self {
        for event in self.events.iter_mut() {
            event.excitation.pitch = Some(pitch.to_string());
        }
        self
    }

    pub fn validate(&self) -> Result<(), PhraseError> {
        let period = self.base_period_seconds;
        if !(period.is_finite() && period > 0.0) {
            return Err(PhraseError::NonPositivePeriod { id: self.id, period });
        }
        for event in &self.events {
            let offset = event.offset_seconds;
            if !(offset.is_finite() && offset >= 0.0 && offset < period) {
                return Err(PhraseError::OffsetOutOfRange { id: self.id, offset, period });
            }
            if let Some(pitch) = &event.excitation.pitch {
                if note_to_frequency(pitch).is_none() {
                    return Err(PhraseError::UnknownPitch {
                        id: self.id,
                        pitch: pitch.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Accepted top-level JSON shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum PhraseDocument {
    Wrapped { phrases: Vec<Phrase> },
    Bare(Vec<Phrase>),
}

/// Parse and validate an ordered list of phrase definitions from JSON.
///
/// Accepts either `{"phrases": [...]}` or a bare array.
pub fn parse_phrases(json: &str) -> Result<Vec<Phrase>, PhraseError> {
    // Parse to a Value first so syntax errors keep their line/column.
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| PhraseError::Parse {
        message: e.to_string(),
        line: e.line(),
        column: e.column(),
    })?;
    let doc: PhraseDocument = serde_json::from_value(value).map_err(|e| PhraseError::Parse {
        message: format!("not a phrase list: {e}"),
        line: 1,
        column: 1,
    })?;
    let phrases = match doc {
        PhraseDocument::Wrapped { phrases } => phrases,
        PhraseDocument::Bare(phrases) => phrases,
    };
    validate_all(&phrases)?;
    Ok(phrases)
}

/// Validate every phrase and reject duplicate ids.
pub fn validate_all(phrases: &[Phrase]) -> Result<(), PhraseError> {
    let mut seen = HashSet::new();
    for phrase in phrases {
        phrase.validate()?;
        if !seen.insert(phrase.id) {
            return Err(PhraseError::DuplicateId(phrase.id));
        }
    }
    Ok(())
}

/// Serialize phrases to the wrapped JSON form.
pub fn phrases_to_json(phrases: &[Phrase]) -> String {
    serde_json::json!({ "phrases": phrases }).to_string()
}

/// The eight tape fragments: mutually non-aligned periods, one note each.
pub fn airports() -> Vec<Phrase> {
    [
        (1, 17.069, 11.645, "BB5"),
        (2, 20.752, 7.163, "EB5"),
        (3, 23.157, 3.840, "F6"),
        (4, 27.999, 11.594, "BB6"),
        (5, 29.501, 11.824, "EB6"),
        (6, 30.034, 8.693, "EB4"),
        (7, 31.101, 5.696, "BB3"),
        (8, 38.049, 6.768, "EB4"),
    ]
    .into_iter()
    .map(|(id, period, offset, pitch)| Phrase::single(id, period, offset).with_pitch(pitch))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn airports_are_valid_and_distinct() {
        let phrases = airports();
        assert_eq!(phrases.len(), 8);
        assert!(validate_all(&phrases).is_ok());
        let periods: HashSet<u64> = phrases.iter().map(|p| p.base_period_seconds.to_bits()).collect();
        assert_eq!(periods.len(), 8);
    }

    #[test]
    fn offset_must_be_inside_period() {
        let bad = Phrase::single(3, 2.0, 2.0);
        assert!(matches!(bad.validate(), Err(PhraseError::OffsetOutOfRange { id: 3, .. })));
        let negative = Phrase::single(4, 2.0, -0.1);
        assert!(negative.validate().is_err());
    }

    #[test]
    fn period_must_be_positive() {
        let bad = Phrase::single(1, 0.0, 0.0);
        assert!(matches!(bad.validate(), Err(PhraseError::NonPositivePeriod { .. })));
    }

    #[test]
    fn parses_wrapped_and_bare_forms() {
        let wrapped = r#"{ "phrases": [
            { "id": 1, "basePeriodSeconds": 17.069,
              "events": [ { "offsetSeconds": 11.645, "mode": "pulse", "pitch": "Bb5" } ] }
        ] }"#;
        let phrases = parse_phrases(wrapped).unwrap();
        assert_eq!(phrases[0].events[0].excitation.mode, Some(ExciterMode::Pulse));
        assert_eq!(phrases[0].events[0].excitation.intensity, 1.0);

        let bare = r#"[ { "id": 2, "basePeriodSeconds": 3.0, "events": [] } ]"#;
        assert_eq!(parse_phrases(bare).unwrap()[0].id, 2);
    }

    #[test]
    fn json_round_trips_library() {
        let json = phrases_to_json(&airports());
        assert_eq!(parse_phrases(&json).unwrap(), airports());
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = parse_phrases("[\n  { \"id\": 1,, }\n]").unwrap_err();
        match err {
            PhraseError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let phrases = vec![Phrase::single(1, 2.0, 0.0), Phrase::single(1, 3.0, 0.0)];
        assert_eq!(validate_all(&phrases), Err(PhraseError::DuplicateId(1)));
    }

    #[test]
    fn unknown_pitch_rejected() {
        let p = Phrase::single(5, 2.0, 0.5).with_pitch("Q9");
        assert!(matches!(p.validate(), Err(PhraseError::UnknownPitch { .. })));
    }
}
