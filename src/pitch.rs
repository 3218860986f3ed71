//! Note name to MIDI number to frequency helpers.

/// Parse a note name (e.g. "C4", "F#3", "Bb5") into a MIDI note number.
///
/// The phrase library also spells flats with an upper-case `B`
/// ("BB5" = B♭5, "EB5" = E♭5); that form is accepted too.
pub fn note_to_midi(note: &str) -> Option<i32> {
    let note = note.trim();
    let bytes = note.as_bytes();
    if bytes.is_empty() {
        return None;
    }

    let base_semitone = match bytes[0].to_ascii_uppercase() as char {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;

    if idx < bytes.len() {
        match bytes[idx] as char {
            '#' => {
                semitone += 1;
                idx += 1;
            }
            'b' | 'B' => {
                semitone -= 1;
                idx += 1;
            }
            _ => {}
        }
    }

    let octave: i32 = note[idx..].parse().ok()?;

    // MIDI note number: C4 = 60
    Some((octave + 1) * 12 + semitone)
}

/// `tuning_pitch * 2^((midi - 69) / 12)`.
pub fn midi_to_frequency(midi: i32, tuning_pitch: f64) -> f64 {
    tuning_pitch * (2.0_f64).powf((midi as f64 - 69.0) / 12.0)
}

/// Note name to Hz at A4 = 440.
pub fn note_to_frequency(note: &str) -> Option<f64> {
    note_to_midi(note).map(|m| midi_to_frequency(m, 440.0))
}
