//! Offline renderer: drives the scheduler and engine block by block and
//! encodes the result as a WAV byte buffer.

use crate::config::EngineConfig;
use crate::error::StringMorphError;
use crate::phrase::Phrase;
use crate::scheduler::{LoopPhasingScheduler, StaggerPolicy};

use super::engine::StringEngine;

/// Render `seconds` of `phrases` looping through a string engine.
///
/// The scheduler is advanced to the start of each block before the block
/// renders, the same way a live host would poll it.
pub fn render_phrases(
    config: EngineConfig,
    phrases: Vec<Phrase>,
    stagger: StaggerPolicy,
    seconds: f64,
) -> Result<Vec<f32>, StringMorphError> {
    let mut scheduler = LoopPhasingScheduler::with_phrases(phrases)?;
    let mut engine = StringEngine::new(config)?;
    let mut handle = engine.handle();
    let sr = engine.sample_rate();
    let block = engine.block_size();

    let total = (seconds.max(0.0) * sr).round() as usize;
    let mut out = vec![0.0_f32; total];

    scheduler.engage_all(stagger, 0.0);
    for (n, chunk) in out.chunks_mut(block).enumerate() {
        let now = (n * block) as f64 / sr;
        scheduler.advance_to(now, &mut handle);
        engine.render_block(chunk);
    }
    Ok(out)
}

/// [`render_phrases`] straight to 16-bit mono WAV bytes.
pub fn render_phrases_wav(
    config: EngineConfig,
    phrases: Vec<Phrase>,
    stagger: StaggerPolicy,
    seconds: f64,
) -> Result<Vec<u8>, StringMorphError> {
    let sample_rate = config.sample_rate.round() as u32;
    let samples = render_phrases(config, phrases, stagger, seconds)?;
    Ok(encode_wav(&samples, sample_rate))
}

/// Encode mono float samples in [-1, 1] as 16-bit PCM WAV bytes.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    // RIFF header
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    // fmt chunk
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        buf.extend_from_slice(&pcm.to_le_bytes());
    }

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase::airports;
    use std::io::Cursor;

    #[test]
    fn wav_header_valid() {
        let wav = encode_wav(&[0.0, 0.5, -0.5], 44100);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(wav.len(), 44 + 6);

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 16383, -16383]);
    }

    #[test]
    fn clips_out_of_range_samples() {
        let wav = encode_wav(&[2.0, -2.0], 8000);
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![32767, -32767]);
    }

    #[test]
    fn phrases_render_to_audible_wav() {
        let config = EngineConfig::with_sample_rate(22050.0);
        let phrases = vec![
            Phrase::single(1, 1.3, 0.1).with_pitch("C4"),
            Phrase::single(2, 1.7, 0.4).with_pitch("G4"),
        ];
        let wav = render_phrases_wav(config, phrases, StaggerPolicy::Simultaneous, 3.0).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.duration(), 66150);
        let samples: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert!(samples[..2000].iter().all(|&s| s == 0), "nothing fires before 0.1 s");
        assert!(samples.iter().any(|&s| s.abs() > 100), "rendered audio is silent");
    }

    #[test]
    fn airports_render_is_quiet_before_first_offset() {
        // The earliest phrase starts at 3.84 s (plus its stagger).
        let out = render_phrases(
            EngineConfig::with_sample_rate(8000.0),
            airports(),
            StaggerPolicy::default(),
            3.5,
        )
        .unwrap();
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_phrases_are_rejected() {
        let bad = vec![Phrase::single(1, -1.0, 0.0)];
        assert!(matches!(
            render_phrases(EngineConfig::default(), bad, StaggerPolicy::Simultaneous, 1.0),
            Err(StringMorphError::Phrase(_))
        ));
    }
}
