//! Body resonance: A fixed bank of band-pass formants blended with the dry string.

use crate::config::FormantConfig;

use super::filter::{BiquadFilter, FilterType};

/// Make-up gain for the summed formants (narrow band-passes lose level).
const BODY_MAKEUP: f64 = 2.0;
/// Pre-drive for the soft saturation feeding the bank.
const BODY_DRIVE: f64 = 1.5;

#[derive(Debug, Clone)]
struct Section {
    filter: BiquadFilter,
    gain: f64,
}

/// Instrument-body model: band-pass sections at fixed formant frequencies.
///
/// Coefficients are computed once at construction and never change; only the
/// `material` blend moves at runtime. Formants at or above Nyquist are left
/// out of the bank.
#[derive(Debug, Clone)]
pub struct BiquadFilterBank {
    sections: Vec<Section>,
}

impl BiquadFilterBank {
    pub fn new(sample_rate: f64, formants: &[FormantConfig]) -> Self {
        let nyquist = sample_rate / 2.0;
        let sections = formants
            .iter()
            .filter(|f| f.frequency < nyquist)
            .map(|f| Section {
                filter: BiquadFilter::with_params(FilterType::Bandpass, sample_rate, f.frequency, f.q),
                gain: f.gain,
            })
            .collect();
        BiquadFilterBank { sections }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Resonated body tone for one input sample (no dry component).
    #[inline]
    pub fn resonate(&mut self, input: f64) -> f64 {
        let driven = (input * BODY_DRIVE).tanh();
        let mut sum = 0.0;
        for section in self.sections.iter_mut() {
            sum += section.filter.process(driven) * section.gain;
        }
        sum * BODY_MAKEUP
    }

    /// Blend dry string and body: `material = 0` is all string, `1` all body.
    #[inline]
    pub fn process(&mut self, input: f64, material: f64) -> f64 {
        let m = material.clamp(0.0, 1.0);
        let body = self.resonate(input);
        input * (1.0 - m) + body * m
    }

    pub fn reset(&mut self) {
        for section in self.sections.iter_mut() {
            section.filter.reset();
        }
    }
}
