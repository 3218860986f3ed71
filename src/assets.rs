//! Sample provider boundary for tape-loop mode.
//!
//! Fetching and decoding audio happens outside this crate. A provider hands
//! over decoded mono buffers by phrase id; whatever fails is reported per
//! asset and the session carries on with the rest.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::dsp::sampler::SampleBuffer;
use crate::error::AssetError;
use crate::phrase::PhraseId;

/// Supplies decoded loop material.
pub trait SampleProvider {
    fn load(&mut self, id: PhraseId) -> Result<SampleBuffer, AssetError>;
}

/// Provider backed by buffers already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    buffers: BTreeMap<PhraseId, SampleBuffer>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        InMemoryProvider::default()
    }

    pub fn insert(&mut self, id: PhraseId, buffer: SampleBuffer) {
        self.buffers.insert(id, buffer);
    }

    pub fn with(mut self, id: PhraseId, buffer: SampleBuffer) -> Self {
        self.insert(id, buffer);
        self
    }
}

impl SampleProvider for InMemoryProvider {
    fn load(&mut self, id: PhraseId) -> Result<SampleBuffer, AssetError> {
        match self.buffers.get(&id) {
            Some(buffer) if buffer.is_empty() => Err(AssetError::Missing {
                id,
                reason: "buffer is empty".to_string(),
            }),
            Some(buffer) => Ok(buffer.clone()),
            None => Err(AssetError::Missing {
                id,
                reason: "no such asset".to_string(),
            }),
        }
    }
}

/// Outcome of loading a set of loops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<PhraseId>,
    pub failed: Vec<AssetError>,
}

impl LoadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Ask `provider` for every id. Failures are logged and collected, never fatal.
pub fn load_all(
    provider: &mut dyn SampleProvider,
    ids: &[PhraseId],
) -> (BTreeMap<PhraseId, SampleBuffer>, LoadReport) {
    let mut buffers = BTreeMap::new();
    let mut report = LoadReport::default();
    for &id in ids {
        match provider.load(id) {
            Ok(buffer) => {
                buffers.insert(id, buffer);
                report.loaded.push(id);
            }
            Err(e) => {
                warn!(asset = id, error = %e, "asset failed to load");
                report.failed.push(e);
            }
        }
    }
    info!(loaded = report.loaded.len(), failed = report.failed.len(), "assets loaded");
    (buffers, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_assets_are_reported_not_fatal() {
        let mut provider = InMemoryProvider::new()
            .with(1, SampleBuffer::new(vec![0.1; 10], 48000))
            .with(3, SampleBuffer::new(Vec::new(), 48000));
        let (buffers, report) = load_all(&mut provider, &[1, 2, 3]);
        assert_eq!(report.loaded, vec![1]);
        assert_eq!(report.failed.len(), 2);
        assert!(!report.is_complete());
        assert!(buffers.contains_key(&1));
        assert!(matches!(report.failed[0], AssetError::Missing { id: 2, .. }));
    }
}
