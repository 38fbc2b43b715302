use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::Result;
use crate::store::RawCaptureStore;
use crate::types::{CaptureRef, RawCapture, SourceId};

/// In-process bronze layer. Entries are only ever inserted.
#[derive(Default)]
pub struct MemoryCaptureStore {
    captures: DashMap<CaptureRef, Arc<RawCapture>>,
}

impl MemoryCaptureStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RawCaptureStore for MemoryCaptureStore {
    async fn append(&self, capture: &RawCapture) -> Result<bool> {
        match self.captures.entry(capture.key()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(capture.clone()));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &CaptureRef) -> Result<Option<RawCapture>> {
        Ok(self.captures.get(key).map(|c| c.as_ref().clone()))
    }

    async fn scan(&self, source: Option<SourceId>) -> Result<Vec<RawCapture>> {
        let mut out: Vec<RawCapture> = self
            .captures
            .iter()
            .filter(|c| source.map_or(true, |s| c.source == s))
            .map(|c| c.value().as_ref().clone())
            .collect();
        out.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(out)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.captures.len())
    }
}
