//! Indicator run cache.
//!
//! Memoizes indicator outputs for the lifetime of one optimization run or
//! fold. The cache is an ordinary value owned by whoever drives the run and
//! is passed down explicitly; it is never shared between concurrent folds.

use crate::domain::error::OptitraderError;
use crate::domain::indicator::{IndicatorKind, IndicatorOutput, IndicatorParams};
use crate::domain::series::SliceId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identity of one indicator computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub slice: SliceId,
    pub kind: IndicatorKind,
    pub params: String,
}

impl CacheKey {
    pub fn new(slice: &SliceId, params: &IndicatorParams) -> Self {
        Self {
            slice: slice.clone(),
            kind: params.kind(),
            params: params.canonical(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.slice, self.kind, self.params)
    }
}

#[derive(Debug, Default)]
pub struct IndicatorRunCache {
    entries: HashMap<CacheKey, Arc<IndicatorOutput>>,
    computations: usize,
}

impl IndicatorRunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<IndicatorOutput>> {
        self.entries.get(key).cloned()
    }

    /// Store a result. Writing a key twice is a consistency failure.
    pub fn put(
        &mut self,
        key: CacheKey,
        output: IndicatorOutput,
    ) -> Result<Arc<IndicatorOutput>, OptitraderError> {
        if self.entries.contains_key(&key) {
            return Err(OptitraderError::DuplicateCacheKey {
                key: key.to_string(),
            });
        }
        let output = Arc::new(output);
        self.entries.insert(key, Arc::clone(&output));
        Ok(output)
    }

    /// Return the cached output, computing and storing it on a miss.
    pub fn get_or_compute<F>(
        &mut self,
        key: CacheKey,
        compute: F,
    ) -> Result<Arc<IndicatorOutput>, OptitraderError>
    where
        F: FnOnce() -> Result<IndicatorOutput, OptitraderError>,
    {
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let output = compute()?;
        self.computations += 1;
        tracing::trace!(key = %key, "indicator computed");
        self.put(key, output)
    }

    pub fn clear(&mut self) {
        tracing::debug!(entries = self.entries.len(), "clearing indicator run cache");
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Underlying computations performed since creation. Not reset by `clear`.
    pub fn computations(&self) -> usize {
        self.computations
    }
}
