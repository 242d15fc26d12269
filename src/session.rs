use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, info};
use mime::Mime;
use tokio::task;
use uuid::Uuid;

use crate::compression::{self, CompressionResult, QualityFactor, SourceImage};
use crate::config::Config;
use crate::errors::CompressorError;
use crate::metrics::SizeMetrics;

/// What became of a compression request once its future resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// The result was committed as the session's current result.
    Completed(SizeMetrics),
    /// The source was replaced while the request was in flight; the stale
    /// result was dropped without being attached to the new source.
    Superseded,
}

#[derive(Default)]
struct SessionState {
    source: Option<SourceImage>,
    result: Option<CompressionResult>,
}

/// Owns the "current source / current result" pair that the original page
/// kept in ambient shared state, with explicit replace and release
/// semantics.
///
/// Selecting a new source discards the previous source and any result
/// derived from it. `compress` runs the pipeline off-thread and commits the
/// result only if the source it was issued against is still current, so a
/// request that is superseded mid-flight can never surface under the wrong
/// image.
pub struct CompressorSession {
    state: Arc<Mutex<SessionState>>,
    config: Config,
}

impl CompressorSession {
    pub fn new(config: Config) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            config,
        }
    }

    /// Replaces the current source wholesale and returns its request tag.
    /// The previous source and result buffers are released here.
    pub fn select_source(
        &self,
        bytes: impl Into<Bytes>,
        mime_type: Mime,
        display_name: impl Into<String>,
    ) -> Uuid {
        let source = SourceImage::new(bytes, mime_type, display_name);
        let id = source.id;
        info!(
            "selected {} ({} bytes, {})",
            source.display_name,
            source.byte_len(),
            source.mime_type
        );

        let mut state = self.state.lock().unwrap();
        state.source = Some(source);
        state.result = None;
        id
    }

    /// Compresses the current source at `quality` (configured default when
    /// `None`). Resolves asynchronously; the caller stays responsive and may
    /// select another image meanwhile, in which case this request reports
    /// `Superseded` and its output is discarded.
    pub async fn compress(
        &self,
        quality: Option<QualityFactor>,
    ) -> Result<CompressionOutcome, CompressorError> {
        let quality = match quality {
            Some(q) => q,
            None => QualityFactor::new(self.config.compression.default_quality)?,
        };

        let (source, request_id) = {
            let state = self.state.lock().unwrap();
            let source = state.source.clone().ok_or(CompressorError::NoSource)?;
            let id = source.id;
            (source, id)
        };

        let original_bytes = source.byte_len() as u64;
        let mime = source.mime_type.clone();
        let config = self.config.clone();
        let outcome =
            task::spawn_blocking(move || compression::compress_with(&source, quality, &config))
                .await
            .map_err(|e| {
                CompressorError::encode(&mime, format!("compression task failed: {}", e))
            })?;

        let mut state = self.state.lock().unwrap();
        let still_current = state.source.as_ref().map(|s| s.id) == Some(request_id);
        if !still_current {
            // Stale request: whatever it produced belongs to a source that
            // is no longer selected. Drop it, including any error.
            debug!("discarding superseded compression request {}", request_id);
            return Ok(CompressionOutcome::Superseded);
        }

        let result = outcome?;
        let metrics = SizeMetrics::new(original_bytes, result.byte_len() as u64);
        // Replacing the previous result drops its buffer handle.
        state.result = Some(result);
        Ok(CompressionOutcome::Completed(metrics))
    }

    /// The committed result for the current source, if any. The returned
    /// handle shares the underlying buffer; it stays alive until every
    /// handle is dropped.
    pub fn current_result(&self) -> Option<CompressionResult> {
        self.state.lock().unwrap().result.clone()
    }

    /// Size metrics for the current source/result pair.
    pub fn metrics(&self) -> Option<SizeMetrics> {
        let state = self.state.lock().unwrap();
        match (&state.source, &state.result) {
            (Some(source), Some(result)) => Some(SizeMetrics::new(
                source.byte_len() as u64,
                result.byte_len() as u64,
            )),
            _ => None,
        }
    }

    /// Download name for the current result: `compressed_<original name>`.
    pub fn download_filename(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        if state.result.is_none() {
            return None;
        }
        state
            .source
            .as_ref()
            .map(|s| format!("compressed_{}", s.display_name))
    }

    pub fn current_source(&self) -> Option<SourceImage> {
        self.state.lock().unwrap().source.clone()
    }

    /// Releases the current source and result.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.source = None;
        state.result = None;
    }
}
