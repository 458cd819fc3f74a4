use crate::error::AnalysisOutcome;
use common::crowd::{AnalysisResult, CacheStatsResponse, MediaKey};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// Completed analyses keyed by media kind and id.
///
/// Each key owns a `OnceCell`, so concurrent requests for the same media run
/// the computation once and share its result. A failed computation leaves
/// the cell empty and the next request computes again. Entries live for the
/// lifetime of the process.
#[derive(Default)]
pub struct ResultCache {
    cells: RwLock<HashMap<MediaKey, Arc<OnceCell<AnalysisResult>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, key: &MediaKey) -> Arc<OnceCell<AnalysisResult>> {
        {
            let cells = self.cells.read().await;
            if let Some(cell) = cells.get(key) {
                return cell.clone();
            }
        }

        let mut cells = self.cells.write().await;
        cells.entry(key.clone()).or_default().clone()
    }

    /// Return the cached result for `key`, computing it on first use
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &MediaKey,
        compute: F,
    ) -> AnalysisOutcome<AnalysisResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisOutcome<AnalysisResult>>,
    {
        let cell = self.cell(key).await;

        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await?
            .clone();

        if computed {
            self.misses.fetch_add(1, Ordering::Relaxed);
            telemetry::metrics::CROWD_CACHE_LOOKUPS
                .with_label_values(&["miss"])
                .inc();
            telemetry::metrics::CROWD_CACHE_ENTRIES.set(self.len().await as i64);
            debug!(%key, "cached analysis result");
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            telemetry::metrics::CROWD_CACHE_LOOKUPS
                .with_label_values(&["hit"])
                .inc();
            debug!(%key, "analysis result served from cache");
        }

        Ok(result)
    }

    /// Cached result for `key`, if one completed
    pub async fn get(&self, key: &MediaKey) -> Option<AnalysisResult> {
        let cells = self.cells.read().await;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    pub async fn contains(&self, key: &MediaKey) -> bool {
        let cells = self.cells.read().await;
        cells.get(key).is_some_and(|cell| cell.initialized())
    }

    /// Number of completed entries
    pub async fn len(&self) -> usize {
        let cells = self.cells.read().await;
        cells.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStatsResponse {
        CacheStatsResponse {
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
