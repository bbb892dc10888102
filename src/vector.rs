//! Dense-vector index and the shared store handle.
//!
//! [`VectorIndex`] is an immutable-once-built brute-force cosine index: a
//! flat f32 arena plus the unit ID for each row. At corpus scale (tens of
//! thousands of units, 768 dims) a full scan is a few milliseconds and keeps
//! the on-disk format trivial: `config.json` + `ids.json` + `vectors.bin`
//! (little-endian f32).
//!
//! [`VectorStore`] owns the handle shared across search workers. Readers
//! clone the `Arc` under a read lock and keep using their snapshot for the
//! whole query; [`VectorStore::reload`] loads the fresh index completely
//! before swapping under the write lock, and a failed load leaves the old
//! handle in place.
//!
//! The store also owns query task-prefixing: callers pass the user query
//! verbatim and the configured `search_query:`-style prefix is applied here,
//! mirroring the document prefix used at index time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, embed_one, vec_to_blob, EmbeddingProvider};
use crate::error::SearchError;
use crate::models::ReloadStats;

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    model: String,
    dims: usize,
    count: usize,
    /// Prefix documents were embedded with; recorded for audit.
    document_prefix: String,
}

/// In-memory dense index over indexed units.
pub struct VectorIndex {
    model: String,
    dims: usize,
    document_prefix: String,
    ids: Vec<String>,
    /// Row-major vector arena, `ids.len() * dims` floats.
    vectors: Vec<f32>,
    slots: HashMap<String, usize>,
}

impl VectorIndex {
    pub fn new(model: &str, dims: usize, document_prefix: &str) -> Self {
        Self {
            model: model.to_string(),
            dims,
            document_prefix: document_prefix.to_string(),
            ids: Vec::new(),
            vectors: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Insert a new vector; rejects duplicates.
    pub fn insert(&mut self, id: &str, vector: &[f32]) -> Result<()> {
        if self.slots.contains_key(id) {
            anyhow::bail!("duplicate vector id: {id}");
        }
        self.upsert(id, vector)
    }

    /// Insert or replace the vector for a unit.
    pub fn upsert(&mut self, id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dims {
            anyhow::bail!(
                "vector for {id} has {} dims, index expects {}",
                vector.len(),
                self.dims
            );
        }

        match self.slots.get(id) {
            Some(&slot) => {
                let start = slot * self.dims;
                self.vectors[start..start + self.dims].copy_from_slice(vector);
            }
            None => {
                let slot = self.ids.len();
                self.ids.push(id.to_string());
                self.vectors.extend_from_slice(vector);
                self.slots.insert(id.to_string(), slot);
            }
        }
        Ok(())
    }

    /// Top-`limit` most similar units for a query vector.
    pub fn search_vector(&self, query: &[f32], limit: usize) -> Vec<(String, f64)> {
        let mut scored: Vec<(String, f64)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(slot, id)| {
                let start = slot * self.dims;
                let similarity =
                    cosine_similarity(query, &self.vectors[start..start + self.dims]);
                (id.clone(), similarity as f64)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }

    /// Persist to a directory: `config.json`, `ids.json`, `vectors.bin`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let meta = IndexMeta {
            model: self.model.clone(),
            dims: self.dims,
            count: self.count(),
            document_prefix: self.document_prefix.clone(),
        };
        std::fs::write(
            dir.join("config.json"),
            serde_json::to_string_pretty(&meta)?,
        )?;
        std::fs::write(dir.join("ids.json"), serde_json::to_string(&self.ids)?)?;
        std::fs::write(dir.join("vectors.bin"), vec_to_blob(&self.vectors))?;

        Ok(())
    }

    /// Load a persisted index.
    pub fn load(dir: &Path) -> Result<Self> {
        let meta_raw = std::fs::read_to_string(dir.join("config.json"))
            .with_context(|| format!("no vector index at {}", dir.display()))?;
        let meta: IndexMeta = serde_json::from_str(&meta_raw)?;

        let ids_raw = std::fs::read_to_string(dir.join("ids.json"))?;
        let ids: Vec<String> = serde_json::from_str(&ids_raw)?;

        let blob = std::fs::read(dir.join("vectors.bin"))?;
        let vectors = blob_to_vec(&blob);

        if vectors.len() != ids.len() * meta.dims {
            anyhow::bail!(
                "vector shard is {} floats, expected {} ({} ids × {} dims)",
                vectors.len(),
                ids.len() * meta.dims,
                ids.len(),
                meta.dims
            );
        }

        let slots = ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (id.clone(), slot))
            .collect();

        Ok(Self {
            model: meta.model,
            dims: meta.dims,
            document_prefix: meta.document_prefix,
            ids,
            vectors,
            slots,
        })
    }

    /// Whether an index exists on disk at `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join("config.json").exists()
    }
}

/// Shared, reloadable handle to the vector index.
pub struct VectorStore {
    dir: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    query_prefix: String,
    handle: RwLock<Option<Arc<VectorIndex>>>,
}

impl VectorStore {
    pub fn new(dir: &Path, provider: Arc<dyn EmbeddingProvider>, query_prefix: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            provider,
            query_prefix: query_prefix.to_string(),
            handle: RwLock::new(None),
        }
    }

    /// Load the index from disk into the handle. Idempotent.
    pub fn load(&self) -> Result<(), SearchError> {
        let index = VectorIndex::load(&self.dir)
            .map_err(|e| SearchError::VectorStoreUnavailable(e.to_string()))?;
        info!(count = index.count(), dir = %self.dir.display(), "vector index loaded");
        *self.handle.write().expect("vector handle poisoned") = Some(Arc::new(index));
        Ok(())
    }

    /// Install a pre-built index (tests, rebuild-in-place).
    pub fn install(&self, index: VectorIndex) {
        *self.handle.write().expect("vector handle poisoned") = Some(Arc::new(index));
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.read().expect("vector handle poisoned").is_some()
    }

    pub fn count(&self) -> usize {
        self.handle
            .read()
            .expect("vector handle poisoned")
            .as_ref()
            .map(|index| index.count())
            .unwrap_or(0)
    }

    /// Snapshot of the current index for the duration of one query.
    pub fn current(&self) -> Result<Arc<VectorIndex>, SearchError> {
        self.handle
            .read()
            .expect("vector handle poisoned")
            .clone()
            .ok_or(SearchError::IndexNotLoaded)
    }

    /// Dense search: embed the (prefixed) query and scan the snapshot.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, SearchError> {
        let index = self.current()?;

        let prefixed = format!("{}{}", self.query_prefix, query);
        let query_vec = embed_one(self.provider.as_ref(), &prefixed)
            .await
            .map_err(|e| SearchError::VectorStoreUnavailable(e.to_string()))?;

        Ok(index.search_vector(&query_vec, limit))
    }

    /// Atomically replace the handle with a freshly loaded index.
    ///
    /// The new index is fully loaded before the swap; on failure the old
    /// handle is retained and the error returned. In-flight queries holding
    /// a snapshot are unaffected either way.
    pub fn reload(&self) -> Result<ReloadStats, SearchError> {
        let old_count = self.count();

        let fresh = match VectorIndex::load(&self.dir) {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "index reload failed, keeping current handle");
                return Err(SearchError::VectorStoreUnavailable(e.to_string()));
            }
        };

        let new_count = fresh.count();
        *self.handle.write().expect("vector handle poisoned") = Some(Arc::new(fresh));

        info!(old_count, new_count, "vector index reloaded");

        Ok(ReloadStats {
            old_count,
            new_count,
            documents_added: new_count as i64 - old_count as i64,
            index_path: self.dir.display().to_string(),
        })
    }
}
