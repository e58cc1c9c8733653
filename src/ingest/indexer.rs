//! Durable chunk indexing: embed and upsert in micro-batches with
//! bounded in-flight concurrency.
//!
//! Per-chunk non-retryable failures (NaN/zero vectors, payload
//! rejections) skip the chunk and continue; a run of more than
//! `max_consecutive_skips` aborts the job. Progress is reported after
//! every micro-batch, mapped into the job's 60–100 band.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};

use crate::config::IngestConfig;
use crate::embed::Embedder;
use crate::error::EngineError;
use crate::ingest::job::{CancelFlag, JobTracker};
use crate::models::Chunk;
use crate::search::sparse::CorpusEntry;
use crate::vector::{VectorRecord, VectorStore};

/// Progress band occupied by the indexing stage.
const PROGRESS_FLOOR: u8 = 60;
const PROGRESS_CEIL: u8 = 100;

/// Per-upsert wall-clock cap.
const UPSERT_TIMEOUT_SECS: u64 = 15;

/// Outcome of one indexing run.
#[derive(Debug)]
pub struct IndexOutcome {
    /// Chunks acknowledged by the store, in completion order.
    pub indexed: Vec<CorpusEntry>,
    pub skipped: usize,
}

pub struct Indexer<'a> {
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub job: &'a JobTracker,
    pub cancel: &'a CancelFlag,
    pub cfg: &'a IngestConfig,
}

impl<'a> Indexer<'a> {
    /// Embed and upsert every chunk into `namespace`.
    ///
    /// Insertion may complete out of order across in-flight batches;
    /// that is safe because ids are content-derived.
    pub async fn index_chunks(
        &self,
        namespace: &str,
        chunks: Vec<Chunk>,
    ) -> Result<IndexOutcome, EngineError> {
        let total = chunks.len();
        if total == 0 {
            return Ok(IndexOutcome {
                indexed: Vec::new(),
                skipped: 0,
            });
        }

        let batch_size = self.cfg.batch_size.clamp(1, 32);
        let consecutive_skips = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));

        let batches: Vec<Vec<Chunk>> = chunks
            .chunks(batch_size)
            .map(|b| b.to_vec())
            .collect();

        let mut indexed = Vec::with_capacity(total);
        let mut skipped_total = 0usize;

        let mut in_flight = stream::iter(batches.into_iter().map(|batch| {
            let consecutive_skips = consecutive_skips.clone();
            async move {
                self.cancel.check()?;
                self.process_batch(namespace, batch, &consecutive_skips).await
            }
        }))
        .buffer_unordered(self.cfg.max_in_flight.max(1));

        while let Some(result) = in_flight.next().await {
            let (entries, skipped, batch_len) = result?;
            skipped_total += skipped;
            indexed.extend(entries);

            let done = processed.fetch_add(batch_len, Ordering::SeqCst) + batch_len;
            let span = (PROGRESS_CEIL - PROGRESS_FLOOR) as usize;
            let progress = PROGRESS_FLOOR + (done * span / total) as u8;
            self.job.update(
                &format!("Indexing chunks ({done}/{total})"),
                progress.min(PROGRESS_CEIL),
            );

            // Memory-release hint between micro-batches.
            tokio::task::yield_now().await;
        }

        Ok(IndexOutcome {
            indexed,
            skipped: skipped_total,
        })
    }

    /// Embed one micro-batch and upsert the valid vectors. Returns the
    /// acknowledged entries, the skip count, and the batch size.
    async fn process_batch(
        &self,
        namespace: &str,
        batch: Vec<Chunk>,
        consecutive_skips: &AtomicUsize,
    ) -> Result<(Vec<CorpusEntry>, usize, usize), EngineError> {
        let batch_len = batch.len();
        let texts: Vec<String> = batch
            .iter()
            .map(|c| format!("{}\n{}", c.payload.path, c.payload.text))
            .collect();

        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(EngineError::Embed(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                batch.len()
            )));
        }

        let mut records = Vec::with_capacity(batch.len());
        let mut entries = Vec::with_capacity(batch.len());
        let mut skipped = 0usize;

        for (chunk, vector) in batch.into_iter().zip(vectors) {
            if !is_valid_vector(&vector) {
                skipped += 1;
                let run = consecutive_skips.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(
                    "skipping chunk {} ({}): degenerate embedding",
                    chunk.id,
                    chunk.payload.path
                );
                if run > self.cfg.max_consecutive_skips {
                    return Err(EngineError::Index(format!(
                        "{run} consecutive chunk failures, aborting"
                    )));
                }
                continue;
            }
            consecutive_skips.store(0, Ordering::SeqCst);
            entries.push(CorpusEntry {
                id: chunk.id.clone(),
                payload: chunk.payload.clone(),
            });
            records.push(VectorRecord {
                id: chunk.id,
                vector,
                metadata: chunk.payload,
            });
        }

        if !records.is_empty() {
            let timeout = Duration::from_secs(UPSERT_TIMEOUT_SECS);
            tokio::time::timeout(timeout, self.store.upsert(namespace, &records))
                .await
                .map_err(|_| EngineError::Upsert("upsert timed out".into()))??;
        }

        Ok((entries, skipped, batch_len))
    }
}

fn is_valid_vector(v: &[f32]) -> bool {
    !v.is_empty() && v.iter().all(|x| x.is_finite()) && v.iter().any(|x| *x != 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkPayload, FileCategory, SizeCategory};
    use crate::vector::memory::MemoryVectorStore;
    use async_trait::async_trait;

    fn ingest_cfg() -> IngestConfig {
        let mut cfg = crate::config::Config::default().ingest;
        cfg.batch_size = 2;
        cfg
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.into(),
            repo_id: "repo".into(),
            payload: ChunkPayload {
                path: format!("src/{id}.rs"),
                start_line: 1,
                end_line: 5,
                text: text.into(),
                category: FileCategory::Code,
                language: "rust".into(),
                depth: 1,
                size_category: SizeCategory::Small,
                has_class_def: false,
                has_fn_def: true,
                has_imports: false,
                has_tests: false,
                complexity: 1,
                word_count: text.split_whitespace().count(),
            },
        }
    }

    /// Deterministic embedder; texts containing "poison" produce a zero
    /// vector, which the indexer must skip.
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("poison") {
                        vec![0.0, 0.0, 0.0]
                    } else {
                        crate::embed::unit_normalize(vec![t.len() as f32, 1.0, 2.0])
                    }
                })
                .collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EngineError> {
            Ok(crate::embed::unit_normalize(vec![text.len() as f32, 1.0, 2.0]))
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    #[tokio::test]
    async fn indexes_all_chunks_and_reports_progress() {
        let store = MemoryVectorStore::new();
        let job = JobTracker::new();
        let cancel = job.try_start("url").unwrap();
        let cfg = ingest_cfg();
        let indexer = Indexer {
            store: &store,
            embedder: &StubEmbedder,
            job: &job,
            cancel: &cancel,
            cfg: &cfg,
        };

        let chunks: Vec<Chunk> = (0..7).map(|i| chunk(&format!("c{i}"), "fn body() {}")).collect();
        let outcome = indexer.index_chunks("ns", chunks).await.unwrap();

        assert_eq!(outcome.indexed.len(), 7);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(store.record_count("ns"), 7);
        assert_eq!(job.snapshot().progress, 100);
    }

    #[tokio::test]
    async fn degenerate_vectors_are_skipped_not_fatal() {
        let store = MemoryVectorStore::new();
        let job = JobTracker::new();
        let cancel = job.try_start("url").unwrap();
        let cfg = ingest_cfg();
        let indexer = Indexer {
            store: &store,
            embedder: &StubEmbedder,
            job: &job,
            cancel: &cancel,
            cfg: &cfg,
        };

        let chunks = vec![
            chunk("good1", "fn a() {}"),
            chunk("bad", "poison"),
            chunk("good2", "fn b() {}"),
        ];
        let outcome = indexer.index_chunks("ns", chunks).await.unwrap();

        assert_eq!(outcome.indexed.len(), 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.record_count("ns"), 2);
    }

    #[tokio::test]
    async fn consecutive_skip_run_aborts() {
        let store = MemoryVectorStore::new();
        let job = JobTracker::new();
        let cancel = job.try_start("url").unwrap();
        let mut cfg = ingest_cfg();
        cfg.max_consecutive_skips = 3;
        let indexer = Indexer {
            store: &store,
            embedder: &StubEmbedder,
            job: &job,
            cancel: &cancel,
            cfg: &cfg,
        };

        let chunks: Vec<Chunk> = (0..8).map(|i| chunk(&format!("p{i}"), "poison")).collect();
        let err = indexer.index_chunks("ns", chunks).await.unwrap_err();
        assert_eq!(err.kind(), "index");
    }

    #[tokio::test]
    async fn cancellation_stops_indexing() {
        let store = MemoryVectorStore::new();
        let job = JobTracker::new();
        let cancel = job.try_start("url").unwrap();
        cancel.cancel();
        let cfg = ingest_cfg();
        let indexer = Indexer {
            store: &store,
            embedder: &StubEmbedder,
            job: &job,
            cancel: &cancel,
            cfg: &cfg,
        };

        let chunks = vec![chunk("a", "fn a() {}")];
        let err = indexer.index_chunks("ns", chunks).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }

    #[tokio::test]
    async fn reindex_is_idempotent() {
        let store = MemoryVectorStore::new();
        let job = JobTracker::new();
        let cancel = job.try_start("url").unwrap();
        let cfg = ingest_cfg();
        let indexer = Indexer {
            store: &store,
            embedder: &StubEmbedder,
            job: &job,
            cancel: &cancel,
            cfg: &cfg,
        };

        let chunks: Vec<Chunk> = (0..4).map(|i| chunk(&format!("c{i}"), "fn x() {}")).collect();
        indexer.index_chunks("ns", chunks.clone()).await.unwrap();
        indexer.index_chunks("ns", chunks).await.unwrap();
        assert_eq!(store.record_count("ns"), 4);
    }

    #[test]
    fn vector_validity_checks() {
        assert!(is_valid_vector(&[0.1, 0.2]));
        assert!(!is_valid_vector(&[]));
        assert!(!is_valid_vector(&[f32::NAN, 0.1]));
        assert!(!is_valid_vector(&[0.0, 0.0]));
        assert!(!is_valid_vector(&[f32::INFINITY]));
    }
}
