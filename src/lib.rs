//! # repo-rag
//!
//! A retrieval-augmented answering service for git repositories. Point it
//! at a repo URL and it builds a per-repository vector namespace; ask a
//! question and it returns a grounded, cited answer.
//!
//! ## Architecture
//!
//! Two pipelines share the vector store and the embedding provider:
//!
//! ```text
//!  Ingestion (one job at a time, background task)
//!
//!   POST /index_repo ──► JobTracker ──► pipeline
//!        Fetcher ► Walker/Classifier ► Chunker ► Enricher
//!                                                  │
//!                              Embedder ◄──────────┘
//!                                  │ micro-batches, bounded concurrency
//!                                  ▼
//!                            Vector store  ──►  CorpusCatalog (BM25 side)
//!
//!  Query (concurrent, per request)
//!
//!   POST /chat ──► Planner (intent, implicit filters, selectivity gate)
//!                      │
//!        ┌─────────────┴─────────────┐
//!        ▼                           ▼
//!   Dense search                Sparse BM25
//!   (pre-filtered ANN)        (inverted index)
//!        └──────────┬────────────────┘
//!                   ▼
//!        RRF fusion (k=60, dense 1.0 / sparse 0.5)
//!                   ▼
//!        Post-filter + recall fallback
//!                   ▼
//!        Intent-weighted rerank ► context assembly ► LLM
//!                   ▼
//!        answer + citations + confidence
//! ```
//!
//! ## Module overview
//!
//! - [`config`] - environment-driven configuration, lazily resolved secrets
//! - [`error`] - the engine error taxonomy
//! - [`models`] - repository records, chunks, job state, wire types
//! - [`git`] - shallow fetch and the file walker/classifier
//! - [`chunking`] - declaration-aware splitting with overlap, stable ids
//! - [`enrich`] - regex-derived chunk metadata (flags, complexity, size)
//! - [`embed`] - embedding provider trait + OpenAI-compatible client
//! - [`vector`] - vector store trait, HTTP and in-memory backends
//! - [`search`] - filters, sparse BM25 catalog, RRF fusion, query planner
//! - [`ingest`] - job tracker, micro-batched indexer, pipeline body
//! - [`llm`] - single-shot chat completion client
//! - [`rag`] - hybrid retrieval and grounded answer assembly
//! - [`api`] - axum handlers
//! - [`state`] - shared application state

pub mod api;
pub mod chunking;
pub mod config;
pub mod embed;
pub mod enrich;
pub mod error;
pub mod git;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod rag;
pub mod retry;
pub mod search;
pub mod state;
pub mod vector;
