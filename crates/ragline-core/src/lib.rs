//! # ragline core
//!
//! I/O-free logic for ragline: data models, the text splitter, the
//! collaborator traits (document loader, embedder, vector store, language
//! model), and the three pipeline stages built on top of them.
//!
//! This crate contains no tokio, reqwest, sqlx, or filesystem access.
//! Concrete adapters live in the `ragline` app crate.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Source units, chunks, metadata, retrieved matches |
//! | [`error`] | Pipeline error taxonomy |
//! | [`split`] | Fixed-size overlapping text splitter |
//! | [`embedding`] | [`Embedder`](embedding::Embedder) trait and vector helpers |
//! | [`store`] | [`VectorStore`](store::VectorStore) trait and in-memory backend |
//! | [`loader`] | [`DocumentLoader`](loader::DocumentLoader) trait |
//! | [`ingest`] | Ingestion orchestrator |
//! | [`retrieve`] | Retrieval engine |
//! | [`synthesize`] | Grounded answer synthesizer |

pub mod embedding;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod retrieve;
pub mod split;
pub mod store;
pub mod synthesize;

pub use error::{PipelineError, Stage};
