//! # ragline
//!
//! A retrieval-augmented generation service. Documents are split into
//! overlapping chunks, embedded, and written to a vector store; questions
//! are embedded, matched against the store, and answered by a language
//! model that sees only the retrieved context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────────┐
//! │  Loader  │──▶│ Split+Embed  │──▶│ Supabase / SQLite │
//! │ PDF/text │   │  (OpenAI)    │   │   vector store    │
//! └──────────┘   └──────────────┘   └─────────┬─────────┘
//!                                             │ match
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌────────────┐
//!                 │   CLI    │          │    HTTP    │
//!                 │ (ragline)│          │ /chat etc. │
//!                 └──────────┘          └────────────┘
//! ```
//!
//! The pipeline logic (splitter, ingestion, retrieval, synthesis) lives in
//! the I/O-free `ragline-core` crate; this crate supplies the adapters.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! ragline init
//! ragline ingest ./handbook.pdf
//! ragline ask "What is the refund policy?"
//! ragline serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | PDF and text file loader |
//! | [`openai`] | Embeddings and Responses API adapters |
//! | [`supabase`] | PostgREST vector store |
//! | [`sqlite_store`] | Local SQLite vector store |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |
//! | [`upload`] | Temp-file handling for uploads |
//! | [`service`] | Config-driven pipeline wiring |
//! | [`server`] | HTTP server |

pub mod config;
pub mod db;
pub mod loader;
pub mod migrate;
pub mod openai;
pub mod server;
pub mod service;
pub mod sqlite_store;
pub mod supabase;
pub mod upload;
