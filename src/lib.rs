//! # Legally
//!
//! Ingestion pipeline and retrieval engine for a corpus of legal documents.
//!
//! Uploaded documents are converted to plain text, persisted as `pending`,
//! and processed in the background: a whole-document embedding, paragraph
//! chunking, and per-chunk embeddings. Retrieval ranks stored documents
//! with a case-insensitive textual score, optionally blended with cosine
//! similarity over the stored embeddings.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────────────┐
//! │  Extractor │──▶│   Store    │◀──│ Pipeline (N workers) │
//! │ PDF/DOCX/… │   │  (SQLite)  │   │ chunk + embed        │
//! └────────────┘   └─────┬──────┘   └──────────────────────┘
//!                        │
//!               ┌────────┴────────┐
//!               ▼                 ▼
//!          ┌─────────┐       ┌─────────┐
//!          │   CLI   │       │  HTTP   │
//!          └─────────┘       └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! legally init
//! legally submit ruling.pdf --title "Supreme Court Ruling" --category "Civil Law" --wait
//! legally search "lease"
//! legally serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, chunks, status, categories |
//! | [`error`] | Typed error taxonomy |
//! | [`extract`] | Payload to normalized text |
//! | [`chunk`] | Paragraph chunker |
//! | [`embedding`] | Remote and fallback embedders |
//! | [`store`] | Document store trait, SQLite and in-memory backends |
//! | [`pipeline`] | Document lifecycle |
//! | [`queue`] | Worker pool and staleness sweep |
//! | [`session`] | Per-owner staged uploads |
//! | [`search`] | Scoring, ranking, excerpts |
//! | [`service`] | Synchronous API |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod get;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod search;
pub mod server;
pub mod service;
pub mod session;
pub mod stats;
pub mod store;
