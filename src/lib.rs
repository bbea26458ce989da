//! # mechanic-rag — repair-manual assistant
//!
//! Turns a free-text description of a vehicle problem into a diagnosis, a
//! parts list with shopping links and a printable repair guide, grounded in
//! passages retrieved from indexed repair manuals.
//!
//! ## Architecture
//!
//! - **[`config`]** — JSON tunables with defaults, credentials from the environment
//! - **[`db`]** — SQLite + sqlite-vec local index and the manual manifest table
//! - **[`embedder`]** — Text embedding (OpenAI-compatible HTTP, deterministic mock)
//! - **[`llm`]** — Chat completion clients
//! - **[`index`]** — `find_relevant` facade over local and Pinecone vector stores
//! - **[`ingest`]** — Manual discovery, chunking, checkpointed embed + upsert
//! - **[`tools`]** — Manual Q&A, parts-search links, legacy SQL lookup
//! - **[`pipeline`]** — The fixed five-stage parse → format pipeline
//! - **[`api`]** — axum HTTP adapter and static UI serving

pub mod api;
pub mod config;
pub mod db;
pub mod embedder;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod tools;
