//! # Local RAG
//!
//! A local retrieval-augmented generation pipeline: ingest a directory of
//! documents, index them for semantic search, and answer questions with a
//! language model using the retrieved passages and a token-budgeted prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Documents  │──▶│   Ingestor   │──▶│ VectorIndex  │──▶ vectors.bin
//! │ + archives │   │ extract+chunk│   │ embed + L2   │    chunks.json
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │ top-k
//!                  ┌──────────────┐   ┌──────▼───────┐
//!    reply ◀───────│ LanguageModel│◀──│ prompt budget│◀── history + query
//!                  └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! lrag index                        # build index_store/ from documents/
//! lrag ask "what is the refund policy?"
//! lrag chat                         # interactive RAG chat
//! lrag assist --mode summarize      # chat without retrieval
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Documents, roles, conversation turns, history |
//! | [`chunk`] | Overlapping fixed-size text windows |
//! | [`archive`] | zip / tar / tar.gz expansion into scoped temp dirs |
//! | [`extract`] | Text extraction by file extension |
//! | [`ingest`] | Directory walk → extraction → chunks |
//! | [`progress`] | Index build progress on stderr |
//! | [`embedding`] | Embedder trait and providers |
//! | [`index`] | Flat L2 vector index and persistence |
//! | [`retriever`] | Ingest + index + query |
//! | [`prompt`] | Token-budgeted prompt assembly |
//! | [`llm`] | Language-model trait and backends |
//! | [`chat`] | Per-turn orchestration |
//! | [`conversation_log`] | JSON log of exchanges |
//! | [`logging`] | `tracing` subscriber setup |

pub mod archive;
pub mod chat;
pub mod chunk;
pub mod config;
pub mod conversation_log;
pub mod embedding;
pub mod error;
pub mod extract;
mod http;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod models;
pub mod progress;
pub mod prompt;
pub mod retriever;

pub use error::{RagError, Result};
