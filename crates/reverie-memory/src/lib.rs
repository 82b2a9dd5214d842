// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-term memory for the Reverie engine.
//!
//! ## Architecture
//!
//! - **OnnxEmbedder / LazyEmbedder**: local 384-dim embeddings, loaded once on first use
//! - **ModelManager**: first-run model download from HuggingFace
//! - **QueryComplexityClassifier**: picks retrieval thresholds by query length
//! - **HybridRetriever**: semantic + keyword fusion over past turns, semantic memory lookup
//! - **MemoryPipeline**: Extract, Validate, Consolidate, Save after each exchange
//! - **MemoryOrchestrator**: foreground prompt building and background reflection

pub mod classifier;
pub mod embedder;
pub mod model_manager;
pub mod orchestrator;
pub mod pipeline;
pub mod retriever;
pub mod structured;
pub mod types;

pub use classifier::{QueryComplexityClassifier, QueryProfile, QueryTier};
pub use embedder::{EmbedderFactory, LazyEmbedder, OnnxEmbedder, OnnxFactory};
pub use model_manager::ModelManager;
pub use orchestrator::{MemoryOrchestrator, ReflectionTask};
pub use pipeline::{MemoryPipeline, ReflectionRecord, Stage, UpdateMemory};
pub use retriever::{HybridRetriever, extract_keywords, fuse};
pub use structured::{StructuredOutcome, extract_json_array, extract_json_object, request_structured};
pub use types::{ContextBlock, RetrievalKind, RetrievalResult};
