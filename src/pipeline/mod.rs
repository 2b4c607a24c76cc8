//! Pipeline stages for one embryo-image analysis.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ encode ──▶ llm ──▶ postprocess ──▶ markdown
//! (validate)  (base64)  (call)   (cleanup)       (blocks)
//! ```
//!
//! 1. [`ingest`] accept or reject the selected file by declared type
//! 2. [`encode`] read the bytes and base64-wrap them as a data URI
//! 3. [`llm`] build the request and make the single backend call;
//!    the only stage with network I/O
//! 4. [`postprocess`] deterministic cleanup of the model's Markdown
//! 5. [`markdown`] parse the result into display blocks for the terminal
//!    view and the report

pub mod encode;
pub mod ingest;
pub mod llm;
pub mod markdown;
pub mod postprocess;
