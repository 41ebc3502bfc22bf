//! Text-generation oracle for optional enrichment of reports.
//!
//! The intake flow never depends on the oracle for correctness: summaries are
//! appended to confirmations and image descriptions are served on request.
//! `GeminiOracle` is the only backend; it talks to Gemini through rig-core
//! for text and through the REST API for inline images.

mod gemini;
pub mod prompts;

pub use gemini::GeminiOracle;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GeminiConfig;
use crate::error::LlmError;

/// An opaque text-generation service.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Summarize a report: the address it names and what the sender wants.
    async fn summarize(&self, text: &str) -> Result<String, LlmError>;

    /// Describe the contents of an image.
    async fn describe_image(&self, image: &[u8], mime_type: &str) -> Result<String, LlmError>;
}

/// Create the oracle from configuration.
pub fn create_oracle(config: &GeminiConfig) -> Result<Arc<dyn TextOracle>, LlmError> {
    let oracle = GeminiOracle::new(config)?;
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(oracle))
}

/// Guess an image MIME type from a file extension, defaulting to PNG.
pub fn mime_from_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("heic") => "image/heic",
        _ => "image/png",
    }
}
