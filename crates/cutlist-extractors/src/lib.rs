//! cutlist-extractors - Raw input normalization for cut-list parsing.
//!
//! Turns pasted text, CSV, spreadsheets, voice transcripts, PDFs and images
//! into a single [`NormalizedInput`]: non-empty lines plus a token stream, or
//! a binary payload for inputs that only a vision provider can read.
//!
//! # Features
//!
//! - `pdf` (default) - PDF text layer extraction via pdf-extract
//!
//! # Example
//!
//! ```ignore
//! use cutlist_extractors::{NormalizationPipeline, RawInput};
//!
//! let pipeline = NormalizationPipeline::with_defaults();
//! let normalized = pipeline.normalize(&RawInput::text("2 pcs 600x400 white")).await?;
//! ```

mod detect;
mod error;
mod factory;
mod image;
mod pdf;
mod pipeline;
mod spreadsheet;
mod text;
pub mod tokenizer;
pub mod transcript;
mod types;

pub use detect::{detect_image_format, detect_kind, sniff_text};
pub use error::{ExtractError, ExtractResult};
pub use factory::NormalizerFactory;
pub use image::ImageNormalizer;
pub use pdf::PdfNormalizer;
pub use pipeline::NormalizationPipeline;
pub use spreadsheet::{read_first_sheet, SpreadsheetNormalizer};
pub use text::{decode_text, split_lines, TextNormalizer};
pub use transcript::TranscriptNormalizer;
pub use types::{InputKind, NormalizedInput, RawInput, Token};

use async_trait::async_trait;

/// Core Normalizer trait - every input format implements this.
#[async_trait]
pub trait Normalizer: Send + Sync {
    /// Normalize raw input already classified as `kind`.
    async fn normalize(&self, raw: &RawInput, kind: &InputKind) -> ExtractResult<NormalizedInput>;

    /// Check if this normalizer handles the given kind.
    fn handles(&self, kind: &InputKind) -> bool;

    /// Human-readable name for this normalizer.
    fn name(&self) -> &str;
}
