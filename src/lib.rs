//! # docbind
//!
//! Convert heterogeneous documents (PDF, images, office files, CSV) to
//! PDF, stamp them with per-category sequence labels, and assemble the
//! batch either as one merged PDF or as a zip archive of standalone PDFs.
//!
//! ## Features
//!
//! - **Format detection**: extension-based classification into five input
//!   families, failing fast on anything unsupported
//! - **Conversion**: native PDF passthrough, full-bleed image pages, and
//!   an external headless office suite with programmatic approximate
//!   fallbacks, so batches still assemble on hosts without one installed
//! - **Labeling**: rotation-aware circular stamps at the visual top-right
//!   of each document's first page, numbered per category
//! - **Assembly**: merge into one PDF (optionally behind a cover page) or
//!   split into a zip archive, one PDF per input
//!
//! ## Quick start
//!
//! ```no_run
//! use docbind::{merge, BatchConfig, InputDocument};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let documents = vec![
//!         InputDocument::new("invoice.pdf", std::fs::read("invoice.pdf")?),
//!         InputDocument::new("receipt.jpg", std::fs::read("receipt.jpg")?),
//!     ];
//!     let labels = vec!["INV".to_string(), "INV".to_string()];
//!     let start_numbers = vec![Some(100), Some(100)];
//!
//!     let pdf = merge(&documents, &labels, &start_numbers, &BatchConfig::default()).await?;
//!     std::fs::write("bundle.pdf", pdf)?;
//!     Ok(())
//! }
//! ```
//!
//! Labels, start numbers, and documents are positionally aligned; a
//! document with `None` for its start number is included unstamped.
//! Numbering is per request: two calls with the same inputs produce the
//! same stamps.

pub mod batch;
pub mod config;
pub mod cover;
pub mod error;
pub mod pipeline;

pub use batch::{label_split, merge};
pub use config::{BatchConfig, BatchConfigBuilder, LETTER};
pub use cover::make_cover;
pub use error::{DocbindError, StrategyAttempt};
pub use pipeline::convert::{
    convert_document, ConvertedDocument, InputDocument, PageInfo, PageRotation,
};
pub use pipeline::detect::{detect_format, DocumentFormat};
