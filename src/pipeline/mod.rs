//! The document pipeline, one stage per module.
//!
//! An input flows detect → convert (with the office strategy chain and
//! programmatic fallbacks behind it) → stamp, and the batch assembler in
//! [`crate::batch`] drives the stages per document.

pub mod compose;
pub mod convert;
pub mod detect;
pub mod fallback;
pub mod office;
pub mod staging;
pub mod stamp;
