//! Configuration types for batch assembly.
//!
//! All behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across a whole batch and to diff two runs to
//! understand why their outputs differ.

use crate::error::DocbindError;
use serde::{Deserialize, Serialize};

/// US-Letter page dimensions in points, used by the programmatic fallback
/// renderers and the cover page.
pub const LETTER: (f32, f32) = (612.0, 792.0);

/// Configuration for one batch operation (merge or label/split).
///
/// Built via [`BatchConfig::builder()`] or [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use docbind::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .office_timeout_secs(30)
///     .include_cover(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Executable candidates for the headless office suite, tried in order.
    ///
    /// Each candidate becomes one strategy in the conversion fallback
    /// chain. A missing binary, non-zero exit, or timeout advances to the
    /// next candidate; when all are exhausted the programmatic renderer
    /// runs. Tests point this at a nonexistent path to force the fallback
    /// deterministically.
    pub office_executables: Vec<String>,

    /// Per-attempt timeout for the external office process in seconds.
    /// Default: 60. A timed-out attempt is killed and treated as failed.
    pub office_timeout_secs: u64,

    /// Page size (width, height) in points for programmatically rendered
    /// pages (word/spreadsheet/csv fallbacks, cover page). Default: US Letter.
    pub fallback_page: (f32, f32),

    /// Row cap for the spreadsheet fallback grid. Default: 100.
    ///
    /// The fallback is intentionally approximate; capping the grid keeps a
    /// million-row sheet from producing a thousand-page PDF nobody asked for.
    pub max_grid_rows: usize,

    /// Column cap for the spreadsheet fallback grid. Default: 12.
    pub max_grid_cols: usize,

    /// Cell text is truncated to this many characters in grid renders.
    /// Default: 24.
    pub max_cell_chars: usize,

    /// Stamp circle diameter in points. Default: 60.
    pub stamp_diameter: f32,

    /// Stamp distance from the visual page corner in points. Default: 25.
    pub stamp_margin: f32,

    /// Prepend a cover page listing the batch's categories (merge mode
    /// only). Default: false.
    pub include_cover: bool,
}

/// Well-known locations and names for the headless office suite, in
/// priority order.
fn default_office_executables() -> Vec<String> {
    [
        "libreoffice",
        "soffice",
        "/usr/bin/libreoffice",
        "/usr/bin/soffice",
        "/opt/libreoffice/program/soffice",
        "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            office_executables: default_office_executables(),
            office_timeout_secs: 60,
            fallback_page: LETTER,
            max_grid_rows: 100,
            max_grid_cols: 12,
            max_cell_chars: 24,
            stamp_diameter: 60.0,
            stamp_margin: 25.0,
            include_cover: false,
        }
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    /// Replace the executable candidate list (tried in the given order).
    pub fn office_executables<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.office_executables = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs.max(1);
        self
    }

    pub fn fallback_page(mut self, width: f32, height: f32) -> Self {
        self.config.fallback_page = (width.max(72.0), height.max(72.0));
        self
    }

    pub fn max_grid_rows(mut self, n: usize) -> Self {
        self.config.max_grid_rows = n.max(1);
        self
    }

    pub fn max_grid_cols(mut self, n: usize) -> Self {
        self.config.max_grid_cols = n.max(1);
        self
    }

    pub fn max_cell_chars(mut self, n: usize) -> Self {
        self.config.max_cell_chars = n.max(1);
        self
    }

    pub fn stamp_diameter(mut self, pts: f32) -> Self {
        self.config.stamp_diameter = pts;
        self
    }

    pub fn stamp_margin(mut self, pts: f32) -> Self {
        self.config.stamp_margin = pts;
        self
    }

    pub fn include_cover(mut self, v: bool) -> Self {
        self.config.include_cover = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, DocbindError> {
        let c = &self.config;
        if c.stamp_diameter <= 0.0 || !c.stamp_diameter.is_finite() {
            return Err(DocbindError::Validation(format!(
                "stamp diameter must be a positive number of points, got {}",
                c.stamp_diameter
            )));
        }
        if c.stamp_margin < 0.0 || !c.stamp_margin.is_finite() {
            return Err(DocbindError::Validation(format!(
                "stamp margin must be non-negative, got {}",
                c.stamp_margin
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = BatchConfig::default();
        assert_eq!(c.office_timeout_secs, 60);
        assert_eq!(c.fallback_page, LETTER);
        assert!(!c.office_executables.is_empty());
        assert!(!c.include_cover);
    }

    #[test]
    fn builder_clamps_timeout() {
        let c = BatchConfig::builder().office_timeout_secs(0).build().unwrap();
        assert_eq!(c.office_timeout_secs, 1);
    }

    #[test]
    fn builder_rejects_bad_stamp_diameter() {
        assert!(BatchConfig::builder().stamp_diameter(-4.0).build().is_err());
        assert!(BatchConfig::builder().stamp_diameter(f32::NAN).build().is_err());
    }
}
