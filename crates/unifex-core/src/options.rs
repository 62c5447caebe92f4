use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{CoordinateUnit, ExtractorKind};

pub const DEFAULT_DPI: u32 = 200;

/// How the native PDF backend groups glyphs into text blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterMerger {
    /// One block per text line.
    #[default]
    Lines,
    /// One block per glyph, whitespace included.
    Characters,
}

/// Backend configuration accepted by the factory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorOptions {
    /// ISO 639-1 codes; each backend translates them to its own format.
    pub languages: Vec<String>,
    /// Resolution used when rendering PDF pages for image-only backends.
    pub dpi: u32,
    /// Unit for returned geometry. `None` keeps the producer's default:
    /// POINTS for PDF-derived pages, PIXELS for raster images.
    pub output_unit: Option<CoordinateUnit>,
    /// Overrides for credential environment variables, keyed by variable name.
    pub credentials: BTreeMap<String, String>,
    pub character_merger: CharacterMerger,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            languages: vec!["en".to_string()],
            dpi: DEFAULT_DPI,
            output_unit: None,
            credentials: BTreeMap::new(),
            character_merger: CharacterMerger::default(),
        }
    }
}

impl ExtractorOptions {
    /// Look up a credential: explicit map first, then the environment.
    pub fn credential(&self, key: &str) -> Option<String> {
        self.credentials
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    pub fn with_output_unit(mut self, unit: CoordinateUnit) -> Self {
        self.output_unit = Some(unit);
        self
    }

    pub fn with_credential(mut self, key: &str, value: impl Into<String>) -> Self {
        self.credentials.insert(key.to_string(), value.into());
        self
    }

    pub fn with_character_merger(mut self, merger: CharacterMerger) -> Self {
        self.character_merger = merger;
        self
    }
}

/// Everything needed to open an extractor from scratch. Process-pool workers
/// receive one of these and build their own handle from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorSpec {
    pub source: PathBuf,
    pub kind: ExtractorKind,
    #[serde(default)]
    pub options: ExtractorOptions,
}

impl ExtractorSpec {
    pub fn new(source: impl Into<PathBuf>, kind: ExtractorKind, options: ExtractorOptions) -> Self {
        Self {
            source: source.into(),
            kind,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ExtractorOptions::default();
        assert_eq!(opts.languages, vec!["en"]);
        assert_eq!(opts.dpi, 200);
        assert!(opts.output_unit.is_none());
    }

    #[test]
    fn test_explicit_credential_wins_over_env() {
        let opts = ExtractorOptions::default().with_credential("PATH", "explicit");
        assert_eq!(opts.credential("PATH").as_deref(), Some("explicit"));
    }

    #[test]
    fn test_blank_credential_is_absent() {
        let opts = ExtractorOptions::default().with_credential("UNIFEX_TEST_BLANK", "  ");
        assert_eq!(opts.credential("UNIFEX_TEST_BLANK"), None);
    }

    #[test]
    fn test_spec_deserializes_with_partial_options() {
        let spec: ExtractorSpec = serde_json::from_str(
            r#"{"source":"/tmp/a.pdf","kind":"tesseract","options":{"dpi":150}}"#,
        )
        .unwrap();
        assert_eq!(spec.kind, ExtractorKind::Tesseract);
        assert_eq!(spec.options.dpi, 150);
        assert_eq!(spec.options.languages, vec!["en"]);
    }
}
