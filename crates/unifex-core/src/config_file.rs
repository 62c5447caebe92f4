use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dispatch::ExecutorKind;
use crate::models::{CoordinateUnit, ExtractorKind};
use crate::options::CharacterMerger;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub extraction: Option<ExtractionConfig>,
    pub concurrency: Option<ConcurrencyConfig>,
    pub credentials: Option<CredentialsConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub extractor: Option<ExtractorKind>,
    pub languages: Option<Vec<String>>,
    pub dpi: Option<u32>,
    pub output_unit: Option<CoordinateUnit>,
    pub character_merger: Option<CharacterMerger>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    pub max_workers: Option<usize>,
    pub executor: Option<ExecutorKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub azure_di_endpoint: Option<String>,
    pub azure_di_key: Option<String>,
    pub azure_di_model: Option<String>,
    pub google_docai_processor_name: Option<String>,
    pub google_docai_credentials_path: Option<String>,
    pub tesseract_cmd: Option<String>,
}

impl CredentialsConfig {
    /// Credentials keyed by the environment variable each one overrides.
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        [
            ("AZURE_DI_ENDPOINT", &self.azure_di_endpoint),
            ("AZURE_DI_KEY", &self.azure_di_key),
            ("AZURE_DI_MODEL", &self.azure_di_model),
            ("GOOGLE_DOCAI_PROCESSOR_NAME", &self.google_docai_processor_name),
            ("GOOGLE_DOCAI_CREDENTIALS_PATH", &self.google_docai_credentials_path),
            ("TESSERACT_CMD", &self.tesseract_cmd),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v)))
        .collect()
    }
}

/// Platform config directory path: `<config_dir>/unifex/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("unifex").join("config.toml"))
}

/// Load config by cascading CWD `.unifex.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".unifex.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config file");
            None
        }
    }
}

fn pick<S, T: Clone>(overlay: &Option<S>, base: &Option<S>, field: impl Fn(&S) -> Option<T>) -> Option<T> {
    overlay
        .as_ref()
        .and_then(&field)
        .or_else(|| base.as_ref().and_then(&field))
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let (be, oe) = (&base.extraction, &overlay.extraction);
    let (bc, oc) = (&base.concurrency, &overlay.concurrency);
    let (bk, ok) = (&base.credentials, &overlay.credentials);
    ConfigFile {
        extraction: Some(ExtractionConfig {
            extractor: pick(oe, be, |e| e.extractor),
            languages: pick(oe, be, |e| e.languages.clone()),
            dpi: pick(oe, be, |e| e.dpi),
            output_unit: pick(oe, be, |e| e.output_unit),
            character_merger: pick(oe, be, |e| e.character_merger),
        }),
        concurrency: Some(ConcurrencyConfig {
            max_workers: pick(oc, bc, |c| c.max_workers),
            executor: pick(oc, bc, |c| c.executor),
        }),
        credentials: Some(CredentialsConfig {
            azure_di_endpoint: pick(ok, bk, |k| k.azure_di_endpoint.clone()),
            azure_di_key: pick(ok, bk, |k| k.azure_di_key.clone()),
            azure_di_model: pick(ok, bk, |k| k.azure_di_model.clone()),
            google_docai_processor_name: pick(ok, bk, |k| k.google_docai_processor_name.clone()),
            google_docai_credentials_path: pick(ok, bk, |k| {
                k.google_docai_credentials_path.clone()
            }),
            tesseract_cmd: pick(ok, bk, |k| k.tesseract_cmd.clone()),
        }),
    }
}
