use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::PipelineError;

pub const PIPELINE_FILE: &str = "pipeline.toml";
pub const FIELDS_FILE: &str = "fields.yaml";

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub pipeline: PipelineSection,
    pub fallback: FallbackSection,
    pub resolver: ResolverSection,
    pub storage: StorageSection,
    pub field_schema: FieldSchema,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub workers: usize,
    pub reprocess: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            workers: 4,
            reprocess: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_chunk_chars: usize,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            timeout_secs: 120,
            max_chunk_chars: 12_000,
        }
    }
}

impl FallbackSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityAlgorithm {
    JaroWinkler,
    Levenshtein,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverSection {
    pub accept_threshold: f64,
    pub ambiguity_margin: f64,
    pub algorithm: SimilarityAlgorithm,
}

impl Default for ResolverSection {
    fn default() -> Self {
        Self {
            accept_threshold: 0.90,
            ambiguity_margin: 0.03,
            algorithm: SimilarityAlgorithm::JaroWinkler,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub db_path: String,
    pub max_write_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: "civic.sqlite".to_string(),
            max_write_attempts: 5,
            backoff_base_ms: 25,
        }
    }
}

/// Council-declared labels captured into a record's free-form field map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSchema {
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    #[serde(default)]
    pipeline: PipelineSection,
    #[serde(default)]
    fallback: FallbackSection,
    #[serde(default)]
    resolver: ResolverSection,
    #[serde(default)]
    storage: StorageSection,
}

impl PipelineConfig {
    /// Load `pipeline.toml` and `fields.yaml` from a directory. Missing files
    /// fall back to defaults.
    pub fn load_from_dir(path: &Path) -> Result<Self, PipelineError> {
        let pipeline_path = path.join(PIPELINE_FILE);
        let file: PipelineFile = if pipeline_path.exists() {
            let raw = fs::read_to_string(&pipeline_path)?;
            toml::from_str(&raw)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", pipeline_path.display())))?
        } else {
            PipelineFile::default()
        };

        let fields_path = path.join(FIELDS_FILE);
        let field_schema: FieldSchema = if fields_path.exists() {
            let raw = fs::read_to_string(&fields_path)?;
            serde_yaml::from_str(&raw)
                .map_err(|e| PipelineError::Config(format!("{}: {e}", fields_path.display())))?
        } else {
            FieldSchema::default()
        };

        let config = Self {
            pipeline: file.pipeline,
            fallback: file.fallback,
            resolver: file.resolver,
            storage: file.storage,
            field_schema,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.pipeline.workers == 0 {
            return Err(PipelineError::Config("pipeline.workers must be at least 1".into()));
        }
        let threshold = self.resolver.accept_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(PipelineError::Config(format!(
                "resolver.accept_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.resolver.ambiguity_margin < 0.0 {
            return Err(PipelineError::Config(
                "resolver.ambiguity_margin must not be negative".into(),
            ));
        }
        if self.fallback.max_chunk_chars < 256 {
            return Err(PipelineError::Config(
                "fallback.max_chunk_chars must be at least 256".into(),
            ));
        }
        if self.storage.max_write_attempts == 0 {
            return Err(PipelineError::Config(
                "storage.max_write_attempts must be at least 1".into(),
            ));
        }
        for spec in &self.field_schema.fields {
            if spec.key.trim().is_empty() || spec.label.trim().is_empty() {
                return Err(PipelineError::Config(
                    "field schema entries need a key and a label".into(),
                ));
            }
        }
        Ok(())
    }
}
