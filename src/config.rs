//! Configuration management for docextract using the prefer crate.
//!
//! Every size threshold and budget lives here as a named value. Call sites
//! never carry their own literals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

pub const MIB: u64 = 1024 * 1024;

/// Size thresholds that gate strategy selection and admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeLimits {
    /// Largest document sent to OCR in a single call.
    #[serde(default = "default_comfortable_bytes")]
    pub comfortable_bytes: u64,
    /// Largest document handled by chunked OCR before switching to the LLM path.
    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: u64,
    /// Above this size a document needs explicit confirmation upstream.
    #[serde(default = "default_managed_file_bytes")]
    pub managed_file_bytes: u64,
    /// Above this size an override flag is required.
    #[serde(default = "default_recommended_max_bytes")]
    pub recommended_max_bytes: u64,
    /// Hard ceiling; nothing larger is ever accepted.
    #[serde(default = "default_absolute_max_bytes")]
    pub absolute_max_bytes: u64,
}

fn default_comfortable_bytes() -> u64 {
    20 * MIB
}

fn default_chunk_bytes() -> u64 {
    40 * MIB
}

fn default_managed_file_bytes() -> u64 {
    100 * MIB
}

fn default_recommended_max_bytes() -> u64 {
    100 * MIB
}

fn default_absolute_max_bytes() -> u64 {
    500 * MIB
}

impl Default for SizeLimits {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl SizeLimits {
    fn base_default() -> Self {
        Self {
            comfortable_bytes: default_comfortable_bytes(),
            chunk_bytes: default_chunk_bytes(),
            managed_file_bytes: default_managed_file_bytes(),
            recommended_max_bytes: default_recommended_max_bytes(),
            absolute_max_bytes: default_absolute_max_bytes(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars (values in megabytes):
    /// - `DOCEXTRACT_COMFORTABLE_MB`
    /// - `DOCEXTRACT_CHUNK_MB`
    /// - `DOCEXTRACT_MANAGED_FILE_MB`
    /// - `DOCEXTRACT_RECOMMENDED_MAX_MB`
    /// - `DOCEXTRACT_ABSOLUTE_MAX_MB`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(mb) = env_u64("DOCEXTRACT_COMFORTABLE_MB") {
            self.comfortable_bytes = mb * MIB;
        }
        if let Some(mb) = env_u64("DOCEXTRACT_CHUNK_MB") {
            self.chunk_bytes = mb * MIB;
        }
        if let Some(mb) = env_u64("DOCEXTRACT_MANAGED_FILE_MB") {
            self.managed_file_bytes = mb * MIB;
        }
        if let Some(mb) = env_u64("DOCEXTRACT_RECOMMENDED_MAX_MB") {
            self.recommended_max_bytes = mb * MIB;
        }
        if let Some(mb) = env_u64("DOCEXTRACT_ABSOLUTE_MAX_MB") {
            self.absolute_max_bytes = mb * MIB;
        }
        self
    }

    /// Thresholds must be non-decreasing and non-zero.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let ordered = [
            ("comfortable", self.comfortable_bytes),
            ("chunk", self.chunk_bytes),
            ("managed_file", self.managed_file_bytes),
            ("recommended_max", self.recommended_max_bytes),
            ("absolute_max", self.absolute_max_bytes),
        ];
        if self.comfortable_bytes == 0 {
            return Err(ExtractError::Config(
                "comfortable threshold must be greater than zero".to_string(),
            ));
        }
        for pair in ordered.windows(2) {
            let (lo_name, lo) = pair[0];
            let (hi_name, hi) = pair[1];
            if lo > hi {
                return Err(ExtractError::Config(format!(
                    "{} limit ({} bytes) exceeds {} limit ({} bytes)",
                    lo_name, lo, hi_name, hi
                )));
            }
        }
        Ok(())
    }

    /// Rough wall-clock estimate for processing a document of `size` bytes.
    ///
    /// Upload, storage and save overheads plus a per-megabyte cost that is
    /// higher on the LLM path than on the OCR path.
    pub fn estimate_processing_secs(&self, size: u64) -> f64 {
        const UPLOAD_SECS: f64 = 2.0;
        const STORAGE_SECS: f64 = 1.0;
        const SAVE_SECS: f64 = 0.5;
        const OCR_SECS_PER_MB: f64 = 3.0;
        const LLM_SECS_PER_MB: f64 = 8.0;

        let mb = size as f64 / MIB as f64;
        let per_mb = if size <= self.chunk_bytes {
            OCR_SECS_PER_MB
        } else {
            LLM_SECS_PER_MB
        };
        UPLOAD_SECS + STORAGE_SECS + SAVE_SECS + mb * per_mb
    }

    /// Overall processing timeout for a document of `size` bytes.
    pub fn timeout_for(&self, size: u64) -> Duration {
        if size <= self.comfortable_bytes {
            Duration::from_secs(60)
        } else if size <= self.recommended_max_bytes {
            Duration::from_secs(300)
        } else {
            Duration::from_secs(900)
        }
    }
}

/// Per-call byte budgets for chunked strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_ocr_budget_bytes")]
    pub ocr_budget_bytes: u64,
    #[serde(default = "default_llm_budget_bytes")]
    pub llm_budget_bytes: u64,
}

fn default_ocr_budget_bytes() -> u64 {
    20 * MIB
}

fn default_llm_budget_bytes() -> u64 {
    12 * MIB
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            ocr_budget_bytes: default_ocr_budget_bytes(),
            llm_budget_bytes: default_llm_budget_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl RetryConfig {
    fn base_default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }

    /// Apply `DOCEXTRACT_RETRY_ATTEMPTS` and `DOCEXTRACT_RETRY_BASE_MS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(n) = env_u64("DOCEXTRACT_RETRY_ATTEMPTS") {
            self.max_attempts = n.max(1) as u32;
        }
        if let Some(ms) = env_u64("DOCEXTRACT_RETRY_BASE_MS") {
            self.base_delay_ms = ms;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// A document with no stage update for this long is marked failed.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Terminal statuses are purged this long after their last update.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_inactivity_timeout_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_retention_secs() -> u64 {
    3600
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl TrackerConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_concurrent_documents")]
    pub max_concurrent_documents: usize,
    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
}

fn default_max_concurrent_documents() -> usize {
    3
}

fn default_max_files_per_batch() -> usize {
    20
}

fn default_max_batch_bytes() -> u64 {
    2 * 1024 * MIB
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_documents: default_max_concurrent_documents(),
            max_files_per_batch: default_max_files_per_batch(),
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadLimitConfig {
    #[serde(default = "default_per_minute")]
    pub per_minute: u32,
    #[serde(default = "default_per_hour")]
    pub per_hour: u32,
}

fn default_per_minute() -> u32 {
    10
}

fn default_per_hour() -> u32 {
    100
}

impl Default for UploadLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: default_per_minute(),
            per_hour: default_per_hour(),
        }
    }
}

/// Google Document AI settings for the OCR path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default = "default_ocr_location")]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_id: Option<String>,
    /// OAuth bearer token for the Document AI API.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    /// Full `:process` URL, overriding the one built from project/location/processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default = "default_ocr_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_cost_per_page_usd")]
    pub cost_per_page_usd: f64,
}

fn default_ocr_location() -> String {
    "us".to_string()
}

fn default_ocr_timeout_secs() -> u64 {
    120
}

fn default_cost_per_page_usd() -> f64 {
    0.0015
}

impl Default for OcrServiceConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl OcrServiceConfig {
    fn base_default() -> Self {
        Self {
            project: None,
            location: default_ocr_location(),
            processor_id: None,
            access_token: None,
            endpoint: None,
            timeout_secs: default_ocr_timeout_secs(),
            cost_per_page_usd: default_cost_per_page_usd(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `DOCUMENT_AI_PROJECT`
    /// - `DOCUMENT_AI_LOCATION`
    /// - `DOCUMENT_AI_PROCESSOR_ID`
    /// - `DOCUMENT_AI_TOKEN`
    /// - `DOCUMENT_AI_ENDPOINT`
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DOCUMENT_AI_PROJECT") {
            self.project = Some(val);
        }
        if let Ok(val) = std::env::var("DOCUMENT_AI_LOCATION") {
            self.location = val;
        }
        if let Ok(val) = std::env::var("DOCUMENT_AI_PROCESSOR_ID") {
            self.processor_id = Some(val);
        }
        if let Ok(val) = std::env::var("DOCUMENT_AI_TOKEN") {
            self.access_token = Some(val);
        }
        if let Ok(val) = std::env::var("DOCUMENT_AI_ENDPOINT") {
            self.endpoint = Some(val);
        }
        self
    }

    /// The `:process` URL, if enough is configured to build one.
    pub fn process_url(&self) -> Option<String> {
        if let Some(ref endpoint) = self.endpoint {
            return Some(endpoint.clone());
        }
        let project = self.project.as_ref()?;
        let processor = self.processor_id.as_ref()?;
        Some(format!(
            "https://{loc}-documentai.googleapis.com/v1/projects/{project}/locations/{loc}/processors/{processor}:process",
            loc = self.location,
            project = project,
            processor = processor,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.process_url().is_some() && self.access_token.is_some()
    }
}

/// Gemini settings for the managed-file and inline LLM paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_managed_file_model")]
    pub managed_file_model: String,
    #[serde(default = "default_inline_model")]
    pub inline_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_file_activation_timeout_secs")]
    pub file_activation_timeout_secs: u64,
    #[serde(default = "default_managed_file_enabled")]
    pub managed_file_enabled: bool,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_managed_file_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_inline_model() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> u32 {
    65536
}

fn default_file_activation_timeout_secs() -> u64 {
    30
}

fn default_managed_file_enabled() -> bool {
    true
}

fn default_llm_timeout_secs() -> u64 {
    600
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::base_default().with_env_overrides()
    }
}

impl LlmConfig {
    fn base_default() -> Self {
        Self {
            api_key: None,
            endpoint: default_llm_endpoint(),
            managed_file_model: default_managed_file_model(),
            inline_model: default_inline_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            file_activation_timeout_secs: default_file_activation_timeout_secs(),
            managed_file_enabled: default_managed_file_enabled(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `GEMINI_API_KEY` or `GOOGLE_AI_API_KEY`
    /// - `GEMINI_ENDPOINT`
    /// - `GEMINI_FILE_MODEL`, `GEMINI_INLINE_MODEL`
    /// - `ENABLE_GEMINI_FILE_API`: "false" or "0" disables the managed-file path
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) =
            std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("GOOGLE_AI_API_KEY"))
        {
            self.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("GEMINI_ENDPOINT") {
            self.endpoint = val;
        }
        if let Ok(val) = std::env::var("GEMINI_FILE_MODEL") {
            self.managed_file_model = val;
        }
        if let Ok(val) = std::env::var("GEMINI_INLINE_MODEL") {
            self.inline_model = val;
        }
        if let Ok(val) = std::env::var("ENABLE_GEMINI_FILE_API") {
            self.managed_file_enabled = !(val.eq_ignore_ascii_case("false") || val == "0");
        }
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.is_empty())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub limits: SizeLimits,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub uploads: UploadLimitConfig,
    #[serde(default)]
    pub ocr: OcrServiceConfig,
    #[serde(default)]
    pub llm: LlmConfig,

    /// Leave extracted documents in the `embedding` stage for a downstream
    /// embedding step to finish, instead of marking them completed.
    #[serde(default)]
    pub hand_off_to_embedding: bool,

    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load the configuration file, falling back to defaults.
    pub async fn load() -> Self {
        match prefer::load("docextract").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ExtractError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ExtractError::Config(format!("Failed to read config file: {}", e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// Parse a config document in the given format.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, ExtractError> {
        let config: Config = match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| ExtractError::Config(format!("Failed to parse TOML config: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| ExtractError::Config(format!("Failed to parse YAML config: {}", e)))?,
            _ => serde_json::from_str(contents)
                .map_err(|e| ExtractError::Config(format!("Failed to parse JSON config: {}", e)))?,
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExtractError> {
        self.limits.validate()?;
        if self.chunking.ocr_budget_bytes == 0 || self.chunking.llm_budget_bytes == 0 {
            return Err(ExtractError::Config(
                "chunk budgets must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ExtractError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch.max_concurrent_documents == 0 {
            return Err(ExtractError::Config(
                "batch.max_concurrent_documents must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
