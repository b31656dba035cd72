use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_target")]
    pub target: PathBuf,

    #[serde(default)]
    pub documents: DocumentsConfig,

    /// Where extracted document text is written; `null` disables it
    #[serde(default = "default_text_dir")]
    pub text_dir: Option<PathBuf>,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// Independent samples per document; higher is more accurate but costs more
    #[serde(default = "default_repeats")]
    pub repeats: u32,

    /// Maximum concurrent requests to the LLM API
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub views: BTreeMap<String, View>,

    /// Free-text questions answered once per document
    #[serde(default)]
    pub questions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct DocumentsConfig {
    #[serde(default = "default_document_paths")]
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_document_include")]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            paths: default_document_paths(),
            include: default_document_include(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ProviderConfig {
    /// OpenAI-format chat completions endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_sec: default_timeout_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct View {
    pub pretty_name: String,

    #[serde(default)]
    pub score_checklist: BTreeMap<String, ChecklistItem>,
}

impl View {
    /// The `key -> question` mapping sent to the model
    pub fn checklist(&self) -> BTreeMap<String, String> {
        self.score_checklist
            .iter()
            .map(|(key, item)| (key.clone(), item.question.clone()))
            .collect()
    }

    pub fn weights(&self) -> BTreeMap<String, f64> {
        self.score_checklist
            .iter()
            .map(|(key, item)| (key.clone(), item.weight))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct ChecklistItem {
    pub question: String,

    #[serde(default = "default_weight")]
    pub weight: f64,
}
