use std::path::PathBuf;

pub fn default_version() -> u32 {
    1
}

pub fn default_target() -> PathBuf {
    PathBuf::from(".")
}

pub fn default_document_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("pdf")]
}

pub fn default_document_include() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

pub fn default_text_dir() -> Option<PathBuf> {
    Some(PathBuf::from("text"))
}

pub fn default_report_dir() -> PathBuf {
    PathBuf::from("result")
}

pub fn default_repeats() -> u32 {
    5
}

pub fn default_concurrency() -> usize {
    3
}

pub fn default_max_attempts() -> u32 {
    8
}

pub fn default_delay_ms() -> u64 {
    5000
}

pub fn default_cache_path() -> PathBuf {
    PathBuf::from("cache.jsonl")
}

pub fn default_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

pub fn default_model() -> String {
    "gpt-4.1".to_string()
}

pub fn default_temperature() -> f32 {
    0.0
}

pub fn default_timeout_sec() -> u64 {
    120
}

pub fn default_weight() -> f64 {
    1.0
}

pub fn default_true() -> bool {
    true
}
