mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::collections::BTreeMap;
use std::path::Path;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            target: default_target(),
            documents: DocumentsConfig::default(),
            text_dir: default_text_dir(),
            report_dir: default_report_dir(),
            repeats: default_repeats(),
            concurrency: default_concurrency(),
            dry_run: false,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            provider: ProviderConfig::default(),
            views: BTreeMap::new(),
            questions: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load config from a YAML (or JSON) file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the config
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repeats == 0 {
            return Err(ConfigError::ZeroValue { field: "repeats" });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroValue {
                field: "concurrency",
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroValue {
                field: "retry.max_attempts",
            });
        }

        for (view_id, view) in &self.views {
            for (key, item) in &view.score_checklist {
                if key.trim().is_empty() {
                    return Err(ConfigError::EmptyKey {
                        view: view_id.clone(),
                    });
                }
                if !item.weight.is_finite() {
                    return Err(ConfigError::InvalidWeight {
                        view: view_id.clone(),
                        key: key.clone(),
                    });
                }
            }
        }

        if self.views.is_empty() && self.questions.is_empty() {
            return Err(ConfigError::NothingToDo);
        }

        Ok(())
    }

    /// Keep only the named views
    pub fn retain_views(&mut self, filter: &[String]) -> Result<(), ConfigError> {
        if let Some(unknown) = filter.iter().find(|id| !self.views.contains_key(*id)) {
            return Err(ConfigError::UnknownView(unknown.clone()));
        }
        self.views.retain(|id, _| filter.contains(id));
        Ok(())
    }
}
