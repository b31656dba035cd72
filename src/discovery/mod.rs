mod extract;
mod scope;

pub use extract::{extract_text, write_text_file};
pub use scope::resolve_documents;

use crate::config::Config;
use crate::error::DiscoveryError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// A resume loaded into memory. The text is shared, never copied.
#[derive(Debug, Clone)]
pub struct Document {
    pub index: usize,
    pub name: String,
    pub path: PathBuf,
    pub text: Arc<str>,
}

impl Document {
    pub fn new(index: usize, path: PathBuf, text: impl Into<Arc<str>>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            index,
            name,
            path,
            text: text.into(),
        }
    }
}

/// Discover and extract every document the config points at
pub fn load_documents(config: &Config) -> Result<Vec<Document>, DiscoveryError> {
    let paths = resolve_documents(&config.target, &config.documents)?;
    info!("Found {} documents", paths.len());

    let mut documents = Vec::with_capacity(paths.len());
    for (index, path) in paths.into_iter().enumerate() {
        let text = extract_text(&path)?;
        debug!("Loaded document {} ({} chars) from {}", index, text.len(), path.display());
        documents.push(Document::new(index, path, text));
    }

    if let Some(text_dir) = &config.text_dir {
        let text_dir = config.target.join(text_dir);
        for doc in &documents {
            write_text_file(&text_dir, &doc.name, &doc.text)?;
        }
        debug!("Wrote extracted text to {}", text_dir.display());
    }

    Ok(documents)
}
