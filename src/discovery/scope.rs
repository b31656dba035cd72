use crate::config::DocumentsConfig;
use crate::error::DiscoveryError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

fn build_globset(patterns: &[String], label: &str) -> Result<GlobSet, DiscoveryError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| DiscoveryError::GlobPattern {
                pattern: pattern.clone(),
                source: e,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| DiscoveryError::GlobPattern {
        pattern: label.to_string(),
        source: e,
    })
}

/// Resolve the configured document paths to a sorted list of files
pub fn resolve_documents(
    target: &Path,
    documents: &DocumentsConfig,
) -> Result<Vec<PathBuf>, DiscoveryError> {
    let include_set = build_globset(&documents.include, "include set")?;
    let exclude_set = build_globset(&documents.exclude, "exclude set")?;

    let mut files = Vec::new();

    for doc_path in &documents.paths {
        let full_path = target.join(doc_path);
        if !full_path.exists() {
            tracing::warn!("Document path {} does not exist", full_path.display());
            continue;
        }

        let walker = WalkBuilder::new(&full_path)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .build();

        for entry in walker {
            let entry = entry?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            // Match against the path relative to target
            let rel_path = path.strip_prefix(target).unwrap_or(path);

            if !documents.include.is_empty() && !include_set.is_match(rel_path) {
                continue;
            }

            if exclude_set.is_match(rel_path) {
                continue;
            }

            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}
