use super::prompt::PROMPT_VERSION;
use super::{Answer, Answers, EvalRequest, Evaluate};
use crate::error::{CacheError, CallError};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Deterministic identifier of everything that shapes a response.
///
/// Every field is length-prefixed so adjacent fields cannot run together.
pub fn fingerprint<A: Answer>(model_id: &str, request: &EvalRequest) -> String {
    fn field(hasher: &mut Sha256, bytes: &[u8]) {
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }

    let mut hasher = Sha256::new();
    field(&mut hasher, A::KIND.as_bytes());
    field(&mut hasher, model_id.as_bytes());
    field(&mut hasher, PROMPT_VERSION.as_bytes());

    hasher.update((request.checklist.len() as u64).to_le_bytes());
    for (key, question) in request.checklist.iter() {
        field(&mut hasher, key.as_bytes());
        field(&mut hasher, question.as_bytes());
    }

    field(&mut hasher, request.document.as_bytes());

    match request.repeat {
        Some(repeat) => {
            hasher.update([1u8]);
            hasher.update(repeat.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }

    format!("{:x}", hasher.finalize())
}

#[derive(Serialize, Deserialize)]
struct CacheLine {
    fingerprint: String,
    response: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Response store persisted as JSON Lines.
///
/// Every write appends one complete line under an exclusive file lock, so runs
/// sharing the file never interleave partial lines. A crash loses at most the line
/// being written. Later lines override earlier ones on load.
pub struct ResponseCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, Value>>,
    file: Mutex<File>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CacheError::Open {
                path: path.clone(),
                source: e,
            })?;

        // Shared lock so a concurrent writer cannot leave us half a line
        FileExt::lock_shared(&file)?;
        let content = fs::read_to_string(&path);
        FileExt::unlock(&file)?;
        let content = content.map_err(|e| CacheError::Open {
            path: path.clone(),
            source: e,
        })?;

        let mut entries = HashMap::new();
        let mut skipped = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<CacheLine>(line) {
                Ok(entry) => {
                    entries.insert(entry.fingerprint, entry.response);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("Skipped {} unreadable cache lines in {}", skipped, path.display());
        }
        info!("Loaded {} cached responses from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            file: Mutex::new(file),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, fingerprint: &str) -> Option<Value> {
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(fingerprint).cloned());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn put(&self, fingerprint: String, response: Value) -> Result<(), CacheError> {
        let mut line = serde_json::to_string(&CacheLine {
            fingerprint: fingerprint.clone(),
            response: response.clone(),
        })?;
        line.push('\n');

        {
            let mut file = self.file.lock().map_err(|_| CacheError::Poisoned)?;
            FileExt::lock_exclusive(&*file)?;
            let written = file.write_all(line.as_bytes()).and_then(|_| file.flush());
            FileExt::unlock(&*file)?;
            written?;
        }

        self.entries
            .write()
            .map_err(|_| CacheError::Poisoned)?
            .insert(fingerprint, response);
        Ok(())
    }

    /// Sync appended entries to disk
    pub fn flush(&self) -> Result<(), CacheError> {
        let file = self.file.lock().map_err(|_| CacheError::Poisoned)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().map(|e| e.len()).unwrap_or(0),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Outermost link: answers from the cache or calls through and stores the result.
///
/// Concurrent misses for the same fingerprint all call through.
pub struct Cached<E> {
    inner: E,
    cache: Arc<ResponseCache>,
    model_id: String,
}

impl<E> Cached<E> {
    pub fn new(inner: E, cache: Arc<ResponseCache>, model_id: impl Into<String>) -> Self {
        Self {
            inner,
            cache,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl<A, E> Evaluate<A> for Cached<E>
where
    A: Answer,
    E: Evaluate<A>,
{
    async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<A>, CallError> {
        let key = fingerprint::<A>(&self.model_id, request);

        if let Some(value) = self.cache.get(&key) {
            match serde_json::from_value::<Answers<A>>(value) {
                Ok(answers) => {
                    debug!("Cache hit {}", &key[..12]);
                    return Ok(answers);
                }
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", &key[..12], e),
            }
        }

        let answers = self.inner.evaluate(request).await?;

        match serde_json::to_value(&answers) {
            Ok(value) => {
                if let Err(e) = self.cache.put(key, value) {
                    warn!("Failed to write cache entry: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize response for cache: {}", e),
        }

        Ok(answers)
    }
}
