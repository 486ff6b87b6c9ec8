use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};
use url::Url;

use super::text::TextDocument;
use super::DocumentError;

/// File path behind a `file://` URI or a plain absolute path.
pub fn uri_to_path(uri: &str) -> Result<PathBuf, DocumentError> {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => {
            url.to_file_path().map_err(|_| DocumentError::InvalidUri(uri.to_string()))
        }
        Ok(_) => Err(DocumentError::InvalidUri(uri.to_string())),
        Err(_) => {
            let path = PathBuf::from(uri);
            if path.is_absolute() {
                Ok(path)
            } else {
                Err(DocumentError::InvalidUri(uri.to_string()))
            }
        }
    }
}

/// Canonical `file://` form used to key documents.
pub fn normalize_uri(uri: &str) -> Result<String, DocumentError> {
    let path = uri_to_path(uri)?;
    Url::from_file_path(&path)
        .map(String::from)
        .map_err(|_| DocumentError::InvalidUri(uri.to_string()))
}

/// Documents loaded into the editing context, keyed by normalized URI.
pub struct DocumentStore {
    docs: RwLock<HashMap<String, Arc<TextDocument>>>,
    create_missing: bool,
}

impl DocumentStore {
    pub fn new(create_missing_files: bool) -> Self {
        Self { docs: RwLock::new(HashMap::new()), create_missing: create_missing_files }
    }

    pub fn get(&self, uri: &str) -> Option<Arc<TextDocument>> {
        let key = normalize_uri(uri).ok()?;
        self.docs.read().unwrap_or_else(PoisonError::into_inner).get(&key).cloned()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.get(uri).is_some()
    }

    pub fn len(&self) -> usize {
        self.docs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Opens `uri` with `content`, replacing any loaded copy.
    pub fn insert(&self, uri: &str, content: &str) -> Result<Arc<TextDocument>, DocumentError> {
        let key = normalize_uri(uri)?;
        let document = Arc::new(TextDocument::with_text(key.clone(), content));
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&document));
        Ok(document)
    }

    pub fn open_or_create(&self, uri: &str) -> Result<Arc<TextDocument>, DocumentError> {
        self.open_or_create_with(uri, None)
    }

    /// Returns the loaded document for `uri`, loading it from disk first if
    /// needed. A missing file is created (with `seed` as its content) when
    /// the store allows it.
    pub fn open_or_create_with(
        &self,
        uri: &str,
        seed: Option<&str>,
    ) -> Result<Arc<TextDocument>, DocumentError> {
        let key = normalize_uri(uri)?;
        if let Some(document) = self.docs.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(document));
        }

        let path = uri_to_path(&key)?;
        let content = if path.exists() {
            read_file(&path)?
        } else if self.create_missing {
            let content = seed.unwrap_or_default();
            create_file(&path, content)?;
            info!(path = %path.display(), "created missing file");
            content.to_string()
        } else {
            return Err(DocumentError::Missing(path));
        };

        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have loaded it while the file was read.
        let document = docs
            .entry(key.clone())
            .or_insert_with(|| Arc::new(TextDocument::with_text(key, &content)));
        debug!(uri = document.uri(), "document opened");
        Ok(Arc::clone(document))
    }

    /// Writes the current text of `uri` back to disk.
    pub fn save(&self, uri: &str) -> Result<PathBuf, DocumentError> {
        let document = self.get(uri).ok_or_else(|| DocumentError::InvalidUri(uri.to_string()))?;
        let path = uri_to_path(document.uri())?;
        std::fs::write(&path, document.text())
            .map_err(|source| DocumentError::Io { path: path.clone(), source })?;
        Ok(path)
    }

    /// Drops the loaded copy. The file on disk is untouched.
    pub fn close(&self, uri: &str) -> bool {
        let Ok(key) = normalize_uri(uri) else {
            return false;
        };
        self.docs.write().unwrap_or_else(PoisonError::into_inner).remove(&key).is_some()
    }
}

fn read_file(path: &Path) -> Result<String, DocumentError> {
    std::fs::read_to_string(path)
        .map_err(|source| DocumentError::Io { path: path.to_path_buf(), source })
}

fn create_file(path: &Path, content: &str) -> Result<(), DocumentError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| DocumentError::Io { path: parent.to_path_buf(), source })?;
    }
    std::fs::write(path, content)
        .map_err(|source| DocumentError::Io { path: path.to_path_buf(), source })
}
