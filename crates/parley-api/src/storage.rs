use std::path::PathBuf;

/// Object-store boundary: resolve a storage reference to a fetchable
/// URL, `None` when the object is absent. Uploads happen elsewhere;
/// this layer only resolves references attached to messages and
/// profiles.
pub trait ObjectStore: Send + Sync {
    fn url_for(&self, storage_ref: &str) -> Option<String>;
}

/// Local-disk store: objects live as files under a base directory and
/// are served under a public base URL.
pub struct LocalObjectStore {
    base_dir: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self {
            base_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn url_for(&self, storage_ref: &str) -> Option<String> {
        // References are opaque single path components; reject anything
        // that could traverse out of the base dir.
        if storage_ref.is_empty()
            || storage_ref.contains('/')
            || storage_ref.contains('\\')
            || storage_ref.contains("..")
        {
            return None;
        }

        let path = self.base_dir.join(storage_ref);
        if !path.is_file() {
            return None;
        }

        Some(format!("{}/{}", self.base_url, storage_ref))
    }
}
