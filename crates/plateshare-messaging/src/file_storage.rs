use crate::{Error, Result, StorageAdapter};
use std::fs;
use std::path::PathBuf;

/// One JSON file per key under a base directory. Path separators in
/// keys are flattened so the directory stays single-level and `keys()`
/// is one readdir. Each escaped character gets its own replacement so
/// file names map back to keys exactly; keys themselves never contain
/// the replacement characters.
pub struct FileStorage {
    base_path: PathBuf,
}

fn flatten(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' => '~',
            ':' => '!',
            '\\' => '^',
            c => c,
        })
        .collect()
}

fn unflatten(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            '~' => '/',
            '!' => ':',
            '^' => '\\',
            c => c,
        })
        .collect()
}

impl FileStorage {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path)
            .map_err(|e| Error::Storage(format!("create storage dir: {e}")))?;
        Ok(Self { base_path })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", flatten(key)))
    }

    fn key_for(file_name: &str) -> Option<String> {
        file_name.strip_suffix(".json").map(unflatten)
    }
}

impl StorageAdapter for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {key}: {e}"))),
        }
    }

    fn put(&self, key: &str, value: String) -> Result<()> {
        fs::write(self.path_for(key), value)
            .map_err(|e| Error::Storage(format!("write {key}: {e}")))
    }

    fn del(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("delete {key}: {e}"))),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.base_path)
            .map_err(|e| Error::Storage(format!("read storage dir: {e}")))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage(format!("read dir entry: {e}")))?;
            let file_name = entry.file_name();
            let Some(key) = Self::key_for(&file_name.to_string_lossy()) else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        Ok(keys)
    }
}
