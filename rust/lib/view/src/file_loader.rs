use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::AccessError;
use crate::memory::MemoryStore;

/// FileLoader seeds a MemoryStore from a data directory. The directory
/// structure determines the record key:
///
/// ```text
/// data-dir/
/// ├── Node/a.json        → Node/a
/// ├── Node/b.json        → Node/b
/// └── Team/core.json     → Team/core
/// ```
///
/// Each file holds one JSON object of attributes. References to other
/// records are written as `{"ref": "Type/id"}`, or an array of those for
/// one-to-many attributes.
pub struct FileLoader;

impl FileLoader {
    /// Load every `{EntityType}/{id}.json` under `data_dir` into `store`.
    /// Returns the number of records loaded.
    pub fn load(data_dir: &Path, store: &MemoryStore) -> Result<usize, AccessError> {
        if !data_dir.is_dir() {
            debug!("FileLoader: data dir {:?} does not exist, skipping", data_dir);
            return Ok(0);
        }

        let mut count = 0;
        let entries = fs::read_dir(data_dir).map_err(|e| AccessError::Storage(e.to_string()))?;

        for entry in entries {
            let entry = entry.map_err(|e| AccessError::Storage(e.to_string()))?;
            let path = entry.path();
            if !path.is_dir() {
                if Self::is_json(&path) {
                    warn!(
                        "FileLoader: {:?} is not inside an entity type directory, skipping",
                        path
                    );
                }
                continue;
            }

            let entity_type = path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            count += Self::load_type_directory(&path, entity_type, store)?;
        }

        debug!("FileLoader: loaded {} records from {:?}", count, data_dir);
        Ok(count)
    }

    /// Load a flat directory of records of one entity type.
    fn load_type_directory(
        dir: &Path,
        entity_type: &str,
        store: &MemoryStore,
    ) -> Result<usize, AccessError> {
        let mut count = 0;
        let entries = fs::read_dir(dir).map_err(|e| AccessError::Storage(e.to_string()))?;

        for entry in entries {
            let entry = entry.map_err(|e| AccessError::Storage(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() || !Self::is_json(&path) {
                continue;
            }

            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if id.is_empty() {
                continue;
            }

            let data = fs::read(&path).map_err(|e| AccessError::Storage(e.to_string()))?;
            store.insert_json(entity_type, id, &data)?;
            count += 1;
        }

        Ok(count)
    }

    fn is_json(path: &Path) -> bool {
        path.extension().and_then(|e| e.to_str()) == Some("json")
    }
}
