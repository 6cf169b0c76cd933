use super::{TargetError, TargetList, TargetStore};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One JSON document per owner: `<dir>/<owner_id>.json`.
pub struct FileTargetStore {
    dir: PathBuf,
}

impl FileTargetStore {
    /// Creates the directory if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TargetError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, owner_id: &str) -> Result<PathBuf, TargetError> {
        let valid = !owner_id.is_empty()
            && owner_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(TargetError::InvalidOwner(owner_id.to_string()));
        }
        Ok(self.dir.join(format!("{owner_id}.json")))
    }
}

impl TargetStore for FileTargetStore {
    fn load(&self, owner_id: &str) -> Result<Option<TargetList>, TargetError> {
        let path = self.path_for(owner_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, list: &TargetList) -> Result<(), TargetError> {
        let path = self.path_for(&list.owner_id)?;
        let json = serde_json::to_string_pretty(list)?;
        // Each writer gets its own temp file; the last rename wins.
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}
