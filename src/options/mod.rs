use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{error::Result, trie::HashMode};

/// Settings for a `TrieFile` handle. These live with the caller, not in the
/// trie file itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub hash_mode: HashMode,
    /// Remember lookup results, including misses, for the life of the handle.
    pub cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            hash_mode: HashMode::None,
            cache: true,
        }
    }
}

impl Options {
    pub fn with_hash_mode(hash_mode: HashMode) -> Self {
        Options {
            hash_mode,
            ..Options::default()
        }
    }

    /// Reads options from a JSON file, or the defaults if there is none.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Options::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = Self::tmp_path(path);
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp_path)?;
        let encoded = serde_json::to_string_pretty(self)?;
        file.write_all(encoded.as_bytes())?;
        file.sync_all()?;

        // TODO: fsync the parent directory so the rename itself is durable.
        fs::rename(tmp_path, path)?;
        Ok(())
    }
}
