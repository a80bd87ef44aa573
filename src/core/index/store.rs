//! On-disk form of a content index: two plain JSON tables in the library
//! folder, each replaced atomically through a temp file and a rename.

use crate::error::IndexError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// `signature -> path` table
pub const ENTRIES_FILE: &str = "hash.json";
/// `known paths` table
pub const KNOWN_PATHS_FILE: &str = "hash_path.json";

/// Raw tables as they appear on disk
#[derive(Debug, Clone, Default)]
pub(crate) struct RawTables {
    pub entries: BTreeMap<String, String>,
    pub known_paths: Vec<String>,
}

/// Outcome of reading the tables
#[derive(Debug)]
pub(crate) enum TableRead {
    /// Neither table exists
    Missing,
    Loaded(RawTables),
    /// A table is absent or unreadable; the message says which
    Corrupt(IndexError),
}

pub(crate) fn read_tables(root: &Path) -> TableRead {
    let entries_path = root.join(ENTRIES_FILE);
    let known_path = root.join(KNOWN_PATHS_FILE);

    match (entries_path.exists(), known_path.exists()) {
        (false, false) => return TableRead::Missing,
        (true, false) => return TableRead::Corrupt(missing(&known_path)),
        (false, true) => return TableRead::Corrupt(missing(&entries_path)),
        (true, true) => {}
    }

    let entries = match read_json::<BTreeMap<String, String>>(&entries_path) {
        Ok(entries) => entries,
        Err(e) => return TableRead::Corrupt(e),
    };
    let known_paths = match read_json::<Vec<String>>(&known_path) {
        Ok(known) => known,
        Err(e) => return TableRead::Corrupt(e),
    };

    TableRead::Loaded(RawTables {
        entries,
        known_paths,
    })
}

/// Persist both tables. `hash_path.json` goes first so `hash.json` is
/// always the last file to change.
pub(crate) fn write_tables(root: &Path, tables: &RawTables) -> Result<(), IndexError> {
    write_json_atomic(&root.join(KNOWN_PATHS_FILE), &tables.known_paths)?;
    write_json_atomic(&root.join(ENTRIES_FILE), &tables.entries)?;
    Ok(())
}

/// Render a library-relative path the way the tables store it.
pub(crate) fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Turn a stored path back into a library-relative one.
///
/// Older tables stored absolute paths; those are reduced to the file name,
/// which is what a non-recursive library listing produces.
pub(crate) fn relative_from_key(key: &str) -> PathBuf {
    let path = Path::new(key);
    if path.is_absolute() || key.contains('/') {
        if let Some(name) = path.file_name() {
            return PathBuf::from(name);
        }
    }
    PathBuf::from(key)
}

fn missing(path: &Path) -> IndexError {
    IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: "table is missing while its companion exists".to_string(),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let text = fs::read_to_string(path).map_err(|e| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| IndexError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let write_error = |source: std::io::Error| IndexError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, value).map_err(|e| IndexError::Serialize {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        writer.flush().map_err(write_error)?;
    }
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;
    Ok(())
}
