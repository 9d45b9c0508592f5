//! NID -> name database
//!
//! Imported and exported symbols are referenced by 32-bit NIDs. The
//! database maps `(library, nid)` to a readable name and is loaded once,
//! before any image is processed.
//!
//! On disk it is JSON or TOML (picked by file extension):
//!
//! ```json
//! { "groups": [ { "name": "sysPrxForUser",
//!                 "entries": [ { "id": "0x9FB6228E", "name": "sys_ppu_thread_create" } ] } ] }
//! ```

use oc_core::error::LoaderError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct NidFile {
    #[serde(default)]
    groups: Vec<NidGroup>,
}

#[derive(Debug, Deserialize)]
struct NidGroup {
    name: String,
    #[serde(default)]
    entries: Vec<NidEntry>,
}

#[derive(Debug, Deserialize)]
struct NidEntry {
    id: NidId,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NidId {
    Number(u64),
    Text(String),
}

impl NidId {
    fn value(&self) -> Option<u32> {
        match self {
            Self::Number(n) => u32::try_from(*n).ok(),
            Self::Text(s) => parse_nid(s),
        }
    }
}

/// Parse an id using C `strtoul(s, .., 0)` base rules: `0x` prefix is
/// hex, a leading `0` is octal, anything else decimal.
pub fn parse_nid(text: &str) -> Option<u32> {
    let s = text.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// Read-only `(library, nid) -> name` store
#[derive(Debug, Clone, Default)]
pub struct NidDatabase {
    libraries: HashMap<String, HashMap<u32, String>>,
}

impl NidDatabase {
    /// Create an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a database file. A `.toml` extension selects TOML, anything
    /// else is read as JSON.
    pub fn open(path: &Path) -> Result<Self, LoaderError> {
        if !path.is_file() {
            return Err(LoaderError::NidDatabaseMissing(path.to_path_buf()));
        }

        let text = std::fs::read_to_string(path).map_err(|e| LoaderError::NidDatabaseParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            Self::from_toml(&text).map_err(|e| e.to_string())
        } else {
            Self::from_json(&text).map_err(|e| e.to_string())
        };

        let db = parsed.map_err(|reason| LoaderError::NidDatabaseParse {
            path: path.to_path_buf(),
            reason,
        })?;

        info!(
            "Loaded NID database {}: {} libraries, {} names",
            path.display(),
            db.library_count(),
            db.len()
        );
        Ok(db)
    }

    /// Parse the JSON form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let file: NidFile = serde_json::from_str(text)?;
        Ok(Self::from_file(file))
    }

    /// Parse the TOML form
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        let file: NidFile = toml::from_str(text)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: NidFile) -> Self {
        let mut db = Self::new();
        for group in file.groups {
            db.libraries.entry(group.name.clone()).or_default();
            for entry in group.entries {
                match entry.id.value() {
                    Some(nid) => db.insert(&group.name, nid, &entry.name),
                    None => warn!(
                        "Skipping NID entry '{}' in library '{}': bad id {:?}",
                        entry.name, group.name, entry.id
                    ),
                }
            }
        }
        db
    }

    /// Add a name. The first name registered for a `(library, nid)` pair wins.
    pub fn insert(&mut self, library: &str, nid: u32, name: &str) {
        let entries = self.libraries.entry(library.to_string()).or_default();
        if entries.contains_key(&nid) {
            debug!("Duplicate NID 0x{:08x} in {}, keeping first name", nid, library);
            return;
        }
        entries.insert(nid, name.to_string());
    }

    /// Look up a name; `None` when the library or the NID is unknown
    pub fn lookup(&self, library: &str, nid: u32) -> Option<&str> {
        self.libraries
            .get(library)?
            .get(&nid)
            .map(|s| s.as_str())
    }

    /// True when the library is listed, even without any entries
    pub fn has_library(&self, library: &str) -> bool {
        self.libraries.contains_key(library)
    }

    pub fn library_count(&self) -> usize {
        self.libraries.len()
    }

    /// Total number of names across all libraries
    pub fn len(&self) -> usize {
        self.libraries.values().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
