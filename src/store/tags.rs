//! Tag Registry
//!
//! Maps physical tag UIDs to a creature: archetype, rarity, optional name
//! and up to four abilities. UIDs are stored as uppercase hex and matched
//! case-insensitively.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::game::catalog::MAX_ABILITIES_PER_UNIT;
use crate::store::StoreError;

/// Registry capacity.
pub const MAX_TAGS: usize = 256;

/// Current JSON schema version.
pub const TAGS_VERSION: u32 = 1;

/// Empty ability pair.
pub const EMPTY_ABILITY: (i8, u8) = (-1, 0);

/// One registered tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagEntry {
    /// Uppercase hex UID.
    pub uid: String,
    /// Archetype index.
    #[serde(rename = "type")]
    pub archetype: u8,
    /// 0 common, 1 rare, 2 legendary.
    pub rarity: u8,
    /// Custom creature name; empty when unnamed.
    #[serde(default)]
    pub name: String,
    /// (ability id, level) per slot; id -1 = empty.
    #[serde(default = "empty_abilities")]
    pub abilities: [(i8, u8); MAX_ABILITIES_PER_UNIT],
}

fn empty_abilities() -> [(i8, u8); MAX_ABILITIES_PER_UNIT] {
    [EMPTY_ABILITY; MAX_ABILITIES_PER_UNIT]
}

/// How a registration landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// New tag.
    Registered,
    /// Existing tag's type and rarity replaced.
    Updated,
}

#[derive(Debug, Serialize, Deserialize)]
struct TagsFile {
    version: u32,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    tags: Vec<TagEntry>,
}

/// Render a raw UID as uppercase hex.
pub fn uid_hex(uid: &[u8]) -> String {
    hex::encode_upper(uid)
}

/// Tag registry, optionally backed by a file.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: Vec<TagEntry>,
    path: Option<PathBuf>,
}

impl TagRegistry {
    /// Empty in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; missing or corrupt files give an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut registry = Self { tags: Vec::new(), path: Some(path.clone()) };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return registry,
            Err(e) => {
                warn!("Cannot read tag registry {}: {}", path.display(), e);
                return registry;
            }
        };
        match Self::from_json(&bytes) {
            Ok(tags) => registry.tags = tags,
            Err(e) => warn!("Ignoring corrupt tag registry {}: {}", path.display(), e),
        }
        registry
    }

    /// Parse the JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Vec<TagEntry>, StoreError> {
        let file: TagsFile = serde_json::from_slice(bytes)?;
        if file.version != TAGS_VERSION {
            return Err(StoreError::Version(file.version));
        }
        Ok(file
            .tags
            .into_iter()
            .take(MAX_TAGS)
            .map(|mut t| {
                t.uid.make_ascii_uppercase();
                t
            })
            .collect())
    }

    /// Render the JSON form.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let file = TagsFile { version: TAGS_VERSION, saved_at: Some(Utc::now()), tags: self.tags.clone() };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Write to the backing file, if any.
    pub fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Backing file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Registered tag count.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// No tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Find a tag by hex UID, ignoring case.
    pub fn lookup(&self, uid: &str) -> Option<&TagEntry> {
        self.tags.iter().find(|t| t.uid.eq_ignore_ascii_case(uid))
    }

    fn lookup_mut(&mut self, uid: &str) -> Option<&mut TagEntry> {
        self.tags.iter_mut().find(|t| t.uid.eq_ignore_ascii_case(uid))
    }

    /// Register a tag, or update type and rarity if it exists.
    pub fn register(&mut self, uid: &str, archetype: u8, rarity: u8) -> Result<Registration, StoreError> {
        if let Some(existing) = self.lookup_mut(uid) {
            existing.archetype = archetype;
            existing.rarity = rarity;
            return Ok(Registration::Updated);
        }
        if self.tags.len() >= MAX_TAGS {
            return Err(StoreError::Full);
        }
        self.tags.push(TagEntry {
            uid: uid.to_ascii_uppercase(),
            archetype,
            rarity,
            name: String::new(),
            abilities: empty_abilities(),
        });
        Ok(Registration::Registered)
    }

    /// Replace a tag's abilities; slots past `abilities.len()` are cleared.
    pub fn update_abilities(&mut self, uid: &str, abilities: &[(i8, u8)]) -> Result<(), StoreError> {
        let entry = self.lookup_mut(uid).ok_or(StoreError::NotFound)?;
        for (i, slot) in entry.abilities.iter_mut().enumerate() {
            *slot = abilities.get(i).copied().unwrap_or(EMPTY_ABILITY);
        }
        Ok(())
    }

    /// Clear every ability on a tag.
    pub fn reset_abilities(&mut self, uid: &str) -> Result<(), StoreError> {
        self.update_abilities(uid, &[])
    }
}
