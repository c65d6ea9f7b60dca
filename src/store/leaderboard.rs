//! Global Leaderboard
//!
//! Up to 50 records sorted by round, persisted as versioned JSON. Units are
//! stored as compact text codes: an archetype digit followed by one token
//! per ability slot, either `XX` (empty) or a two-letter ability code plus a
//! 1-based level digit. `"1MM2VC1XXXX"` is a Goblin with Magic Missile at
//! level 2, Vacuum at level 1 and two empty slots.
//!
//! Files written by older servers in the binary `LDRB` layout are read once
//! and rewritten as JSON.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::game::catalog::{AbilityId, ABILITY_MAX_LEVELS, MAX_ABILITIES_PER_UNIT};
use crate::game::state::BLUE_TEAM_MAX_SIZE;
use crate::network::protocol::{clip_name, LeaderboardRecord, SavedUnit, MAX_NAME_LEN};
use crate::store::StoreError;

/// Records kept.
pub const MAX_LEADERBOARD_ENTRIES: usize = 50;

/// Current JSON schema version.
pub const LEADERBOARD_VERSION: u32 = 1;

/// Legacy binary header magic ("LDRB").
pub const LEGACY_MAGIC: u32 = 0x4C44_5242;

const LEGACY_HEADER_SIZE: usize = 12;
const LEGACY_NAME_FIELD: usize = 32;
const LEGACY_RECORD_SIZE: usize = 184;

// =============================================================================
// UNIT CODES
// =============================================================================

/// Text code for a saved unit.
pub fn unit_code(unit: &SavedUnit) -> String {
    let mut code = String::with_capacity(1 + 3 * MAX_ABILITIES_PER_UNIT);
    code.push(char::from(b'0' + unit.archetype % 10));
    for slot in &unit.abilities {
        match slot {
            Some((id, level)) => {
                code.push_str(id.abbrev());
                code.push(char::from(b'1' + (*level).min(8)));
            }
            None => code.push_str("XX"),
        }
    }
    code
}

/// Parse a unit code. Missing trailing slots are empty.
pub fn parse_unit_code(code: &str) -> Option<SavedUnit> {
    let bytes = code.as_bytes();
    let (&first, mut rest) = bytes.split_first()?;
    if !first.is_ascii_digit() {
        return None;
    }
    let mut unit = SavedUnit { archetype: first - b'0', ..Default::default() };

    for slot in &mut unit.abilities {
        if rest.is_empty() {
            break;
        }
        if rest.starts_with(b"XX") {
            rest = &rest[2..];
            continue;
        }
        if rest.len() < 3 {
            return None;
        }
        let abbrev = std::str::from_utf8(&rest[..2]).ok()?;
        let id = AbilityId::from_abbrev(abbrev)?;
        let level = rest[2].checked_sub(b'1').filter(|l| (*l as usize) < ABILITY_MAX_LEVELS)?;
        *slot = Some((id, level));
        rest = &rest[3..];
    }

    rest.is_empty().then_some(unit)
}

// =============================================================================
// JSON SCHEMA
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct LeaderboardFile {
    version: u32,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
    entries: Vec<EntryJson>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryJson {
    name: String,
    round: u16,
    units: Vec<String>,
}

impl From<&LeaderboardRecord> for EntryJson {
    fn from(record: &LeaderboardRecord) -> Self {
        Self {
            name: record.name.clone(),
            round: record.round,
            units: record.units.iter().map(unit_code).collect(),
        }
    }
}

impl From<EntryJson> for LeaderboardRecord {
    fn from(entry: EntryJson) -> Self {
        Self {
            name: clip_name(&entry.name, MAX_NAME_LEN).to_string(),
            round: entry.round,
            units: entry
                .units
                .iter()
                .filter_map(|code| parse_unit_code(code))
                .take(BLUE_TEAM_MAX_SIZE)
                .collect(),
        }
    }
}

// =============================================================================
// LEADERBOARD
// =============================================================================

/// Sorted leaderboard, optionally backed by a file.
#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: Vec<LeaderboardRecord>,
    path: Option<PathBuf>,
}

impl Leaderboard {
    /// Empty in-memory board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`. Missing or unreadable files give an empty board;
    /// a legacy binary file is migrated and rewritten as JSON.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut board = Self { entries: Vec::new(), path: Some(path.clone()) };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return board,
            Err(e) => {
                warn!("Cannot read leaderboard {}: {}", path.display(), e);
                return board;
            }
        };

        if bytes.len() >= 4 && u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == LEGACY_MAGIC {
            match parse_legacy(&bytes) {
                Ok(entries) => {
                    board.entries = entries;
                    board.sort();
                    info!("Migrated {} legacy leaderboard entries from {}", board.entries.len(), path.display());
                    if let Err(e) = board.save() {
                        warn!("Cannot rewrite migrated leaderboard: {}", e);
                    }
                }
                Err(e) => warn!("Ignoring legacy leaderboard {}: {}", path.display(), e),
            }
            return board;
        }

        match Self::from_json(&bytes) {
            Ok(entries) => board.entries = entries,
            Err(e) => warn!("Ignoring corrupt leaderboard {}: {}", path.display(), e),
        }
        board.sort();
        board
    }

    /// Parse the JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Vec<LeaderboardRecord>, StoreError> {
        let file: LeaderboardFile = serde_json::from_slice(bytes)?;
        if file.version != LEADERBOARD_VERSION {
            return Err(StoreError::Version(file.version));
        }
        Ok(file
            .entries
            .into_iter()
            .take(MAX_LEADERBOARD_ENTRIES)
            .map(LeaderboardRecord::from)
            .collect())
    }

    /// Render the JSON form.
    pub fn to_json(&self) -> Result<String, StoreError> {
        let file = LeaderboardFile {
            version: LEADERBOARD_VERSION,
            saved_at: Some(Utc::now()),
            entries: self.entries.iter().map(EntryJson::from).collect(),
        };
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

    /// Records, best first.
    pub fn entries(&self) -> &[LeaderboardRecord] {
        &self.entries
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No records.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add a record. When full, it replaces the last record only if it
    /// reached a strictly higher round. Returns whether it was kept.
    pub fn insert(&mut self, record: LeaderboardRecord) -> bool {
        let kept = if self.entries.len() < MAX_LEADERBOARD_ENTRIES {
            self.entries.push(record);
            true
        } else {
            self.sort();
            match self.entries.last_mut() {
                Some(last) if record.round > last.round => {
                    *last = record;
                    true
                }
                _ => false,
            }
        };
        self.sort();
        kept
    }

    // Stable: equal rounds keep insertion order.
    fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.round.cmp(&a.round));
    }
}

fn le_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Read the legacy binary layout: 12-byte little-endian header, then
/// fixed 184-byte records.
fn parse_legacy(bytes: &[u8]) -> Result<Vec<LeaderboardRecord>, StoreError> {
    if bytes.len() < LEGACY_HEADER_SIZE {
        return Err(StoreError::Legacy("short header"));
    }
    if le_i32(bytes, 4) != 1 {
        return Err(StoreError::Legacy("unsupported version"));
    }
    let declared = le_i32(bytes, 8).clamp(0, MAX_LEADERBOARD_ENTRIES as i32) as usize;
    let available = (bytes.len() - LEGACY_HEADER_SIZE) / LEGACY_RECORD_SIZE;

    let records = bytes[LEGACY_HEADER_SIZE..]
        .chunks_exact(LEGACY_RECORD_SIZE)
        .take(declared.min(available))
        .map(|rec| {
            let name_field = &rec[..LEGACY_NAME_FIELD];
            let end = name_field.iter().position(|&b| b == 0).unwrap_or(LEGACY_NAME_FIELD);
            let name = String::from_utf8_lossy(&name_field[..end]);

            let round = le_i32(rec, 32).clamp(0, u16::MAX as i32) as u16;
            let count = le_i32(rec, 36).clamp(0, BLUE_TEAM_MAX_SIZE as i32) as usize;

            let units = (0..count)
                .map(|u| {
                    let base = 40 + u * 36;
                    let mut unit = SavedUnit { archetype: le_i32(rec, base).clamp(0, 9) as u8, ..Default::default() };
                    for (a, slot) in unit.abilities.iter_mut().enumerate() {
                        let id = le_i32(rec, base + 4 + a * 8);
                        let level = le_i32(rec, base + 8 + a * 8).clamp(0, ABILITY_MAX_LEVELS as i32 - 1) as u8;
                        *slot = u8::try_from(id).ok().and_then(AbilityId::from_u8).map(|id| (id, level));
                    }
                    unit
                })
                .collect();

            LeaderboardRecord {
                name: clip_name(&name, MAX_NAME_LEN).to_string(),
                round,
                units,
            }
        })
        .collect();
    Ok(records)
}
