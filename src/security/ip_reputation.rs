//! Address block and allow lists.
//!
//! Each address owns a small history of list entries. At most one active
//! `Allow` and one active `Block` exist per address; deactivated entries are
//! kept. Expiry is checked whenever an entry is read, so a timed entry stops
//! counting the moment it lapses whether or not the sweep has run.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::Clock;

/// Longest timed entry accepted, about a century. Longer means permanent.
pub const MAX_DURATION_HOURS: u32 = 876_000;

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error("duration must be between one and {MAX_DURATION_HOURS} hours")]
    InvalidDuration,

    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Whether an entry blocks or allows its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    Block { reason: String, is_automatic: bool },
    Allow,
}

impl EntryKind {
    fn same_kind(&self, other: &EntryKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// One block or allow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpListEntry {
    pub address: IpAddr,
    pub kind: EntryKind,
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// `None` means permanent.
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl IpListEntry {
    /// Active and not yet expired at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.map_or(true, |at| at > now)
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, EntryKind::Block { .. })
    }
}

/// Result of evaluating an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reputation {
    Allowed,
    Blocked {
        reason: String,
        expires_at: Option<DateTime<Utc>>,
    },
}

/// Concurrent block/allow list keyed by address.
#[derive(Debug)]
pub struct IpReputationGuard {
    entries: DashMap<IpAddr, Vec<IpListEntry>>,
    clock: Arc<dyn Clock>,
}

impl IpReputationGuard {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Allow beats Block; anything else is allowed. Never mutates.
    pub fn evaluate(&self, address: IpAddr) -> Reputation {
        let now = self.clock.utc();
        let Some(history) = self.entries.get(&address) else {
            return Reputation::Allowed;
        };

        let mut block = None;
        for entry in history.iter().filter(|e| e.is_live(now)) {
            match &entry.kind {
                EntryKind::Allow => return Reputation::Allowed,
                EntryKind::Block { reason, .. } => block = Some((reason.clone(), entry.expires_at)),
            }
        }

        match block {
            Some((reason, expires_at)) => Reputation::Blocked { reason, expires_at },
            None => Reputation::Allowed,
        }
    }

    /// Create or update the active block for `address`.
    pub fn block(
        &self,
        address: IpAddr,
        reason: impl Into<String>,
        added_by: Option<String>,
        is_automatic: bool,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ReputationError> {
        let kind = EntryKind::Block {
            reason: reason.into(),
            is_automatic,
        };
        self.upsert(address, kind, added_by, duration_hours)
    }

    /// Create or update the active allow entry for `address`.
    pub fn whitelist(
        &self,
        address: IpAddr,
        added_by: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ReputationError> {
        self.upsert(address, EntryKind::Allow, added_by, duration_hours)
    }

    fn upsert(
        &self,
        address: IpAddr,
        kind: EntryKind,
        added_by: Option<String>,
        duration_hours: Option<u32>,
    ) -> Result<IpListEntry, ReputationError> {
        let now = self.clock.utc();
        let expires_at = match duration_hours {
            Some(0) => return Err(ReputationError::InvalidDuration),
            Some(hours) if hours > MAX_DURATION_HOURS => return Err(ReputationError::InvalidDuration),
            Some(hours) => Some(
                ChronoDuration::try_hours(i64::from(hours))
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or(ReputationError::InvalidDuration)?,
            ),
            None => None,
        };

        let mut history = self.entries.entry(address).or_default();

        // A lapsed entry of the same kind is retired rather than revived.
        for entry in history.iter_mut() {
            if entry.is_active && entry.kind.same_kind(&kind) && !entry.is_live(now) {
                entry.is_active = false;
            }
        }

        if let Some(existing) = history
            .iter_mut()
            .find(|e| e.is_active && e.kind.same_kind(&kind))
        {
            existing.kind = kind;
            existing.added_by = added_by;
            existing.expires_at = expires_at;
            return Ok(existing.clone());
        }

        let entry = IpListEntry {
            address,
            kind,
            added_by,
            created_at: now,
            expires_at,
            is_active: true,
        };
        history.push(entry.clone());
        Ok(entry)
    }

    /// Deactivate the block on `address`. `false` if none was in force.
    pub fn unblock(&self, address: IpAddr) -> bool {
        self.deactivate(address, |e| e.is_block())
    }

    /// Deactivate the allow entry on `address`. `false` if none was in force.
    pub fn remove_from_whitelist(&self, address: IpAddr) -> bool {
        self.deactivate(address, |e| !e.is_block())
    }

    fn deactivate(&self, address: IpAddr, of_kind: impl Fn(&IpListEntry) -> bool) -> bool {
        let now = self.clock.utc();
        let Some(mut history) = self.entries.get_mut(&address) else {
            return false;
        };

        let mut was_live = false;
        for entry in history.iter_mut().filter(|e| e.is_active && of_kind(e)) {
            was_live |= entry.is_live(now);
            entry.is_active = false;
        }
        was_live
    }

    pub fn is_blocked(&self, address: IpAddr) -> bool {
        self.active_entry(address, IpListEntry::is_block).is_some()
    }

    pub fn is_whitelisted(&self, address: IpAddr) -> bool {
        self.active_entry(address, |e| !e.is_block()).is_some()
    }

    /// The block entry currently in force, if any.
    pub fn active_block(&self, address: IpAddr) -> Option<IpListEntry> {
        self.active_entry(address, IpListEntry::is_block)
    }

    /// The allow entry currently in force, if any.
    pub fn active_allow(&self, address: IpAddr) -> Option<IpListEntry> {
        self.active_entry(address, |e| !e.is_block())
    }

    fn active_entry(&self, address: IpAddr, of_kind: impl Fn(&IpListEntry) -> bool) -> Option<IpListEntry> {
        let now = self.clock.utc();
        self.entries
            .get(&address)?
            .iter()
            .find(|e| e.is_live(now) && of_kind(e))
            .cloned()
    }

    /// Every entry ever recorded for `address`, oldest first.
    pub fn history(&self, address: IpAddr) -> Vec<IpListEntry> {
        self.entries
            .get(&address)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn blocked_entries(&self) -> Vec<IpListEntry> {
        self.live_entries(IpListEntry::is_block)
    }

    pub fn whitelisted_entries(&self) -> Vec<IpListEntry> {
        self.live_entries(|e| !e.is_block())
    }

    fn live_entries(&self, of_kind: impl Fn(&IpListEntry) -> bool) -> Vec<IpListEntry> {
        let now = self.clock.utc();
        let mut live: Vec<IpListEntry> = self
            .entries
            .iter()
            .flat_map(|h| {
                h.value()
                    .iter()
                    .filter(|e| e.is_live(now) && of_kind(e))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        live.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        live
    }

    /// Deactivate entries whose expiry has passed. Returns how many changed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.utc();
        let mut swept = 0;
        for mut history in self.entries.iter_mut() {
            for entry in history.iter_mut() {
                if entry.is_active && !entry.is_live(now) {
                    entry.is_active = false;
                    swept += 1;
                }
            }
        }
        swept
    }

    /// Write every entry, history included, as a JSON array.
    pub fn save_snapshot(&self, path: &Path) -> Result<usize, ReputationError> {
        let all: Vec<IpListEntry> = self
            .entries
            .iter()
            .flat_map(|h| h.value().clone())
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &all)?;
        tracing::info!(path = ?path, entries = all.len(), "Saved IP list snapshot");
        Ok(all.len())
    }

    /// Merge entries from a snapshot. A missing file loads nothing.
    pub fn load_snapshot(&self, path: &Path) -> Result<usize, ReputationError> {
        if !path.exists() {
            return Ok(0);
        }

        let reader = BufReader::new(File::open(path)?);
        let loaded: Vec<IpListEntry> = serde_json::from_reader(reader)?;
        let count = loaded.len();
        for entry in loaded {
            self.entries.entry(entry.address).or_default().push(entry);
        }
        tracing::info!(path = ?path, entries = count, "Loaded IP list snapshot");
        Ok(count)
    }
}
