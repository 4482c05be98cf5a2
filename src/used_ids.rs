//! Persisted set of content ids that were already posted.
//!
//! Ids are drawn uniformly from `[1, max_id]` while skipping used ones. Once
//! every id has been used the set is wiped and the cycle starts over.
use rand::seq::IteratorRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ContentError, PersistenceError};

/// Rejection-sampling draws before giving up.
const MAX_RANDOM_DRAWS: u32 = 64;

#[derive(Debug)]
pub struct UsedIdTracker {
    path: PathBuf,
    max_id: u32,
    used: BTreeSet<u32>,
}

/// Snapshot of how much of the id range has been consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStats {
    pub total: u32,
    pub used: u32,
    pub remaining: u32,
    pub percent_used: f64,
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} used, {} remaining ({:.2}%)",
            self.used, self.total, self.remaining, self.percent_used
        )
    }
}

impl UsedIdTracker {
    /// Load the set from `path`. A missing or unreadable file yields an empty set.
    pub fn load(path: impl Into<PathBuf>, max_id: u32) -> Self {
        let path = path.into();
        let used = match read_set(&path) {
            Ok(Some(set)) => {
                let before = set.len();
                let set: BTreeSet<u32> = set.into_iter().filter(|id| (1..=max_id).contains(id)).collect();
                if set.len() != before {
                    warn!(path=%path.display(), dropped = before - set.len(), "ignored out-of-range ids");
                }
                set
            }
            Ok(None) => {
                debug!(path=%path.display(), "no used-id file yet, starting fresh");
                BTreeSet::new()
            }
            Err(err) => {
                warn!(?err, path=%path.display(), "could not read used-id file, starting fresh");
                BTreeSet::new()
            }
        };
        Self { path, max_id, used }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_id(&self) -> u32 {
        self.max_id
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains(&id)
    }

    pub fn random_unused(&mut self) -> Result<u32, ContentError> {
        self.random_unused_with(&mut rand::thread_rng())
    }

    /// Pick an id that has not been used yet, resetting first if the range is
    /// exhausted.
    pub fn random_unused_with<R: Rng>(&mut self, rng: &mut R) -> Result<u32, ContentError> {
        if self.used.len() as u64 >= u64::from(self.max_id) {
            info!(max_id = self.max_id, "all ids have been used, resetting");
            self.reset();
        }

        // Past half full, rejection sampling gets slow; pick from what is left.
        if self.used.len() as u64 * 2 >= u64::from(self.max_id) {
            return (1..=self.max_id)
                .filter(|id| !self.used.contains(id))
                .choose(rng)
                .ok_or(ContentError::ExhaustedRetries { attempts: 1 });
        }

        for _ in 0..MAX_RANDOM_DRAWS {
            let candidate = rng.gen_range(1..=self.max_id);
            if !self.used.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(ContentError::ExhaustedRetries { attempts: MAX_RANDOM_DRAWS })
    }

    /// Record `id` as used and persist the whole set. Write failures are logged.
    pub async fn mark_used(&mut self, id: u32) {
        if !(1..=self.max_id).contains(&id) {
            warn!(id, max_id = self.max_id, "refusing to mark out-of-range id");
            return;
        }
        self.used.insert(id);
        if let Err(err) = self.save().await {
            warn!(?err, path=%self.path.display(), "failed to persist used ids");
        }
    }

    /// Forget every used id and delete the persisted file.
    pub fn reset(&mut self) {
        self.used.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(?err, path=%self.path.display(), "failed to remove used-id file"),
        }
    }

    pub fn stats(&self) -> UsageStats {
        let used = self.used.len() as u32;
        let percent_used = if self.max_id == 0 {
            0.0
        } else {
            f64::from(used) / f64::from(self.max_id) * 100.0
        };
        UsageStats {
            total: self.max_id,
            used,
            remaining: self.max_id.saturating_sub(used),
            percent_used,
        }
    }

    async fn save(&self) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let ids: Vec<u32> = self.used.iter().copied().collect();
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&ids)?).await?;
        Ok(())
    }
}

fn read_set(path: &Path) -> Result<Option<BTreeSet<u32>>, PersistenceError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let ids: Vec<u32> = serde_json::from_str(&raw)?;
    Ok(Some(ids.into_iter().collect()))
}
