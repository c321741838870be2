/*!
 * Resume ledger: the set of words already turned into cards.
 *
 * The ledger is committed after every item, so an interrupted run loses at
 * most the item that was in flight.
 */

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use crate::file_utils::FileManager;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    processed: BTreeSet<String>,
}

/// Persisted set of processed lowercase words
#[derive(Debug, Clone)]
pub struct ResumeLedger {
    path: PathBuf,
}

impl ResumeLedger {
    /// Ledger stored at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the processed set. A missing or corrupt file is an empty set.
    pub fn load(&self) -> HashSet<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => {
                debug!("No resume state at {}", self.path.display());
                return HashSet::new();
            }
        };

        match serde_json::from_str::<LedgerFile>(&raw) {
            Ok(ledger) => ledger.processed.into_iter().collect(),
            Err(e) => {
                warn!("Ignoring unreadable resume state {}: {}", self.path.display(), e);
                HashSet::new()
            }
        }
    }

    /// Persist the full set, sorted, through an atomic rename
    pub fn commit(&self, processed: &HashSet<String>) -> std::io::Result<()> {
        let ledger = LedgerFile {
            processed: processed.iter().cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&ledger).map_err(std::io::Error::other)?;
        FileManager::write_atomic(&self.path, &json)
    }
}
