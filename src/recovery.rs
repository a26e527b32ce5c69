// Interruption recovery
// A record exists on disk only while a match is in flight. Finding one at
// startup means the last run died mid-match, which counts as abandoning it.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::PersistenceError;
use crate::session::report::{MatchOutcome, OutcomeReason, Winner};

const RECORD_FILE: &str = "session-recovery.bin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecoveryRecord {
    pub opponent_username: String,
    pub opponent_user_id: Option<String>,
    pub is_host: bool,
    pub session_id: String,
    pub my_score: u8,
    pub opponent_score: u8,
    pub elapsed_secs: f32,
}

/// Small key-value style persistence for the single recovery record
pub trait RecoveryStore {
    fn get(&self) -> Result<Option<SessionRecoveryRecord>, PersistenceError>;

    fn put(&mut self, record: &SessionRecoveryRecord) -> Result<(), PersistenceError>;

    fn delete(&mut self) -> Result<(), PersistenceError>;
}

/// Record stored as bincode in the user's data directory
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data dir>/pongmatch/session-recovery.bin`
    pub fn default_location() -> Result<Self, PersistenceError> {
        let dir = dirs::data_dir()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no data directory")
            })?
            .join("pongmatch");
        fs::create_dir_all(&dir)?;
        Ok(Self::new(dir.join(RECORD_FILE)))
    }
}

impl RecoveryStore for FileStore {
    fn get(&self) -> Result<Option<SessionRecoveryRecord>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, record: &SessionRecoveryRecord) -> Result<(), PersistenceError> {
        let bytes = bincode::serialize(record)?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn delete(&mut self) -> Result<(), PersistenceError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store. Clones share the same slot, so a test can keep a handle
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Arc<Mutex<Option<SessionRecoveryRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SessionRecoveryRecord) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(record))),
        }
    }

    pub fn current(&self) -> Option<SessionRecoveryRecord> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl RecoveryStore for MemoryStore {
    fn get(&self) -> Result<Option<SessionRecoveryRecord>, PersistenceError> {
        Ok(self.current())
    }

    fn put(&mut self, record: &SessionRecoveryRecord) -> Result<(), PersistenceError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(record.clone());
        }
        Ok(())
    }

    fn delete(&mut self) -> Result<(), PersistenceError> {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
        Ok(())
    }
}

/// Run before anything else at startup. A leftover record becomes a forfeit loss
/// for this player and is deleted; the caller shows the outcome instead of any menu.
pub fn check_interrupted(store: &mut dyn RecoveryStore) -> Option<MatchOutcome> {
    let record = match store.get() {
        Ok(Some(record)) => record,
        Ok(None) => return None,
        Err(e) => {
            // Unreadable record: nothing to show, don't let it stick around
            warn!("Discarding unreadable recovery record: {}", e);
            let _ = store.delete();
            return None;
        }
    };

    info!(
        session_id = %record.session_id,
        opponent = %record.opponent_username,
        "Found interrupted match, recording forfeit"
    );

    if let Err(e) = store.delete() {
        warn!("Failed to delete recovery record: {}", e);
    }

    Some(MatchOutcome {
        winner: Winner::Opponent,
        my_score: record.my_score,
        opponent_score: record.opponent_score,
        reason: OutcomeReason::Abandoned,
        opponent_name: record.opponent_username,
        duration_secs: record.elapsed_secs.max(0.0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecoveryRecord {
        SessionRecoveryRecord {
            opponent_username: "Bob".to_string(),
            opponent_user_id: Some("u-7".to_string()),
            is_host: false,
            session_id: "match-1-a".to_string(),
            my_score: 1,
            opponent_score: 3,
            elapsed_secs: 42.5,
        }
    }

    #[test]
    fn test_no_record_no_outcome() {
        let mut store = MemoryStore::new();
        assert!(check_interrupted(&mut store).is_none());
    }

    #[test]
    fn test_leftover_record_is_forfeit_loss() {
        let mut store = MemoryStore::with_record(record());
        let outcome = check_interrupted(&mut store).unwrap();

        assert_eq!(outcome.winner, Winner::Opponent);
        assert_eq!(outcome.reason, OutcomeReason::Abandoned);
        assert_eq!((outcome.my_score, outcome.opponent_score), (1, 3));
        assert_eq!(outcome.headline(), "Bob wins by forfeit");
        assert_eq!(outcome.duration_secs, 42);

        // Consumed
        assert!(store.current().is_none());
        assert!(check_interrupted(&mut store).is_none());
    }

    #[test]
    fn test_file_store_roundtrip_and_delete() {
        let dir = std::env::temp_dir().join(format!("pongmatch-recovery-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let mut store = FileStore::new(dir.join(RECORD_FILE));

        assert_eq!(store.get().unwrap(), None);
        store.put(&record()).unwrap();
        assert_eq!(store.get().unwrap(), Some(record()));

        store.delete().unwrap();
        assert_eq!(store.get().unwrap(), None);
        // Deleting twice is fine
        store.delete().unwrap();

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = std::env::temp_dir().join(format!("pongmatch-corrupt-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(RECORD_FILE);
        fs::write(&path, [0xff, 0x01]).unwrap();

        let mut store = FileStore::new(path.clone());
        assert!(check_interrupted(&mut store).is_none());
        assert!(!path.exists());

        let _ = fs::remove_dir_all(&dir);
    }
}
