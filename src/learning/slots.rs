//! Named save slots.
//!
//! Each slot is a pair of files in the slot directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `qtable_<name>.blob` | Q-table blob |
//! | `learning_history_<name>.doc` | learning history document |
//!
//! Slot names are restricted to `[A-Za-z0-9_]+` and validated before any
//! path is built. Saves write both files to temporaries first and only
//! rename them into place once both writes have succeeded. The previous blob
//! is kept as `<blob>.bak` until the history document is in place and is
//! moved back if that last rename fails.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::learning::LearningError;
use crate::learning::history::LearningHistory;
use crate::learning::persist;
use crate::learning::qtable::QTable;

const QTABLE_PREFIX: &str = "qtable_";
const QTABLE_SUFFIX: &str = ".blob";
const HISTORY_PREFIX: &str = "learning_history_";
const HISTORY_SUFFIX: &str = ".doc";

/// Reject slot names outside `[A-Za-z0-9_]+`.
///
/// # Examples
///
/// ```
/// use reversi_qlearn::learning::validate_slot_name;
///
/// assert!(validate_slot_name("alpha_2").is_ok());
/// assert!(validate_slot_name("../alpha").is_err());
/// assert!(validate_slot_name("").is_err());
/// ```
pub fn validate_slot_name(name: &str) -> Result<(), LearningError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(LearningError::InvalidSlotName(name.to_string()))
    }
}

/// Filesystem catalogue of slots.
#[derive(Clone, Debug)]
pub struct SlotStore {
    dir: PathBuf,
    compress: bool,
}

impl SlotStore {
    /// Store rooted at `dir`; blobs are compressed.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            compress: true,
        }
    }

    /// Whether Q-table blobs are gzip-compressed on save.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the slot's Q-table blob.
    pub fn qtable_path(&self, name: &str) -> Result<PathBuf, LearningError> {
        validate_slot_name(name)?;
        Ok(self
            .dir
            .join(format!("{}{}{}", QTABLE_PREFIX, name, QTABLE_SUFFIX)))
    }

    /// Path of the slot's history document.
    pub fn history_path(&self, name: &str) -> Result<PathBuf, LearningError> {
        validate_slot_name(name)?;
        Ok(self
            .dir
            .join(format!("{}{}{}", HISTORY_PREFIX, name, HISTORY_SUFFIX)))
    }

    /// Sorted slot names, taken from the blob filenames.
    ///
    /// A missing slot directory lists as empty.
    pub fn list(&self) -> Result<Vec<String>, LearningError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name
                .strip_prefix(QTABLE_PREFIX)
                .and_then(|rest| rest.strip_suffix(QTABLE_SUFFIX))
                && validate_slot_name(name).is_ok()
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Whether the slot's blob exists.
    pub fn exists(&self, name: &str) -> Result<bool, LearningError> {
        Ok(self.qtable_path(name)?.exists())
    }

    /// Write the Q-table and history into slot `name`.
    ///
    /// Both files are encoded and written to temporaries before either is
    /// moved into place, and the previous blob is restored if the history
    /// rename fails, so a failed save leaves the previous slot contents
    /// intact.
    ///
    /// # Errors
    ///
    /// `InvalidSlotName`, or `Io`/`InvalidBlob`/`InvalidHistory` from the
    /// encode and write steps.
    pub fn save(
        &self,
        name: &str,
        qtable: &QTable,
        history: &LearningHistory,
    ) -> Result<(), LearningError> {
        let qtable_path = self.qtable_path(name)?;
        let history_path = self.history_path(name)?;

        let blob = qtable.to_bytes(self.compress)?;
        let document = history.to_json()?;

        let qtable_temp = persist::write_temp(&qtable_path, &blob)?;
        let history_temp = match persist::write_temp(&history_path, document.as_bytes()) {
            Ok(temp) => temp,
            Err(e) => {
                let _ = fs::remove_file(&qtable_temp);
                return Err(e.into());
            }
        };

        let discard_temps = || {
            let _ = fs::remove_file(&qtable_temp);
            let _ = fs::remove_file(&history_temp);
        };

        // the previous blob stays aside until the history is in place
        let qtable_backup = match persist::backup(&qtable_path) {
            Ok(bak) => bak,
            Err(e) => {
                discard_temps();
                return Err(e.into());
            }
        };
        let roll_back = |e: io::Error| -> LearningError {
            discard_temps();
            if let Err(restore_err) = persist::restore(qtable_backup.as_deref(), &qtable_path) {
                log::warn!(
                    "Failed to restore {}: {}",
                    qtable_path.display(),
                    restore_err
                );
            }
            e.into()
        };

        if let Err(e) = persist::commit(&qtable_temp, &qtable_path) {
            return Err(roll_back(e));
        }
        if let Err(e) = persist::commit(&history_temp, &history_path) {
            return Err(roll_back(e));
        }
        if let Some(bak) = &qtable_backup
            && let Err(e) = fs::remove_file(bak)
        {
            log::warn!("Failed to remove backup {}: {}", bak.display(), e);
        }

        log::info!(
            "Saved slot {} ({} Q entries, {} history records)",
            name,
            qtable.len(),
            history.len()
        );
        Ok(())
    }

    /// Replace an existing slot. Behaves exactly like [`SlotStore::save`].
    pub fn overwrite(
        &self,
        name: &str,
        qtable: &QTable,
        history: &LearningHistory,
    ) -> Result<(), LearningError> {
        self.save(name, qtable, history)
    }

    /// Read slot `name`.
    ///
    /// The returned history has no write-through path; the caller decides
    /// where it is persisted.
    ///
    /// # Errors
    ///
    /// `UnknownSlot` if the blob does not exist; any read or decode failure
    /// of either file fails the whole load.
    pub fn load(
        &self,
        name: &str,
        history_capacity: usize,
    ) -> Result<(QTable, LearningHistory), LearningError> {
        let qtable_path = self.qtable_path(name)?;
        let history_path = self.history_path(name)?;
        if !qtable_path.exists() {
            return Err(LearningError::UnknownSlot(name.to_string()));
        }

        let qtable = QTable::load(&qtable_path)?;
        let history = LearningHistory::load(&history_path, history_capacity)?;

        log::info!(
            "Loaded slot {} ({} Q entries, {} history records)",
            name,
            qtable.len(),
            history.len()
        );
        Ok((qtable, history))
    }

    /// Remove both files of slot `name`.
    ///
    /// Removal is best-effort: a file that cannot be removed is logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// `UnknownSlot` if neither file exists.
    pub fn delete(&self, name: &str) -> Result<(), LearningError> {
        let paths = [self.qtable_path(name)?, self.history_path(name)?];
        if !paths.iter().any(|p| p.exists()) {
            return Err(LearningError::UnknownSlot(name.to_string()));
        }

        for path in &paths {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        log::info!("Deleted slot {}", name);
        Ok(())
    }

    /// Save an empty Q-table and history as slot `name` and return them.
    pub fn create_new(
        &self,
        name: &str,
        history_capacity: usize,
    ) -> Result<(QTable, LearningHistory), LearningError> {
        let qtable = QTable::new();
        let history = LearningHistory::new(history_capacity);
        self.save(name, &qtable, &history)?;
        Ok((qtable, history))
    }
}
