use std::collections::HashMap;

use chrono::Utc;
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{FileRecord, FileStatus};
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Store a new file record and update the owner index
    pub fn insert_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.id.is_empty(), "file id must not be empty");
        debug_assert!(!file.owner_id.is_empty(), "file owner must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.id.as_str(), data.as_slice())?;

            // Maintain owner index
            let mut owner_table = write_txn.open_table(OWNER_FILES)?;
            let mut file_ids: Vec<String> = owner_table
                .get(file.owner_id.as_str())?
                .map(|v| rmp_serde::from_slice(v.value()).unwrap_or_default())
                .unwrap_or_default();

            if !file_ids.contains(&file.id) {
                file_ids.push(file.id.clone());
                let index_data = rmp_serde::to_vec_named(&file_ids)?;
                owner_table.insert(file.owner_id.as_str(), index_data.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its UUID
    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get all files belonging to an owner
    pub fn list_files_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<String> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::new();
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                files.push(file);
            }
        }

        Ok(files)
    }

    /// Delete a file record by its UUID and clean up the owner index.
    /// Used for upload rollback and test purges; there is no delete endpoint.
    pub fn delete_file(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        // Get the file for index cleanup
        let owner_id: Option<String> = {
            let table = write_txn.open_table(FILES)?;
            let owner_id = match table.get(id)? {
                Some(data) => {
                    let file: FileRecord = rmp_serde::from_slice(data.value())?;
                    Some(file.owner_id)
                }
                None => None,
            };
            owner_id
        };

        let deleted = match owner_id {
            Some(owner_id) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(id)?;
                }
                let file_ids: Option<Vec<String>> = {
                    let owner_table = write_txn.open_table(OWNER_FILES)?;
                    let file_ids = match owner_table.get(owner_id.as_str())? {
                        Some(data) => Some(rmp_serde::from_slice(data.value())?),
                        None => None,
                    };
                    file_ids
                };

                if let Some(mut ids) = file_ids {
                    ids.retain(|fid| fid != id);
                    let mut owner_table = write_txn.open_table(OWNER_FILES)?;
                    if ids.is_empty() {
                        owner_table.remove(owner_id.as_str())?;
                    } else {
                        let new_data = rmp_serde::to_vec_named(&ids)?;
                        owner_table.insert(owner_id.as_str(), new_data.as_slice())?;
                    }
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all files (for recovery scans and test assertions)
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }

    // ========================================================================
    // Lifecycle transitions
    //
    // Each transition is a single read-modify-write transaction, so a
    // concurrent reader only ever observes committed states: never
    // `error` without an error_message, never `completed` with
    // progress < 100.
    // ========================================================================

    /// Compare-and-set `uploaded -> processing`. Returns false if the file
    /// does not exist or is in any other status, which makes processing a
    /// no-op under at-least-once job delivery.
    pub fn begin_processing(&self, id: &str) -> Result<bool, DatabaseError> {
        self.transition(id, |file| {
            if file.status != FileStatus::Uploaded {
                return false;
            }
            file.status = FileStatus::Processing;
            file.progress = 0;
            true
        })
    }

    /// Record processing progress. Only applies while the file is in
    /// `processing`; values are clamped to 99 (100 is reserved for
    /// completion) and regressions below the current value are ignored.
    pub fn record_progress(&self, id: &str, progress: u8) -> Result<bool, DatabaseError> {
        self.transition(id, |file| {
            if file.status != FileStatus::Processing {
                return false;
            }
            let progress = progress.min(99);
            if progress > file.progress {
                file.progress = progress;
            }
            true
        })
    }

    /// Transition `processing -> completed`, setting progress to 100 and
    /// stamping `processed_at`. Derived metadata from the processing step
    /// is merged into the record.
    pub fn complete_file(
        &self,
        id: &str,
        metadata: Option<HashMap<String, serde_json::Value>>,
        new_byte_size: Option<u64>,
    ) -> Result<bool, DatabaseError> {
        self.transition(id, |file| {
            if file.status != FileStatus::Processing {
                return false;
            }
            file.status = FileStatus::Completed;
            file.progress = 100;
            file.error_message = None;
            file.processed_at = Some(Utc::now());
            if let Some(meta) = metadata {
                file.metadata.get_or_insert_with(HashMap::new).extend(meta);
            }
            // Processing may have replaced the stored bytes
            if let Some(size) = new_byte_size {
                file.byte_size = size;
            }
            true
        })
    }

    /// Transition any non-terminal status to `error` with a message.
    /// The message must be non-empty; a blank message is replaced so the
    /// error/error_message invariant always holds.
    pub fn fail_file(&self, id: &str, message: &str) -> Result<bool, DatabaseError> {
        let message = if message.trim().is_empty() {
            "processing failed"
        } else {
            message
        };
        self.transition(id, |file| {
            if file.status.is_terminal() {
                return false;
            }
            file.status = FileStatus::Error;
            file.error_message = Some(message.to_string());
            file.processed_at = Some(Utc::now());
            true
        })
    }

    /// Startup recovery: any file left in `processing` by a previous run is
    /// reset to `uploaded`, then all `uploaded` ids are returned for requeue.
    pub fn reset_interrupted(&self) -> Result<Vec<String>, DatabaseError> {
        let write_txn = self.begin_write()?;
        let mut pending = Vec::new();
        {
            let table = write_txn.open_table(FILES)?;
            let records: Vec<FileRecord> = table
                .iter()?
                .map(|r| {
                    r.map_err(DatabaseError::from)
                        .and_then(|(_, v)| Ok(rmp_serde::from_slice(v.value())?))
                })
                .collect::<Result<Vec<_>, _>>()?;
            drop(table);

            let mut table = write_txn.open_table(FILES)?;
            for mut file in records {
                if file.status == FileStatus::Processing {
                    file.status = FileStatus::Uploaded;
                    file.progress = 0;
                    let data = rmp_serde::to_vec_named(&file)?;
                    table.insert(file.id.as_str(), data.as_slice())?;
                }
                if file.status == FileStatus::Uploaded {
                    pending.push(file.id.clone());
                }
            }
        }
        write_txn.commit()?;
        Ok(pending)
    }

    /// Apply a mutation to a record inside one write transaction. The
    /// closure returns false to leave the record untouched.
    fn transition<F>(&self, id: &str, mutate: F) -> Result<bool, DatabaseError>
    where
        F: FnOnce(&mut FileRecord) -> bool,
    {
        let write_txn = self.begin_write()?;

        let existing: Option<FileRecord> = {
            let table = write_txn.open_table(FILES)?;
            let existing = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            existing
        };

        let applied = match existing {
            Some(mut file) => {
                if mutate(&mut file) {
                    let serialized = rmp_serde::to_vec_named(&file)?;
                    let mut table = write_txn.open_table(FILES)?;
                    table.insert(id, serialized.as_slice())?;
                    true
                } else {
                    false
                }
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(applied)
    }
}
