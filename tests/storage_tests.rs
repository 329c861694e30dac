use std::collections::HashMap;

use file_pipeline::storage::models::{FileRecord, FileStatus};
use file_pipeline::storage::Database;

fn test_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    (dir, db)
}

fn sample_file(id: &str, owner_id: &str) -> FileRecord {
    let mut file = FileRecord::new_uploaded(
        owner_id,
        "report.pdf",
        "application/pdf",
        1024,
        uuid::Uuid::new_v4().to_string(),
    );
    file.id = id.to_string();
    file
}

/// The invariants every committed record must satisfy, checked after each
/// transition in the interleaving tests below.
fn assert_invariants(file: &FileRecord) {
    match file.status {
        FileStatus::Error => {
            let msg = file.error_message.as_deref().unwrap_or("");
            assert!(!msg.is_empty(), "error status requires an error_message");
            assert!(file.processed_at.is_some());
        }
        FileStatus::Completed => {
            assert_eq!(file.progress, 100, "completed requires progress 100");
            assert!(file.error_message.is_none());
            assert!(file.processed_at.is_some());
        }
        FileStatus::Uploaded | FileStatus::Processing => {
            assert!(file.progress < 100, "progress 100 is reserved for completed");
            assert!(file.error_message.is_none());
        }
    }
}

// ============================================================================
// Record CRUD and owner index
// ============================================================================

#[test]
fn test_insert_and_get_file() {
    let (_dir, db) = test_db();
    let file = sample_file("file-1", "user-1");

    db.insert_file(&file).unwrap();

    let retrieved = db.get_file("file-1").unwrap().expect("file should exist");
    assert_eq!(retrieved.id, "file-1");
    assert_eq!(retrieved.owner_id, "user-1");
    assert_eq!(retrieved.original_filename, "report.pdf");
    assert_eq!(retrieved.byte_size, 1024);
    assert_eq!(retrieved.status, FileStatus::Uploaded);
    assert_eq!(retrieved.progress, 0);
    assert_eq!(retrieved.error_message, None);
    assert_eq!(retrieved.processed_at, None);
}

#[test]
fn test_get_file_not_found() {
    let (_dir, db) = test_db();
    assert!(db.get_file("nonexistent").unwrap().is_none());
}

#[test]
fn test_list_files_by_owner() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("a", "user-1")).unwrap();
    db.insert_file(&sample_file("b", "user-1")).unwrap();
    db.insert_file(&sample_file("c", "user-2")).unwrap();

    let user1_files = db.list_files_by_owner("user-1").unwrap();
    assert_eq!(user1_files.len(), 2);

    let user2_files = db.list_files_by_owner("user-2").unwrap();
    assert_eq!(user2_files.len(), 1);
    assert_eq!(user2_files[0].id, "c");

    assert!(db.list_files_by_owner("nobody").unwrap().is_empty());
}

#[test]
fn test_delete_file_cleans_owner_index() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("del", "user-x")).unwrap();
    db.insert_file(&sample_file("keep", "user-x")).unwrap();

    assert!(db.delete_file("del").unwrap());
    assert!(db.get_file("del").unwrap().is_none());

    let remaining = db.list_files_by_owner("user-x").unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "keep");
}

#[test]
fn test_delete_last_file_removes_owner_entry() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("only", "user-solo")).unwrap();

    assert!(db.delete_file("only").unwrap());
    assert!(db.list_files_by_owner("user-solo").unwrap().is_empty());
}

#[test]
fn test_delete_file_not_found() {
    let (_dir, db) = test_db();
    assert!(!db.delete_file("nonexistent").unwrap());
}

#[test]
fn test_purge_all() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("p1", "user-1")).unwrap();
    db.insert_file(&sample_file("p2", "user-2")).unwrap();

    let stats = db.purge_all().unwrap();
    assert_eq!(stats.files, 2);

    assert!(db.get_all_files().unwrap().is_empty());
    assert!(db.list_files_by_owner("user-1").unwrap().is_empty());
}

// ============================================================================
// Lifecycle transitions
// ============================================================================

#[test]
fn test_begin_processing_claims_uploaded_file() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();

    assert!(db.begin_processing("f").unwrap());
    let file = db.get_file("f").unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Processing);
    assert_eq!(file.progress, 0);

    // A second claim is a no-op: this is the idempotency guard for
    // at-least-once delivery
    assert!(!db.begin_processing("f").unwrap());
}

#[test]
fn test_begin_processing_missing_file() {
    let (_dir, db) = test_db();
    assert!(!db.begin_processing("nonexistent").unwrap());
}

#[test]
fn test_begin_processing_rejects_terminal_states() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("done", "u")).unwrap();
    db.begin_processing("done").unwrap();
    db.complete_file("done", None, None).unwrap();
    assert!(!db.begin_processing("done").unwrap());

    db.insert_file(&sample_file("failed", "u")).unwrap();
    db.begin_processing("failed").unwrap();
    db.fail_file("failed", "boom").unwrap();
    assert!(!db.begin_processing("failed").unwrap());
}

#[test]
fn test_record_progress_is_monotonic() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();

    db.record_progress("f", 40).unwrap();
    assert_eq!(db.get_file("f").unwrap().unwrap().progress, 40);

    // Regressions are ignored
    db.record_progress("f", 10).unwrap();
    assert_eq!(db.get_file("f").unwrap().unwrap().progress, 40);

    db.record_progress("f", 70).unwrap();
    assert_eq!(db.get_file("f").unwrap().unwrap().progress, 70);
}

#[test]
fn test_record_progress_caps_below_completion() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();

    // 100 is reserved for the completed status
    db.record_progress("f", 100).unwrap();
    let file = db.get_file("f").unwrap().unwrap();
    assert_eq!(file.progress, 99);
    assert_eq!(file.status, FileStatus::Processing);
}

#[test]
fn test_record_progress_ignored_outside_processing() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();

    assert!(!db.record_progress("f", 50).unwrap());
    assert_eq!(db.get_file("f").unwrap().unwrap().progress, 0);

    db.begin_processing("f").unwrap();
    db.complete_file("f", None, None).unwrap();
    assert!(!db.record_progress("f", 50).unwrap());
    assert_eq!(db.get_file("f").unwrap().unwrap().progress, 100);
}

#[test]
fn test_complete_file() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();

    let mut meta = HashMap::new();
    meta.insert("sha256".to_string(), serde_json::json!("abc123"));
    assert!(db.complete_file("f", Some(meta), Some(2048)).unwrap());

    let file = db.get_file("f").unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Completed);
    assert_eq!(file.progress, 100);
    assert_eq!(file.byte_size, 2048);
    assert!(file.processed_at.is_some());
    assert_eq!(
        file.metadata.unwrap().get("sha256").unwrap(),
        &serde_json::json!("abc123")
    );
}

#[test]
fn test_complete_file_requires_processing() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();

    // Straight from uploaded is rejected
    assert!(!db.complete_file("f", None, None).unwrap());
    assert_eq!(
        db.get_file("f").unwrap().unwrap().status,
        FileStatus::Uploaded
    );
}

#[test]
fn test_fail_file() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();

    assert!(db.fail_file("f", "virus scan rejected the file").unwrap());

    let file = db.get_file("f").unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Error);
    assert_eq!(
        file.error_message,
        Some("virus scan rejected the file".to_string())
    );
    assert!(file.processed_at.is_some());
}

#[test]
fn test_fail_file_never_stores_blank_message() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();

    db.fail_file("f", "   ").unwrap();

    let file = db.get_file("f").unwrap().unwrap();
    assert_eq!(file.status, FileStatus::Error);
    let msg = file.error_message.unwrap();
    assert!(!msg.trim().is_empty());
}

#[test]
fn test_fail_file_is_terminal() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("f", "u")).unwrap();
    db.begin_processing("f").unwrap();
    db.complete_file("f", None, None).unwrap();

    // A completed file cannot transition to error
    assert!(!db.fail_file("f", "too late").unwrap());
    assert_eq!(
        db.get_file("f").unwrap().unwrap().status,
        FileStatus::Completed
    );
}

#[test]
fn test_reset_interrupted() {
    let (_dir, db) = test_db();
    db.insert_file(&sample_file("stuck", "u")).unwrap();
    db.begin_processing("stuck").unwrap();
    db.record_progress("stuck", 60).unwrap();

    db.insert_file(&sample_file("waiting", "u")).unwrap();

    db.insert_file(&sample_file("done", "u")).unwrap();
    db.begin_processing("done").unwrap();
    db.complete_file("done", None, None).unwrap();

    let mut pending = db.reset_interrupted().unwrap();
    pending.sort();
    assert_eq!(pending, vec!["stuck".to_string(), "waiting".to_string()]);

    let stuck = db.get_file("stuck").unwrap().unwrap();
    assert_eq!(stuck.status, FileStatus::Uploaded);
    assert_eq!(stuck.progress, 0);

    let done = db.get_file("done").unwrap().unwrap();
    assert_eq!(done.status, FileStatus::Completed);
}

// ============================================================================
// Invariants under interleaved transitions
// ============================================================================

/// Small deterministic PRNG so the interleavings vary without a rand
/// dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[test]
fn test_invariants_hold_under_random_interleavings() {
    for seed in 0..20u64 {
        let (_dir, db) = test_db();
        let id = format!("file-{seed}");
        db.insert_file(&sample_file(&id, "u")).unwrap();

        let mut rng = Lcg(seed.wrapping_mul(0x9e3779b97f4a7c15) + 1);
        for _ in 0..40 {
            match rng.next() % 5 {
                0 => {
                    db.begin_processing(&id).unwrap();
                }
                1 | 2 => {
                    db.record_progress(&id, (rng.next() % 120) as u8).unwrap();
                }
                3 => {
                    db.complete_file(&id, None, None).unwrap();
                }
                _ => {
                    db.fail_file(&id, "induced failure").unwrap();
                }
            }
            let file = db.get_file(&id).unwrap().unwrap();
            assert_invariants(&file);
        }
    }
}
