//! Cross-client scraping quota tracker.
//!
//! A single persistent record counts listings requested by every client of
//! the service inside a resetting window, so the limit survives process
//! restarts and holds across multiple service instances sharing one
//! database. The window reset is lazy: it happens on the next incoming
//! request once the window has elapsed, never on a background timer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::error::{JobError, Result};

const TRACKER_ID: &str = "tracker_00";

/// Outcome of a quota admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Denied {
        /// Seconds until the next lazy window reset.
        retry_after_secs: i64,
        /// Listings still admissible in the current window.
        remaining: u32,
    },
}

/// The persisted singleton window record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRecord {
    pub id: String,
    /// Human-readable timestamp of the last admitted request.
    pub last_job_time: String,
    pub last_job_time_epoch: i64,
    /// Listings admitted in the current window.
    pub window_count: u32,
    /// Epoch seconds of the last window reset.
    pub window_reset_epoch: i64,
}

/// Sliding-window rate limiter over total listings requested by all clients.
pub struct QuotaTracker {
    db_path: PathBuf,
    window_secs: i64,
    ceiling: u32,
}

impl QuotaTracker {
    /// Open (and initialize if needed) the tracker database.
    pub fn new(db_path: &Path, window_secs: u64, ceiling: u32) -> Result<Self> {
        let tracker = Self {
            db_path: db_path.to_path_buf(),
            window_secs: window_secs as i64,
            ceiling,
        };
        tracker.init_schema()?;
        Ok(tracker)
    }

    /// The configured window length in seconds.
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// The configured listing budget per window.
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS quota_tracker (
                id TEXT PRIMARY KEY,
                last_job_time TEXT NOT NULL,
                last_job_time_epoch INTEGER NOT NULL,
                window_count INTEGER NOT NULL,
                window_reset_epoch INTEGER NOT NULL
            )",
        )?;
        Ok(())
    }

    /// Admit or deny a request for `n` listings at the current wall clock.
    pub fn try_admit(&self, n: u32) -> Result<Admission> {
        self.try_admit_at(n, Utc::now().timestamp())
    }

    /// Admission check against an explicit clock (tests drive this
    /// directly). A transient store failure gets one transparent retry; a
    /// second failure denies the request rather than over-admitting.
    pub fn try_admit_at(&self, n: u32, now: i64) -> Result<Admission> {
        match self.admit_txn(n, now) {
            Ok(admission) => Ok(admission),
            Err(first) => {
                tracing::warn!("quota transaction failed, retrying once: {first}");
                self.admit_txn(n, now).map_err(|err| {
                    tracing::error!("quota transaction failed twice, denying: {err}");
                    JobError::Store(err)
                })
            }
        }
    }

    /// The whole read-modify-write runs inside one immediate transaction so
    /// concurrent admitters serialize on the write lock: two simultaneous
    /// checks can never both succeed on the last slice of quota.
    fn admit_txn(&self, n: u32, now: i64) -> rusqlite::Result<Admission> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let record = tx
            .query_row(
                "SELECT id, last_job_time, last_job_time_epoch, window_count, window_reset_epoch
                 FROM quota_tracker WHERE id = ?",
                params![TRACKER_ID],
                row_to_record,
            )
            .optional()?;

        let admission = match record {
            None => {
                // First request ever seeds the record with itself counted.
                tx.execute(
                    "INSERT INTO quota_tracker
                     (id, last_job_time, last_job_time_epoch, window_count, window_reset_epoch)
                     VALUES (?, ?, ?, ?, ?)",
                    params![TRACKER_ID, format_epoch(now), now, n, now],
                )?;
                Admission::Admitted
            }
            Some(mut rec) => {
                // Lazy reset before evaluating admission.
                if now - rec.window_reset_epoch > self.window_secs {
                    rec.window_count = 0;
                    rec.window_reset_epoch = now;
                }

                let remaining = self.ceiling.saturating_sub(rec.window_count);
                let within_window = now - rec.last_job_time_epoch <= self.window_secs;

                let admission = if within_window && remaining < n {
                    Admission::Denied {
                        retry_after_secs: (self.window_secs - (now - rec.window_reset_epoch))
                            .max(0),
                        remaining,
                    }
                } else {
                    rec.window_count += n;
                    rec.last_job_time = format_epoch(now);
                    rec.last_job_time_epoch = now;
                    Admission::Admitted
                };

                // A denial still persists the lazy reset, if one happened.
                tx.execute(
                    "UPDATE quota_tracker
                     SET last_job_time = ?, last_job_time_epoch = ?,
                         window_count = ?, window_reset_epoch = ?
                     WHERE id = ?",
                    params![
                        rec.last_job_time,
                        rec.last_job_time_epoch,
                        rec.window_count,
                        rec.window_reset_epoch,
                        TRACKER_ID
                    ],
                )?;
                admission
            }
        };

        tx.commit()?;
        Ok(admission)
    }

    /// Current window record, if any request has ever been admitted.
    pub fn status(&self) -> Result<Option<TrackerRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT id, last_job_time, last_job_time_epoch, window_count, window_reset_epoch
                 FROM quota_tracker WHERE id = ?",
                params![TRACKER_ID],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackerRecord> {
    Ok(TrackerRecord {
        id: row.get(0)?,
        last_job_time: row.get(1)?,
        last_job_time_epoch: row.get(2)?,
        window_count: row.get(3)?,
        window_reset_epoch: row.get(4)?,
    })
}

fn format_epoch(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(dir: &tempfile::TempDir) -> QuotaTracker {
        QuotaTracker::new(&dir.path().join("quota.db"), 180, 200).unwrap()
    }

    #[test]
    fn first_request_seeds_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let quota = tracker(&dir);

        assert_eq!(quota.try_admit_at(25, 1_000).unwrap(), Admission::Admitted);
        let rec = quota.status().unwrap().unwrap();
        assert_eq!(rec.window_count, 25);
        assert_eq!(rec.window_reset_epoch, 1_000);
    }

    #[test]
    fn denial_arithmetic() {
        let dir = tempfile::tempdir().unwrap();
        let quota = tracker(&dir);

        assert_eq!(quota.try_admit_at(150, 1_000).unwrap(), Admission::Admitted);
        match quota.try_admit_at(100, 1_060).unwrap() {
            Admission::Denied {
                retry_after_secs,
                remaining,
            } => {
                assert_eq!(remaining, 50);
                assert_eq!(retry_after_secs, 120);
            }
            Admission::Admitted => panic!("expected denial"),
        }
        // The denied request must not have consumed quota.
        assert_eq!(quota.status().unwrap().unwrap().window_count, 150);
    }

    #[test]
    fn window_reset_readmits() {
        let dir = tempfile::tempdir().unwrap();
        let quota = tracker(&dir);

        assert_eq!(quota.try_admit_at(150, 1_000).unwrap(), Admission::Admitted);
        // More than the window has elapsed since the last reset.
        assert_eq!(quota.try_admit_at(150, 1_200).unwrap(), Admission::Admitted);
        let rec = quota.status().unwrap().unwrap();
        assert_eq!(rec.window_count, 150);
        assert_eq!(rec.window_reset_epoch, 1_200);
    }

    #[test]
    fn exact_remaining_is_admitted() {
        let dir = tempfile::tempdir().unwrap();
        let quota = tracker(&dir);

        assert_eq!(quota.try_admit_at(150, 1_000).unwrap(), Admission::Admitted);
        assert_eq!(quota.try_admit_at(50, 1_050).unwrap(), Admission::Admitted);
        assert_eq!(quota.status().unwrap().unwrap().window_count, 200);
    }

    #[test]
    fn concurrent_admitters_never_both_succeed_on_last_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quota.db");
        QuotaTracker::new(&path, 180, 100)
            .unwrap()
            .try_admit_at(40, 1_000)
            .unwrap();

        // Two independent trackers over the same database, as if two service
        // instances raced for the remaining 60.
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    QuotaTracker::new(&path, 180, 100)
                        .unwrap()
                        .try_admit_at(60, 1_010)
                        .unwrap()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|a| *a == Admission::Admitted)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn unwritable_store_fails_closed() {
        let quota = QuotaTracker {
            db_path: PathBuf::from("/nonexistent/dir/quota.db"),
            window_secs: 180,
            ceiling: 200,
        };
        let err = quota.try_admit_at(25, 1_000).unwrap_err();
        assert_eq!(err.kind(), "store_failure");
    }
}
