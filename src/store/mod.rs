mod cursor;
mod daylog;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Local, Locale, NaiveDate, TimeZone};

use crate::error::StoreError;
use crate::types::fix::{DayLog, Distance, Fix, FixTime, Speed, ValidatedFix};

pub use cursor::FixCursor;

const CREATED_FORMAT: &str = "%A, %d. %B %Y um %H:%M:%S";
const CREATED_LOCALE: Locale = Locale::de_DE;

/// Source of the server time stamped onto appended fixes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Last fix known to the store, resolved from disk on the first append.
/// `Empty` caches a store with no fixes so later appends skip the rescan.
enum Tail {
    Unresolved,
    Empty,
    Last(Fix),
}

/// Append-only fix log with one JSON file per server-local day.
///
/// Every append runs the previous-fix lookup, the delta computation and the
/// file rewrite under one mutex, so concurrent writers are applied one after
/// the other and each delta is taken against its true predecessor. Readers
/// take no lock; day files are replaced by rename and are never seen torn.
pub struct DayLogStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    tail: Mutex<Tail>,
}

impl DayLogStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| StoreError::unavailable(&dir, err))?;
        Ok(Self {
            dir,
            clock,
            tail: Mutex::new(Tail::Unresolved),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stamps, derives and durably appends `fix`, returning the stored record.
    ///
    /// On error nothing is appended and the next append still measures
    /// against the previously stored fix.
    pub fn append(&self, fix: ValidatedFix) -> Result<Fix, StoreError> {
        // The tail only moves to a fix after a successful write, so a panic
        // while holding the lock cannot leave it ahead of the disk.
        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);

        if let Tail::Unresolved = *tail {
            *tail = match self.resolve_previous()? {
                Some(last) => Tail::Last(last),
                None => Tail::Empty,
            };
        }
        let previous = match &*tail {
            Tail::Last(fix) => Some(fix.clone()),
            Tail::Empty | Tail::Unresolved => None,
        };

        let now = self.clock.now();
        let path = daylog::path_for(&self.dir, day_of(now, previous.as_ref()));
        let mut log = daylog::read(&path)?;

        let stored = derive(fix, previous.as_ref(), now);
        check_tail(previous.as_ref(), stored.index, &log)?;

        log.entries.push(stored.clone());
        daylog::write(&path, &log).inspect_err(|err| {
            tracing::warn!("Append of fix {} failed: {}", stored.index, err);
        })?;

        tracing::debug!(
            "Appended fix {} to {} ({} entries)",
            stored.index,
            path.display(),
            log.entries.len()
        );

        *tail = Tail::Last(stored.clone());
        Ok(stored)
    }

    /// Fixes with `index >= start`, in index order across all days.
    pub fn read_from(&self, start: u64) -> Result<FixCursor, StoreError> {
        let days = daylog::list(&self.dir)?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        Ok(FixCursor::new(start, days))
    }

    /// Newest stored fix, searching back from the latest day file.
    fn resolve_previous(&self) -> Result<Option<Fix>, StoreError> {
        for (_, path) in daylog::list(&self.dir)?.into_iter().rev() {
            if let Some(last) = daylog::read(&path)?.entries.pop() {
                return Ok(Some(last));
            }
        }
        Ok(None)
    }
}

/// Day file for a fix stamped at `now`. A clock stepped back across
/// midnight keeps appending to the tail's day.
fn day_of(now: DateTime<Local>, previous: Option<&Fix>) -> NaiveDate {
    let today = now.date_naive();
    previous
        .and_then(|fix| Local.timestamp_millis_opt(fix.time.created).single())
        .map(|created| created.date_naive().max(today))
        .unwrap_or(today)
}

/// The fix about to be stored must follow the cached tail, and the day file
/// must end with that tail (or be empty when the tail lives in an earlier day).
fn check_tail(previous: Option<&Fix>, next_index: u64, log: &DayLog) -> Result<(), StoreError> {
    let expected = previous.map(|fix| fix.index);
    let preceding = next_index.checked_sub(1);
    if preceding != expected {
        return Err(StoreError::DivergentState {
            expected,
            found: preceding,
        });
    }

    match log.entries.last() {
        Some(on_disk) if Some(on_disk.index) != expected => Err(StoreError::DivergentState {
            expected,
            found: Some(on_disk.index),
        }),
        _ => Ok(()),
    }
}

fn derive(fix: ValidatedFix, previous: Option<&Fix>, now: DateTime<Local>) -> Fix {
    let created = now.timestamp_millis();
    let diff = previous
        .map(|p| (created - p.time.created) as f64 / 1000.0)
        .unwrap_or(0.0);
    let distance = previous.map(|p| Distance::between(&p.position, &fix.position));
    let speed = distance.as_ref().map(|d| Speed::over(d, diff));

    Fix {
        index: previous.map(|p| p.index + 1).unwrap_or(0),
        user: fix.user,
        position: fix.position,
        motion: fix.motion,
        time: FixTime {
            created,
            created_string: now
                .format_localized(CREATED_FORMAT, CREATED_LOCALE)
                .to_string(),
            diff,
            upload_duration: fix
                .client_timestamp
                .map(|ts| (created - ts) as f64 / 1000.0),
        },
        distance,
        speed,
        ignore: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fix::{Motion, Position};
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ManualClock(Mutex<DateTime<Local>>);

    impl ManualClock {
        fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Arc<Self> {
            let start = Local
                .with_ymd_and_hms(y, m, d, h, min, s)
                .single()
                .expect("unambiguous local time");
            Arc::new(Self(Mutex::new(start)))
        }

        fn advance_ms(&self, ms: i64) {
            let mut now = self.0.lock().expect("clock");
            *now += Duration::milliseconds(ms);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Local> {
            *self.0.lock().expect("clock")
        }
    }

    fn fix_at(lat: f64, lon: f64, altitude: f64) -> ValidatedFix {
        ValidatedFix {
            user: "xx".to_string(),
            position: Position { lat, lon, altitude },
            motion: Motion {
                speed_reported: 150.0,
                heading: 180.0,
                hdop: 50.0,
            },
            client_timestamp: None,
        }
    }

    fn read_all(store: &DayLogStore, start: u64) -> Vec<Fix> {
        store
            .read_from(start)
            .expect("cursor")
            .collect::<Result<Vec<_>, _>>()
            .expect("fixes")
    }

    #[test]
    fn first_fix_has_no_deltas() {
        let tmp = TempDir::new().expect("tempdir");
        let store = DayLogStore::with_clock(tmp.path(), ManualClock::at(2026, 1, 5, 12, 0, 0))
            .expect("store");

        let fix = store.append(fix_at(52.51451, 13.35105, 5000.0)).expect("append");

        assert_eq!(fix.index, 0);
        assert_eq!(fix.time.diff, 0.0);
        assert!(fix.distance.is_none());
        assert!(fix.speed.is_none());
        assert!(!fix.ignore);
    }

    #[test]
    fn second_fix_derives_reference_deltas() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");

        store.append(fix_at(52.51451, 13.35105, 5000.0)).expect("first");
        clock.advance_ms(2085);
        let fix = store.append(fix_at(52.51627, 13.37770, 4000.0)).expect("second");

        assert_eq!(fix.index, 1);
        assert!((fix.time.diff - 2.085).abs() < 1e-9);
        let distance = fix.distance.expect("distance");
        assert!((distance.horizontal - 1813.926).abs() < 1e-2);
        assert_eq!(distance.vertical, -1000.0);
        assert!((distance.total - 2071.311).abs() < 1e-2);
        let speed = fix.speed.expect("speed");
        assert!((speed.horizontal - 871.0).abs() <= 6.0);
        assert!((speed.vertical + 479.0).abs() <= 6.0);
        assert!((speed.total - 995.0).abs() <= 6.0);
    }

    #[test]
    fn wall_clock_diff_follows_real_elapsed_time() {
        let tmp = TempDir::new().expect("tempdir");
        let store = DayLogStore::open(tmp.path()).expect("store");

        store.append(fix_at(52.51451, 13.35105, 5000.0)).expect("first");
        std::thread::sleep(std::time::Duration::from_millis(2000));
        let fix = store.append(fix_at(52.51627, 13.37770, 4000.0)).expect("second");

        assert!(fix.time.diff >= 2.0 && fix.time.diff < 3.0, "diff {}", fix.time.diff);
    }

    #[test]
    fn created_string_is_rendered_in_german() {
        let tmp = TempDir::new().expect("tempdir");
        let store = DayLogStore::with_clock(tmp.path(), ManualClock::at(2026, 1, 5, 14, 3, 9))
            .expect("store");

        let fix = store.append(fix_at(1.0, 1.0, 1.0)).expect("append");
        assert_eq!(fix.time.created_string, "Montag, 05. Januar 2026 um 14:03:09");
    }

    #[test]
    fn upload_duration_measures_client_lag() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");

        let mut fix = fix_at(1.0, 1.0, 1.0);
        fix.client_timestamp = Some(clock.now().timestamp_millis() - 1500);
        let stored = store.append(fix).expect("append");
        assert_eq!(stored.time.upload_duration, Some(1.5));
    }

    #[test]
    fn indices_and_deltas_continue_across_midnight() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 3, 1, 23, 59, 58);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");

        store.append(fix_at(10.0, 10.0, 100.0)).expect("first");
        clock.advance_ms(1000);
        store.append(fix_at(10.001, 10.0, 100.0)).expect("second");
        clock.advance_ms(3000);
        let after_midnight = store.append(fix_at(10.002, 10.0, 90.0)).expect("third");

        assert_eq!(after_midnight.index, 2);
        assert_eq!(after_midnight.time.diff, 3.0);
        assert_eq!(after_midnight.distance.expect("distance").vertical, -10.0);

        let days = daylog::list(tmp.path()).expect("days");
        assert_eq!(days.len(), 2);
        assert_eq!(daylog::read(&days[0].1).expect("day one").entries.len(), 2);
        assert_eq!(daylog::read(&days[1].1).expect("day two").entries.len(), 1);

        let indices: Vec<u64> = read_all(&store, 0).iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn reopened_store_resumes_from_earlier_day() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 3, 1, 18, 0, 0);
        {
            let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
            store.append(fix_at(10.0, 10.0, 100.0)).expect("first");
            store.append(fix_at(10.0, 10.0, 100.0)).expect("second");
        }

        clock.advance_ms(24 * 3600 * 1000);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("reopen");
        let fix = store.append(fix_at(10.0, 10.0, 100.0)).expect("third");

        assert_eq!(fix.index, 2);
        assert_eq!(fix.time.diff, 86_400.0);
    }

    #[test]
    fn read_from_returns_the_appended_record() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");

        store.append(fix_at(52.51451, 13.35105, 5000.0)).expect("first");
        clock.advance_ms(1234);
        let mut fix = fix_at(52.51627, 13.37770, 4000.0);
        fix.client_timestamp = Some(clock.now().timestamp_millis() - 77);
        let stored = store.append(fix).expect("second");

        let read = read_all(&store, stored.index);
        assert_eq!(read, vec![stored]);
    }

    #[test]
    fn read_from_is_restartable_and_skips_below_cursor() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 23, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        for _ in 0..5 {
            store.append(fix_at(1.0, 1.0, 1.0)).expect("append");
            clock.advance_ms(30 * 60 * 1000);
        }

        let first: Vec<u64> = read_all(&store, 2).iter().map(|f| f.index).collect();
        let again: Vec<u64> = read_all(&store, 2).iter().map(|f| f.index).collect();
        assert_eq!(first, vec![2, 3, 4]);
        assert_eq!(first, again);
        assert!(read_all(&store, 5).is_empty());
    }

    #[test]
    fn concurrent_appends_are_serialized() {
        const WRITERS: usize = 16;
        let tmp = TempDir::new().expect("tempdir");
        let store = Arc::new(DayLogStore::open(tmp.path()).expect("store"));

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    store
                        .append(fix_at(writer as f64 * 0.01, 0.0, writer as f64))
                        .expect("append")
                });
            }
        });

        let fixes = read_all(&store, 0);
        let indices: Vec<u64> = fixes.iter().map(|f| f.index).collect();
        assert_eq!(indices, (0..WRITERS as u64).collect::<Vec<_>>());

        let altitudes: HashSet<u64> = fixes.iter().map(|f| f.position.altitude as u64).collect();
        assert_eq!(altitudes.len(), WRITERS);

        for pair in fixes.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            let expected = Distance::between(&prev.position, &curr.position);
            assert_eq!(curr.distance, Some(expected));
            assert_eq!(
                curr.time.diff,
                (curr.time.created - prev.time.created) as f64 / 1000.0
            );
            assert!(curr.time.diff >= 0.0);
        }
    }

    #[test]
    fn unreadable_day_fails_without_moving_the_tail() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        let first = store.append(fix_at(1.0, 1.0, 1.0)).expect("first");

        let path = daylog::path_for(tmp.path(), clock.now().date_naive());
        let saved = fs::read(&path).expect("saved");
        fs::write(&path, b"not json").expect("corrupt");

        let err = store.append(fix_at(2.0, 2.0, 2.0)).expect_err("corrupt day");
        assert!(matches!(err, StoreError::StorageUnavailable { .. }));

        fs::write(&path, saved).expect("restore");
        clock.advance_ms(1000);
        let next = store.append(fix_at(2.0, 2.0, 2.0)).expect("after restore");
        assert_eq!(next.index, first.index + 1);
        assert_eq!(next.time.diff, 1.0);
    }

    #[test]
    fn truncated_day_is_reported_as_divergent() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        store.append(fix_at(1.0, 1.0, 1.0)).expect("first");
        store.append(fix_at(1.0, 1.0, 1.0)).expect("second");

        let path = daylog::path_for(tmp.path(), clock.now().date_naive());
        let mut log = daylog::read(&path).expect("read");
        log.entries.truncate(1);
        daylog::write(&path, &log).expect("truncate");

        let err = store.append(fix_at(1.0, 1.0, 1.0)).expect_err("diverged");
        assert!(matches!(
            err,
            StoreError::DivergentState {
                expected: Some(1),
                found: Some(0)
            }
        ));
        assert_eq!(read_all(&store, 0).len(), 1);
    }

    #[test]
    fn ignore_flag_set_by_hand_survives_later_appends() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        store.append(fix_at(1.0, 1.0, 1.0)).expect("first");

        let path = daylog::path_for(tmp.path(), clock.now().date_naive());
        let mut log = daylog::read(&path).expect("read");
        log.entries[0].ignore = true;
        daylog::write(&path, &log).expect("flag");

        store.append(fix_at(1.0, 1.0, 1.0)).expect("second");
        let fixes = read_all(&store, 0);
        assert!(fixes[0].ignore);
        assert!(!fixes[1].ignore);
    }

    #[test]
    fn readers_never_see_a_partial_log_while_appending() {
        const WRITERS: usize = 8;
        const APPENDS: usize = 25;
        let tmp = TempDir::new().expect("tempdir");
        let store = DayLogStore::open(tmp.path()).expect("store");
        let writing = AtomicUsize::new(WRITERS);

        std::thread::scope(|scope| {
            for writer in 0..WRITERS {
                let (store, writing) = (&store, &writing);
                scope.spawn(move || {
                    for step in 0..APPENDS {
                        store
                            .append(fix_at(writer as f64, step as f64 * 0.001, 10.0))
                            .expect("append");
                    }
                    writing.fetch_sub(1, Ordering::Release);
                });
            }

            for _ in 0..2 {
                let (store, writing) = (&store, &writing);
                scope.spawn(move || {
                    let mut seen = 0;
                    loop {
                        let finished = writing.load(Ordering::Acquire) == 0;
                        let fixes = read_all(store, 0);
                        let indices: Vec<u64> = fixes.iter().map(|f| f.index).collect();
                        assert_eq!(indices, (0..fixes.len() as u64).collect::<Vec<_>>());
                        assert!(fixes.iter().skip(1).all(|f| f.distance.is_some()));
                        assert!(fixes.len() >= seen, "{} after {}", fixes.len(), seen);
                        seen = fixes.len();
                        if finished {
                            break;
                        }
                    }
                    assert_eq!(seen, WRITERS * APPENDS);
                });
            }
        });
    }

    #[test]
    fn empty_store_is_not_rescanned_after_a_failed_first_append() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 1, 5, 12, 0, 0);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        let path = daylog::path_for(tmp.path(), clock.now().date_naive());

        let blocker = path.with_extension("json.tmp");
        fs::create_dir(&blocker).expect("blocker");
        let err = store.append(fix_at(1.0, 1.0, 1.0)).expect_err("blocked write");
        assert!(matches!(err, StoreError::StorageUnavailable { .. }));
        fs::remove_dir(&blocker).expect("unblock");

        let other = TempDir::new().expect("tempdir");
        let foreign = DayLogStore::with_clock(other.path(), clock.clone())
            .expect("other store")
            .append(fix_at(2.0, 2.0, 2.0))
            .expect("foreign fix");
        daylog::write(&path, &DayLog { entries: vec![foreign] }).expect("foreign day");

        let err = store.append(fix_at(1.0, 1.0, 1.0)).expect_err("diverged");
        assert!(matches!(
            err,
            StoreError::DivergentState {
                expected: None,
                found: Some(0)
            }
        ));
    }

    #[test]
    fn index_out_of_sequence_is_divergent() {
        let tmp = TempDir::new().expect("tempdir");
        let store = DayLogStore::with_clock(tmp.path(), ManualClock::at(2026, 1, 5, 12, 0, 0))
            .expect("store");
        let first = store.append(fix_at(1.0, 1.0, 1.0)).expect("first");
        let log = DayLog {
            entries: vec![first.clone()],
        };

        assert!(check_tail(Some(&first), 1, &log).is_ok());
        assert!(matches!(
            check_tail(Some(&first), 3, &log),
            Err(StoreError::DivergentState {
                expected: Some(0),
                found: Some(2)
            })
        ));
        assert!(matches!(
            check_tail(None, 0, &log),
            Err(StoreError::DivergentState {
                expected: None,
                found: Some(0)
            })
        ));
    }

    #[test]
    fn clock_stepped_back_over_midnight_keeps_the_tail_day() {
        let tmp = TempDir::new().expect("tempdir");
        let clock = ManualClock::at(2026, 3, 2, 0, 0, 30);
        let store = DayLogStore::with_clock(tmp.path(), clock.clone()).expect("store");
        store.append(fix_at(10.0, 10.0, 100.0)).expect("first");

        clock.advance_ms(-40_000);
        let fix = store.append(fix_at(10.0, 10.0, 100.0)).expect("after step back");

        assert_eq!(fix.index, 1);
        assert_eq!(fix.time.diff, -40.0);
        assert_eq!(fix.speed.expect("speed").total, 0.0);
        let days = daylog::list(tmp.path()).expect("days");
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].0, NaiveDate::from_ymd_opt(2026, 3, 2).expect("date"));
        assert_eq!(daylog::read(&days[0].1).expect("day").entries.len(), 2);
    }
}
