use std::path::PathBuf;
use std::vec;

use crate::error::StoreError;
use crate::store::daylog;
use crate::types::fix::Fix;

/// Lazy iterator over stored fixes at or beyond a global index.
///
/// Day files are loaded one at a time while iterating. The set of days is
/// fixed when the cursor is created; days started afterwards are picked up
/// by the next `read_from` call. After an error the cursor is exhausted.
#[derive(Debug, Clone)]
pub struct FixCursor {
    start: u64,
    days: vec::IntoIter<PathBuf>,
    pending: vec::IntoIter<Fix>,
    failed: bool,
}

impl FixCursor {
    pub(crate) fn new(start: u64, days: Vec<PathBuf>) -> Self {
        Self {
            start,
            days: days.into_iter(),
            pending: Vec::new().into_iter(),
            failed: false,
        }
    }
}

impl Iterator for FixCursor {
    type Item = Result<Fix, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(fix) = self.pending.next() {
                return Some(Ok(fix));
            }
            if self.failed {
                return None;
            }

            let path = self.days.next()?;
            match daylog::read(&path) {
                Ok(log) => {
                    let start = self.start;
                    let entries: Vec<Fix> = log
                        .entries
                        .into_iter()
                        .filter(|fix| fix.index >= start)
                        .collect();
                    self.pending = entries.into_iter();
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
