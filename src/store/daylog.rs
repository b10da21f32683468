use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::StoreError;
use crate::types::fix::DayLog;

const FILE_PREFIX: &str = "data-";
const FILE_SUFFIX: &str = ".json";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn path_for(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}{}{}", FILE_PREFIX, date.format(DATE_FORMAT), FILE_SUFFIX))
}

fn date_of(file_name: &str) -> Option<NaiveDate> {
    let date = file_name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}

/// Day files in `dir`, oldest first.
pub(crate) fn list(dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StoreError::unavailable(dir, err)),
    };

    let mut days = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| StoreError::unavailable(dir, err))?;
        let name = entry.file_name();
        if let Some(date) = name.to_str().and_then(date_of) {
            days.push((date, entry.path()));
        }
    }
    days.sort_by_key(|(date, _)| *date);
    Ok(days)
}

/// A missing file is an empty day.
pub(crate) fn read(path: &Path) -> Result<DayLog, StoreError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| StoreError::unavailable(path, err)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(DayLog::default()),
        Err(err) => Err(StoreError::unavailable(path, err)),
    }
}

/// Replaces the day file by writing a sibling and renaming it over the
/// existing one, so concurrent readers see either the old or the new content.
pub(crate) fn write(path: &Path, log: &DayLog) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(log).map_err(|err| StoreError::unavailable(path, err))?;
    let tmp = path.with_extension("json.tmp");

    let result = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    result.map_err(|err| {
        let _ = fs::remove_file(&tmp);
        StoreError::unavailable(path, err)
    })
}
