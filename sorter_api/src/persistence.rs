//! Atomic `config.json`/`sort_log.json` load and save, grounded in the
//! original controller's write-to-`.tmp`-then-`rename` pattern.

use std::collections::HashMap;
use std::path::Path;

use sorter_common::config::AppConfig;
use sorter_core::SorterHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// `YYYY-MM-DD -> {lane_name: count}`.
pub type SortLog = HashMap<String, HashMap<String, u64>>;

/// Write `value` to `path` via a same-directory temp file, fsync, then
/// atomic rename — a crash mid-write never corrupts the previous file.
pub async fn atomic_save_json<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let body = serde_json::to_vec_pretty(value)?;

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    tokio::io::AsyncWriteExt::write_all(&mut file, &body).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await
}

/// Load `config.json`. A missing file is not an error — callers get the
/// default config and should persist it. A present-but-unparseable file is
/// an error the caller should turn into a maintenance trigger.
pub async fn load_config(path: &Path) -> Result<Option<AppConfig>, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => {
            warn!(path = %path.display(), "config file is empty, using defaults");
            Ok(None)
        }
        Ok(content) => {
            let config: AppConfig = serde_json::from_str(&content).map_err(|e| e.to_string())?;
            config.validate().map_err(|e| e.to_string())?;
            Ok(Some(config))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file yet, using defaults");
            Ok(None)
        }
        Err(e) => Err(e.to_string()),
    }
}

pub async fn load_sort_log(path: &Path) -> SortLog {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => SortLog::new(),
    }
}

/// Samples lane counts every 30 s; on any change, rewrites today's entry and
/// atomically persists the whole file.
pub async fn sort_log_autosaver(handle: std::sync::Arc<SorterHandle>, path: std::path::PathBuf, cancel: CancellationToken) {
    let mut log = load_sort_log(&path).await;
    let mut last_counts: HashMap<String, u64> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(std::time::Duration::from_secs(30)) => {}
        }

        let lanes = handle.state.lanes();
        let counts: HashMap<String, u64> = lanes.iter().map(|l| (l.name.clone(), l.runtime.count)).collect();
        if counts == last_counts {
            continue;
        }
        last_counts = counts.clone();

        let today = today_string();
        log.insert(today, counts);

        if let Err(e) = atomic_save_json(&path, &log).await {
            error!(error = %e, "failed to persist sort log");
        }
    }
}

fn today_string() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days = secs / 86_400;
    // Civil-from-days (Howard Hinnant's algorithm), good for any date after
    // the epoch without pulling in a date/time crate for one calculation.
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = AppConfig::fallback_default();
        atomic_save_json(&path, &cfg).await.unwrap();
        let loaded = load_config(&path).await.unwrap().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[tokio::test]
    async fn missing_file_yields_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does_not_exist.json");
        assert!(load_config(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unparseable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(load_config(&path).await.is_err());
    }

    #[test]
    fn today_string_is_well_formed() {
        let s = today_string();
        assert_eq!(s.len(), 10);
        assert_eq!(s.as_bytes()[4], b'-');
        assert_eq!(s.as_bytes()[7], b'-');
    }
}
