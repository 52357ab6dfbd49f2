// LogManager Service
// File logger for the bot and log retention cleanup

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const LOG_FILE_NAME: &str = "streambot.log";

/// Writes `[date][time][target][level] message` lines to a file and stderr
pub struct BotLogger {
    file: Mutex<fs::File>,
    level: LevelFilter,
}

impl BotLogger {
    pub fn new(log_dir: &Path, level: LevelFilter) -> Result<Self, Box<dyn std::error::Error>> {
        fs::create_dir_all(log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(LOG_FILE_NAME))?;
        Ok(Self {
            file: Mutex::new(file),
            level,
        })
    }
}

impl Log for BotLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        // Dependencies are chatty below info
        if !metadata.target().starts_with("streambot") && metadata.level() > Level::Info {
            return false;
        }
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = Local::now();
        let date = timestamp.format("%Y-%m-%d");
        let time = timestamp.format("%H:%M:%S");
        let line = format!(
            "[{date}][{time}][{}][{}] {}",
            record.target(),
            record.level(),
            record.args()
        );

        {
            let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = writeln!(file, "{line}");
        }
        eprintln!("{line}");
    }

    fn flush(&self) {
        let _ = self.file.lock().unwrap_or_else(|e| e.into_inner()).flush();
    }
}

/// Install the file logger. Unknown level names fall back to info.
pub fn init_logger(log_dir: &Path, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);
    let logger = BotLogger::new(log_dir, level)?;
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);
    Ok(())
}

/// Delete `*.log` files older than the retention window. Zero keeps everything.
pub fn prune_logs(log_dir: &Path, retention_days: u32) -> Result<usize, String> {
    if retention_days == 0 {
        return Ok(0);
    }

    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(retention_days as u64 * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = fs::read_dir(log_dir).map_err(|e| format!("Failed to read log dir: {e}"))?;
    let mut removed = 0;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("log") {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn age_file(path: &Path, days: u64) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60))
            .unwrap();
    }

    #[test]
    fn test_prune_removes_only_old_logs() {
        let temp = tempdir().unwrap();
        let old_log = temp.path().join("old.log");
        let new_log = temp.path().join("new.log");
        let old_other = temp.path().join("old.txt");
        for path in [&old_log, &new_log, &old_other] {
            fs::write(path, "x").unwrap();
        }
        age_file(&old_log, 40);
        age_file(&old_other, 40);

        assert_eq!(prune_logs(temp.path(), 30).unwrap(), 1);
        assert!(!old_log.exists());
        assert!(new_log.exists());
        assert!(old_other.exists());
    }

    #[test]
    fn test_prune_disabled_or_missing_dir() {
        let temp = tempdir().unwrap();
        let old_log = temp.path().join("old.log");
        fs::write(&old_log, "x").unwrap();
        age_file(&old_log, 400);

        assert_eq!(prune_logs(temp.path(), 0).unwrap(), 0);
        assert!(old_log.exists());
        assert_eq!(prune_logs(&temp.path().join("absent"), 7).unwrap(), 0);
    }

    #[test]
    fn test_logger_writes_formatted_lines() {
        let temp = tempdir().unwrap();
        let logger = BotLogger::new(temp.path(), LevelFilter::Info).unwrap();

        logger.log(
            &Record::builder()
                .args(format_args!("stream started"))
                .level(Level::Info)
                .target("streambot::services")
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("too detailed"))
                .level(Level::Debug)
                .target("streambot::services")
                .build(),
        );
        logger.flush();

        let content = fs::read_to_string(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert!(content.contains("[streambot::services][INFO] stream started"));
        assert!(!content.contains("too detailed"));
    }

    #[test]
    fn test_concurrent_lines_are_all_written() {
        let temp = tempdir().unwrap();
        let logger = BotLogger::new(temp.path(), LevelFilter::Info).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let logger = &logger;
                scope.spawn(move || {
                    for n in 0..50 {
                        logger.log(
                            &Record::builder()
                                .args(format_args!("worker {worker} line {n}"))
                                .level(Level::Info)
                                .target("streambot::commands")
                                .build(),
                        );
                    }
                });
            }
        });
        logger.flush();

        let content = fs::read_to_string(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(content.lines().count(), 400);
    }

    #[test]
    fn test_dependency_debug_is_filtered() {
        let temp = tempdir().unwrap();
        let logger = BotLogger::new(temp.path(), LevelFilter::Trace).unwrap();

        let ours = Metadata::builder().level(Level::Debug).target("streambot").build();
        let theirs = Metadata::builder().level(Level::Debug).target("hyper::proto").build();
        assert!(logger.enabled(&ours));
        assert!(!logger.enabled(&theirs));
    }
}
