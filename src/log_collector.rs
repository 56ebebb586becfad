//! Decoupled logging pipeline for the settings engine.
//!
//! ```text
//! log::info!/warn!/...        log_notice!(...)
//!          \                      /
//!         [LogCollector] (crossbeam unbounded, never blocks)
//!                   |
//!          dedicated OS thread
//!           /               \
//! logs/full/<ts>_full.log   logs/notice/<ts>_notice.log
//!                   |
//!        try_send -> interactive loop (optional, lossy)
//! ```
//!
//! Every line reaches disk even when the interactive side is slow or gone.
//! Lines logged with the `notice` target are the transient messages shown
//! to the user and are mirrored to their own file.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// `log` target for user-facing notices.
pub const NOTICE_TARGET: &str = "notice";

/// Log a user-facing notice (mirrored to `logs/notice/`).
#[macro_export]
macro_rules! log_notice {
    ($($arg:tt)+) => {
        $crate::log::warn!(target: $crate::log_collector::NOTICE_TARGET, $($arg)+)
    };
}

enum LogMessage {
    Line(LogLine),
    Flush(tokio::sync::oneshot::Sender<()>),
}

/// Default log directory: `~/.local/share/biglinux-settings/logs`, or
/// `./logs` when no data directory is known.
pub fn default_logs_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("biglinux-settings").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Full,
    Notice,
}

#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub kind: LogKind,
    pub level: Level,
    /// `HH:MM:SS.mmm`
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogLine {
            message: message.into(),
            kind: LogKind::Full,
            level,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn notice(message: impl Into<String>) -> Self {
        LogLine {
            kind: LogKind::Notice,
            ..Self::new(Level::Warn, message)
        }
    }

    fn formatted(&self) -> String {
        format!("[{}] [{}] {}\n", self.timestamp, self.level, self.message)
    }
}

#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    full_path: PathBuf,
    notice_path: PathBuf,
    level: LevelFilter,
}

impl LogCollector {
    /// Create the log directories and start the writer thread.
    ///
    /// `ui_tx` receives a copy of every line on a best-effort basis.
    pub fn new(
        log_dir: PathBuf,
        ui_tx: Option<tokio::sync::mpsc::Sender<LogLine>>,
    ) -> Result<Self, String> {
        let full_dir = log_dir.join("full");
        let notice_dir = log_dir.join("notice");
        std::fs::create_dir_all(&full_dir)
            .map_err(|e| format!("Failed to create full log dir: {}", e))?;
        std::fs::create_dir_all(&notice_dir)
            .map_err(|e| format!("Failed to create notice log dir: {}", e))?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let full_path = full_dir.join(format!("{}_full.log", stamp));
        let notice_path = notice_dir.join(format!("{}_notice.log", stamp));
        let mut full_file = open_append(&full_path)?;
        let mut notice_file = open_append(&notice_path)?;

        let (tx, rx) = unbounded::<LogMessage>();

        // Plain OS thread: log calls may come from any runtime or none.
        std::thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let formatted = line.formatted();
                            let _ = full_file.write_all(formatted.as_bytes());
                            if line.kind == LogKind::Notice {
                                let _ = notice_file.write_all(formatted.as_bytes());
                            }
                            if let Some(ui_tx) = &ui_tx {
                                let _ = ui_tx.try_send(line);
                            }
                        }
                        LogMessage::Flush(done) => {
                            let _ = full_file.flush();
                            let _ = notice_file.flush();
                            let _ = full_file.sync_data();
                            let _ = notice_file.sync_data();
                            let _ = done.send(());
                        }
                    }
                }
            })
            .map_err(|e| format!("Failed to start log writer thread: {}", e))?;

        Ok(LogCollector {
            tx,
            full_path,
            notice_path,
            level: LevelFilter::Info,
        })
    }

    pub fn with_level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    pub fn full_log_path(&self) -> &Path {
        &self.full_path
    }

    pub fn notice_log_path(&self) -> &Path {
        &self.notice_path
    }

    /// Queue a line. Never blocks.
    pub fn log_line(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    pub fn log_str(&self, message: impl Into<String>) {
        self.log_line(LogLine::new(Level::Info, message));
    }

    pub fn log_notice(&self, message: impl Into<String>) {
        self.log_line(LogLine::notice(message));
    }

    /// Resolve once every line queued before this call is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(LogMessage::Flush(done_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        done_rx
            .await
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }

    /// Route the `log` facade into this collector.
    pub fn install_global(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(self.level);
        Ok(())
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if record.target() == NOTICE_TARGET {
            self.log_notice(message);
        } else {
            self.log_line(LogLine::new(record.level(), message));
        }
    }

    fn flush(&self) {}
}

fn open_append(path: &Path) -> Result<File, String> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))
}
