//! Structured JSON-lines debug log
//!
//! Off unless `ACCTWATCH_DEBUG` is set. Each line is one [`LogEntry`];
//! messages pass through credential redaction before they are written, so
//! proxy URLs can be logged as-is.
//!
//! The file is gzipped aside once it passes 8 MB and only the newest five
//! archives are kept. Rolling takes an advisory lock so concurrent runs
//! sharing a log do not archive the same file twice.

use crate::config::defaults::app_file;
use chrono::Local;
use flate2::{write::GzEncoder, Compression};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

pub const DEBUG_ENV_VAR: &str = "ACCTWATCH_DEBUG";
pub const LOG_PATH_ENV_VAR: &str = "ACCTWATCH_DEBUG_LOG";

const MAX_LOG_BYTES: u64 = 8 * 1024 * 1024;
const KEEP_ARCHIVES: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LogEntry {
    /// RFC 3339, local time
    pub timestamp: String,
    /// DEBUG, WARN, ERROR, POLL, PROXY or STATE
    pub level: String,
    pub component: String,
    pub event: String,
    pub message: String,
    /// Session id of the run that wrote the line
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Append-only log file with size-based gzip archival
struct LogFile {
    path: PathBuf,
    /// Running size estimate, seeded from disk on open
    size: u64,
}

impl LogFile {
    fn open(path: PathBuf) -> Self {
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, size }
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if self.size >= MAX_LOG_BYTES {
            // A failed roll must not cost the line
            let _ = self.roll();
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
        self.size += line.len() as u64 + 1;
        Ok(())
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "acctwatch-debug".to_string())
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn roll(&mut self) -> io::Result<()> {
        let lock_path = self.path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            // Someone else is archiving; re-read the size next time
            self.size = 0;
            return Ok(());
        }

        let on_disk = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if on_disk >= MAX_LOG_BYTES {
            let archive = self.dir().join(format!(
                "{}.{}.gz",
                self.stem(),
                Local::now().format("%Y%m%d_%H%M%S")
            ));
            let mut encoder = GzEncoder::new(File::create(&archive)?, Compression::default());
            io::copy(&mut File::open(&self.path)?, &mut encoder)?;
            encoder.finish()?;
            fs::remove_file(&self.path)?;
            let _ = self.prune_archives();
            self.size = 0;
        } else {
            self.size = on_disk;
        }

        let _ = FileExt::unlock(&lock);
        let _ = fs::remove_file(&lock_path);
        Ok(())
    }

    /// Archive names embed a sortable timestamp, so name order is age order
    fn prune_archives(&self) -> io::Result<()> {
        let prefix = format!("{}.", self.stem());
        let mut archives: Vec<PathBuf> = fs::read_dir(self.dir())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".gz"))
            })
            .collect();
        archives.sort();

        let excess = archives.len().saturating_sub(KEEP_ARCHIVES);
        for old in archives.into_iter().take(excess) {
            let _ = fs::remove_file(old);
        }
        Ok(())
    }
}

/// Structured logger for tracking runs
pub struct TrackerLogger {
    file: Option<Mutex<LogFile>>,
    session_id: String,
    redactions: Vec<(Regex, &'static str)>,
}

impl Default for TrackerLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackerLogger {
    /// Enabled by `ACCTWATCH_DEBUG`; the path comes from `ACCTWATCH_DEBUG_LOG`
    /// or defaults to `~/.acctwatch/acctwatch-debug.log`
    pub fn new() -> Self {
        if !crate::core::tracker::types::parse_env_flag(DEBUG_ENV_VAR) {
            return Self::disabled();
        }
        let path = std::env::var(LOG_PATH_ENV_VAR)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| app_file("acctwatch-debug.log"));
        Self::to_file(path)
    }

    /// Logger writing to an explicit file regardless of environment
    pub fn to_file(path: PathBuf) -> Self {
        Self::with_file(Some(LogFile::open(path)))
    }

    /// Logger that drops everything
    pub fn disabled() -> Self {
        Self::with_file(None)
    }

    fn with_file(file: Option<LogFile>) -> Self {
        Self {
            file: file.map(Mutex::new),
            session_id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            redactions: redaction_rules(),
        }
    }

    /// Scrub URL credentials and `key: value` secrets
    pub fn redact_sensitive_data(&self, text: &str) -> String {
        self.redactions
            .iter()
            .fold(text.to_string(), |acc, (rule, replacement)| {
                rule.replace_all(&acc, *replacement).into_owned()
            })
    }

    fn emit(&self, level: &str, component: &str, event: &str, message: &str, fields: Map<String, Value>) {
        let Some(file) = &self.file else {
            return;
        };

        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339(),
            level: level.to_string(),
            component: component.to_string(),
            event: event.to_string(),
            message: self.redact_sensitive_data(message),
            correlation_id: Some(self.session_id.clone()),
            fields,
        };

        let Ok(line) = serde_json::to_string(&entry) else {
            return;
        };
        if let Ok(mut file) = file.lock() {
            let _ = file.append(&line);
        }
    }

    pub fn debug(&self, component: &str, event: &str, message: &str) {
        self.emit("DEBUG", component, event, message, Map::new());
    }

    pub fn warn(&self, component: &str, event: &str, message: &str) {
        self.emit("WARN", component, event, message, Map::new());
    }

    pub fn error(&self, component: &str, event: &str, message: &str) {
        self.emit("ERROR", component, event, message, Map::new());
    }

    pub fn poll_start(&self, account_id: &str, attempt: u32, delay_ms: u64) {
        self.emit(
            "POLL",
            "StatusPoller",
            "poll_start",
            &format!("Polling {} (attempt {})", account_id, attempt + 1),
            fields([
                ("account", account_id.into()),
                ("attempt", attempt.into()),
                ("pre_delay_ms", delay_ms.into()),
            ]),
        );
    }

    pub fn poll_end(&self, account_id: &str, state: &str, http_status: Option<u16>, attempts: u32) {
        let mut extra = fields([
            ("account", account_id.into()),
            ("state", state.into()),
            ("attempts", attempts.into()),
        ]);
        if let Some(code) = http_status {
            extra.insert("http_status".to_string(), code.into());
        }

        self.emit(
            "POLL",
            "StatusPoller",
            "poll_end",
            &format!("{} -> {} after {} attempt(s)", account_id, state, attempts),
            extra,
        );
    }

    pub fn backoff(&self, component: &str, subject: &str, attempt: u32, delay_ms: u64, cause: &str) {
        self.emit(
            "WARN",
            component,
            "backoff",
            &format!("{}: backing off {}ms ({})", subject, delay_ms, cause),
            fields([
                ("subject", subject.into()),
                ("attempt", attempt.into()),
                ("delay_ms", delay_ms.into()),
                ("cause", cause.into()),
            ]),
        );
    }

    pub fn proxy_check(&self, proxy_key: &str, status: &str, reason: Option<&str>, attempts: u32) {
        let mut extra = fields([
            ("proxy", proxy_key.into()),
            ("status", status.into()),
            ("attempts", attempts.into()),
        ]);
        if let Some(reason) = reason {
            extra.insert("reason".to_string(), reason.into());
        }

        self.emit(
            "PROXY",
            "ProxyHealthProbe",
            "proxy_check",
            &format!("Proxy {} -> {}", proxy_key, status),
            extra,
        );
    }

    pub fn transition(&self, kind: &str, subject: &str, detail: &str) {
        self.emit(
            "STATE",
            "StateDiffStore",
            "transition",
            detail,
            fields([("kind", kind.into()), ("subject", subject.into())]),
        );
    }

    pub fn state_write_summary(&self, accounts: usize, proxies: usize, not_found_tracked: usize) {
        self.emit(
            "STATE",
            "StateDiffStore",
            "state_write",
            &format!(
                "Snapshot saved: {} accounts, {} proxies, {} not_found tracked",
                accounts, proxies, not_found_tracked
            ),
            fields([
                ("accounts", accounts.into()),
                ("proxies", proxies.into()),
                ("not_found_tracked", not_found_tracked.into()),
            ]),
        );
    }

    pub fn sink_outcome(&self, sink: &str, ok: bool, detail: &str) {
        self.emit(
            if ok { "DEBUG" } else { "WARN" },
            "Sinks",
            "sink_outcome",
            &format!("{}: {}", sink, detail),
            fields([("sink", sink.into()), ("ok", ok.into())]),
        );
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn get_session_id(&self) -> &str {
        &self.session_id
    }
}

fn fields<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn redaction_rules() -> Vec<(Regex, &'static str)> {
    [
        // scheme://user:pass@
        (r"(?i)(?P<scheme>[a-z][a-z0-9+.-]*://)[^\s/@]+@", "${scheme}[REDACTED]@"),
        (
            r"(?i)\b(?:authorization|bearer|token|password|secret|api[_-]?key)\b[:=\s]+(?:bearer\s+)?\S+",
            "[REDACTED]",
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|rule| (rule, replacement)))
    .collect()
}

/// Factory reading `ACCTWATCH_DEBUG` at call time
pub fn get_debug_logger() -> TrackerLogger {
    TrackerLogger::new()
}
