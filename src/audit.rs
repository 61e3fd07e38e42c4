//! Session audit log.
//!
//! One `;`-separated file per control-channel connection, opened on connect
//! and closed on disconnect. The remote peer reconnecting starts a fresh
//! session file. Write failures are logged and swallowed; the audit trail is
//! never allowed to take down a connection or an action.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

const HEADER: &str = "timestamp;event;author;detail;state";

/// Append-only audit trail for operator-visible events.
pub struct AuditLog {
    dir: PathBuf,
    file: Mutex<Option<File>>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: Mutex::new(None),
        }
    }

    /// Open a new session file, closing any previous one. Called when the
    /// control channel connects.
    pub fn open_session(&self) {
        let name = Local::now().format("%Y-%m-%d--%Hh-%Mm-%Ss.csv").to_string();
        let path = self.dir.join(name);

        match open_session_file(&self.dir, &path) {
            Ok(file) => {
                tracing::info!(path = %path.display(), "Opened audit session");
                *self.file.lock().expect("audit lock poisoned") = Some(file);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Could not open audit session");
            }
        }
    }

    /// Close the current session file, if any.
    pub fn close_session(&self) {
        if self.file.lock().expect("audit lock poisoned").take().is_some() {
            tracing::info!("Closed audit session");
        }
    }

    /// Record one event. No-op when no session is open.
    pub fn record(&self, event: &str, author: &str, detail: &str, state: &str) {
        let mut guard = self.file.lock().expect("audit lock poisoned");
        let Some(file) = guard.as_mut() else {
            return;
        };

        let stamp = Local::now().format("%H:%M:%S").to_string();
        // Semicolons inside fields would shift the columns.
        let detail = detail.replace(';', ",");
        let line = format!("{stamp};{event};{author};{detail};{state}\n");

        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
            tracing::warn!(error = %e, "Audit write failed");
        }
    }

    pub fn has_session(&self) -> bool {
        self.file.lock().expect("audit lock poisoned").is_some()
    }
}

fn open_session_file(dir: &Path, path: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    let mut file = File::create(path)?;
    writeln!(file, "{HEADER}")?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_between_open_and_close() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path());

        // Records before a session are dropped silently.
        audit.record("action", "agent", "talk", "PENDING");
        assert!(!audit.has_session());

        audit.open_session();
        audit.record("action", "operator", "talk: hello; world", "EXECUTED");
        audit.close_session();
        assert!(!audit.has_session());

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let content = fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(HEADER));
        let line = lines.next().unwrap();
        assert!(line.ends_with(";action;operator;talk: hello, world;EXECUTED"));
    }

    #[test]
    fn reopen_starts_a_new_file() {
        let dir = tempdir().unwrap();
        let audit = AuditLog::new(dir.path());

        audit.open_session();
        audit.record("session", "system", "first", "-");
        std::thread::sleep(std::time::Duration::from_millis(1100));
        audit.open_session();
        audit.record("session", "system", "second", "-");
        audit.close_session();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }
}
