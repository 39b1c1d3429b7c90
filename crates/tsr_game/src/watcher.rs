use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Polls a file's modification time.
pub struct FileWatcher {
    path: PathBuf,
    last_seen_modified: Option<SystemTime>,
}

impl FileWatcher {
    pub fn new(path: PathBuf) -> Self {
        let last_seen_modified = modified_time(&path);
        Self {
            path,
            last_seen_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once per observed change, including the file first appearing.
    pub fn should_reload(&mut self) -> bool {
        let current = modified_time(&self.path);
        match (self.last_seen_modified, current) {
            (Some(old), Some(now)) if now > old => {
                self.last_seen_modified = Some(now);
                true
            }
            (None, Some(now)) => {
                self.last_seen_modified = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Accept the current state as seen, e.g. after a forced reload.
    pub fn mark_seen(&mut self) {
        self.last_seen_modified = modified_time(&self.path);
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn temp_file_path(name_hint: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "tsr_watcher_test_{}_{}_{}.json",
            name_hint,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn creation_triggers_one_reload() {
        let path = temp_file_path("create");
        let mut watcher = FileWatcher::new(path.clone());
        assert!(!watcher.should_reload(), "missing file should not reload");

        fs::write(&path, "{}").expect("write temp file");
        assert!(watcher.should_reload(), "creating file should trigger reload once");
        assert!(!watcher.should_reload(), "without changes, second poll should not reload");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn newer_mtime_triggers_reload() {
        let path = temp_file_path("touch");
        fs::write(&path, "{}").expect("write temp file");
        let mut watcher = FileWatcher::new(path.clone());
        assert!(!watcher.should_reload());

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .expect("open temp file");
        file.set_modified(SystemTime::now() + Duration::from_secs(5))
            .expect("bump mtime");
        assert!(watcher.should_reload());
        watcher.mark_seen();
        assert!(!watcher.should_reload());
        let _ = fs::remove_file(path);
    }
}
