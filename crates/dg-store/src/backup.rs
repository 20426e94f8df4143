//! Timestamped backups of tracker files, kept at two most recent per base file
//! (spec §4.6 "Backups", §5 "Backups (two most recent) are the recovery surface").

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreError;

pub struct BackupManager {
    backups_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            backups_dir: backups_dir.into(),
        }
    }

    /// Copy `tracker_path` into the backups directory with a timestamp suffix, then
    /// prune older backups of the same base file down to the two most recent. No-op if
    /// `tracker_path` doesn't exist yet (nothing to back up on first write).
    pub fn backup(&self, tracker_path: &Path) -> Result<(), StoreError> {
        if !tracker_path.exists() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.backups_dir)?;

        let stem = tracker_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("tracker.md");
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let backup_name = format!("{stem}.{stamp}.bak");
        std::fs::copy(tracker_path, self.backups_dir.join(backup_name))?;

        self.prune(stem)
    }

    fn prune(&self, stem: &str) -> Result<(), StoreError> {
        let prefix = format!("{stem}.");
        let mut matches: Vec<(std::time::SystemTime, PathBuf)> = std::fs::read_dir(&self.backups_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
            })
            .filter_map(|p| std::fs::metadata(&p).and_then(|m| m.modified()).ok().map(|m| (m, p)))
            .collect();

        matches.sort_by_key(|(modified, _)| *modified);
        while matches.len() > 2 {
            let (_, oldest) = matches.remove(0);
            std::fs::remove_file(oldest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn keeps_only_two_most_recent_backups() {
        let dir = tempdir().unwrap();
        let tracker = dir.path().join("src_module.md");
        let backups = dir.path().join("backups");
        let manager = BackupManager::new(&backups);

        for i in 0..5 {
            std::fs::write(&tracker, format!("version {i}")).unwrap();
            manager.backup(&tracker).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let count = std::fs::read_dir(&backups).unwrap().count();
        assert_eq!(count, 2);
    }

    #[test]
    fn no_op_when_tracker_does_not_exist_yet() {
        let dir = tempdir().unwrap();
        let tracker = dir.path().join("missing_module.md");
        let manager = BackupManager::new(dir.path().join("backups"));
        manager.backup(&tracker).unwrap();
        assert!(!dir.path().join("backups").exists());
    }
}
