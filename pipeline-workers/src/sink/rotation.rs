//! File-rotation policy (§4.E, worked example for file sinks): a file
//! is rotated when its size exceeds `max_size_bytes` or its age
//! exceeds `rotation_interval`, whichever trips first. The active file
//! is renamed to `<base>-<nanos>.<suffix>` and a fresh active file is
//! opened; the oldest rotated files beyond `max_files` are unlinked.
//! `max_size_bytes == 0` disables size rotation, `rotation_interval ==
//! Duration::ZERO` disables time rotation; both disabled never rotates.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub max_size_bytes: u64,
    pub max_files: usize,
    pub rotation_interval: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_bytes: 0,
            max_files: 0,
            rotation_interval: Duration::ZERO,
        }
    }
}

pub struct RotationTracker {
    base_path: PathBuf,
    policy: RotationPolicy,
    current_size: u64,
    opened_at: Instant,
    rotated: VecDeque<PathBuf>,
}

impl RotationTracker {
    pub fn new(base_path: PathBuf, policy: RotationPolicy) -> Self {
        Self {
            base_path,
            policy,
            current_size: 0,
            opened_at: Instant::now(),
            rotated: VecDeque::new(),
        }
    }

    pub fn should_rotate(&self, incoming_len: u64) -> bool {
        let size_trip = self.policy.max_size_bytes > 0 && self.current_size + incoming_len > self.policy.max_size_bytes;
        let time_trip = self.policy.rotation_interval > Duration::ZERO && self.opened_at.elapsed() >= self.policy.rotation_interval;
        size_trip || time_trip
    }

    pub fn note_write(&mut self, n: u64) {
        self.current_size += n;
    }

    pub fn rotated_file_count(&self) -> usize {
        self.rotated.len()
    }

    /// Renames the active file aside and opens a fresh one, returning
    /// the new handle. Resets the size/age counters and enforces
    /// `max_files` on the rotated set.
    pub fn rotate(&mut self) -> io::Result<std::fs::File> {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
        let suffix = self
            .base_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("log")
            .to_string();
        let stem = self.base_path.with_extension("");
        let rotated_path = PathBuf::from(format!("{}-{nanos}.{suffix}", stem.display()));

        std::fs::rename(&self.base_path, &rotated_path)?;
        let file = open_active(&self.base_path)?;

        self.current_size = 0;
        self.opened_at = Instant::now();
        self.rotated.push_back(rotated_path);
        self.enforce_max_files()?;

        Ok(file)
    }

    fn enforce_max_files(&mut self) -> io::Result<()> {
        if self.policy.max_files == 0 {
            return Ok(());
        }
        while self.rotated.len() > self.policy.max_files {
            if let Some(oldest) = self.rotated.pop_front() {
                let _ = std::fs::remove_file(oldest);
            }
        }
        Ok(())
    }
}

pub fn open_active(path: &Path) -> io::Result<std::fs::File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotates_on_size_and_caps_retained_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("active.log");
        let mut file = open_active(&base).unwrap();
        let mut tracker = RotationTracker::new(
            base.clone(),
            RotationPolicy {
                max_size_bytes: 10,
                max_files: 2,
                rotation_interval: Duration::ZERO,
            },
        );

        for _ in 0..5 {
            let chunk = b"0123456789AB";
            if tracker.should_rotate(chunk.len() as u64) {
                file = tracker.rotate().unwrap();
            }
            file.write_all(chunk).unwrap();
            tracker.note_write(chunk.len() as u64);
        }

        assert_eq!(tracker.rotated_file_count(), 2);
        let rotated_on_disk = std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().starts_with("active-"))
            .count();
        assert_eq!(rotated_on_disk, 2);
        assert!(base.exists());
    }

    #[test]
    fn never_rotates_when_both_triggers_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("active.log");
        let _file = open_active(&base).unwrap();
        let tracker = RotationTracker::new(base, RotationPolicy::default());
        assert!(!tracker.should_rotate(1_000_000));
    }
}
