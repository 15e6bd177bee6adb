use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Intermediate file with a deterministic path that is removed when the guard drops.
///
/// Dropping happens on every exit path (success, early return, error propagation), so a failed
/// run never leaves half-written narration or mix files behind unless `keep` was requested.
#[derive(Debug)]
pub struct ScopedArtifact {
    path: PathBuf,
    keep: bool,
}

impl ScopedArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keep: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the file on disk when the guard drops.
    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }
}

impl Drop for ScopedArtifact {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.path.display(), "keeping intermediate file");
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed intermediate file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove intermediate file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice_0.mp3");
        std::fs::write(&path, b"abc").unwrap();
        {
            let _guard = ScopedArtifact::new(&path);
        }
        assert!(!path.exists());
    }

    #[test]
    fn keep_preserves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.f32le");
        std::fs::write(&path, b"abc").unwrap();
        drop(ScopedArtifact::new(&path).with_keep(true));
        assert!(path.exists());
    }

    #[test]
    fn missing_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        drop(ScopedArtifact::new(dir.path().join("never-written")));
    }
}
