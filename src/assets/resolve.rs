use std::path::{Path, PathBuf};

use tracing::warn;

/// Outcome of looking up a declared asset path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(PathBuf),
    NotFound { hint: String, tried: Vec<PathBuf> },
}

/// Maps script-declared paths onto files that exist, searching an ordered list of directories.
///
/// The hint is tried as given first (relative hints against the process working directory),
/// then `dir/basename(hint)` for each candidate directory. First hit wins.
#[derive(Clone, Debug, Default)]
pub struct AssetResolver {
    candidates: Vec<PathBuf>,
}

impl AssetResolver {
    pub fn new(candidates: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut out: Vec<PathBuf> = Vec::new();
        for c in candidates {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        Self { candidates: out }
    }

    /// Candidate order for a run: script dir, `<script dir>/assets`, then the project assets dir.
    pub fn for_job(script_path: &Path, project_assets: Option<&Path>) -> Self {
        let script_dir = script_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut dirs = vec![script_dir.clone(), script_dir.join("assets")];
        if let Some(p) = project_assets {
            dirs.push(p.to_path_buf());
        }
        Self::new(dirs)
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn resolve(&self, hint: &str) -> Resolution {
        let mut tried = Vec::with_capacity(self.candidates.len() + 1);
        let direct = PathBuf::from(hint);
        if direct.is_file() {
            return Resolution::Found(direct);
        }
        tried.push(direct.clone());

        if let Some(name) = direct.file_name() {
            for dir in &self.candidates {
                let p = dir.join(name);
                if p.is_file() {
                    return Resolution::Found(p);
                }
                tried.push(p);
            }
        }
        Resolution::NotFound {
            hint: hint.to_owned(),
            tried,
        }
    }

    /// [`resolve`](Self::resolve), logging every path tried on a miss.
    pub fn resolve_logged(&self, hint: &str, context: &str) -> Option<PathBuf> {
        match self.resolve(hint) {
            Resolution::Found(p) => Some(p),
            Resolution::NotFound { hint, tried } => {
                let tried: Vec<String> = tried.iter().map(|p| p.display().to_string()).collect();
                warn!(%hint, context, tried = ?tried, "asset not found");
                None
            }
        }
    }
}
