use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// Scratch directory for one finalize run
///
/// Everything inside is deleted when the workspace is dropped, whether the
/// run finished, skipped parts or aborted.
#[derive(Debug)]
pub struct RenderWorkspace {
    dir: TempDir,
}

impl RenderWorkspace {
    /// Create the workspace under `parent`, or the system temp dir
    pub fn new(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("narration-render-");

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };

        debug!("Render workspace at {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn segment_path(&self, part_index: usize) -> PathBuf {
        self.file(&format!("segment_{:03}.mp4", part_index))
    }

    /// Delete intermediate files that are no longer needed
    pub async fn remove_files(&self, files: &[PathBuf]) {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(file).await {
                warn!("Failed to remove {:?}: {}", file, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_workspace_removed_on_drop() {
        let parent = tempdir().unwrap();
        let workspace = RenderWorkspace::new(Some(parent.path())).unwrap();
        let root = workspace.path().to_path_buf();

        std::fs::write(workspace.segment_path(0), b"x").unwrap();
        assert!(root.starts_with(parent.path()));
        assert!(workspace.segment_path(7).ends_with("segment_007.mp4"));

        drop(workspace);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_remove_files() {
        let workspace = RenderWorkspace::new(None).unwrap();
        let a = workspace.segment_path(0);
        std::fs::write(&a, b"x").unwrap();

        workspace.remove_files(&[a.clone(), workspace.file("missing.mp4")]).await;
        assert!(!a.exists());
        assert!(workspace.path().exists());
    }
}
