use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

pub const APPLICATION_DIR_NAME: &str = "activity-tracker";

fn default_base_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        env::var("APPDATA")
            .map(PathBuf::from)
            .context("APPDATA should be present on Windows")
    }
    #[cfg(not(windows))]
    {
        env::var("XDG_STATE_HOME")
            .map(PathBuf::from)
            .or_else(|_| env::var("HOME").map(|home| Path::new(&home).join(".local/state")))
            .context("Couldn't find neither XDG_STATE_HOME nor HOME")
    }
}

/// Creates `dir` if needed. Everything the tracker persists lives in it.
pub fn ensure_application_dir(dir: PathBuf) -> Result<PathBuf> {
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create application directory {}", dir.display()))?;
    Ok(dir)
}

pub fn create_application_default_path() -> Result<PathBuf> {
    ensure_application_dir(default_base_dir()?.join(APPLICATION_DIR_NAME))
}

/// Uses `dir` when given, the platform default otherwise.
pub fn resolve_application_dir(dir: Option<&Path>) -> Result<PathBuf> {
    match dir {
        Some(dir) => ensure_application_dir(dir.to_path_buf()),
        None => create_application_default_path(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::resolve_application_dir;

    #[test]
    fn test_explicit_dir_is_created() -> Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("state").join("tracker");
        assert_eq!(resolve_application_dir(Some(&nested))?, nested);
        assert!(nested.is_dir());
        // Already existing directories are fine.
        assert_eq!(resolve_application_dir(Some(&nested))?, nested);
        Ok(())
    }
}
