use kindeploy_core::DeployError;
use std::path::{Path, PathBuf};

/// Resolve the application folder the user named.
///
/// Relative paths (including `.`) are taken against `cwd`. The result is the
/// canonical absolute path, so the derived app name comes from the real
/// directory name rather than from `.` or `..`.
pub fn resolve_folder(input: &Path, cwd: &Path) -> Result<PathBuf, DeployError> {
    if input.as_os_str().is_empty() || input.to_string_lossy().trim().is_empty() {
        return Err(DeployError::InvalidInput(
            "folder path cannot be empty".to_string(),
        ));
    }
    let joined = if input.is_absolute() {
        input.to_path_buf()
    } else {
        cwd.join(input)
    };
    let resolved = joined.canonicalize().map_err(|_| {
        DeployError::InvalidInput(format!("folder '{}' not found", joined.display()))
    })?;
    if !resolved.is_dir() {
        return Err(DeployError::InvalidInput(format!(
            "'{}' is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}
