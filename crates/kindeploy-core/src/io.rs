use crate::error::Result;
use serde::Serialize;
use std::fs::Permissions;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// What happened to a destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Created,
    Overwritten,
    Kept,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Created => "created",
            WriteStatus::Overwritten => "overwritten",
            WriteStatus::Kept => "kept",
        }
    }
}

/// Ownership of a destination file: generated files are replaced on every
/// run, user files are only seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Generated,
    User,
}

/// Write `data` to `path` according to `ownership`. Writes go through a
/// tempfile in the same directory and a rename, so a concurrent `docker
/// build` or `kubectl apply` never reads a half-written file.
pub fn write_file(path: &Path, data: &[u8], ownership: Ownership) -> Result<WriteStatus> {
    let previous = std::fs::metadata(path).ok();
    let existed = previous.is_some();
    if existed && ownership == Ownership::User {
        return Ok(WriteStatus::Kept);
    }

    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    // Tempfiles are created 0600; the destination keeps its old mode.
    let permissions = match previous {
        Some(meta) => Some(meta.permissions()),
        None => new_file_permissions(),
    };
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;

    Ok(if existed {
        WriteStatus::Overwritten
    } else {
        WriteStatus::Created
    })
}

#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}
