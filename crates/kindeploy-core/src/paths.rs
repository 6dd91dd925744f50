use crate::error::{DeployError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File name constants
// ---------------------------------------------------------------------------

pub const DOCKERFILE: &str = "Dockerfile";
pub const DEPLOYMENT_MANIFEST: &str = "deployment.yaml";
pub const SERVICE_MANIFEST: &str = "service.yaml";
pub const ENTRY_POINT: &str = "main.go";
pub const GO_MOD: &str = "go.mod";
pub const DOCKERIGNORE: &str = ".dockerignore";
pub const ENV_FILE: &str = ".env";

/// Looked up in the working directory when no config path is given.
pub const CONFIG_FILE: &str = "kindeploy.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn dockerfile_path(folder: &Path) -> PathBuf {
    folder.join(DOCKERFILE)
}

pub fn deployment_manifest_path(folder: &Path) -> PathBuf {
    folder.join(DEPLOYMENT_MANIFEST)
}

pub fn service_manifest_path(folder: &Path) -> PathBuf {
    folder.join(SERVICE_MANIFEST)
}

pub fn entry_point_path(folder: &Path) -> PathBuf {
    folder.join(ENTRY_POINT)
}

pub fn go_mod_path(folder: &Path) -> PathBuf {
    folder.join(GO_MOD)
}

pub fn env_file_path(folder: &Path) -> PathBuf {
    folder.join(ENV_FILE)
}

// ---------------------------------------------------------------------------
// Resource name validation
// ---------------------------------------------------------------------------

static RESOURCE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn resource_name_re() -> &'static Regex {
    RESOURCE_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Validate a Kubernetes-style name (RFC 1123 label): namespace, secret and
/// kind cluster names all share this shape.
pub fn validate_resource_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 63 || !resource_name_re().is_match(name) {
        return Err(DeployError::Config(format!(
            "{field} '{name}' must be lowercase alphanumeric with hyphens (max 63 chars)"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
