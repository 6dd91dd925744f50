//! Writes the generated artifacts into the target folder.
//!
//! The build file and both manifests are tool-owned and overwritten on every
//! run. The entry point, `go.mod` and `.dockerignore` belong to the user once
//! they exist and are only written when missing.

use crate::error::Result;
use crate::io::{self, Ownership};
use crate::paths;
use crate::target::DeploymentTarget;
use crate::templates;
use serde::Serialize;
use std::path::PathBuf;

pub use crate::io::WriteStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub status: WriteStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub name: String,
    pub image_tag: String,
    pub files: Vec<WrittenFile>,
}

impl GenerationReport {
    /// True when the default entry point was synthesized on this run.
    pub fn synthesized_entry_point(&self) -> bool {
        self.files.iter().any(|f| {
            f.status == WriteStatus::Created
                && f.path.file_name().and_then(|n| n.to_str()) == Some(paths::ENTRY_POINT)
        })
    }
}

/// Render and write every artifact for `target`.
pub fn generate(target: &DeploymentTarget) -> Result<GenerationReport> {
    let folder = &target.folder;
    let mut files = Vec::new();

    let user = [
        (paths::entry_point_path(folder), templates::render_entry_point(target)),
        (paths::go_mod_path(folder), templates::render_go_mod(target)),
        (folder.join(paths::DOCKERIGNORE), templates::render_dockerignore()),
    ];
    let generated = [
        (paths::dockerfile_path(folder), templates::render_dockerfile(target)),
        (paths::deployment_manifest_path(folder), templates::render_deployment(target)),
        (paths::service_manifest_path(folder), templates::render_service(target)),
    ];
    let artifacts = user
        .into_iter()
        .map(|(path, content)| (path, content, Ownership::User))
        .chain(
            generated
                .into_iter()
                .map(|(path, content)| (path, content, Ownership::Generated)),
        );

    for (path, content, ownership) in artifacts {
        let status = io::write_file(&path, content.as_bytes(), ownership)?;
        if ownership == Ownership::User && status == WriteStatus::Created {
            tracing::info!(path = %path.display(), "synthesized default file");
        }
        files.push(WrittenFile { path, status });
    }

    Ok(GenerationReport {
        name: target.name.clone(),
        image_tag: target.image_tag.clone(),
        files,
    })
}
