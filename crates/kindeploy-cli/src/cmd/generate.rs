use crate::output::{print_json, print_table};
use crate::root;
use kindeploy_core::config::Config;
use kindeploy_core::manifest;
use kindeploy_core::port;
use kindeploy_core::target::DeploymentTarget;
use kindeploy_core::DeployError;
use std::path::{Path, PathBuf};

/// Write the build file, manifests and missing defaults without touching
/// the cluster. The folder defaults to the working directory and the port to
/// the configured default.
pub fn run(
    config_path: Option<&Path>,
    cwd: &Path,
    folder: Option<PathBuf>,
    port: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, _) = Config::resolve(config_path, cwd)?;
    config.validate()?;

    let folder = root::resolve_folder(folder.as_deref().unwrap_or(Path::new(".")), cwd)?;
    let port = match port {
        Some(raw) => port::parse_port(&raw, config.default_port)
            .map_err(|e| DeployError::InvalidInput(e.to_string()))?,
        None => config.default_port,
    };

    let target = DeploymentTarget::new(&folder, port, &config);
    let report = manifest::generate(&target)?;

    if json {
        return print_json(&report);
    }

    println!("app:   {}", report.name);
    println!("image: {}", report.image_tag);
    println!();
    let rows = report
        .files
        .iter()
        .map(|f| {
            let name = f
                .path
                .strip_prefix(&folder)
                .unwrap_or(&f.path)
                .display()
                .to_string();
            vec![name, f.status.as_str().to_string()]
        })
        .collect();
    print_table(&["FILE", "STATUS"], rows);
    Ok(())
}
