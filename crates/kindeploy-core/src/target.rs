//! The deployment target: everything derived once from the user's folder and
//! port, immutable for the rest of the run.

use crate::config::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Used when the folder name has no usable characters.
pub const DEFAULT_APP_NAME: &str = "go-app";

/// Longest name for which `<name>-service` is still a valid 63-char label.
const MAX_APP_NAME_LEN: usize = 63 - "-service".len();

/// Derive a cluster-safe application name from a folder's base name.
///
/// Lower-cases, turns `_` and spaces into `-`, drops everything that is not
/// an ASCII alphanumeric or `-`, and trims `-` from both ends. A leading digit
/// gets an `app-` prefix because Service names must start with a letter.
pub fn derive_app_name(folder_name: &str) -> String {
    let normalized: String = folder_name
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    let mut name = normalized.trim_matches('-').to_string();
    if name.is_empty() {
        return DEFAULT_APP_NAME.to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("app-{name}");
    }
    if name.len() > MAX_APP_NAME_LEN {
        name.truncate(MAX_APP_NAME_LEN);
        name = name.trim_end_matches('-').to_string();
    }
    name
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentTarget {
    pub folder: PathBuf,
    pub name: String,
    pub image_tag: String,
    pub port: u16,
    pub secret_name: String,
    pub cluster_name: String,
    pub namespace: String,
}

impl DeploymentTarget {
    pub fn new(folder: &Path, port: u16, config: &Config) -> Self {
        let base = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = derive_app_name(&base);
        Self {
            folder: folder.to_path_buf(),
            image_tag: format!("{name}-image:latest"),
            name,
            port,
            secret_name: config.secret_name.clone(),
            cluster_name: config.cluster_name.clone(),
            namespace: config.namespace.clone(),
        }
    }

    pub fn deployment_name(&self) -> String {
        format!("{}-deployment", self.name)
    }

    pub fn service_name(&self) -> String {
        format!("{}-service", self.name)
    }

    pub fn container_name(&self) -> String {
        format!("{}-container", self.name)
    }

    /// `app=<name>` label selector shared by the workload and the service.
    pub fn selector(&self) -> String {
        format!("app={}", self.name)
    }

    pub fn local_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(name: &str) {
        assert!(!name.is_empty());
        assert!(
            name.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "bad chars in {name}"
        );
        assert!(!name.starts_with('-') && !name.ends_with('-'), "edge hyphen in {name}");
    }

    #[test]
    fn mixed_input_is_normalized() {
        assert_eq!(derive_app_name("My_Cool App"), "my-cool-app");
        assert_eq!(derive_app_name("hello-World!"), "hello-world");
        assert_eq!(derive_app_name("__svc__"), "svc");
        assert_eq!(derive_app_name("  spaced  "), "spaced");
    }

    #[test]
    fn symbols_are_stripped() {
        for input in ["a@b#c", "Web.Server(v2)", "-_- x -_-", "Ünïcode_svc"] {
            let name = derive_app_name(input);
            assert_well_formed(&name);
        }
        assert_eq!(derive_app_name("Web.Server(v2)"), "webserverv2");
    }

    #[test]
    fn all_symbol_input_yields_default() {
        assert_eq!(derive_app_name("!!!@@@"), DEFAULT_APP_NAME);
        assert_eq!(derive_app_name("___"), DEFAULT_APP_NAME);
        assert_eq!(derive_app_name(""), DEFAULT_APP_NAME);
    }

    #[test]
    fn leading_digit_gets_prefix() {
        assert_eq!(derive_app_name("2048-game"), "app-2048-game");
    }

    #[test]
    fn long_names_fit_service_label() {
        let name = derive_app_name(&"a-".repeat(60));
        assert_well_formed(&name);
        assert!(format!("{name}-service").len() <= 63);
    }

    #[test]
    fn target_derives_resource_names() {
        let cfg = Config::default();
        let target = DeploymentTarget::new(Path::new("/work/My_Service"), 9090, &cfg);
        assert_eq!(target.name, "my-service");
        assert_eq!(target.image_tag, "my-service-image:latest");
        assert_eq!(target.deployment_name(), "my-service-deployment");
        assert_eq!(target.service_name(), "my-service-service");
        assert_eq!(target.container_name(), "my-service-container");
        assert_eq!(target.selector(), "app=my-service");
        assert_eq!(target.local_url(), "http://localhost:9090");
        assert_eq!(target.cluster_name, "go-cluster");
        assert_eq!(target.secret_name, "app-secret");
    }

    #[test]
    fn root_folder_uses_default_name() {
        let target = DeploymentTarget::new(Path::new("/"), 8080, &Config::default());
        assert_eq!(target.name, DEFAULT_APP_NAME);
    }
}
