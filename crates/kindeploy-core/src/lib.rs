pub mod apply;
pub mod cluster;
pub mod config;
pub mod envfile;
pub mod error;
pub mod forward;
pub mod image;
pub mod io;
pub mod manifest;
pub mod paths;
pub mod port;
pub mod runner;
pub mod secret;
pub mod target;
pub mod templates;
pub mod tools;

pub use error::{DeployError, Result};
