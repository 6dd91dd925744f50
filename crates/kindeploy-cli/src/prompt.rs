//! Interactive questions on a line-based reader/writer pair.
//!
//! Invalid answers are reported and asked again. End of input is an error
//! so a closed stdin never spins the loop.

use crate::root;
use kindeploy_core::port::{self, PortError};
use kindeploy_core::DeployError;
use std::io::{BufRead, Stdout, StdinLock, Write};
use std::path::{Path, PathBuf};

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, question: &str) -> Result<String, DeployError> {
        write!(self.output, "{question}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            writeln!(self.output)?;
            return Err(DeployError::InvalidInput(
                "input closed before an answer was given".to_string(),
            ));
        }
        Ok(line.trim().to_string())
    }

    fn reject(&mut self, reason: impl std::fmt::Display) -> Result<(), DeployError> {
        writeln!(self.output, "  {reason}")?;
        Ok(())
    }

    pub fn folder(&mut self, cwd: &Path) -> Result<PathBuf, DeployError> {
        loop {
            let answer = self.ask("Path to the Go application folder: ")?;
            match root::resolve_folder(Path::new(&answer), cwd) {
                Ok(folder) => return Ok(folder),
                Err(DeployError::InvalidInput(reason)) => self.reject(reason)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Ask until the answer is a valid port that `in_use` reports free.
    pub fn port(&mut self, default: u16, in_use: impl Fn(u16) -> bool) -> Result<u16, DeployError> {
        loop {
            let answer = self.ask(&format!("Application port (empty for {default}): "))?;
            match port::parse_port(&answer, default) {
                Ok(port) if in_use(port) => self.reject(format!(
                    "{}; choose a different port",
                    PortError::InUse(port)
                ))?,
                Ok(port) => return Ok(port),
                Err(e) => self.reject(e)?,
            }
        }
    }

    /// Yes/no question; anything but `y`/`yes` is no.
    pub fn confirm(&mut self, question: &str) -> Result<bool, DeployError> {
        let answer = self.ask(&format!("{question} (y/N): "))?;
        Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}
