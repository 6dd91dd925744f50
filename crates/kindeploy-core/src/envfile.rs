//! Reading the local `KEY=VALUE` file that backs the cluster secret.
//!
//! Only key names are ever surfaced; values stay in the file and go straight
//! to `kubectl create secret --from-env-file`.

/// A line `kubectl --from-env-file` will reject or misread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLint {
    pub line: usize,
    pub message: String,
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Key names in file order, comments and blank lines skipped.
pub fn parse_env_key_names(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|l| is_content(l))
        .filter_map(|l| l.split_once('=').map(|(k, _)| k.trim().to_string()))
        .filter(|k| !k.is_empty())
        .collect()
}

pub fn lint_env(content: &str) -> Vec<EnvLint> {
    let mut problems = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if !is_content(line) {
            continue;
        }
        let line_no = idx + 1;
        match line.split_once('=') {
            None => problems.push(EnvLint {
                line: line_no,
                message: "expected KEY=VALUE".to_string(),
            }),
            Some((key, value)) => {
                if key.trim().is_empty() {
                    problems.push(EnvLint {
                        line: line_no,
                        message: "empty key".to_string(),
                    });
                } else if key.ends_with(' ') || value.starts_with(' ') {
                    problems.push(EnvLint {
                        line: line_no,
                        message: format!("spaces around '=' for key '{}'", key.trim()),
                    });
                } else if key.contains(char::is_whitespace) {
                    problems.push(EnvLint {
                        line: line_no,
                        message: format!("key '{}' contains whitespace", key.trim()),
                    });
                }
            }
        }
    }
    problems
}
