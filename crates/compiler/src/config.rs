//! Compiler configuration
//!
//! A small knob set, loadable from TOML. Both options default to the
//! historical behavior: marker comments in the output, and code generation
//! proceeding even after semantic diagnostics (the output for such programs
//! is unspecified but the process still exits cleanly).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Write `# while` / `# for` / `# if` / `# or` marker comments into the
    /// generated assembly.
    pub emit_comments: bool,

    /// Run code generation even when semantic diagnostics were reported.
    pub continue_after_errors: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            emit_comments: true,
            continue_after_errors: true,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("invalid configuration: {}", e))
    }

    pub fn with_comments(mut self, emit_comments: bool) -> Self {
        self.emit_comments = emit_comments;
        self
    }

    pub fn with_continue_after_errors(mut self, continue_after_errors: bool) -> Self {
        self.continue_after_errors = continue_after_errors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert!(config.emit_comments);
        assert!(config.continue_after_errors);
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml("emit_comments = false").unwrap();
        assert!(!config.emit_comments);
        assert!(config.continue_after_errors);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(CompilerConfig::from_toml("emit_commentz = false").is_err());
    }

    #[test]
    fn test_from_toml_file() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "emit_comments = false").unwrap();
        writeln!(file, "continue_after_errors = false").unwrap();

        // The same round trip the CLI makes for --config.
        let content = std::fs::read_to_string(file.path()).unwrap();
        let config = CompilerConfig::from_toml(&content).unwrap();
        assert!(!config.emit_comments);
        assert!(!config.continue_after_errors);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_comments(false)
            .with_continue_after_errors(false);
        assert!(!config.emit_comments);
        assert!(!config.continue_after_errors);
    }
}
