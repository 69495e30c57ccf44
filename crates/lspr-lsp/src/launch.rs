//! Per-language launch table for language servers

use crate::error::{LspError, LspResult};
use lspr_config::ServerOverride;
use std::collections::HashMap;
use std::fmt;

/// Languages with a known language server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::TypeScript,
        Language::JavaScript,
        Language::Python,
        Language::Rust,
        Language::Go,
    ];

    /// Parse a language name (case-insensitive)
    pub fn parse(name: &str) -> LspResult<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "typescript" => Ok(Self::TypeScript),
            "javascript" => Ok(Self::JavaScript),
            "python" => Ok(Self::Python),
            "rust" => Ok(Self::Rust),
            "go" => Ok(Self::Go),
            _ => Err(LspError::UnsupportedLanguage {
                language: name.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
        }
    }

    /// `languageId` sent with `textDocument/didOpen`
    pub fn language_id(&self) -> &'static str {
        self.as_str()
    }

    /// Source file extensions scanned when collecting workspace files
    pub fn file_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["ts", "tsx"],
            Self::JavaScript => &["js", "jsx"],
            Self::Python => &["py"],
            Self::Rust => &["rs"],
            Self::Go => &["go"],
        }
    }

    /// Glob patterns (relative to a workspace root) matching this language's files
    pub fn file_globs(&self) -> Vec<String> {
        self.file_extensions()
            .iter()
            .map(|ext| format!("**/*.{}", ext))
            .collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which server to run for a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum ServerVariant {
    #[default]
    Default,
    Lint,
}

impl ServerVariant {
    pub fn parse(tag: Option<&str>) -> LspResult<Self> {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("default") => Ok(Self::Default),
            Some("lint") => Ok(Self::Lint),
            Some(_) => Err(LspError::UnsupportedVariant {
                variant: tag.unwrap_or_default().to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Lint => "lint",
        }
    }
}

impl fmt::Display for ServerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to start one language server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Human-readable server name used in error messages
    pub server_name: String,
    pub command: String,
    pub args: Vec<String>,
    pub install_hint: String,
}

impl LaunchSpec {
    fn new(server_name: &str, command: &str, args: &[&str], install_hint: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            install_hint: install_hint.to_string(),
        }
    }
}

/// A launch table lookup: the resolved language and variant plus the spec to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLaunch {
    pub language: Language,
    pub variant: ServerVariant,
    pub spec: LaunchSpec,
}

/// Maps (language, variant) to the server that handles it
#[derive(Debug, Clone)]
pub struct LaunchTable {
    entries: HashMap<(Language, ServerVariant), LaunchSpec>,
}

impl Default for LaunchTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl LaunchTable {
    /// The built-in servers
    pub fn builtin() -> Self {
        let typescript = LaunchSpec::new(
            "TypeScript Language Server",
            "typescript-language-server",
            &["--stdio"],
            "npm install -g typescript-language-server typescript",
        );

        let mut entries = HashMap::new();
        entries.insert(
            (Language::TypeScript, ServerVariant::Default),
            typescript.clone(),
        );
        entries.insert((Language::JavaScript, ServerVariant::Default), typescript);
        entries.insert(
            (Language::Python, ServerVariant::Default),
            LaunchSpec::new(
                "Pyright Language Server",
                "pyright-langserver",
                &["--stdio"],
                "npm install -g pyright",
            ),
        );
        entries.insert(
            (Language::Python, ServerVariant::Lint),
            LaunchSpec::new(
                "Ruff Server",
                "ruff",
                &["server", "--stdio"],
                "pip install ruff",
            ),
        );
        entries.insert(
            (Language::Rust, ServerVariant::Default),
            LaunchSpec::new(
                "Rust Analyzer",
                "rust-analyzer",
                &[],
                "rustup component add rust-analyzer",
            ),
        );
        entries.insert(
            (Language::Go, ServerVariant::Default),
            LaunchSpec::new(
                "Go Language Server (gopls)",
                "gopls",
                &[],
                "go install golang.org/x/tools/gopls@latest",
            ),
        );

        Self { entries }
    }

    /// Replace the command of entries named by configuration.
    ///
    /// An override for a variant the table lacks adds a new entry.
    pub fn with_overrides(mut self, overrides: &[ServerOverride]) -> LspResult<Self> {
        for server in overrides {
            let language = Language::parse(&server.language)?;
            let variant = ServerVariant::parse(server.variant.as_deref())?;
            let Some((command, args)) = server.command.split_first() else {
                return Err(LspError::SpawnFailed {
                    server: format!("{} {} server", language, variant),
                    message: "configured command is empty".to_string(),
                });
            };

            let entry = self
                .entries
                .entry((language, variant))
                .or_insert_with(|| LaunchSpec {
                    server_name: format!("{} ({} {})", command, language, variant),
                    command: String::new(),
                    args: Vec::new(),
                    install_hint: format!("check the '{}' server configured for {}", command, language),
                });
            entry.command = command.clone();
            entry.args = args.to_vec();

            tracing::debug!(
                language = %language,
                variant = %variant,
                command = %command,
                "Applied LSP server override"
            );
        }
        Ok(self)
    }

    /// Look up the server for a language name and optional variant tag.
    ///
    /// A variant missing for the language falls back to its default server,
    /// and the returned variant reflects that.
    pub fn resolve(&self, language: &str, variant: Option<&str>) -> LspResult<ResolvedLaunch> {
        let language = Language::parse(language)?;
        let requested = ServerVariant::parse(variant)?;

        let variant = if self.entries.contains_key(&(language, requested)) {
            requested
        } else {
            ServerVariant::Default
        };

        let spec = self
            .entries
            .get(&(language, variant))
            .cloned()
            .ok_or_else(|| LspError::UnsupportedLanguage {
                language: language.to_string(),
            })?;

        Ok(ResolvedLaunch {
            language,
            variant,
            spec,
        })
    }

    pub fn get(&self, language: Language, variant: ServerVariant) -> Option<&LaunchSpec> {
        self.entries.get(&(language, variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builtin_entries() {
        let table = LaunchTable::builtin();

        let ts = table.resolve("typescript", None).unwrap();
        assert_eq!(ts.spec.command, "typescript-language-server");
        assert_eq!(ts.spec.args, vec!["--stdio".to_string()]);

        let js = table.resolve("javascript", None).unwrap();
        assert_eq!(js.spec, ts.spec);
        assert_eq!(js.language, Language::JavaScript);

        let ruff = table.resolve("python", Some("lint")).unwrap();
        assert_eq!(ruff.spec.server_name, "Ruff Server");
        assert_eq!(ruff.spec.args, vec!["server".to_string(), "--stdio".to_string()]);
        assert_eq!(ruff.variant, ServerVariant::Lint);

        let rust = table.resolve("rust", None).unwrap();
        assert!(rust.spec.args.is_empty());
        assert_eq!(rust.spec.install_hint, "rustup component add rust-analyzer");
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = LaunchTable::builtin();
        assert_eq!(table.resolve("Go", None).unwrap().spec.command, "gopls");
    }

    #[test]
    fn test_unsupported_language() {
        let err = LaunchTable::builtin().resolve("cobol", None).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported language: cobol");
    }

    #[test]
    fn test_lint_falls_back_to_default_server() {
        let table = LaunchTable::builtin();
        let resolved = table.resolve("go", Some("lint")).unwrap();
        assert_eq!(resolved.variant, ServerVariant::Default);
        assert_eq!(resolved.spec.command, "gopls");
    }

    #[test]
    fn test_unknown_variant_rejected() {
        assert!(matches!(
            LaunchTable::builtin().resolve("python", Some("format")),
            Err(LspError::UnsupportedVariant { .. })
        ));
    }

    #[test]
    fn test_override_replaces_command_but_keeps_install_hint() {
        let table = LaunchTable::builtin()
            .with_overrides(&[ServerOverride {
                language: "python".to_string(),
                variant: None,
                command: vec!["/opt/pyright/bin/pyright-langserver".to_string(), "--stdio".to_string()],
            }])
            .unwrap();

        let python = table.resolve("python", None).unwrap();
        assert_eq!(python.spec.command, "/opt/pyright/bin/pyright-langserver");
        assert_eq!(python.spec.install_hint, "npm install -g pyright");
    }

    #[test]
    fn test_file_globs() {
        assert_eq!(
            Language::TypeScript.file_globs(),
            vec!["**/*.ts".to_string(), "**/*.tsx".to_string()]
        );
        assert_eq!(Language::Python.file_globs(), vec!["**/*.py".to_string()]);
    }
}
