//! Command value type for describing program invocations

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Privilege-elevation policy for a command.
///
/// This is an abstract two-level policy; each driver binds it to whatever
/// concrete mechanism its backend offers (a `pkexec` prefix for local
/// children, a declarative flag in the spawn request for channel execution).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Elevate {
    /// Run with the caller's privileges.
    #[default]
    None,
    /// Attempt elevation, falling back to the caller's privileges.
    Try,
    /// Elevation is mandatory.
    Require,
}

impl Elevate {
    /// Whether any elevation was requested.
    pub fn requested(self) -> bool {
        !matches!(self, Elevate::None)
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

fn is_no_elevation(v: &Elevate) -> bool {
    !v.requested()
}

/// Options applied when spawning a command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOptions {
    /// Working directory for the process
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// Environment variable overrides
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environ: Option<BTreeMap<String, String>>,
    /// Request a pseudo-terminal for the process
    #[serde(skip_serializing_if = "is_false")]
    pub pty: bool,
    /// Privilege-elevation policy
    #[serde(rename = "superuser", skip_serializing_if = "is_no_elevation")]
    pub elevate: Elevate,
    /// Synthetic program name used in diagnostic prefixes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg0: Option<String>,
}

impl CommandOptions {
    /// Set the working directory.
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Set an environment variable override.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environ
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Request a pseudo-terminal.
    pub fn pty(mut self) -> Self {
        self.pty = true;
        self
    }

    /// Set the privilege-elevation policy.
    pub fn elevate(mut self, policy: Elevate) -> Self {
        self.elevate = policy;
        self
    }

    /// Set the synthetic program name used in diagnostics.
    pub fn arg0(mut self, arg0: impl Into<String>) -> Self {
        self.arg0 = Some(arg0.into());
        self
    }
}

/// Immutable description of a program invocation.
///
/// `Command` is pure data: an argument vector plus spawn options. It has no
/// behavior beyond construction and rendering; validation happens when a
/// driver spawns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    argv: Vec<String>,
    options: CommandOptions,
}

impl Command {
    /// Create a command from an argument vector with default options.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_options(argv, CommandOptions::default())
    }

    /// Create a command from an argument vector and options.
    pub fn with_options<I, S>(argv: I, options: CommandOptions) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            options,
        }
    }

    /// Wrap a bash script body in an interpreter invocation.
    ///
    /// The script becomes `argv[0]`-addressable under a synthetic name so
    /// error prefixes stay readable; `args` are passed through as the
    /// script's positional parameters.
    pub fn bash<S: Into<String>>(
        script: impl Into<String>,
        args: impl IntoIterator<Item = S>,
        mut options: CommandOptions,
    ) -> Self {
        let arg0 = options.arg0.get_or_insert_with(|| "bash-script".to_string()).clone();
        let mut argv = vec![
            "/usr/bin/env".to_string(),
            "bash".to_string(),
            "-c".to_string(),
            script.into(),
            arg0,
        ];
        argv.extend(args.into_iter().map(Into::into));
        Self { argv, options }
    }

    /// Wrap an inline python script in an interpreter invocation.
    pub fn python<S: Into<String>>(
        script: impl Into<String>,
        args: impl IntoIterator<Item = S>,
        mut options: CommandOptions,
    ) -> Self {
        options.arg0.get_or_insert_with(|| "python-script".to_string());
        let mut argv = vec![
            "/usr/bin/env".to_string(),
            "python3".to_string(),
            "-c".to_string(),
            script.into(),
        ];
        argv.extend(args.into_iter().map(Into::into));
        Self { argv, options }
    }

    /// Get the argument vector.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Get the spawn options.
    pub fn options(&self) -> &CommandOptions {
        &self.options
    }

    /// Get the name used in diagnostic prefixes: the `arg0` override if set,
    /// else `argv[0]`, else the empty string.
    pub fn get_name(&self) -> &str {
        self.options
            .arg0
            .as_deref()
            .unwrap_or_else(|| self.argv.first().map(String::as_str).unwrap_or(""))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Argv and options verbatim, no redaction, for debuggability.
        write!(f, "Command({:?}, {:?})", self.argv, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_creation() {
        let cmd = Command::new(["echo", "hello"]);
        assert_eq!(cmd.get_name(), "echo");
        assert_eq!(cmd.argv(), ["echo", "hello"]);
    }

    #[test]
    fn test_empty_argv_name() {
        let cmd = Command::new(Vec::<String>::new());
        assert_eq!(cmd.get_name(), "");
    }

    #[test]
    fn test_arg0_override() {
        let cmd = Command::with_options(["ls"], CommandOptions::default().arg0("list-files"));
        assert_eq!(cmd.get_name(), "list-files");
    }

    #[test]
    fn test_bash_command_shape() {
        let cmd = Command::bash("echo \"$1\"", ["world"], CommandOptions::default());
        assert_eq!(
            cmd.argv(),
            [
                "/usr/bin/env",
                "bash",
                "-c",
                "echo \"$1\"",
                "bash-script",
                "world"
            ]
        );
        assert_eq!(cmd.get_name(), "bash-script");
    }

    #[test]
    fn test_python_command_shape() {
        let cmd = Command::python("print('hi')", Vec::<String>::new(), CommandOptions::default());
        assert_eq!(cmd.argv(), ["/usr/bin/env", "python3", "-c", "print('hi')"]);
        assert_eq!(cmd.get_name(), "python-script");
    }

    #[test]
    fn test_options_serialization_omits_defaults() {
        let options = CommandOptions::default();
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json, serde_json::json!({}));

        let options = CommandOptions::default()
            .directory("/tmp")
            .elevate(Elevate::Require);
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"directory": "/tmp", "superuser": "require"})
        );
    }

    #[test]
    fn test_display_renders_argv_verbatim() {
        let cmd = Command::new(["echo", "hello world"]);
        let rendered = cmd.to_string();
        assert!(rendered.contains("echo"));
        assert!(rendered.contains("hello world"));
    }
}
