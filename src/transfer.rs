//! Typed command lines for external tools.
//!
//! Commands are built from structs instead of format strings so that flag
//! order and quoting live in one place. The executor still runs them through
//! a shell, hence [`ShellCommand::to_command_line`].

use std::path::PathBuf;

/// Default object-store move command
pub const DEFAULT_MOVER: &str = "aws s3 mv";

/// A command rendered to a single shell line.
///
/// # Contract
///
/// - `program()` is inserted verbatim and may contain several words
///   (e.g. `aws s3 mv`).
/// - `to_cli_args()` returns raw arguments; quoting happens in
///   `to_command_line()`.
pub trait ShellCommand {
    fn program(&self) -> &str;

    fn to_cli_args(&self) -> Vec<String>;

    fn to_command_line(&self) -> String {
        let mut line = self.program().to_string();
        for arg in self.to_cli_args() {
            line.push(' ');
            line.push_str(&shell_quote(&arg));
        }
        line
    }
}

/// Quote `arg` for a POSIX shell when it holds anything beyond safe characters
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Move a local file or tree to a remote object-store URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreMove {
    pub program: String,
    pub local: PathBuf,
    pub remote: String,
    pub recursive: bool,
}

impl ObjectStoreMove {
    pub fn new(program: impl Into<String>, local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            local: local.into(),
            remote: remote.into(),
            recursive: false,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

impl ShellCommand for ObjectStoreMove {
    fn program(&self) -> &str {
        &self.program
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(3);
        if self.recursive {
            args.push("--recursive".to_string());
        }
        args.push(self.local.display().to_string());
        args.push(self.remote.clone());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_move() {
        let cmd = ObjectStoreMove::new(
            DEFAULT_MOVER,
            "/results/ccf_Ex_488_Em_525_process_output.json",
            "s3://aind-open-data/SmartSPIM_000/ccf_Ex_488_Em_525_process_output.json",
        );
        assert_eq!(
            cmd.to_command_line(),
            "aws s3 mv /results/ccf_Ex_488_Em_525_process_output.json \
             s3://aind-open-data/SmartSPIM_000/ccf_Ex_488_Em_525_process_output.json"
        );
    }

    #[test]
    fn test_recursive_move_flag_first() {
        let cmd = ObjectStoreMove::new(DEFAULT_MOVER, "/results", "s3://b/d").recursive();
        assert_eq!(cmd.to_cli_args(), vec!["--recursive", "/results", "s3://b/d"]);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain/path-1.json"), "plain/path-1.json");
        assert_eq!(shell_quote("with space"), "'with space'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }
}
