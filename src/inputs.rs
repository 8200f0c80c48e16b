//! Pre-flight checks for stage inputs
//!
//! - Required local inputs (files or directories) exist
//! - Required external programs can be found
//!
//! Checks only report; `ensure_*` helpers turn a non-empty report into an error.

use crate::error::{Result, StageError};
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Return the required paths that do not exist, in input order.
///
/// Existence only: files and directories are treated the same and
/// permissions are not checked. Duplicates are kept.
pub fn missing_inputs<I, P>(required: I) -> Vec<String>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    required
        .into_iter()
        .filter(|path| !path.as_ref().exists())
        .map(|path| path.as_ref().display().to_string())
        .collect()
}

/// Fail with the full list of missing paths
pub fn ensure_inputs<I, P>(required: I) -> Result<()>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let missing = missing_inputs(required);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StageError::MissingInput { paths: missing })
    }
}

/// Regular file with at least one execute bit set
fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Check if a program can be executed by name
fn program_exists(program: &str) -> bool {
    if program.contains('/') {
        return is_executable(Path::new(program));
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
        .unwrap_or(false)
}

/// Return the programs that cannot be found on PATH
pub fn missing_programs(programs: &[&str]) -> Vec<String> {
    programs
        .iter()
        .filter(|program| !program_exists(program))
        .map(|program| (*program).to_string())
        .collect()
}

pub fn ensure_programs(programs: &[&str]) -> Result<()> {
    let missing = missing_programs(programs);
    if missing.is_empty() {
        tracing::debug!("Pre-flight: programs present: {:?}", programs);
        Ok(())
    } else {
        Err(StageError::MissingProgram { programs: missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_inputs_preserves_order() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        fs::write(&b, "").unwrap();

        let missing = missing_inputs([&a, &b, &c]);
        assert_eq!(
            missing,
            vec![a.display().to_string(), c.display().to_string()]
        );
    }

    #[test]
    fn test_missing_inputs_empty() {
        let none: Vec<String> = Vec::new();
        assert!(missing_inputs(&none).is_empty());
        assert!(ensure_inputs(&none).is_ok());
    }

    #[test]
    fn test_missing_inputs_keeps_duplicates() {
        let missing = missing_inputs(["/nonexistent/x", "/nonexistent/x"]);
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn test_directories_count_as_present() {
        let dir = TempDir::new().unwrap();
        assert!(missing_inputs([dir.path()]).is_empty());
    }

    #[test]
    fn test_ensure_inputs_reports_all() {
        let err = ensure_inputs(["/nonexistent/a", "/nonexistent/b"]).unwrap_err();
        match err {
            StageError::MissingInput { paths } => {
                assert_eq!(paths, vec!["/nonexistent/a", "/nonexistent/b"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_program_exists_bash() {
        assert!(program_exists("bash"), "bash should be available");
    }

    #[test]
    fn test_missing_programs() {
        let missing = missing_programs(&["bash", "this_program_definitely_does_not_exist_12345"]);
        assert_eq!(missing, vec!["this_program_definitely_does_not_exist_12345"]);
        assert!(ensure_programs(&["/nonexistent/tool"]).is_err());
    }

    #[test]
    fn test_program_without_execute_bit_is_missing() {
        let dir = TempDir::new().unwrap();
        let tool = dir.path().join("aws");
        fs::write(&tool, "#!/bin/sh\nexit 0\n").unwrap();
        let tool_path = tool.display().to_string();

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o644)).unwrap();
        assert_eq!(missing_programs(&[tool_path.as_str()]), vec![tool_path.clone()]);

        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(missing_programs(&[tool_path.as_str()]).is_empty());
    }
}
