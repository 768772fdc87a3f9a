//! Persisting generated source and running the target's formatter.
use std::path::Path;
use std::process::Command;

use crate::error::OutputError;

/// Writes `source` to `path`, creating parent directories.
///
/// A formatter that cannot be started or exits non-zero only logs a warning;
/// the unformatted file stays in place.
pub fn write_output(path: &Path, source: &str, formatter: Option<&[&str]>) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, source).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = source.len(), "wrote generated source");

    if let Some((program, args)) = formatter.and_then(<[&str]>::split_first) {
        run_formatter(program, args, path);
    }
    Ok(())
}

fn run_formatter(program: &str, args: &[&str], path: &Path) {
    match Command::new(program).args(args).arg(path).output() {
        Ok(output) if output.status.success() => {
            tracing::debug!(formatter = program, path = %path.display(), "formatted output");
        }
        Ok(output) => {
            tracing::warn!(
                formatter = program,
                path = %path.display(),
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "formatter failed, leaving output unformatted"
            );
        }
        Err(error) => {
            tracing::warn!(formatter = program, %error, "could not run formatter, leaving output unformatted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generated/client/index.ts");
        write_output(&path, "export {};\n", None).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export {};\n");
    }

    #[test]
    #[traced_test]
    fn missing_formatter_is_only_a_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.rs");
        write_output(&path, "pub struct A;\n", Some(&["rpcgen-no-such-formatter", "--check"])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pub struct A;\n");
        assert!(logs_contain("could not run formatter"));
    }

    #[test]
    fn unwritable_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_output(dir.path(), "x", None).unwrap_err();
        assert!(matches!(err, OutputError::Write { .. }));
    }
}
