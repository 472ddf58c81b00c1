//! Error taxonomy for prefetch requests.
//!
//! Every variant is fatal to the request that raised it. Library functions
//! return `anyhow::Result` and wrap these errors, so callers that need to
//! branch on the kind use `err.downcast_ref::<PrefetchError>()`.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// A typed failure of the prefetch pipeline.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum PrefetchError {
    #[error("invalid package spec `{spec}`: {reason}")]
    #[diagnostic(code(prefetch::input::invalid_package))]
    InvalidPackageSpec { spec: String, reason: String },

    #[error("conflicting packages for {key}: {first} X {second}")]
    #[diagnostic(
        code(prefetch::unique::duplicate_package),
        help("Each package may only be requested once per run")
    )]
    DuplicatePackageConflict {
        key: String,
        first: String,
        second: String,
    },

    #[error("conflicting {kind} entries for {key}: {first} X {second}")]
    #[diagnostic(code(prefetch::unique::duplicate_resource))]
    DuplicateResourceConflict {
        kind: &'static str,
        key: String,
        first: String,
        second: String,
    },

    #[error("artifact `{filename}` exists in the mirror with different content")]
    #[diagnostic(
        code(prefetch::repository::artifact_conflict),
        help("Two dependencies produced different files with the same name")
    )]
    ArtifactContentConflict {
        filename: String,
        existing: PathBuf,
        incoming: PathBuf,
        existing_sha256: String,
        incoming_sha256: String,
    },

    #[error("{} is outside of {}", path.display(), root.display())]
    #[diagnostic(code(prefetch::paths::escape))]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("`{command}` failed with exit code {}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    #[diagnostic(code(prefetch::process::failed))]
    SubprocessFailure {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    #[diagnostic(code(prefetch::process::timeout))]
    SubprocessTimeout { command: String, timeout: Duration },

    #[error("{}:{line}: {reason}", path.display())]
    #[diagnostic(code(prefetch::requirements::invalid))]
    InvalidRequirementsFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

impl PrefetchError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            PrefetchError::InvalidPackageSpec { spec, reason } => {
                Diagnostic::error(format!("invalid package `{}`", spec))
                    .with_context(reason.clone())
                    .with_suggestion("Specify packages as `pip:<path>` or a JSON object")
            }

            PrefetchError::DuplicatePackageConflict { key, first, second } => {
                Diagnostic::error(format!("package {} was requested more than once", key))
                    .with_context(format!("first: {}", first))
                    .with_context(format!("second: {}", second))
                    .with_suggestion("Remove the duplicate package from the request")
            }

            PrefetchError::DuplicateResourceConflict {
                kind,
                key,
                first,
                second,
            } => Diagnostic::error(format!("conflicting {} for {}", kind, key))
                .with_context(format!("first: {}", first))
                .with_context(format!("second: {}", second)),

            PrefetchError::ArtifactContentConflict {
                filename,
                existing,
                incoming,
                existing_sha256,
                incoming_sha256,
            } => Diagnostic::error(format!(
                "two different artifacts are named `{}`",
                filename
            ))
            .with_location(existing)
            .with_context(format!("{} (sha256:{})", existing.display(), existing_sha256))
            .with_context(format!("{} (sha256:{})", incoming.display(), incoming_sha256))
            .with_suggestion("Pin both packages to the same artifact")
            .with_suggestion("Clear the mirror directory if it holds a stale artifact"),

            PrefetchError::PathEscape { path, root } => {
                Diagnostic::error(format!("{} escapes its root directory", path.display()))
                    .with_context(format!("root: {}", root.display()))
            }

            PrefetchError::SubprocessFailure {
                command,
                exit_code,
                stderr,
            } => {
                let mut diag = Diagnostic::error(format!("`{}` failed", command));
                if let Some(code) = exit_code {
                    diag = diag.with_context(format!("exit code: {}", code));
                }
                for line in stderr.lines().filter(|l| !l.trim().is_empty()).take(20) {
                    diag = diag.with_context(line.to_string());
                }
                diag
            }

            PrefetchError::SubprocessTimeout { command, timeout } => Diagnostic::error(format!(
                "`{}` did not finish within {}s",
                command,
                timeout.as_secs()
            ))
            .with_suggestion("Raise `[process] timeout` in the prefetch config"),

            PrefetchError::InvalidRequirementsFile { path, line, reason } => {
                Diagnostic::error(reason.clone())
                    .with_location(path)
                    .with_context(format!("line {}", line))
            }
        }
    }
}
