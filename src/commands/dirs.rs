//! `dirs`: file and directory operations
//!
//! Parameters are `<op> <path> [arg]`, as a line or a list. Paths are made
//! absolute against the working directory and normalised lexically before
//! use. `delete` refuses the filesystem root, the home directory, and any
//! path directly below either of them.

use super::archive::extract_zip;
use crate::executor::{CommandHandler, StepContext, StepOutput};
use crate::pipeline::{Params, StepError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const CMD: &str = "dirs";

/// A parsed `dirs` operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirOp {
    /// Create a directory and its parents
    Mkdir(PathBuf),
    /// Remove a file or directory tree
    Delete(PathBuf),
    /// Extract a zip archive
    Unzip {
        /// Archive
        src: PathBuf,
        /// Destination directory
        dest: PathBuf,
    },
    /// Move, replacing whatever is at the destination
    Move {
        /// Source
        src: PathBuf,
        /// Destination
        dest: PathBuf,
    },
    /// Rename within the same parent directory
    Rename {
        /// Path to rename
        path: PathBuf,
        /// New file name
        new_name: String,
    },
    /// List a path and all its ancestors
    WalkUp(PathBuf),
    /// List a directory tree
    WalkDown(PathBuf),
    /// List the files (not directories) in a directory
    ListFiles(PathBuf),
}

impl DirOp {
    /// Parses `<op> <path> [arg]` with relative paths taken from `cwd`
    ///
    /// # Errors
    ///
    /// Returns [`StepError::InvalidParams`] for unknown operations or missing
    /// arguments.
    pub fn parse(words: &[String], cwd: &Path) -> Result<Self, StepError> {
        let [op, path, rest @ ..] = words else {
            return Err(StepError::invalid_params(CMD, "expected <op> <path> [arg]"));
        };
        let path = absolute(Path::new(path), cwd);
        let second = |what: &str| {
            rest.first()
                .ok_or_else(|| StepError::invalid_params(CMD, format!("{op} requires {what}")))
        };

        Ok(match op.as_str() {
            "mkdir" => Self::Mkdir(path),
            "delete" => Self::Delete(path),
            "unzip" => Self::Unzip {
                src: path,
                dest: absolute(Path::new(second("a destination")?), cwd),
            },
            "mv" => Self::Move {
                src: path,
                dest: absolute(Path::new(second("a destination")?), cwd),
            },
            "rename" => {
                let new_name = second("a new name")?;
                if new_name.contains('/') || new_name == ".." || new_name == "." {
                    return Err(StepError::invalid_params(
                        CMD,
                        format!("'{new_name}' is not a plain file name"),
                    ));
                }
                Self::Rename {
                    path,
                    new_name: new_name.clone(),
                }
            }
            "walkup" => Self::WalkUp(path),
            "walkdown" => Self::WalkDown(path),
            "listfiles" => Self::ListFiles(path),
            other => {
                return Err(StepError::invalid_params(
                    CMD,
                    format!("unsupported file operation: {other}"),
                ));
            }
        })
    }

    /// Performs the operation
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Refused`] when a delete guard trips and
    /// [`StepError::Io`] for filesystem failures.
    pub fn apply(&self, home: Option<&Path>) -> Result<Value, StepError> {
        match self {
            Self::Mkdir(path) => {
                fs::create_dir_all(path).map_err(|e| io_error("create", path, &e))?;
                Ok(json!({ "created": display(path) }))
            }
            Self::Delete(path) => {
                check_delete_allowed(path, home)?;
                remove(path)?;
                Ok(json!({ "deleted": display(path) }))
            }
            Self::Unzip { src, dest } => {
                let files = extract_zip(src, dest)?;
                Ok(json!({ "unzippedTo": display(dest), "files": files.len() }))
            }
            Self::Move { src, dest } => {
                if fs::symlink_metadata(dest).is_ok() {
                    check_delete_allowed(dest, home)?;
                    remove(dest)?;
                }
                fs::rename(src, dest).map_err(|e| io_error("move", src, &e))?;
                Ok(json!({ "moved": display(src), "to": display(dest) }))
            }
            Self::Rename { path, new_name } => {
                let target = path
                    .parent()
                    .ok_or_else(|| StepError::Refused("cannot rename the filesystem root".into()))?
                    .join(new_name);
                fs::rename(path, &target).map_err(|e| io_error("rename", path, &e))?;
                Ok(json!({ "renamed": display(path), "to": display(&target) }))
            }
            Self::WalkUp(path) => Ok(json!(path.ancestors().map(display).collect::<Vec<_>>())),
            Self::WalkDown(path) => {
                let mut walked = Vec::new();
                for entry in WalkDir::new(path).sort_by_file_name() {
                    let entry = entry.map_err(|e| StepError::Io(e.to_string()))?;
                    walked.push(display(entry.path()));
                }
                Ok(json!(walked))
            }
            Self::ListFiles(path) => {
                let mut names = Vec::new();
                for entry in fs::read_dir(path).map_err(|e| io_error("list", path, &e))? {
                    let entry = entry?;
                    if !entry.file_type()?.is_dir() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names.sort();
                Ok(json!(names))
            }
        }
    }
}

/// Refuses deletes of `/`, `home`, and anything directly below either
///
/// `path` must already be absolute and normalised.
///
/// # Errors
///
/// Returns [`StepError::Refused`] naming the guard that tripped.
pub fn check_delete_allowed(path: &Path, home: Option<&Path>) -> Result<(), StepError> {
    let Some(parent) = path.parent() else {
        return Err(StepError::Refused("cannot delete the filesystem root".to_string()));
    };
    if parent.parent().is_none() {
        return Err(StepError::Refused(format!(
            "cannot delete {}: it is directly below the root",
            path.display()
        )));
    }
    if let Some(home) = home.map(normalize) {
        if path == home {
            return Err(StepError::Refused("cannot delete the home directory".to_string()));
        }
        if parent == home {
            return Err(StepError::Refused(format!(
                "cannot delete {}: it is directly below the home directory",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Joins relative paths onto `cwd` and normalises the result
fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    }
}

/// Resolves `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn remove(path: &Path) -> Result<(), StepError> {
    let meta = fs::symlink_metadata(path).map_err(|e| io_error("delete", path, &e))?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| io_error("delete", path, &e))
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn io_error(action: &str, path: &Path, err: &std::io::Error) -> StepError {
    StepError::Io(format!("failed to {action} {}: {err}", path.display()))
}

/// `dirs <op> <path> [arg]`
#[derive(Debug, Clone, Copy, Default)]
pub struct DirsCommand;

#[async_trait]
impl CommandHandler for DirsCommand {
    fn name(&self) -> &str {
        CMD
    }

    fn help(&self) -> &str {
        "Create, delete, move, unzip and list files and directories"
    }

    async fn execute(&self, params: &Params, ctx: &StepContext<'_>) -> Result<StepOutput, StepError> {
        let words = params.words(CMD)?;
        let cwd = std::env::current_dir()?;
        let op = DirOp::parse(&words, &cwd)?;
        tracing::info!(step = %ctx.step_name, op = ?op, "Running file operation");

        let home = ::dirs::home_dir();
        let response = tokio::task::spawn_blocking(move || op.apply(home.as_deref()))
            .await
            .map_err(|e| StepError::Io(format!("file operation task failed: {e}")))??;
        Ok(StepOutput::respond(response))
    }
}
