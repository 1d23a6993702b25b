//! Narrow interfaces to the outside world the resolver depends on.
//!
//! The resolver never touches the filesystem or runs code itself: it goes
//! through a [`FileReader`] and a [`CodeLoader`], always under a deadline
//! ([`run_with_timeout`]).

use crate::core::error::StarlogError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

pub trait FileReader: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>, StarlogError>;
}

pub trait CodeLoader: Send + Sync {
    fn get_variable(&self, module: &str, name: &str) -> Result<String, StarlogError>;
    fn call(&self, module: &str, func: &str) -> Result<String, StarlogError>;
}

/// Reads files relative to a base directory (the project directory).
pub struct FsFileReader {
    base: PathBuf,
}

impl FsFileReader {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }
}

impl FileReader for FsFileReader {
    fn read(&self, path: &str) -> Result<Vec<u8>, StarlogError> {
        let candidate = Path::new(path);
        let full = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.base.join(candidate)
        };
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StarlogError::NotFound(format!("file {}", full.display())))
            }
            Err(e) => Err(StarlogError::ExternalDependencyFailure(format!(
                "reading {}: {}",
                full.display(),
                e
            ))),
        }
    }
}

/// Treats a module as an executable under the project directory and invokes
/// it as `MODULE var NAME` or `MODULE call FUNC`; stdout is the value.
pub struct CommandCodeLoader {
    base: PathBuf,
}

impl CommandCodeLoader {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    fn module_path(&self, module: &str) -> Result<PathBuf, StarlogError> {
        let rel = Path::new(module);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StarlogError::InvalidArgument(format!(
                "module '{}' must be a relative path inside the project",
                module
            )));
        }
        let full = self.base.join(rel);
        if !full.exists() {
            return Err(StarlogError::NotFound(format!("module {}", full.display())));
        }
        Ok(full)
    }

    fn invoke(&self, module: &str, mode: &str, item: &str) -> Result<String, StarlogError> {
        let program = self.module_path(module)?;
        let output = Command::new(&program)
            .arg(mode)
            .arg(item)
            .current_dir(&self.base)
            .output()
            .map_err(|e| {
                StarlogError::ExternalDependencyFailure(format!(
                    "spawning {}: {}",
                    program.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(StarlogError::ExternalDependencyFailure(format!(
                "{} {} {} exited with {}: {}",
                module,
                mode,
                item,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .trim_end_matches('\n')
            .to_string())
    }
}

impl CodeLoader for CommandCodeLoader {
    fn get_variable(&self, module: &str, name: &str) -> Result<String, StarlogError> {
        self.invoke(module, "var", name)
    }

    fn call(&self, module: &str, func: &str) -> Result<String, StarlogError> {
        self.invoke(module, "call", func)
    }
}

/// Run `f` on a helper thread and give up after `timeout`.
///
/// A delegate that overruns is abandoned, not killed; its result is dropped.
pub fn run_with_timeout<T, F>(timeout: Duration, what: &str, f: F) -> Result<T, StarlogError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StarlogError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("starlog-delegate".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| StarlogError::ExternalDependencyFailure(format!("{}: {}", what, e)))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            tracing::warn!(delegate = what, timeout_ms = timeout.as_millis() as u64, "delegate timed out");
            Err(StarlogError::ExternalDependencyFailure(format!(
                "{} timed out after {}ms",
                what,
                timeout.as_millis()
            )))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(
            StarlogError::ExternalDependencyFailure(format!("{} terminated without a result", what)),
        ),
    }
}
