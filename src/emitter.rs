//! Writes rendered packages to disk.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::renderer::RenderedFile;

/// Ensures the output directory is safe to write to.
///
/// # Arguments
/// * `output_dir` - Target directory path for the package
/// * `force` - Whether writing into an existing directory is allowed
///
/// # Returns
/// * `Result<PathBuf>` - Validated output directory path
///
/// # Errors
/// * Returns `Error::OutputDirectoryExistsError` if the directory exists and force is false
pub fn ensure_output_dir<P: AsRef<Path>>(output_dir: P, force: bool) -> Result<PathBuf> {
    let output_dir = output_dir.as_ref();
    if output_dir.exists() && !force {
        return Err(Error::OutputDirectoryExistsError {
            output_dir: output_dir.display().to_string(),
        });
    }
    Ok(output_dir.to_path_buf())
}

fn write_file<P: AsRef<Path>>(content: &str, dest_path: P) -> Result<()> {
    let dest_path = dest_path.as_ref();
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(Error::IoError)?;
    }
    fs::write(dest_path, content).map_err(Error::IoError)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(Error::IoError)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Writes every file under `root`, creating directories as needed.
///
/// # Returns
/// * `Result<Vec<PathBuf>>` - Paths written, in file order
pub fn write_files<P: AsRef<Path>>(root: P, files: &[RenderedFile]) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    fs::create_dir_all(root).map_err(Error::IoError)?;

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let target = root.join(&file.path);
        debug!("Writing file: {}", target.display());
        write_file(&file.content, &target)?;
        if file.executable {
            set_executable(&target)?;
        }
        written.push(target);
    }
    Ok(written)
}
