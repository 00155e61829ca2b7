//! Zipping action sources.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::RemoteBuildError;
use crate::Result;

/// File names left out of the archive besides dotfiles.
const EXCLUDED: &[&str] = &["_Whisk.swift"];

fn excluded(name: &str) -> bool {
    name.starts_with('.') || EXCLUDED.iter().any(|e| name.starts_with(e))
}

/// Zip every file under `source` into `zip_path`, with paths relative to
/// `source`. Returns the number of files written.
pub fn zip_directory(source: &Path, zip_path: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(RemoteBuildError::Packaging(format!(
            "{} is not a directory",
            source.display()
        )));
    }

    let mut files = Vec::new();
    collect_files(source, &mut files)?;
    files.sort();

    let mut zip = ZipWriter::new(File::create(zip_path)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let rel = path
            .strip_prefix(source)
            .map_err(|e| RemoteBuildError::Packaging(e.to_string()))?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!("adding {}", name);
        zip.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut zip)?;
    }
    zip.finish()?;

    Ok(files.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else if !excluded(&entry.file_name().to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(())
}

/// Zip the action at `source` into `<out_dir>/<function_name>_action.zip`.
pub async fn zip_action_source(
    source: &Path,
    function_name: &str,
    out_dir: &Path,
) -> Result<PathBuf> {
    let zip_path = out_dir.join(format!("{}_action.zip", function_name));
    info!("Zipping {} to {}", source.display(), zip_path.display());

    let source = source.to_path_buf();
    let target = zip_path.clone();
    let count = tokio::task::spawn_blocking(move || zip_directory(&source, &target)).await??;
    debug!("{} files packaged", count);
    Ok(zip_path)
}
