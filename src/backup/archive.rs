// offsitebackup/src/backup/archive.rs
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io;
use std::path::{Path, PathBuf};
use tar::Builder;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::errors::ArchiveError;

fn io_error(context: String) -> impl FnOnce(io::Error) -> ArchiveError {
    move |source| ArchiveError::Io { context, source }
}

/// Temporary file next to the destination. On Unix it is opened with mode 0644 (subject to the
/// umask) so the persisted archive gets the same permissions as any newly created file.
fn staging_file(dest_dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".archive-").suffix(".partial");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    builder.tempfile_in(dest_dir)
}

/// Creates a GZipped TAR archive from a source directory.
///
/// Entries are rooted at the source directory's own name, so extracting
/// `public/` yields `public/...` again. The archive is assembled in a
/// temporary file next to `archive_dest_path` and only renamed into place
/// once the gzip stream is complete; on any error nothing is left at the
/// destination.
///
/// # Arguments
/// * `source_dir` - The directory to archive, recursively.
/// * `archive_dest_path` - The full path where the `.tar.gz` archive will be created.
///
/// # Returns
/// Path to the created archive file.
pub fn create_tar_gz_archive(
    source_dir: &Path,
    archive_dest_path: &Path,
) -> Result<PathBuf, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::MissingSource(source_dir.to_path_buf()));
    }

    let root_name = source_dir
        .canonicalize()
        .map_err(io_error(format!(
            "Failed to resolve source directory {}",
            source_dir.display()
        )))?
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("root"));

    let dest_dir = match archive_dest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    log::info!(
        "🗜 Creating tar.gz archive from {} to {}",
        source_dir.display(),
        archive_dest_path.display()
    );

    let staging = staging_file(&dest_dir).map_err(io_error(format!(
        "Failed to create temporary archive file in {}",
        dest_dir.display()
    )))?;
    let archive_file = staging.reopen().map_err(io_error(format!(
        "Failed to open temporary archive file {}",
        staging.path().display()
    )))?;

    let enc = GzEncoder::new(archive_file, Compression::default());
    let mut tar_builder = Builder::new(enc);
    tar_builder.follow_symlinks(false);

    let mut entries = 0usize;
    for entry in WalkDir::new(source_dir).follow_links(false) {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: source_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let relative = path
            .strip_prefix(source_dir)
            .map_err(|e| ArchiveError::Io {
                context: format!(
                    "Failed to strip prefix {} from {}",
                    source_dir.display(),
                    path.display()
                ),
                source: io::Error::new(io::ErrorKind::InvalidInput, e),
            })?;
        let name = root_name.join(relative);

        if entry.file_type().is_dir() {
            tar_builder.append_dir(&name, path).map_err(io_error(format!(
                "Failed to append directory {} to archive",
                path.display()
            )))?;
        } else {
            tar_builder
                .append_path_with_name(path, &name)
                .map_err(io_error(format!(
                    "Failed to append file {} as {} to archive",
                    path.display(),
                    name.display()
                )))?;
            entries += 1;
        }
    }

    let encoder = tar_builder.into_inner().map_err(io_error(format!(
        "Failed to finish tar stream for archive: {}",
        archive_dest_path.display()
    )))?;
    let archive_file = encoder.finish().map_err(io_error(format!(
        "Failed to finish Gzip encoding for archive: {}",
        archive_dest_path.display()
    )))?;
    archive_file.sync_all().map_err(io_error(format!(
        "Failed to flush archive to disk: {}",
        archive_dest_path.display()
    )))?;
    drop(archive_file);

    staging
        .persist(archive_dest_path)
        .map_err(|e| ArchiveError::Io {
            context: format!(
                "Failed to move finished archive into place at {}",
                archive_dest_path.display()
            ),
            source: e.error,
        })?;

    log::info!(
        "✅ Tar.gz archive with {} files created at {}",
        entries,
        archive_dest_path.display()
    );
    Ok(archive_dest_path.to_path_buf())
}
