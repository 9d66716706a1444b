//! Expands downloaded archives next to themselves.
use crate::error::ExtractionError;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

#[derive(Debug, Default)]
pub struct ExtractReport {
    pub directory: PathBuf,
    pub extracted: usize,
    /// Members that could not be written. The others were still extracted.
    pub failures: Vec<ExtractionError>,
}

/// `<dir>/<name>.zip` expands into `<dir>/<name>/`.
pub fn target_dir(archive: &Path) -> PathBuf {
    let stem = archive.file_stem().unwrap_or(archive.as_os_str());
    archive.with_file_name(stem)
}

/// Extracts every member of `archive`. Only a failure to open the archive itself is an error.
pub fn extract(archive: &Path) -> Result<ExtractReport, ExtractionError> {
    let file = File::open(archive).map_err(|source| ExtractionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(file).map_err(|source| ExtractionError::Archive {
        path: archive.to_path_buf(),
        source,
    })?;

    let directory = target_dir(archive);
    fs::create_dir_all(&directory).map_err(|source| ExtractionError::Io {
        path: directory.clone(),
        source,
    })?;

    let mut report = ExtractReport {
        directory,
        ..Default::default()
    };
    for index in 0..zip.len() {
        match extract_member(&mut zip, index, archive, &report.directory) {
            Ok(true) => report.extracted += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("{e}");
                report.failures.push(e);
            }
        }
    }
    Ok(report)
}

/// Returns whether a file was written. Directory entries only create the directory.
fn extract_member(
    zip: &mut ZipArchive<File>,
    index: usize,
    archive: &Path,
    directory: &Path,
) -> Result<bool, ExtractionError> {
    let mut member = zip
        .by_index(index)
        .map_err(|source| ExtractionError::Member {
            path: archive.to_path_buf(),
            index,
            source,
        })?;
    let relative = member
        .enclosed_name()
        .ok_or_else(|| ExtractionError::UnsafePath {
            path: archive.to_path_buf(),
            name: member.name().to_string(),
        })?;
    let output = directory.join(relative);
    let io_error = |source: io::Error| ExtractionError::Io {
        path: output.clone(),
        source,
    };

    if member.is_dir() {
        fs::create_dir_all(&output).map_err(io_error)?;
        return Ok(false);
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut out = File::create(&output).map_err(io_error)?;
    io::copy(&mut member, &mut out).map_err(io_error)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_archive(path: &Path, members: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, content) in members {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_target_dir() {
        assert_eq!(
            target_dir(Path::new("/data/RCM1_A.zip")),
            PathBuf::from("/data/RCM1_A")
        );
    }

    #[test]
    fn test_extract_nested_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("RCM1_A.zip");
        build_archive(
            &archive,
            &[("manifest.safe", "<xml/>"), ("measurement/hh.tif", "pixels")],
        );

        let report = extract(&archive).unwrap();

        assert_eq!(report.extracted, 2);
        assert!(report.failures.is_empty());
        assert_eq!(report.directory, dir.path().join("RCM1_A"));
        assert_eq!(
            fs::read_to_string(dir.path().join("RCM1_A/measurement/hh.tif")).unwrap(),
            "pixels"
        );
    }

    #[test]
    fn test_unsafe_member_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.zip");
        build_archive(&archive, &[("../evil.txt", "x"), ("good.txt", "y")]);

        let report = extract(&archive).unwrap();

        assert_eq!(report.extracted, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            ExtractionError::UnsafePath { .. }
        ));
        assert!(!dir.path().join("evil.txt").exists());
        assert!(dir.path().join("bad/good.txt").exists());
    }

    #[test]
    fn test_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, "not a zip").unwrap();
        assert!(matches!(
            extract(&archive),
            Err(ExtractionError::Archive { .. })
        ));
    }
}
