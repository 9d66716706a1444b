//! Locates and reads the area-of-interest file from the working directory.
use crate::error::ConfigError;
use crate::geometry::GeoJson;
use crate::run_log::RunLog;
use std::fs;
use std::path::{Path, PathBuf};

/// `*.geojson` files in `work_dir`, sorted by name so the choice does not depend on the filesystem.
pub fn candidates(work_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = fs::read_dir(work_dir).map_err(|source| ConfigError::AoiRead {
        path: work_dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("geojson")))
        .collect();
    files.sort();
    Ok(files)
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<GeoJson, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::AoiRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::AoiDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the first area of interest, warning when the choice was ambiguous.
pub fn load(work_dir: &Path, log: &mut RunLog) -> Result<GeoJson, ConfigError> {
    let files = candidates(work_dir)?;
    let first = files
        .first()
        .ok_or_else(|| ConfigError::NoAoi(work_dir.to_path_buf()))?;
    if files.len() > 1 {
        log.warning(format!(
            "Multiple geojson files detected. Selecting the first file from the list: {}",
            first.display()
        ));
    }
    log.debug(format!("Reading area of interest from {}", first.display()));

    let geojson = read(first)?;
    match geojson.feature_count() {
        0 => Err(ConfigError::EmptyAoi),
        1 => Ok(geojson),
        _ => {
            log.warning(
                "Multiple geojson objects detected. Selecting the first object from the list.",
            );
            Ok(geojson)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::Severity;

    const SQUARE: &str = r#"{"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [0, 1], [1, 1], [1, 0], [0, 0]]]}}"#;

    #[test]
    fn test_candidates_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.geojson"), SQUARE).unwrap();
        fs::write(dir.path().join("a.GeoJSON"), SQUARE).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = candidates(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.GeoJSON", "b.geojson"]);
    }

    #[test]
    fn test_load_warns_on_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.geojson"), SQUARE).unwrap();
        fs::write(dir.path().join("b.geojson"), SQUARE).unwrap();
        let mut log = RunLog::create(dir.path(), Severity::Debug).unwrap();

        let geojson = load(dir.path(), &mut log).unwrap();
        assert_eq!(geojson.feature_count(), 1);
        assert!(log.lines()[0].contains("WARNING - Multiple geojson files detected"));
    }

    #[test]
    fn test_load_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = RunLog::create(dir.path(), Severity::Debug).unwrap();
        assert!(matches!(load(dir.path(), &mut log), Err(ConfigError::NoAoi(_))));
    }

    #[test]
    fn test_load_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("aoi.geojson"),
            r#"{"type": "FeatureCollection", "features": []}"#,
        )
        .unwrap();
        let mut log = RunLog::create(dir.path(), Severity::Debug).unwrap();
        assert!(matches!(load(dir.path(), &mut log), Err(ConfigError::EmptyAoi)));
    }

    #[test]
    fn test_load_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("aoi.geojson"), "{ not json").unwrap();
        let mut log = RunLog::create(dir.path(), Severity::Debug).unwrap();
        assert!(matches!(
            load(dir.path(), &mut log),
            Err(ConfigError::AoiDecode { .. })
        ));
    }
}
