//! Data file plumbing: format detection, file discovery, and deserialization.
//!
//! Every data file may be written in RON, JSON, or TOML; the format is picked
//! from the extension. The pack loader builds on these helpers.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    #[error("duplicate {kind} '{name}' in {file}")]
    Duplicate {
        file: PathBuf,
        kind: &'static str,
        name: String,
    },

    /// The file parsed but describes something the engine cannot use.
    #[error("invalid data in {file}: {detail}")]
    Invalid { file: PathBuf, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .into_iter()
        .find(|format| Some(format.extension()) == ext)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find `{base_name}.ron`, `.toml` or `.json` in `dir`.
///
/// Returns `Ok(None)` if none exists and `ConflictingFormats` if more than
/// one does.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for format in Format::ALL {
        let candidate = dir.join(format!("{base_name}.{}", format.extension()));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, error: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: error.to_string(),
    }
}

fn parse_str<T: DeserializeOwned>(
    path: &Path,
    format: Format,
    content: &str,
) -> Result<T, DataLoadError> {
    match format {
        Format::Ron => ron::from_str(content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(content).map_err(|e| parse_error(path, e)),
    }
}

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    parse_str(path, format, &content)
}

/// Deserialize a list from a file. TOML has no top-level arrays, so for TOML
/// the list is read from the array under `toml_key`; RON and JSON files hold
/// the list directly.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    if format != Format::Toml {
        return parse_str(path, format, &content);
    }

    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    let array = table.remove(toml_key).ok_or_else(|| DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: format!("missing key '{toml_key}' in TOML file"),
    })?;
    array.try_into().map_err(|e: toml::de::Error| parse_error(path, e))
}

// ===========================================================================
// Name resolution
// ===========================================================================

/// Look up a name, returning `UnresolvedRef` if it is not defined.
pub fn resolve_name<V: Copy>(
    map: &BTreeMap<String, V>,
    name: &str,
    file: &Path,
    expected_kind: &'static str,
) -> Result<V, DataLoadError> {
    map.get(name).copied().ok_or_else(|| DataLoadError::UnresolvedRef {
        file: file.to_path_buf(),
        name: name.to_string(),
        expected_kind,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CapabilityData;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "conduit_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("logistics.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("logistics.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("logistics.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_rejects_unknown_and_missing_extension() {
        assert!(matches!(
            detect_format(Path::new("layout.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("layout")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // find_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn find_data_file_single_match() {
        let dir = make_test_dir("find_single");
        fs::write(dir.join("layout.json"), "{}").unwrap();

        assert_eq!(find_data_file(&dir, "layout").unwrap(), Some(dir.join("layout.json")));
        assert_eq!(find_data_file(&dir, "capabilities").unwrap(), None);

        cleanup(&dir);
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("find_conflict");
        fs::write(dir.join("layout.ron"), "()").unwrap();
        fs::write(dir.join("layout.toml"), "").unwrap();

        let result = find_data_file(&dir, "layout");
        assert!(matches!(result, Err(DataLoadError::ConflictingFormats { .. })));

        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // deserialize_file / deserialize_list
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_list_in_every_format() {
        let dir = make_test_dir("list_formats");
        let ron_path = dir.join("a.ron");
        let json_path = dir.join("b.json");
        let toml_path = dir.join("c.toml");
        fs::write(&ron_path, r#"[(name: "item", id: 0), (name: "fluid", id: 1)]"#).unwrap();
        fs::write(
            &json_path,
            r#"[{"name": "item", "id": 0}, {"name": "fluid", "id": 1}]"#,
        )
        .unwrap();
        fs::write(
            &toml_path,
            r#"
[[capabilities]]
name = "item"
id = 0

[[capabilities]]
name = "fluid"
id = 1
"#,
        )
        .unwrap();

        for path in [&ron_path, &json_path, &toml_path] {
            let list: Vec<CapabilityData> = deserialize_list(path, "capabilities").unwrap();
            assert_eq!(list.len(), 2, "{}", path.display());
            assert_eq!(list[1].name, "fluid");
            assert_eq!(list[1].id, 1);
        }

        cleanup(&dir);
    }

    #[test]
    fn deserialize_list_toml_missing_key() {
        let dir = make_test_dir("list_toml_missing");
        let path = dir.join("capabilities.toml");
        fs::write(&path, "other = 1\n").unwrap();

        let result: Result<Vec<CapabilityData>, _> = deserialize_list(&path, "capabilities");
        match result {
            Err(DataLoadError::Parse { detail, .. }) => assert!(detail.contains("capabilities")),
            other => panic!("expected Parse error, got: {other:?}"),
        }

        cleanup(&dir);
    }

    #[test]
    fn deserialize_file_parse_error_names_file() {
        let dir = make_test_dir("parse_err");
        let path = dir.join("bad.ron");
        fs::write(&path, "this is not valid RON {{{").unwrap();

        let err = deserialize_file::<Vec<CapabilityData>>(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::Parse { .. }));
        assert!(err.to_string().contains("bad.ron"));

        cleanup(&dir);
    }

    #[test]
    fn deserialize_file_missing_is_io_error() {
        let missing = Path::new("/nonexistent/conduit/x.ron");
        let result = deserialize_file::<Vec<CapabilityData>>(missing);
        assert!(matches!(result, Err(DataLoadError::Io(_))));
    }

    // -----------------------------------------------------------------------
    // resolve_name
    // -----------------------------------------------------------------------

    #[test]
    fn resolve_name_found_and_missing() {
        let map = BTreeMap::from([("item".to_string(), 0u16)]);

        assert_eq!(resolve_name(&map, "item", Path::new("layout.ron"), "capability").unwrap(), 0);

        let err = resolve_name(&map, "energy", Path::new("layout.ron"), "capability").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("energy"));
        assert!(msg.contains("capability"));
        assert!(msg.contains("layout.ron"));
    }
}
