use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, Permissions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// One segment's features, time-major: `matrix[frame][coefficient]`.
pub type Matrix = Vec<Vec<f32>>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to move dataset into place: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("label {label} at position {index} is outside the mapping ({classes} classes)")]
    LabelOutOfRange {
        index: usize,
        label: usize,
        classes: usize,
    },
    #[error("{labels} labels but {features} feature matrices")]
    Misaligned { labels: usize, features: usize },
    #[error("class `{0}` appears more than once in the mapping")]
    DuplicateClass(String),
    #[error("matrix {index} has {found} columns in row {row}, expected {expected}")]
    RaggedMatrix {
        index: usize,
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Labeled feature dataset as written to disk.
///
/// `labels[i]` indexes `mapping` and belongs to `features[i]`. The features
/// field is serialized as `mfcc` whatever the feature kind, which is what
/// existing training code reads; `features` is accepted on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub mapping: Vec<String>,
    pub labels: Vec<usize>,
    #[serde(rename = "mfcc", alias = "features")]
    pub features: Vec<Matrix>,
}

impl Dataset {
    pub fn new(mapping: Vec<String>) -> Self {
        Self {
            mapping,
            labels: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Append one kept segment.
    pub fn push(&mut self, label: usize, matrix: Matrix) -> Result<(), DatasetError> {
        if label >= self.mapping.len() {
            return Err(DatasetError::LabelOutOfRange {
                index: self.labels.len(),
                label,
                classes: self.mapping.len(),
            });
        }
        self.labels.push(label);
        self.features.push(matrix);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check the structural invariants: aligned sequences, labels in range,
    /// unique class names and rectangular matrices.
    pub fn validate(&self) -> Result<(), DatasetError> {
        if self.labels.len() != self.features.len() {
            return Err(DatasetError::Misaligned {
                labels: self.labels.len(),
                features: self.features.len(),
            });
        }

        let mut seen = HashSet::new();
        for name in &self.mapping {
            if !seen.insert(name.as_str()) {
                return Err(DatasetError::DuplicateClass(name.clone()));
            }
        }

        for (index, &label) in self.labels.iter().enumerate() {
            if label >= self.mapping.len() {
                return Err(DatasetError::LabelOutOfRange {
                    index,
                    label,
                    classes: self.mapping.len(),
                });
            }
        }

        for (index, matrix) in self.features.iter().enumerate() {
            let Some(first) = matrix.first() else {
                continue;
            };
            let expected = first.len();
            if let Some((row, r)) = matrix.iter().enumerate().find(|(_, r)| r.len() != expected) {
                return Err(DatasetError::RaggedMatrix {
                    index,
                    row,
                    expected,
                    found: r.len(),
                });
            }
        }

        Ok(())
    }

    /// Segments per class, in mapping order.
    pub fn class_counts(&self) -> Vec<(&str, usize)> {
        let mut counts = vec![0usize; self.mapping.len()];
        for &label in &self.labels {
            if let Some(c) = counts.get_mut(label) {
                *c += 1;
            }
        }
        self.mapping
            .iter()
            .map(String::as_str)
            .zip(counts)
            .collect()
    }

    /// (frames, coefficients) of the first matrix, if any.
    pub fn frame_shape(&self) -> Option<(usize, usize)> {
        self.features
            .first()
            .map(|m| (m.len(), m.first().map_or(0, Vec::len)))
    }

    /// Serialize as JSON indented by four spaces.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), DatasetError> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut ser)?;
        Ok(())
    }

    /// Write to `path` through a temporary file in the same directory, so the
    /// destination either keeps its old content or gets the complete dataset.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let io_err = |source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        };

        let tmp = tempfile::Builder::new()
            .prefix(".mirset-")
            .suffix(".json.tmp")
            .tempfile_in(dir)
            .map_err(io_err)?;

        {
            let mut writer = BufWriter::new(tmp.as_file());
            self.write_json(&mut writer)?;
            writer.flush().map_err(io_err)?;
        }
        // Temp files are created 0600; give the result ordinary file permissions
        if let Some(perms) = output_permissions(path) {
            tmp.as_file().set_permissions(perms).map_err(io_err)?;
        }
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path)?;

        log::info!(
            "Wrote {} segments across {} classes to {}",
            self.len(),
            self.mapping.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        let file = File::open(path).map_err(|source| DatasetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let dataset: Dataset = serde_json::from_reader(BufReader::new(file))?;
        Ok(dataset)
    }
}

/// Permissions for a saved dataset: those of the file being replaced, else
/// 0644 on Unix.
fn output_permissions(path: &Path) -> Option<Permissions> {
    if let Ok(meta) = fs::metadata(path) {
        return Some(meta.permissions());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(Permissions::from_mode(0o644))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec!["blues".into(), "rock".into()]);
        ds.push(0, vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        ds.push(1, vec![vec![-0.5, 0.25], vec![0.0, 1.5]]).unwrap();
        ds.push(1, vec![vec![7.0, 8.0], vec![9.0, 10.0]]).unwrap();
        ds
    }

    #[test]
    fn push_rejects_unknown_label() {
        let mut ds = Dataset::new(vec!["rock".into()]);
        assert!(matches!(
            ds.push(1, vec![]),
            Err(DatasetError::LabelOutOfRange { label: 1, classes: 1, .. })
        ));
        assert!(ds.is_empty());
    }

    #[test]
    fn json_uses_mfcc_field_and_four_space_indent() {
        let mut buf = Vec::new();
        sample().write_json(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("{\n    \"mapping\": [\n        \"blues\","));
        assert!(text.contains("\n    \"labels\": ["));
        assert!(text.contains("\n    \"mfcc\": ["));
        assert!(!text.contains("\"features\""));

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn reader_accepts_features_alias() {
        let json = r#"{"mapping": ["a"], "labels": [0], "features": [[[1.0, 2.0]]]}"#;
        let ds: Dataset = serde_json::from_str(json).unwrap();
        assert_eq!(ds.features, vec![vec![vec![1.0, 2.0]]]);
        assert!(ds.validate().is_ok());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let ds = sample();
        ds.save(&path).unwrap();
        assert_eq!(Dataset::load(&path).unwrap(), ds);

        // Only the dataset is left behind
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "stale").unwrap();
        sample().save(&path).unwrap();
        assert!(Dataset::load(&path).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        sample().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn save_keeps_permissions_of_replaced_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "old").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        sample().save(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("data.json");
        assert!(matches!(sample().save(&path), Err(DatasetError::Io { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn validate_catches_broken_invariants() {
        let mut ds = sample();
        ds.labels.push(0);
        assert!(matches!(ds.validate(), Err(DatasetError::Misaligned { .. })));

        let mut ds = sample();
        ds.labels[2] = 5;
        assert!(matches!(
            ds.validate(),
            Err(DatasetError::LabelOutOfRange { index: 2, label: 5, .. })
        ));

        let mut ds = sample();
        ds.mapping.push("blues".into());
        assert!(matches!(ds.validate(), Err(DatasetError::DuplicateClass(_))));

        let mut ds = sample();
        ds.features[1][1].push(0.0);
        assert!(matches!(
            ds.validate(),
            Err(DatasetError::RaggedMatrix { index: 1, row: 1, .. })
        ));
    }

    #[test]
    fn class_counts_include_empty_classes() {
        let mut ds = sample();
        ds.mapping.push("jazz".into());
        assert_eq!(
            ds.class_counts(),
            vec![("blues", 1), ("rock", 2), ("jazz", 0)]
        );
        assert_eq!(ds.frame_shape(), Some((2, 2)));
        assert_eq!(Dataset::default().frame_shape(), None);
    }
}
