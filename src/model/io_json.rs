//! JSON annotation files consumed by `import` and produced by executors.
//!
//! The layout keys objects by the asset's origin file name and names classes
//! instead of numbering them, so the file is independent of any label space:
//!
//! ```json
//! {
//!   "image001.jpg": [
//!     {"class_name": "person", "box": {"xmin": 10, "ymin": 20, "xmax": 100, "ymax": 200}, "score": 0.9}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use super::geometry::{BBox, Coord, Geometry};
use crate::error::MirError;

/// One object in an annotation file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedObject {
    pub class_name: String,
    #[serde(default, rename = "box", skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<Coord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anno_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl NamedObject {
    /// Geometry of the object; a box wins when both are present.
    pub fn geometry(&self) -> Option<Geometry> {
        match (&self.bbox, &self.polygon) {
            (Some(bbox), _) => Some(Geometry::Box(*bbox)),
            (None, Some(points)) => Some(Geometry::Polygon(points.clone())),
            (None, None) => None,
        }
    }
}

/// File name -> objects.
pub type NamedAnnotations = BTreeMap<String, Vec<NamedObject>>;

/// Reads an annotation file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed.
pub fn read_annotation_json(path: &Path) -> Result<NamedAnnotations, MirError> {
    let file = File::open(path).map_err(MirError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| MirError::AnnotationJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes an annotation file.
pub fn write_annotation_json(path: &Path, annotations: &NamedAnnotations) -> Result<(), MirError> {
    let file = File::create(path).map_err(MirError::Io)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, annotations).map_err(|source| {
        MirError::AnnotationJsonWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Parses an annotation file from a string.
pub fn from_json_str(json: &str) -> Result<NamedAnnotations, serde_json::Error> {
    serde_json::from_str(json)
}

/// Serializes annotations to a string.
pub fn to_json_string(annotations: &NamedAnnotations) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(annotations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_box_and_polygon() {
        let json = r#"{
            "a.jpg": [
                {"class_name": "cat", "box": {"xmin": 1, "ymin": 2, "xmax": 3, "ymax": 4}, "score": 0.5},
                {"class_name": "dog", "polygon": [{"x": 0, "y": 0}, {"x": 4, "y": 0}, {"x": 4, "y": 4}]}
            ]
        }"#;
        let parsed = from_json_str(json).expect("parse");
        let objects = &parsed["a.jpg"];
        assert_eq!(objects.len(), 2);
        assert_eq!(
            objects[0].geometry(),
            Some(Geometry::Box(BBox::from_xyxy(1.0, 2.0, 3.0, 4.0)))
        );
        assert_eq!(objects[0].score, Some(0.5));
        assert!(matches!(objects[1].geometry(), Some(Geometry::Polygon(ref p)) if p.len() == 3));
    }

    #[test]
    fn test_object_without_geometry() {
        let parsed = from_json_str(r#"{"a.jpg": [{"class_name": "cat"}]}"#).expect("parse");
        assert_eq!(parsed["a.jpg"][0].geometry(), None);
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("anno.json");
        let mut annotations = NamedAnnotations::new();
        annotations.insert(
            "x.png".to_string(),
            vec![NamedObject {
                class_name: "person".into(),
                bbox: Some(BBox::from_xyxy(0.0, 0.0, 5.0, 5.0)),
                polygon: None,
                score: None,
                anno_quality: Some(0.8),
                tags: BTreeMap::new(),
            }],
        );
        write_annotation_json(&path, &annotations).expect("write");
        assert_eq!(read_annotation_json(&path).expect("read"), annotations);
    }
}
