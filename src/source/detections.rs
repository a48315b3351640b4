//! Per-keyframe object detection files.
//!
//! Each file holds parallel arrays, one entry per detected object:
//!
//! ```json
//! {
//!   "detection_class_entities": ["Lantern", "Skyscraper"],
//!   "detection_scores": ["0.79", "0.68"],
//!   "detection_boxes": [["0.1", "0.2", "0.5", "0.6"], ["0.0", "0.0", "1.0", "0.4"]],
//!   "detection_class_names": ["/m/01jfsr", "/m/079cl"],
//!   "detection_class_labels": ["77", "12"]
//! }
//! ```

use crate::error::{ClipframeError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// One detected object.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Human-readable label, e.g. `Lantern`.
    pub entity: String,
    /// Detector confidence in `[0, 1]`.
    pub score: f64,
    /// `[ymin, xmin, ymax, xmax]` in relative coordinates, if provided.
    pub bbox: Option<[f64; 4]>,
    /// Detector class identifier, if provided.
    pub class_name: Option<String>,
    /// Numeric class label, if provided.
    pub class_label: Option<String>,
}

/// A number the detector wrote either as a JSON number or as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn to_f64(&self) -> Option<f64> {
        match self {
            Numeric::Number(v) => Some(*v),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }

    fn to_label(&self) -> String {
        match self {
            Numeric::Number(v) if v.fract() == 0.0 => format!("{}", *v as i64),
            Numeric::Number(v) => v.to_string(),
            Numeric::Text(s) => s.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetections {
    #[serde(default)]
    detection_class_entities: Vec<String>,
    #[serde(default)]
    detection_scores: Vec<Numeric>,
    detection_boxes: Option<Vec<Vec<Numeric>>>,
    detection_class_names: Option<Vec<String>>,
    detection_class_labels: Option<Vec<Numeric>>,
}

/// Parse one detection file, zipping the parallel arrays by position.
///
/// Entities and scores must have equal length; the optional arrays must
/// match too when present.
pub fn parse_detections(bytes: &[u8], path: &Path) -> Result<Vec<Detection>> {
    let raw: RawDetections = serde_json::from_slice(bytes)
        .map_err(|e| ClipframeError::parse(path, format!("invalid detection json: {}", e)))?;

    let count = raw.detection_class_entities.len();
    check_len(path, "detection_scores", raw.detection_scores.len(), count)?;
    if let Some(boxes) = &raw.detection_boxes {
        check_len(path, "detection_boxes", boxes.len(), count)?;
    }
    if let Some(names) = &raw.detection_class_names {
        check_len(path, "detection_class_names", names.len(), count)?;
    }
    if let Some(labels) = &raw.detection_class_labels {
        check_len(path, "detection_class_labels", labels.len(), count)?;
    }

    let mut detections = Vec::with_capacity(count);
    for (i, entity) in raw.detection_class_entities.into_iter().enumerate() {
        let score = raw.detection_scores[i].to_f64().ok_or_else(|| {
            ClipframeError::parse(path, format!("detection_scores[{}] is not a number", i))
        })?;

        let bbox = match raw.detection_boxes.as_ref().map(|b| &b[i]) {
            Some(coords) if coords.len() == 4 => {
                let mut bbox = [0.0; 4];
                for (slot, coord) in bbox.iter_mut().zip(coords) {
                    *slot = coord.to_f64().ok_or_else(|| {
                        ClipframeError::parse(
                            path,
                            format!("detection_boxes[{}] has a non-numeric coordinate", i),
                        )
                    })?;
                }
                Some(bbox)
            }
            Some(coords) => {
                debug!(
                    "{}: detection_boxes[{}] has {} coordinates, expected 4; dropping box",
                    path.display(),
                    i,
                    coords.len()
                );
                None
            }
            None => None,
        };

        detections.push(Detection {
            entity,
            score,
            bbox,
            class_name: raw.detection_class_names.as_ref().map(|n| n[i].clone()),
            class_label: raw.detection_class_labels.as_ref().map(|l| l[i].to_label()),
        });
    }

    Ok(detections)
}

fn check_len(path: &Path, field: &str, len: usize, expected: usize) -> Result<()> {
    if len != expected {
        return Err(ClipframeError::parse(
            path,
            format!(
                "{} has {} entries but detection_class_entities has {}",
                field, len, expected
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_encoded_values() {
        let json = r#"{
            "detection_class_entities": ["Lantern", "Skyscraper"],
            "detection_scores": ["0.79", "0.68"],
            "detection_boxes": [["0.1", "0.2", "0.5", "0.6"], ["0", "0", "1", "0.4"]],
            "detection_class_names": ["/m/01jfsr", "/m/079cl"],
            "detection_class_labels": ["77", 12]
        }"#;
        let detections = parse_detections(json.as_bytes(), Path::new("0001.json")).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].entity, "Lantern");
        assert_eq!(detections[0].score, 0.79);
        assert_eq!(detections[0].bbox, Some([0.1, 0.2, 0.5, 0.6]));
        assert_eq!(detections[1].class_name.as_deref(), Some("/m/079cl"));
        assert_eq!(detections[1].class_label.as_deref(), Some("12"));
    }

    #[test]
    fn test_optional_arrays_may_be_absent() {
        let json = r#"{"detection_class_entities": ["Lantern"], "detection_scores": [0.9]}"#;
        let detections = parse_detections(json.as_bytes(), Path::new("0001.json")).unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, None);
        assert_eq!(detections[0].class_name, None);
    }

    #[test]
    fn test_empty_object_has_no_detections() {
        let detections = parse_detections(b"{}", Path::new("0001.json")).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_unequal_arrays_are_parse_error() {
        let json = r#"{"detection_class_entities": ["A", "B"], "detection_scores": ["0.5"]}"#;
        let err = parse_detections(json.as_bytes(), Path::new("0001.json")).unwrap_err();
        assert!(matches!(err, ClipframeError::Parse { .. }));
        assert!(err.to_string().contains("detection_scores has 1 entries"));

        let json = r#"{
            "detection_class_entities": ["A"],
            "detection_scores": ["0.5"],
            "detection_boxes": []
        }"#;
        assert!(parse_detections(json.as_bytes(), Path::new("0001.json")).is_err());
    }

    #[test]
    fn test_boxes_without_four_coordinates_are_dropped() {
        let json = r#"{
            "detection_class_entities": ["Short", "Long", "Exact"],
            "detection_scores": [0.9, 0.8, 0.7],
            "detection_boxes": [[0.1, 0.2], [0.1, 0.2, 0.3, 0.4, 0.5], [0.1, 0.2, 0.3, 0.4]]
        }"#;
        let detections = parse_detections(json.as_bytes(), Path::new("0001.json")).unwrap();

        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].bbox, None);
        assert_eq!(detections[1].bbox, None);
        assert_eq!(detections[2].bbox, Some([0.1, 0.2, 0.3, 0.4]));
    }

    #[test]
    fn test_non_numeric_score_is_parse_error() {
        let json = r#"{"detection_class_entities": ["A"], "detection_scores": ["high"]}"#;
        let err = parse_detections(json.as_bytes(), Path::new("0001.json")).unwrap_err();
        assert!(err.to_string().contains("detection_scores[0]"));
    }
}
