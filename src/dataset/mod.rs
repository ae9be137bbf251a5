//! Labelled datasets: parsing label files and running the estimator over them.
//!
//! Two input layouts are understood (see [`InputFormat`]). Records that cannot
//! be parsed are skipped with a warning and counted. Records that parse but
//! fail estimation come back as [`RecordFailure`] and never abort the batch.

pub mod export;
pub mod summary;

use std::fmt;
use std::fs;
use std::str::FromStr;

use log::{info, warn};
use nalgebra::Point2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::camera::{CameraModel, ProfileError};
use crate::distance::DistanceModel;
use crate::error::EstimationError;
use crate::quadrilateral::Quadrilateral;

pub use export::{write_bbox_csv, write_json};
pub use summary::{DatasetSummary, DistanceExtreme, Histogram};

#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to parse JSON: {0}")]
    JsonError(String),
    #[error("Failed to write CSV: {0}")]
    CsvError(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Profile(#[from] ProfileError),
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::IOError(err.to_string())
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(err: serde_json::Error) -> Self {
        DatasetError::JsonError(err.to_string())
    }
}

impl From<csv::Error> for DatasetError {
    fn from(err: csv::Error) -> Self {
        DatasetError::CsvError(err.to_string())
    }
}

/// Layout of a label file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Labelbox export: `"External ID"`, `"Labeled Data"` and the polygon at
    /// `"Label"[<label>][0]["geometry"]` as `{x, y}` objects.
    Labelbox,
    /// Corner detector output: `"img_id"` (or `"mask_id"`) and
    /// `"vertices_2D"` as `[x, y]` pairs.
    Corners,
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputFormat::Labelbox => f.write_str("labelbox"),
            InputFormat::Corners => f.write_str("corners"),
        }
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "labelbox" => Ok(InputFormat::Labelbox),
            "corners" => Ok(InputFormat::Corners),
            other => Err(format!(
                "unknown input format '{other}', expected labelbox or corners"
            )),
        }
    }
}

/// One image's identifier and its four (unordered) target corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub id: String,
    pub url: Option<String>,
    pub points: Vec<Point2<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLabels {
    /// Usable records, sorted by id.
    pub records: Vec<LabelRecord>,
    /// Entries dropped because they did not parse.
    pub skipped: usize,
}

/// A record whose estimation failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    pub id: String,
    pub error: EstimationError,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.error)
    }
}

pub fn load_labels(path: &str, format: InputFormat, label: &str) -> Result<ParsedLabels, DatasetError> {
    let contents = fs::read_to_string(path)?;
    let parsed = parse_labels(&contents, format, label)?;
    info!(
        "Loaded {} records from {path} ({} skipped)",
        parsed.records.len(),
        parsed.skipped
    );
    Ok(parsed)
}

/// Parses a label file already read into memory.
///
/// # Errors
///
/// [`DatasetError::JsonError`] if the text is not JSON and
/// [`DatasetError::InvalidRecord`] if the top level is not an array.
/// Individual bad entries are skipped instead.
pub fn parse_labels(json: &str, format: InputFormat, label: &str) -> Result<ParsedLabels, DatasetError> {
    let data: Value = serde_json::from_str(json)?;
    let entries = data.as_array().ok_or_else(|| {
        DatasetError::InvalidRecord("Label file must contain a JSON array".to_string())
    })?;

    let mut parsed = ParsedLabels::default();
    for (index, entry) in entries.iter().enumerate() {
        let record = match format {
            InputFormat::Labelbox => parse_labelbox(entry, label),
            InputFormat::Corners => parse_corners(entry),
        };
        match record {
            Ok(record) => parsed.records.push(record),
            Err(reason) => {
                warn!("Skipping entry {index}: {reason}");
                parsed.skipped += 1;
            }
        }
    }
    parsed.records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(parsed)
}

fn parse_labelbox(entry: &Value, label: &str) -> Result<LabelRecord, String> {
    let id = identifier(&entry["External ID"]).ok_or("missing 'External ID'")?;
    let url = entry["Labeled Data"].as_str().map(str::to_string);

    let geometry = entry["Label"][label][0]["geometry"]
        .as_array()
        .ok_or_else(|| format!("{id}: no '{label}' polygon"))?;
    let points = geometry
        .iter()
        .map(|vertex| {
            Some(Point2::new(
                coordinate(&vertex["x"])?,
                coordinate(&vertex["y"])?,
            ))
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| format!("{id}: polygon vertex without numeric x/y"))?;

    four_points(id, url, points)
}

fn parse_corners(entry: &Value) -> Result<LabelRecord, String> {
    let id = identifier(&entry["img_id"])
        .or_else(|| identifier(&entry["mask_id"]))
        .ok_or("missing 'img_id' and 'mask_id'")?;

    let vertices = entry["vertices_2D"]
        .as_array()
        .ok_or_else(|| format!("{id}: missing 'vertices_2D'"))?;
    let points = vertices
        .iter()
        .map(|vertex| Some(Point2::new(coordinate(&vertex[0])?, coordinate(&vertex[1])?)))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| format!("{id}: vertex is not an [x, y] pair"))?;

    four_points(id, None, points)
}

fn four_points(id: String, url: Option<String>, points: Vec<Point2<f64>>) -> Result<LabelRecord, String> {
    if points.len() != 4 {
        return Err(format!("{id}: expected 4 points, got {}", points.len()));
    }
    Ok(LabelRecord { id, url, points })
}

/// Ids appear as strings or bare numbers.
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A finite coordinate written as a JSON number or a numeric string.
fn coordinate(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Estimates every record in parallel, keeping input order.
pub fn process_records(
    records: &[LabelRecord],
    camera: &CameraModel,
    models: &[DistanceModel],
) -> Vec<Result<Quadrilateral, RecordFailure>> {
    let results: Vec<_> = records
        .par_iter()
        .map(|record| {
            Quadrilateral::from_record(record, camera, models).map_err(|error| RecordFailure {
                id: record.id.clone(),
                error,
            })
        })
        .collect();

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(
        "Processed {} records: {} succeeded, {failed} failed",
        results.len(),
        results.len() - failed
    );
    results
}

/// Splits batch results into successes and failures, logging each failure.
pub fn partition_results(
    results: Vec<Result<Quadrilateral, RecordFailure>>,
) -> (Vec<Quadrilateral>, Vec<RecordFailure>) {
    let mut succeeded = Vec::with_capacity(results.len());
    let mut failed = Vec::new();
    for result in results {
        match result {
            Ok(quad) => succeeded.push(quad),
            Err(failure) => {
                warn!("Estimation failed for {failure}");
                failed.push(failure);
            }
        }
    }
    (succeeded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CalibrationProfile;

    const LABELBOX: &str = r#"[
        {
            "External ID": "b.jpg",
            "Labeled Data": "https://example.com/b.jpg",
            "Label": {"EXIT_sign": [{"geometry": [
                {"x": 180, "y": 320}, {"x": "265.76", "y": "320"},
                {"x": 265.76, "y": 373.6}, {"x": 180, "y": 373.6}
            ]}]}
        },
        {
            "External ID": "a.jpg",
            "Labeled Data": "https://example.com/a.jpg",
            "Label": {"EXIT_sign": [{"geometry": [
                {"x": 180, "y": 373.6}, {"x": 265.76, "y": 373.6},
                {"x": 265.76, "y": 320}, {"x": 180, "y": 320}
            ]}]}
        },
        {
            "External ID": "skipped.jpg",
            "Labeled Data": "https://example.com/skipped.jpg",
            "Label": "Skip"
        },
        {
            "External ID": "three.jpg",
            "Label": {"EXIT_sign": [{"geometry": [
                {"x": 1, "y": 1}, {"x": 2, "y": 1}, {"x": 2, "y": 2}
            ]}]}
        }
    ]"#;

    #[test]
    fn test_parse_labelbox() {
        let parsed = parse_labels(LABELBOX, InputFormat::Labelbox, "EXIT_sign").unwrap();
        assert_eq!(parsed.skipped, 2);
        let ids: Vec<_> = parsed.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a.jpg", "b.jpg"]);
        assert_eq!(parsed.records[1].points[1], Point2::new(265.76, 320.0));
        assert_eq!(
            parsed.records[0].url.as_deref(),
            Some("https://example.com/a.jpg")
        );
    }

    #[test]
    fn test_parse_corners_with_mask_id_fallback() {
        let json = r#"[
            {"img_id": "img_2", "vertices_2D": [[1, 1], [5, 1], [5, 3], [1, 3]]},
            {"mask_id": 7, "vertices_2D": [[1.5, 1], [5, 1], [5, 3], [1, 3]]},
            {"vertices_2D": [[1, 1], [5, 1], [5, 3], [1, 3]]}
        ]"#;
        let parsed = parse_labels(json, InputFormat::Corners, "").unwrap();
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.records[0].id, "7");
        assert_eq!(parsed.records[1].id, "img_2");
        assert!(parsed.records.iter().all(|r| r.url.is_none()));
    }

    #[test]
    fn test_non_array_is_an_error() {
        assert!(matches!(
            parse_labels("{}", InputFormat::Corners, ""),
            Err(DatasetError::InvalidRecord(_))
        ));
        assert!(matches!(
            parse_labels("not json", InputFormat::Corners, ""),
            Err(DatasetError::JsonError(_))
        ));
    }

    #[test]
    fn test_process_records_keeps_order_and_failures() {
        let camera = CalibrationProfile::preset("pnp_360x640")
            .unwrap()
            .camera_model()
            .unwrap();
        let mut records = parse_labels(LABELBOX, InputFormat::Labelbox, "EXIT_sign")
            .unwrap()
            .records;
        records.push(LabelRecord {
            id: "collinear".to_string(),
            url: None,
            points: vec![
                Point2::new(0.0, 0.0),
                Point2::new(1.0, 1.0),
                Point2::new(2.0, 2.0),
                Point2::new(3.0, 3.0),
            ],
        });

        let results = process_records(&records, &camera, &DistanceModel::ALL);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().id(), "a.jpg");
        assert_eq!(results[1].as_ref().unwrap().id(), "b.jpg");
        let failure = results[2].as_ref().unwrap_err();
        assert_eq!(failure.id, "collinear");
        assert!(matches!(failure.error, EstimationError::DegenerateGeometry(_)));

        let (ok, failed) = partition_results(results);
        assert_eq!(ok.len(), 2);
        assert_eq!(failed.len(), 1);
        // Same corners in a different order give the same estimate.
        assert_eq!(ok[0].vertices(), ok[1].vertices());
        assert_eq!(ok[0].pose(), ok[1].pose());
    }

    #[test]
    fn test_load_sample_labels() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/samples/labelbox.json");
        let parsed = load_labels(path, InputFormat::Labelbox, "EXIT_sign").unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.skipped, 1);

        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/samples/corners.json");
        let parsed = load_labels(path, InputFormat::Corners, "").unwrap();
        assert_eq!(parsed.records.len(), 2);
    }
}
