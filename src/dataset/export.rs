//! Writing processed records to disk.

use std::fs::File;
use std::io::{BufWriter, Write};

use serde::Serialize;

use super::DatasetError;
use crate::camera::Resolution;
use crate::distance::DistanceModel;
use crate::quadrilateral::Quadrilateral;

/// Writes all records as a pretty-printed JSON array.
pub fn write_json(results: &[Quadrilateral], path: &str) -> Result<(), DatasetError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// One row of the bounding-box table consumed by object-detection tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BboxRow {
    pub filename: String,
    pub width: u32,
    pub height: u32,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub distance: Option<f64>,
    pub class: String,
}

impl BboxRow {
    pub fn new(
        quad: &Quadrilateral,
        resolution: &Resolution,
        model: DistanceModel,
        class: &str,
    ) -> Self {
        let (min, max) = quad.bounding_box();
        Self {
            filename: quad.id().to_string(),
            width: resolution.width,
            height: resolution.height,
            xmin: min.x,
            ymin: min.y,
            xmax: max.x,
            ymax: max.y,
            distance: quad.distance(model),
            class: class.to_string(),
        }
    }
}

/// Writes `filename,width,height,xmin,ymin,xmax,ymax,distance,class` rows.
pub fn write_bbox_csv(
    results: &[Quadrilateral],
    resolution: &Resolution,
    model: DistanceModel,
    class: &str,
    path: &str,
) -> Result<(), DatasetError> {
    let mut writer = csv::Writer::from_path(path)?;
    for quad in results {
        writer.serialize(BboxRow::new(quad, resolution, model, class))?;
    }
    writer.flush()?;
    Ok(())
}
