//! Aggregate statistics over a processed dataset.

use log::info;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceModel;
use crate::quadrilateral::Quadrilateral;
use crate::reprojection::{mean_axis_error, AxisError, ProjectionError};

/// Bin count used when none is configured.
pub const DEFAULT_BINS: usize = 50;

/// The record at one end of the distance range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceExtreme {
    pub id: String,
    pub url: Option<String>,
    pub distance: f64,
}

/// Equal-width histogram; the last bin includes its upper edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// `None` when there are no values or no bins.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bin_width = (max - min) / bins as f64;

        let mut counts = vec![0; bins];
        for &value in values {
            let bin = if bin_width > 0.0 {
                (((value - min) / bin_width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[bin] += 1;
        }

        Some(Self {
            min,
            max,
            bin_width,
            counts,
        })
    }

    /// Lower edge of every bin.
    pub fn edges(&self) -> Vec<f64> {
        (0..self.counts.len())
            .map(|i| self.min + i as f64 * self.bin_width)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Distance model used for the extremes and the histogram.
    pub model: DistanceModel,
    pub mean_error: Option<AxisError>,
    /// Statistics of the per-record error magnitude.
    pub error_stats: Option<ProjectionError>,
    pub min_distance: Option<DistanceExtreme>,
    pub max_distance: Option<DistanceExtreme>,
    pub histogram: Option<Histogram>,
    /// Poses with the target origin at non-positive depth.
    pub negative_depth: usize,
}

impl DatasetSummary {
    pub fn from_results(
        results: &[Quadrilateral],
        failed: usize,
        model: DistanceModel,
        bins: usize,
    ) -> Self {
        let mean_error = mean_axis_error(results.iter().map(Quadrilateral::error));
        let magnitudes: Vec<f64> = results.iter().map(|q| q.error().magnitude()).collect();
        let error_stats = ProjectionError::from_samples(&magnitudes);

        let measured: Vec<(&Quadrilateral, f64)> = results
            .iter()
            .filter_map(|q| q.distance(model).map(|d| (q, d)))
            .collect();
        let extreme = |(quad, distance): (&Quadrilateral, f64)| DistanceExtreme {
            id: quad.id().to_string(),
            url: quad.url().map(str::to_string),
            distance,
        };
        // Ties keep the first record in dataset order.
        let min_distance = measured
            .iter()
            .copied()
            .reduce(|best, next| if next.1 < best.1 { next } else { best })
            .map(extreme);
        let max_distance = measured
            .iter()
            .copied()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .map(extreme);

        let distances: Vec<f64> = measured.iter().map(|(_, d)| *d).collect();
        let histogram = Histogram::new(&distances, bins);
        let negative_depth = results.iter().filter(|q| !q.pose().is_in_front()).count();

        Self {
            succeeded: results.len(),
            failed,
            model,
            mean_error,
            error_stats,
            min_distance,
            max_distance,
            histogram,
            negative_depth,
        }
    }

    pub fn log(&self) {
        info!(
            "Records: {} succeeded, {} failed, {} with negative depth",
            self.succeeded, self.failed, self.negative_depth
        );
        if let Some(error) = &self.mean_error {
            info!(
                "Mean reprojection error: x {:.4} px, y {:.4} px",
                error.x, error.y
            );
        }
        if let Some(stats) = &self.error_stats {
            info!("{stats:?}");
        }
        if let Some(min) = &self.min_distance {
            info!(
                "Min {} distance: {:.4} m ({}, {})",
                self.model,
                min.distance,
                min.id,
                min.url.as_deref().unwrap_or("-")
            );
        }
        if let Some(max) = &self.max_distance {
            info!(
                "Max {} distance: {:.4} m ({}, {})",
                self.model,
                max.distance,
                max.id,
                max.url.as_deref().unwrap_or("-")
            );
        }
        if let Some(histogram) = &self.histogram {
            for (edge, count) in histogram.edges().iter().zip(&histogram.counts) {
                info!(
                    "  [{:>8.3}, {:>8.3}) {count}",
                    edge,
                    edge + histogram.bin_width
                );
            }
        }
    }
}
