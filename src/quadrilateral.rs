//! One labelled target observation with everything derived from it.

use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::camera::CameraModel;
use crate::dataset::LabelRecord;
use crate::distance::{DistanceModel, Distances};
use crate::error::EstimationError;
use crate::geometry::{canonicalize, validate_corners};
use crate::pose::{solve_pose, Pose};
use crate::reprojection::{
    overlay_pixels, reproject, reprojection_error, AxisError, Overlay, OverlayPixels,
};

/// Four target corners in an image, with pose, distances and diagnostics.
///
/// Every derived field is computed once in [`Quadrilateral::new`]. Estimating
/// under another camera means building a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    url: Option<String>,
    /// Canonical {A, B, C, D} corners.
    vertices: [Point2<f64>; 4],
    pose: Pose,
    distances: Distances,
    /// Target corners reprojected through `pose`, in {A, B, C, D} order.
    projected_vertices: [Point2<f64>; 4],
    overlay: Overlay,
    overlay_pixels: OverlayPixels,
    error: AxisError,
}

impl Quadrilateral {
    /// Canonicalizes `points`, solves the pose and evaluates `models`.
    ///
    /// # Errors
    ///
    /// * [`EstimationError::DegenerateGeometry`] for unusable corner sets.
    /// * [`EstimationError::InvalidGeometry`] if a distance is zero or a
    ///   reference point cannot be projected.
    pub fn new(
        id: impl Into<String>,
        points: &[Point2<f64>],
        camera: &CameraModel,
        models: &[DistanceModel],
    ) -> Result<Self, EstimationError> {
        Self::build(id.into(), None, points, camera, models)
    }

    /// Like [`Quadrilateral::new`], keeping the record's id and image url.
    pub fn from_record(
        record: &LabelRecord,
        camera: &CameraModel,
        models: &[DistanceModel],
    ) -> Result<Self, EstimationError> {
        Self::build(
            record.id.clone(),
            record.url.clone(),
            &record.points,
            camera,
            models,
        )
    }

    fn build(
        id: String,
        url: Option<String>,
        points: &[Point2<f64>],
        camera: &CameraModel,
        models: &[DistanceModel],
    ) -> Result<Self, EstimationError> {
        let corners = validate_corners(points)?;
        let vertices = canonicalize(&corners);

        let pose = solve_pose(camera, &vertices)?;
        if !pose.is_in_front() {
            warn!(
                "{id}: target behind the camera (tvec z = {:.4})",
                pose.translation.z
            );
        }

        let distances = Distances::compute(camera, &vertices, &pose, models)?;
        let projected_vertices = reproject(camera, &pose)?;
        let overlay = Overlay::project(camera, &pose)?;
        let overlay_pixels = overlay_pixels(&projected_vertices, &overlay);
        let error = reprojection_error(&vertices, &projected_vertices);

        debug!(
            "{id}: distances {distances:?}, reprojection error x {:.3} y {:.3} px",
            error.x, error.y
        );

        Ok(Self {
            id,
            url,
            vertices,
            pose,
            distances,
            projected_vertices,
            overlay,
            overlay_pixels,
            error,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn vertices(&self) -> &[Point2<f64>; 4] {
        &self.vertices
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    pub fn distances(&self) -> &Distances {
        &self.distances
    }

    pub fn distance(&self, model: DistanceModel) -> Option<f64> {
        self.distances.get(model)
    }

    pub fn projected_vertices(&self) -> &[Point2<f64>; 4] {
        &self.projected_vertices
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn overlay_pixels(&self) -> &OverlayPixels {
        &self.overlay_pixels
    }

    pub fn error(&self) -> &AxisError {
        &self.error
    }

    /// Axis-aligned bounds of the canonical corners as `(min, max)`.
    pub fn bounding_box(&self) -> (Point2<f64>, Point2<f64>) {
        let mut min = self.vertices[0];
        let mut max = self.vertices[0];
        for v in &self.vertices[1..] {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CalibrationProfile;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn pnp_camera() -> CameraModel {
        CalibrationProfile::preset("pnp_360x640")
            .unwrap()
            .camera_model()
            .unwrap()
    }

    /// Corners of the 0.32 x 0.20 target seen head-on at 2 m.
    fn scenario_points() -> Vec<Point2<f64>> {
        vec![
            Point2::new(180.0, 320.0),
            Point2::new(265.76, 320.0),
            Point2::new(265.76, 373.6),
            Point2::new(180.0, 373.6),
        ]
    }

    #[test]
    fn test_scenario_distance() {
        let camera = pnp_camera();
        let quad =
            Quadrilateral::new("scenario", &scenario_points(), &camera, &DistanceModel::ALL)
                .unwrap();

        assert_relative_eq!(quad.distance(DistanceModel::Radial).unwrap(), 2.0, epsilon = 1e-3);
        assert_relative_eq!(
            quad.distance(DistanceModel::HorizontalDepth).unwrap(),
            2.0,
            epsilon = 1e-3
        );
        assert_relative_eq!(
            quad.distance(DistanceModel::PinholeRatio).unwrap(),
            2.0,
            epsilon = 1e-9
        );
        assert!(quad.error().x < 0.5);
        assert!(quad.error().y < 0.5);
        assert!(quad.pose().is_in_front());
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let camera = pnp_camera();
        let points = scenario_points();
        let mut reversed = points.clone();
        reversed.reverse();
        let shuffled = vec![points[2], points[0], points[3], points[1]];

        let expected = Quadrilateral::new("q", &points, &camera, &DistanceModel::ALL).unwrap();
        for order in [reversed, shuffled] {
            let quad = Quadrilateral::new("q", &order, &camera, &DistanceModel::ALL).unwrap();
            assert_eq!(quad, expected);
        }
    }

    #[test]
    fn test_vertices_are_canonical() {
        let camera = pnp_camera();
        let mut points = scenario_points();
        points.swap(0, 2);
        let quad = Quadrilateral::new("q", &points, &camera, &[DistanceModel::Radial]).unwrap();
        assert_eq!(quad.vertices()[0], Point2::new(180.0, 320.0));
        assert_eq!(quad.vertices()[2], Point2::new(265.76, 373.6));
        assert!(quad.distance(DistanceModel::PinholeRatio).is_none());
    }

    #[test]
    fn test_synthetic_reprojection_is_exact() {
        let camera = pnp_camera();
        let truth = crate::pose::Pose::new(
            Vector3::new(0.05, -0.15, 0.03),
            Vector3::new(-0.2, 0.1, 3.0),
        );
        let points = camera.project(&camera.target().corners(), &truth).unwrap();
        let quad = Quadrilateral::new("synthetic", &points, &camera, &DistanceModel::ALL).unwrap();

        assert!(quad.error().magnitude() < 1e-6);
        assert_relative_eq!(
            quad.distance(DistanceModel::Radial).unwrap(),
            truth.translation.norm(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_collinear_record_fails() {
        let camera = pnp_camera();
        let points = [
            Point2::new(10.0, 10.0),
            Point2::new(20.0, 20.0),
            Point2::new(30.0, 30.0),
            Point2::new(40.0, 40.0),
        ];
        assert!(matches!(
            Quadrilateral::new("bad", &points, &camera, &DistanceModel::ALL),
            Err(EstimationError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_bounding_box() {
        let camera = pnp_camera();
        let quad =
            Quadrilateral::new("q", &scenario_points(), &camera, &DistanceModel::ALL).unwrap();
        let (min, max) = quad.bounding_box();
        assert_eq!(min, Point2::new(180.0, 320.0));
        assert_eq!(max, Point2::new(265.76, 373.6));
    }

    #[test]
    fn test_serializes_to_json() {
        let camera = pnp_camera();
        let quad =
            Quadrilateral::new("q", &scenario_points(), &camera, &DistanceModel::ALL).unwrap();
        let json = serde_json::to_value(&quad).unwrap();
        assert_eq!(json["id"], "q");
        assert!(json["distances"]["radial"].is_number());
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_from_record_keeps_url() {
        let camera = pnp_camera();
        let record = LabelRecord {
            id: "r1".to_string(),
            url: Some("https://example.com/r1.jpg".to_string()),
            points: scenario_points(),
        };
        let quad = Quadrilateral::from_record(&record, &camera, &DistanceModel::ALL).unwrap();
        assert_eq!(quad.id(), "r1");
        assert_eq!(quad.url(), Some("https://example.com/r1.jpg"));

        let plain =
            Quadrilateral::new("r1", &scenario_points(), &camera, &DistanceModel::ALL).unwrap();
        assert_eq!(plain.url(), None);
        assert_eq!(quad.pose(), plain.pose());
        assert_eq!(quad.distances(), plain.distances());
    }
}
