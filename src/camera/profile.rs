//! Named calibration profiles and their YAML representation.
//!
//! A profile carries everything needed to build a [`CameraModel`] for one
//! capture device: intrinsics, distortion, native resolution and the size of
//! the target being photographed. Several profiles can coexist; nothing here
//! is global.
//!
//! The YAML layout is:
//!
//! ```yaml
//! profile:
//!   name: main_360x640
//!   intrinsics: [536.0, 536.0, 180.0, 320.0]
//!   distortion: [0.0, 0.0, 0.0, 0.0]
//!   resolution: [360, 640]
//!   target_size: [0.335, 0.195]
//! ```

use std::fs;
use std::io::Write;

use serde::{Deserialize, Serialize};
use yaml_rust::{Yaml, YamlLoader};

use super::{CameraModel, Intrinsics, Resolution, TargetGeometry};
use crate::error::EstimationError;

/// Inches to meters, for targets specified in imperial units.
const INCH: f64 = 0.0254;

#[derive(thiserror::Error, Debug)]
pub enum ProfileError {
    #[error("IO Error: {0}")]
    IOError(String),
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("Invalid profile parameters: {0}")]
    InvalidParams(String),
    #[error("Unknown calibration profile: {0}")]
    UnknownProfile(String),
    #[error(transparent)]
    Calibration(#[from] EstimationError),
}

impl From<std::io::Error> for ProfileError {
    fn from(err: std::io::Error) -> Self {
        ProfileError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for ProfileError {
    fn from(err: yaml_rust::ScanError) -> Self {
        ProfileError::YamlError(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub name: String,
    pub intrinsics: Intrinsics,
    /// 0, 4 or 5 Radial-Tangential coefficients.
    pub distortion: Vec<f64>,
    pub resolution: Resolution,
    pub target: TargetGeometry,
}

impl CalibrationProfile {
    /// Names accepted by [`CalibrationProfile::preset`].
    pub const PRESETS: [&'static str; 5] = [
        "main_360x640",
        "pnp_360x640",
        "groundtruth_1920x1440_iphone8",
        "street_4032x3024_iphone8s",
        "street_1008x756_iphone8s",
    ];

    /// Looks up a built-in profile by name.
    ///
    /// # Errors
    ///
    /// [`ProfileError::UnknownProfile`] if `name` is not one of
    /// [`CalibrationProfile::PRESETS`].
    pub fn preset(name: &str) -> Result<Self, ProfileError> {
        let exit_sign = TargetGeometry {
            width: 0.335,
            height: 0.195,
        };
        let street_sign = TargetGeometry {
            width: 32.0 * INCH,
            height: 19.0 * INCH,
        };

        let profile = match name {
            "main_360x640" => Self {
                name: name.to_string(),
                intrinsics: Intrinsics {
                    fx: 536.0,
                    fy: 536.0,
                    cx: 180.0,
                    cy: 320.0,
                },
                distortion: vec![0.0; 4],
                resolution: Resolution {
                    width: 360,
                    height: 640,
                },
                target: exit_sign,
            },
            "pnp_360x640" => Self {
                name: name.to_string(),
                intrinsics: Intrinsics {
                    fx: 536.0,
                    fy: 536.0,
                    cx: 180.0,
                    cy: 320.0,
                },
                distortion: Vec::new(),
                resolution: Resolution {
                    width: 360,
                    height: 640,
                },
                target: TargetGeometry {
                    width: 0.32,
                    height: 0.20,
                },
            },
            "groundtruth_1920x1440_iphone8" => Self {
                name: name.to_string(),
                intrinsics: Intrinsics {
                    fx: 1602.0,
                    fy: 1602.0,
                    cx: 960.0,
                    cy: 720.0,
                },
                distortion: vec![0.0; 4],
                resolution: Resolution {
                    width: 1920,
                    height: 1440,
                },
                target: exit_sign,
            },
            "street_4032x3024_iphone8s" => Self {
                name: name.to_string(),
                intrinsics: Intrinsics {
                    fx: 3280.1416389452497,
                    fy: 3298.877562243612,
                    cx: 2051.308838596682,
                    cy: 1457.0395478396988,
                },
                distortion: vec![
                    0.3584224308304239,
                    -3.2316961497984638,
                    -0.0020241077395336247,
                    0.005125810383911658,
                    9.145486487494859,
                ],
                resolution: Resolution {
                    width: 4032,
                    height: 3024,
                },
                target: street_sign,
            },
            "street_1008x756_iphone8s" => Self {
                name: name.to_string(),
                intrinsics: Intrinsics {
                    fx: 819.7375674224452,
                    fy: 824.4628650025569,
                    cx: 512.6162509923176,
                    cy: 363.63539991910477,
                },
                distortion: vec![
                    0.3625525153631118,
                    -3.2679279813000974,
                    -0.0021839532687696257,
                    0.005111306480977345,
                    9.299685322344486,
                ],
                resolution: Resolution {
                    width: 1008,
                    height: 756,
                },
                target: street_sign,
            },
            other => return Err(ProfileError::UnknownProfile(other.to_string())),
        };
        Ok(profile)
    }

    /// Builds the validated camera model described by this profile.
    pub fn camera_model(&self) -> Result<CameraModel, EstimationError> {
        CameraModel::new(self.intrinsics, &self.distortion, self.target)
    }

    /// Loads a profile from a YAML file and validates it.
    ///
    /// Numeric entries may be written as integers or reals.
    ///
    /// # Errors
    ///
    /// * [`ProfileError::IOError`] / [`ProfileError::YamlError`] if the file
    ///   cannot be read or parsed.
    /// * [`ProfileError::InvalidParams`] for missing or malformed keys.
    /// * [`ProfileError::Calibration`] if the values do not form a usable camera.
    pub fn load_from_yaml(path: &str) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ProfileError> {
        let docs = YamlLoader::load_from_str(contents)?;
        let doc = docs
            .first()
            .ok_or_else(|| ProfileError::InvalidParams("Empty YAML document".to_string()))?;
        let node = &doc["profile"];
        if node.is_badvalue() {
            return Err(ProfileError::InvalidParams(
                "Missing 'profile' section".to_string(),
            ));
        }

        let name = node["name"]
            .as_str()
            .ok_or_else(|| ProfileError::InvalidParams("Invalid name".to_string()))?
            .to_string();

        let intrinsics_yaml = numbers(&node["intrinsics"], "intrinsics")?;
        if intrinsics_yaml.len() != 4 {
            return Err(ProfileError::InvalidParams(format!(
                "Expected 4 intrinsics (fx, fy, cx, cy), found {}",
                intrinsics_yaml.len()
            )));
        }
        let intrinsics = Intrinsics {
            fx: intrinsics_yaml[0],
            fy: intrinsics_yaml[1],
            cx: intrinsics_yaml[2],
            cy: intrinsics_yaml[3],
        };

        // An absent distortion key means an undistorted camera.
        let distortion = if node["distortion"].is_badvalue() {
            Vec::new()
        } else {
            numbers(&node["distortion"], "distortion")?
        };

        let resolution_yaml = node["resolution"]
            .as_vec()
            .ok_or_else(|| ProfileError::InvalidParams("Invalid resolution".to_string()))?;
        let dimension = |index: usize, label: &str| -> Result<u32, ProfileError> {
            resolution_yaml
                .get(index)
                .and_then(Yaml::as_i64)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| ProfileError::InvalidParams(format!("Invalid {label}")))
        };
        let resolution = Resolution {
            width: dimension(0, "width")?,
            height: dimension(1, "height")?,
        };

        let target_yaml = numbers(&node["target_size"], "target_size")?;
        if target_yaml.len() != 2 {
            return Err(ProfileError::InvalidParams(format!(
                "Expected target_size [width, height], found {} values",
                target_yaml.len()
            )));
        }
        let target = TargetGeometry {
            width: target_yaml[0],
            height: target_yaml[1],
        };

        let profile = Self {
            name,
            intrinsics,
            distortion,
            resolution,
            target,
        };
        profile.camera_model()?;
        Ok(profile)
    }

    /// Writes the profile in the layout read by [`CalibrationProfile::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), ProfileError> {
        let yaml_string = self.to_yaml_string()?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;
        Ok(())
    }

    pub fn to_yaml_string(&self) -> Result<String, ProfileError> {
        let to_yaml = |value: serde_yaml::Result<serde_yaml::Value>| {
            value.map_err(|e| ProfileError::YamlError(e.to_string()))
        };

        let profile = serde_yaml::Mapping::from_iter([
            (
                serde_yaml::Value::String("name".to_string()),
                serde_yaml::Value::String(self.name.clone()),
            ),
            (
                serde_yaml::Value::String("intrinsics".to_string()),
                to_yaml(serde_yaml::to_value(vec![
                    self.intrinsics.fx,
                    self.intrinsics.fy,
                    self.intrinsics.cx,
                    self.intrinsics.cy,
                ]))?,
            ),
            (
                serde_yaml::Value::String("distortion".to_string()),
                to_yaml(serde_yaml::to_value(&self.distortion))?,
            ),
            (
                serde_yaml::Value::String("resolution".to_string()),
                to_yaml(serde_yaml::to_value(vec![
                    self.resolution.width,
                    self.resolution.height,
                ]))?,
            ),
            (
                serde_yaml::Value::String("target_size".to_string()),
                to_yaml(serde_yaml::to_value(vec![
                    self.target.width,
                    self.target.height,
                ]))?,
            ),
        ]);
        let root = serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("profile".to_string()),
            serde_yaml::Value::Mapping(profile),
        )]);

        serde_yaml::to_string(&root).map_err(|e| ProfileError::YamlError(e.to_string()))
    }
}

/// Reads a YAML sequence of numbers, accepting integers as well as reals.
fn numbers(node: &Yaml, key: &str) -> Result<Vec<f64>, ProfileError> {
    let values = node
        .as_vec()
        .ok_or_else(|| ProfileError::InvalidParams(format!("Invalid {key}")))?;
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value
                .as_f64()
                .or_else(|| value.as_i64().map(|v| v as f64))
                .ok_or_else(|| ProfileError::InvalidParams(format!("Invalid {key}[{i}]")))
        })
        .collect()
}
