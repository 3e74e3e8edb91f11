use serde::{Deserialize, Serialize};

use crate::camera::{Camera, ImageCoordinate, XDependency};

/// Pinhole framing camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramingCamera {
    /// Focal length, millimeters.
    pub focal_length: f64,
    /// Detector pixel pitch, millimeters.
    pub pixel_pitch: f64,
    pub boresight_sample: f64,
    pub boresight_line: f64,
    #[serde(default = "default_x_dependency")]
    pub x_dependency: XDependency,
}

fn default_x_dependency() -> XDependency {
    XDependency::Sample
}

impl FramingCamera {
    pub fn new(focal_length: f64, pixel_pitch: f64, boresight_sample: f64, boresight_line: f64) -> Self {
        Self {
            focal_length,
            pixel_pitch,
            boresight_sample,
            boresight_line,
            x_dependency: XDependency::Sample,
        }
    }
}

impl Camera for FramingCamera {
    fn x_dependency(&self) -> XDependency {
        self.x_dependency
    }

    fn focal_length(&self) -> f64 {
        self.focal_length
    }

    fn pixel_pitch(&self) -> f64 {
        self.pixel_pitch
    }

    fn boresight(&self) -> ImageCoordinate {
        ImageCoordinate::new(self.boresight_sample, self.boresight_line)
    }
}
