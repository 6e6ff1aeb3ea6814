//! Geographic coordinates and bounding boxes.
//!
//! Map files store coordinates as microdegrees in signed 32-bit integers.

use serde::Serialize;

use crate::error::FormatError;

/// Maximum latitude in degrees.
pub const LATITUDE_MAX: f64 = 90.0;

/// Minimum latitude in degrees.
pub const LATITUDE_MIN: f64 = -90.0;

/// Maximum longitude in degrees.
pub const LONGITUDE_MAX: f64 = 180.0;

/// Minimum longitude in degrees.
pub const LONGITUDE_MIN: f64 = -180.0;

/// Conversion factor between degrees and microdegrees.
const CONVERSION_FACTOR: f64 = 1_000_000.0;

/// Convert a coordinate from microdegrees to degrees.
#[inline]
pub fn microdegrees_to_degrees(microdegrees: i32) -> f64 {
    microdegrees as f64 / CONVERSION_FACTOR
}

fn is_valid_latitude(latitude: f64) -> bool {
    (LATITUDE_MIN..=LATITUDE_MAX).contains(&latitude)
}

fn is_valid_longitude(longitude: f64) -> bool {
    (LONGITUDE_MIN..=LONGITUDE_MAX).contains(&longitude)
}

/// A point on the globe in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLong {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLong {
    /// Create a coordinate without range checks.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are inside the valid coordinate range.
    pub fn is_valid(&self) -> bool {
        is_valid_latitude(self.latitude) && is_valid_longitude(self.longitude)
    }
}

/// An axis-aligned geographic rectangle.
///
/// Always satisfies `min_latitude <= max_latitude` and
/// `min_longitude <= max_longitude`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub min_longitude: f64,
    pub max_latitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Create a bounding box, validating ranges and ordering.
    pub fn new(
        min_latitude: f64,
        min_longitude: f64,
        max_latitude: f64,
        max_longitude: f64,
    ) -> Result<Self, FormatError> {
        let valid = is_valid_latitude(min_latitude)
            && is_valid_latitude(max_latitude)
            && is_valid_longitude(min_longitude)
            && is_valid_longitude(max_longitude)
            && min_latitude <= max_latitude
            && min_longitude <= max_longitude;

        if !valid {
            return Err(FormatError::InvalidBoundingBox {
                min_lat: min_latitude,
                min_lon: min_longitude,
                max_lat: max_latitude,
                max_lon: max_longitude,
            });
        }

        Ok(Self {
            min_latitude,
            min_longitude,
            max_latitude,
            max_longitude,
        })
    }

    /// Center point of the box.
    pub fn center(&self) -> LatLong {
        LatLong::new(
            self.min_latitude + (self.max_latitude - self.min_latitude) / 2.0,
            self.min_longitude + (self.max_longitude - self.min_longitude) / 2.0,
        )
    }

    /// Whether the point lies inside the box (edges included).
    pub fn contains(&self, point: &LatLong) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude)
    }
}
