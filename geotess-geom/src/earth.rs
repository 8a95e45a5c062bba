//! Earth shapes
//!
//! An [`EarthShape`] defines how geographic latitude and earth radius are
//! derived from a unit vector. Every model carries its own shape; there is
//! no process-wide mutable default.

use crate::vector::Vec3;
use strum_macros::{Display, EnumIter, EnumString};

/// Mean earth radius in km, used by the spherical shapes.
pub const SPHERE_RADIUS_KM: f64 = 6371.0;

/// How geographic latitude and earth radius are computed from a unit
/// vector.
///
/// The `*RConst` shapes apply the ellipsoidal geographic/geocentric
/// latitude conversion but report a constant earth radius, which is the
/// convention used by several travel-time models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum EarthShape {
    /// Sphere of radius 6371 km; geographic latitude equals geocentric.
    #[strum(serialize = "SPHERE")]
    Sphere,
    /// WGS84 ellipsoid: ellipsoidal radius and geographic latitude.
    #[strum(serialize = "WGS84")]
    Wgs84,
    /// WGS84 latitude conversion on a constant 6371 km radius.
    #[strum(serialize = "WGS84_RCONST")]
    Wgs84RConst,
    /// IERS2003 ellipsoid: ellipsoidal radius and geographic latitude.
    #[strum(serialize = "IERS2003")]
    Iers2003,
}

impl Default for EarthShape {
    fn default() -> Self {
        EarthShape::Wgs84
    }
}

impl EarthShape {
    /// Equatorial radius in km.
    pub fn equatorial_radius(self) -> f64 {
        match self {
            EarthShape::Sphere => SPHERE_RADIUS_KM,
            EarthShape::Wgs84 | EarthShape::Wgs84RConst => 6378.137,
            EarthShape::Iers2003 => 6378.1366,
        }
    }

    /// Inverse flattening 1/f, infinite for the sphere.
    pub fn inverse_flattening(self) -> f64 {
        match self {
            EarthShape::Sphere => f64::INFINITY,
            EarthShape::Wgs84 | EarthShape::Wgs84RConst => 298.257223563,
            EarthShape::Iers2003 => 298.25642,
        }
    }

    /// First eccentricity squared, e2 = f (2 - f).
    fn eccentricity_sq(self) -> f64 {
        let f = 1.0 / self.inverse_flattening();
        f * (2.0 - f)
    }

    fn constant_radius(self) -> bool {
        matches!(self, EarthShape::Sphere | EarthShape::Wgs84RConst)
    }

    /// Radius of the earth surface in km at the geocentric latitude of
    /// unit vector `v`.
    pub fn radius_at(self, v: Vec3) -> f64 {
        if self.constant_radius() {
            return SPHERE_RADIUS_KM;
        }
        let a = self.equatorial_radius();
        let f = 1.0 / self.inverse_flattening();
        // r = a / sqrt(1 + (1/(1-f)^2 - 1) sin^2(lat_geocentric)),
        // with sin(lat_geocentric) = v.z for a unit vector.
        let k = 1.0 / ((1.0 - f) * (1.0 - f)) - 1.0;
        a / (1.0 + k * v.z * v.z).sqrt()
    }

    /// Depth in km below the earth surface of a point at `radius` km in
    /// the direction of `v`.
    pub fn depth(self, v: Vec3, radius: f64) -> f64 {
        self.radius_at(v) - radius
    }

    /// Geographic latitude in radians of unit vector `v`.
    pub fn latitude(self, v: Vec3) -> f64 {
        let geocentric = v.z.asin();
        match self {
            EarthShape::Sphere => geocentric,
            _ => {
                // tan(geographic) = tan(geocentric) / (1 - e2)
                (geocentric.tan() / (1.0 - self.eccentricity_sq())).atan()
            }
        }
    }

    /// Longitude in radians of unit vector `v`, in (-pi, pi].
    pub fn longitude(self, v: Vec3) -> f64 {
        v.y.atan2(v.x)
    }

    /// Geographic latitude in degrees.
    pub fn latitude_degrees(self, v: Vec3) -> f64 {
        self.latitude(v).to_degrees()
    }

    /// Longitude in degrees.
    pub fn longitude_degrees(self, v: Vec3) -> f64 {
        self.longitude(v).to_degrees()
    }

    /// Unit vector at geographic latitude and longitude, both in degrees.
    pub fn unit_vector_degrees(self, lat: f64, lon: f64) -> Vec3 {
        self.unit_vector(lat.to_radians(), lon.to_radians())
    }

    /// Unit vector at geographic latitude and longitude, both in radians.
    pub fn unit_vector(self, lat: f64, lon: f64) -> Vec3 {
        let geocentric = match self {
            EarthShape::Sphere => lat,
            // tan(geocentric) = (1 - e2) tan(geographic)
            _ => ((1.0 - self.eccentricity_sq()) * lat.tan()).atan(),
        };
        let (sin_lat, cos_lat) = geocentric.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        Vec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }
}
