//! Spherical Web Mercator (EPSG:3857) reprojection.
//!
//! Events and segments arrive in WGS84 (EPSG:4326) degrees. Distances for
//! the nearest-segment join are measured in projected metres.

use geo::{Coord, MapCoords as _, MultiLineString, Point};

/// Radius of the sphere used by EPSG:3857, in metres.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude beyond which Web Mercator diverges. Inputs are clamped to it.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects a WGS84 longitude/latitude pair into Web Mercator metres.
#[must_use]
pub fn to_web_mercator(longitude: f64, latitude: f64) -> Point<f64> {
    let lat = latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = EARTH_RADIUS_M * longitude.to_radians();
    let y = EARTH_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Point::new(x, y)
}

/// Inverse of [`to_web_mercator`]: returns `(longitude, latitude)` degrees.
#[must_use]
pub fn to_wgs84(x: f64, y: f64) -> Point<f64> {
    let longitude = (x / EARTH_RADIUS_M).to_degrees();
    let latitude = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::FRAC_PI_2)
        .to_degrees();
    Point::new(longitude, latitude)
}

/// Projects every vertex of a WGS84 line geometry into Web Mercator.
#[must_use]
pub fn project_lines(lines: &MultiLineString<f64>) -> MultiLineString<f64> {
    lines.map_coords(|c| {
        let p = to_web_mercator(c.x, c.y);
        Coord { x: p.x(), y: p.y() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_known_boston_coordinate() {
        let p = to_web_mercator(-71.07, 42.30);
        assert!((p.x() - -7_911_476.210_677_952).abs() < 1e-3);
        assert!((p.y() - 5_206_024.461_292_35).abs() < 1e-3);
    }

    #[test]
    fn round_trips_within_tolerance() {
        for &(lng, lat) in &[(-71.106, 42.365), (0.0, 0.0), (151.2093, -33.8688), (-0.1, 51.5)] {
            let projected = to_web_mercator(lng, lat);
            let back = to_wgs84(projected.x(), projected.y());
            assert!((back.x() - lng).abs() < 1e-6, "lng {lng} -> {}", back.x());
            assert!((back.y() - lat).abs() < 1e-6, "lat {lat} -> {}", back.y());
        }
    }

    #[test]
    fn clamps_polar_latitudes() {
        let p = to_web_mercator(0.0, 90.0);
        assert!(p.y().is_finite());
    }
}
