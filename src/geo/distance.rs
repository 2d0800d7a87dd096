use super::Coordinate;

/// Mean earth radius used for the spherical approximation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates (haversine).
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude().to_radians();
    let phi2 = b.latitude().to_radians();

    let delta_phi = (b.latitude() - a.latitude()).to_radians();
    let delta_lambda = (b.longitude() - a.longitude()).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}
