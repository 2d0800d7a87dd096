pub mod coord;
pub mod distance;

pub use coord::{AccuracyBand, Coordinate, PositionSample};
pub use distance::{distance, EARTH_RADIUS_METERS};
