pub mod acquirer;
pub mod policy;
pub mod replay;
pub mod sensor;
pub mod simulated;

pub use acquirer::PositionAcquirer;
pub use policy::AccuracyPolicy;
pub use replay::{ReplaySensor, ReplayStep};
pub use sensor::{PositionSensor, SensorRequest};
pub use simulated::SimulatedSensor;
