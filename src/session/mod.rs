pub mod controller;
pub mod events;
pub mod state;

pub use controller::GeoSessionController;
pub use events::GeoEvent;
pub use state::{CheckInAffordance, SessionState, SessionStatus};
