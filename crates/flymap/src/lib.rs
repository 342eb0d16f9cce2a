pub mod config;
pub mod controller;
pub mod error;
pub mod focus;
pub mod geocoding;
pub mod location;
pub mod markers;
pub mod overlay;
pub mod single;
pub mod surface;
pub mod timer;
pub mod types;
pub mod viewport;

pub use config::MapConfig;
pub use controller::{HostCallbacks, MapController, MapEvent, Services};
pub use error::MapError;
