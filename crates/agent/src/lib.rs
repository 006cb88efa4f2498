#![forbid(unsafe_code)]

//! Driver-side itinerary management: a local view of the vehicle's stops kept in step with the
//! delivery backend.

pub mod backend;
pub mod debounce;
pub mod itinerary;
pub mod manager;

pub use backend::{BackendError, DeliveryBackend, HttpBackend};
pub use manager::{ItineraryManager, ManagerError, ManagerOptions};
