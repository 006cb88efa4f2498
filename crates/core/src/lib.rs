#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared itinerary model, stop-state rules and wire types for the delivery daemon and driver agent.

pub mod api;
pub mod error;
pub mod model;
pub mod state;
pub mod validation;

mod util;

pub use error::ItineraryError;
pub use util::now_ms;
