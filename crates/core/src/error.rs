//! Error taxonomy shared by the coordinator and its HTTP surface.

use thiserror::Error;

use crate::api::ErrorBody;

/// Failure of an itinerary operation.
///
/// Validation variants are produced before anything is mutated; `RemoteFailure` means the fleet
/// engine refused or did not answer and nothing was committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItineraryError {
    /// The request is malformed or breaks an itinerary rule.
    #[error("{0}")]
    InvalidArgument(String),
    /// A referenced vehicle, stop or task does not exist.
    #[error("{0}")]
    NotFound(String),
    /// The caller may not act on the resource (assignment conflicts).
    #[error("{0}")]
    Forbidden(String),
    /// The fleet engine call failed.
    #[error("fleet engine call failed: {0}")]
    RemoteFailure(String),
    /// Persistence or other local fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ItineraryError {
    /// [`ItineraryError::InvalidArgument`] with `msg`.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// [`ItineraryError::NotFound`] with `msg`.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// [`ItineraryError::Forbidden`] with `msg`.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// HTTP status carried in the error body.
    pub fn status_code(&self) -> u16 {
        match self {
            ItineraryError::InvalidArgument(_) => 400,
            ItineraryError::Forbidden(_) => 403,
            ItineraryError::NotFound(_) => 404,
            ItineraryError::RemoteFailure(_) => 502,
            ItineraryError::Internal(_) => 500,
        }
    }

    /// Wire shape of the error.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            code: self.status_code(),
        }
    }
}
