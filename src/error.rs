use std::fmt::{self, Debug, Display};
use std::io;

use crate::location::LocationId;
use crate::person::PersonId;

/// Provides `FacsError` and maps to other errors to
/// convert to a `FacsError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum FacsError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// A location failed validation when it was constructed.
    InvalidLocation(String),
    /// An agent needed a hospital but the location graph has none.
    NoHospital,
    /// A mutation fraction outside `[0, 1]`.
    InvalidFraction(f64),
    InvalidParameter(String),
    UnknownPerson(PersonId),
    UnknownLocation(LocationId),
    ReportError(String),
    FacsError(String),
}

impl From<io::Error> for FacsError {
    fn from(error: io::Error) -> Self {
        FacsError::IoError(error)
    }
}

impl From<serde_json::Error> for FacsError {
    fn from(error: serde_json::Error) -> Self {
        FacsError::JsonError(error)
    }
}

impl From<csv::Error> for FacsError {
    fn from(error: csv::Error) -> Self {
        FacsError::CSVError(error)
    }
}

impl From<String> for FacsError {
    fn from(error: String) -> Self {
        FacsError::FacsError(error)
    }
}

impl From<&str> for FacsError {
    fn from(error: &str) -> Self {
        FacsError::FacsError(error.to_string())
    }
}

impl std::error::Error for FacsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FacsError::IoError(error) => Some(error),
            FacsError::JsonError(error) => Some(error),
            FacsError::CSVError(error) => Some(error),
            _ => None,
        }
    }
}

impl Display for FacsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FacsError::InvalidLocation(message) => write!(f, "Invalid location: {message}"),
            FacsError::NoHospital => write!(
                f,
                "Agent is hospitalised, but there are no hospitals in the location graph"
            ),
            FacsError::InvalidFraction(fraction) => {
                write!(f, "Fraction must be within [0, 1], got {fraction}")
            }
            FacsError::InvalidParameter(message) => write!(f, "Invalid parameter: {message}"),
            FacsError::UnknownPerson(person_id) => write!(f, "Unknown person {person_id}"),
            FacsError::UnknownLocation(location_id) => {
                write!(f, "Unknown location {location_id}")
            }
            FacsError::ReportError(message) => write!(f, "Report error: {message}"),
            _ => write!(f, "Error: {self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_conversion() {
        let error: FacsError = "something broke".into();
        assert!(matches!(error, FacsError::FacsError(ref m) if m == "something broke"));
    }

    #[test]
    fn display_no_hospital() {
        assert_eq!(
            FacsError::NoHospital.to_string(),
            "Agent is hospitalised, but there are no hospitals in the location graph"
        );
    }

    #[test]
    fn io_error_has_source() {
        use std::error::Error;
        let error = FacsError::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert!(error.source().is_some());
    }
}
