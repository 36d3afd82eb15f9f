use thiserror::Error;

/// Errors raised by the trajectory simulation core.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A parameter or UI input is missing or unusable. Reported before any computation starts.
    #[error("invalid configuration for `{field}`: {reason}")]
    Config { field: &'static str, reason: String },

    /// A random draw was requested outside the distribution's domain.
    #[error("{distribution} distribution domain error: {reason}")]
    Domain {
        distribution: &'static str,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimulationError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::Config {
            field,
            reason: reason.into(),
        }
    }

    pub fn domain(distribution: &'static str, reason: impl Into<String>) -> Self {
        SimulationError::Domain {
            distribution,
            reason: reason.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimulationError>;
