use std::fmt::Display;

use calabash_solver::parsers::ParseError;
use thiserror::Error;

pub(crate) type CalabashResult<T> = Result<T, CalabashError>;

#[derive(Error, Debug)]
pub(crate) enum CalabashError {
    #[error("IO error, more details: {0}")]
    Io(#[from] std::io::Error),
    #[error("The file {0} is not supported.")]
    InvalidInstanceFile(String),
    #[error("Failed to load the instance, more details: {0}")]
    Parse(#[from] ParseError),
    #[error("Invalid bound: {0}")]
    InvalidBound(String),
}

impl CalabashError {
    pub(crate) fn invalid_instance(path: impl Display) -> Self {
        Self::InvalidInstanceFile(format!("{path}"))
    }
}
