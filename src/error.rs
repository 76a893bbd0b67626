use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid query input: {0}")]
    InvalidQuery(String),

    #[error("Query runner failed: {0}")]
    Runner(String),

    #[error("Malformed runner response: {0}")]
    MalformedResponse(String),
}

pub type QueryResult<T> = Result<T, QueryError>;
