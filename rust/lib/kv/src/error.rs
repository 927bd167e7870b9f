use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KVError {
    #[error("storage error: {0}")]
    Storage(String),
}
