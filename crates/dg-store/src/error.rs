use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Core(#[from] dg_core::CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("path '{path}' appears twice in a global map, with keys '{first}' and '{second}'")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },

    #[error("key '{0}' assigned to more than one path in the same global map")]
    DuplicateKey(String),

    #[error("tracker file '{0}' could not be parsed; continuing with an empty prior grid")]
    TrackerFormat(String),

    #[error("tracker write for '{0}' would violate invariant T1/T2: {1}")]
    InvariantViolation(String, String),
}
