#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no device address configured")]
    AddressUnknown,
    #[error("network error: {0}")]
    Network(String),
    #[error("device answered HTTP {status}")]
    Server { status: u16 },
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid {field}: {value:?}")]
    Validation { field: &'static str, value: String },
    #[error("failed to build request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("device rejected the command")]
    Rejected,
}

impl ControlError {
    /// The device could not be reached at all, as opposed to answering badly
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ControlError::AddressUnknown | ControlError::Network(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
}
