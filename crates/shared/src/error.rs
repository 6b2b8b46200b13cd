use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("follow-me payload must be a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },
    #[error("invalid follow-me field {field}: {source}")]
    InvalidField {
        field: &'static str,
        source: serde_json::Error,
    },
}
