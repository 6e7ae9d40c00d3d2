use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("message {message_id} payload is not a UTF-8 file name")]
    InvalidPayload {
        message_id: String,
        #[source]
        source: std::str::Utf8Error,
    },

    #[error("content of {name} is not a number: {content:?}")]
    NotANumber {
        name: String,
        content: String,
        #[source]
        source: std::num::ParseFloatError,
    },
}
