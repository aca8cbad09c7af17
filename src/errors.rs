use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed sequence \"{sequence}\" at index {index} in {context}: {reason}")]
    MalformedSequence {
        sequence: String,
        index: usize,
        context: &'static str,
        reason: &'static str,
    },

    #[error("Duplicate sequence \"{sequence}\" at indices {first} and {second} in {context}")]
    DuplicateSequence {
        sequence: String,
        first: usize,
        second: usize,
        context: &'static str,
    },

    #[error("Invalid configuration in {context}: {reason}")]
    Config {
        context: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub fn utf8(b: &[u8]) -> String {
    String::from_utf8_lossy(b).into_owned()
}

pub(crate) fn config_error(context: &'static str, reason: impl Into<String>) -> Error {
    Error::Config {
        context,
        reason: reason.into(),
    }
}
