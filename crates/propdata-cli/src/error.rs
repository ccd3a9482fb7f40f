use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] propdata_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("gateway returned a failed response: {0}")]
    FailedEnvelope(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] propdata_store::StoreError),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Command(_) => 2,
            Self::FailedEnvelope(_) => 3,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
            Self::Store(_) => 11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_category() {
        let validation = CliError::from(propdata_core::ValidationError::EmptyCircuitName);
        assert_eq!(validation.exit_code(), 2);
        assert_eq!(CliError::FailedEnvelope(String::from("x")).exit_code(), 3);

        let io = CliError::from(std::io::Error::other("disk"));
        assert_eq!(io.exit_code(), 10);

        let store = CliError::from(propdata_store::StoreError::InvalidData(String::from("bad")));
        assert_eq!(store.exit_code(), 11);
    }
}
