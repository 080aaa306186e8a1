use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConciergeBotError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid flow state: {0}")]
    InvalidFlowState(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("delivery error: {0}")]
    Delivery(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, ConciergeBotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_error_display() {
        let err = ConciergeBotError::InvalidFlowState("missing selected_time".to_string());
        assert!(format!("{err}").contains("invalid flow state"));
        let err = ConciergeBotError::Delivery("push failed".to_string());
        assert!(format!("{err}").contains("delivery error"));
    }
}
