use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Strategy not found: aggregator={aggregator}, method={method}, channel={channel}")]
    StrategyNotFound {
        aggregator: String,
        method: String,
        channel: String,
    },

    /// The provider wants manual action (capture, retry later, admin fix).
    /// `deactivate_channel` asks the caller to stop routing to the channel.
    #[error("Payment required: {message}")]
    PaymentRequired {
        message: String,
        deactivate_channel: bool,
    },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    /// `outcome_unknown` is set when the request may have reached the provider.
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        outcome_unknown: bool,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl PaymentError {
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        PaymentError::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PaymentError::InternalError {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        PaymentError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Prefix the error message with the operation that produced it.
    pub fn context(self, operation: &str) -> Self {
        let annotate = |message: String| format!("{}: {}", operation, message);
        match self {
            PaymentError::ValidationError { message, field } => PaymentError::ValidationError {
                message: annotate(message),
                field,
            },
            PaymentError::PaymentRequired {
                message,
                deactivate_channel,
            } => PaymentError::PaymentRequired {
                message: annotate(message),
                deactivate_channel,
            },
            PaymentError::ProviderError {
                provider,
                message,
                provider_code,
                retryable,
            } => PaymentError::ProviderError {
                provider,
                message: annotate(message),
                provider_code,
                retryable,
            },
            PaymentError::NetworkError {
                message,
                outcome_unknown,
            } => PaymentError::NetworkError {
                message: annotate(message),
                outcome_unknown,
            },
            PaymentError::ConfigurationError { message } => PaymentError::ConfigurationError {
                message: annotate(message),
            },
            PaymentError::InternalError { message } => PaymentError::InternalError {
                message: annotate(message),
            },
            other @ (PaymentError::StrategyNotFound { .. } | PaymentError::NotFound { .. }) => {
                other
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ValidationError { .. } => false,
            PaymentError::StrategyNotFound { .. } => false,
            PaymentError::PaymentRequired { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::NetworkError { .. } => true,
            PaymentError::NotFound { .. } => false,
            PaymentError::ConfigurationError { .. } => false,
            PaymentError::InternalError { .. } => false,
        }
    }

    /// True when the provider may have accepted the charge even though we
    /// did not get an answer back.
    pub fn is_outcome_unknown(&self) -> bool {
        matches!(
            self,
            PaymentError::NetworkError {
                outcome_unknown: true,
                ..
            }
        )
    }

    pub fn deactivates_channel(&self) -> bool {
        matches!(
            self,
            PaymentError::PaymentRequired {
                deactivate_channel: true,
                ..
            }
        )
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::ValidationError { .. } => 400,
            PaymentError::StrategyNotFound { .. } => 500,
            PaymentError::PaymentRequired { .. } => 402,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError { .. } => 503,
            PaymentError::NotFound { .. } => 404,
            PaymentError::ConfigurationError { .. } => 500,
            PaymentError::InternalError { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::ValidationError { message, .. } => message.clone(),
            PaymentError::StrategyNotFound { .. } => {
                "Selected payment channel is not available".to_string()
            }
            PaymentError::PaymentRequired { message, .. } => message.clone(),
            PaymentError::ProviderError { message, .. } => message.clone(),
            PaymentError::NetworkError { .. } => {
                "Payment provider is temporarily unavailable".to_string()
            }
            PaymentError::NotFound { entity, .. } => format!("{} not found", entity),
            PaymentError::ConfigurationError { .. } | PaymentError::InternalError { .. } => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        PaymentError::InternalError {
            message: format!("json decode failed: {}", err),
        }
    }
}
