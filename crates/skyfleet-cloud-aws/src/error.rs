//! AWS client error types

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use skyfleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    /// EC2 answered with an error code
    #[error("{operation} failed ({code}): {message}")]
    Service {
        operation: &'static str,
        code: String,
        message: String,
    },

    /// The request never got a service answer (credentials, network, timeout)
    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    #[error("unexpected aws response: {0}")]
    UnexpectedResponse(String),

    #[error("{0}")]
    Unsupported(String),
}

impl AwsError {
    /// Classify an SDK failure of `operation`
    pub fn from_sdk<E, R>(operation: &'static str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug + Send + Sync + 'static,
    {
        let service = err
            .as_service_error()
            .and_then(|e| Some((e.code()?.to_string(), e.message().unwrap_or_default().to_string())));
        match service {
            Some((code, message)) => AwsError::Service {
                operation,
                code,
                message,
            },
            None => AwsError::Transport {
                operation,
                message: DisplayErrorContext(err).to_string(),
            },
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|code| {
            code.ends_with("NotFound")
                || code == "InvalidInstanceType"
                || code == "InvalidAMIID.Unavailable"
        })
    }

    pub fn is_already_exists(&self) -> bool {
        self.code().is_some_and(|code| {
            code.ends_with(".Duplicate")
                || code.contains("AlreadyExists")
                || code.contains("AlreadyAssociated")
        })
    }

    fn is_conflict(&self) -> bool {
        self.code().is_some_and(|code| {
            matches!(code, "DependencyViolation" | "VolumeInUse" | "IncorrectState")
                || code.ends_with(".InUse")
                || code.starts_with("IncorrectInstanceState")
        })
    }
}

/// Attach the EC2 operation name to an SDK result
pub(crate) trait OperationResult<T> {
    fn during(self, operation: &'static str) -> Result<T>;
}

impl<T, E, R> OperationResult<T> for std::result::Result<T, SdkError<E, R>>
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    fn during(self, operation: &'static str) -> Result<T> {
        self.map_err(|e| AwsError::from_sdk(operation, e))
    }
}

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        if e.is_not_found() {
            CloudError::NotFound(e.to_string())
        } else if e.is_already_exists() {
            CloudError::AlreadyExists(e.to_string())
        } else if e.is_conflict() {
            CloudError::Conflict(e.to_string())
        } else {
            match e {
                AwsError::Unsupported(message) => CloudError::InvalidConfig(message),
                AwsError::UnexpectedResponse(message) => CloudError::Api(message),
                AwsError::Service { .. } | AwsError::Transport { .. } => {
                    CloudError::Api(e.to_string())
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
