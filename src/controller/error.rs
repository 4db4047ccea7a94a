//! Error types for the Component controller

use std::time::Duration;

use thiserror::Error;

/// Error variants are named with the `Error` suffix where they wrap a lower
/// layer (e.g., `KubeError`), and after the reconcile outcome otherwise.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The component declares no handler for the requested action
    #[error("lifecycle action {0} custom handler not found")]
    ActionNotDefined(String),

    /// The action exists but cannot be run the requested way
    #[error("unsupported lifecycle action: {0}")]
    UnsupportedAction(String),

    /// An ordering invariant between steps does not hold yet
    #[error("precondition not met: {0}")]
    PreconditionFailed(String),

    /// Work is in flight; requeue and check again without reporting a failure
    #[error("requeue to wait: {0}")]
    ExpectedInProcess(String),

    /// Progress was made but another pass is needed after the delay
    #[error("requeue after {0:?}: {1}")]
    RequeueAfter(Duration, String),

    #[error("{0}")]
    JobFailed(String),

    /// Optimistic concurrency conflict on write
    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("Permanent error (will not retry): {0}")]
    PermanentError(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::KubeError(e) => match e {
                kube::Error::Api(api_err) => {
                    // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                    let code = api_err.code;
                    if (400..500).contains(&code) {
                        return code == 409 || code == 429;
                    }
                    true
                }
                // Network and other errors are retryable
                _ => true,
            },
            Error::ExpectedInProcess(_) => true,
            Error::RequeueAfter(..) => true,
            Error::ConflictError(_) => true,
            // Pods and jobs may still appear
            Error::NotFound(_) => true,
            Error::PreconditionFailed(_) => true,
            Error::PermanentError(_) => false,
            Error::InvalidConfig(_) => false,
            Error::ActionNotDefined(_) => false,
            Error::UnsupportedAction(_) => false,
            Error::JobFailed(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
        }
    }

    /// Check if the error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(api_err)) => api_err.code == 404,
            Error::NotFound(_) => true,
            _ => false,
        }
    }

    /// Check if the error is a write conflict
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(api_err)) => api_err.code == 409,
            Error::ConflictError(_) => true,
            _ => false,
        }
    }

    /// Expected requeues are normal control flow, not failures
    pub fn is_expected(&self) -> bool {
        matches!(self, Error::ExpectedInProcess(_) | Error::RequeueAfter(..))
    }

    /// Explicit delay requested by the error, if any
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            Error::RequeueAfter(delay, _) => Some(*delay),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
    /// Delay used while waiting on in-flight work
    pub in_process_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
            in_process_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error
    ///
    /// Expected requeues use their own delay, retryable errors back off
    /// exponentially and anything else waits the maximum delay.
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if let Some(delay) = error.requeue_delay() {
            return delay;
        }
        if error.is_expected() {
            return self.in_process_delay;
        }
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            self.max_delay
        }
    }
}
