use thiserror::Error;

/// Boxed error used for per-stream transport failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for kubelogs operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving or streaming logs.
#[derive(Error, Debug)]
pub enum Error {
    /// No pod appeared in time, or nothing matched the target.
    #[error("{0}")]
    NotFound(String),

    #[error("container {container} is not valid for pod {pod}")]
    InvalidContainer { pod: String, container: String },

    #[error("invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("cannot get the logs from {kind}: selector for {kind} not implemented")]
    UnsupportedSelector { kind: String },

    #[error(
        "you are attempting to follow {requested} log streams, \
         but maximum allowed concurrency is {max}, \
         use --max-log-requests to increase the limit"
    )]
    TooManyFollowedStreams { requested: usize, max: usize },

    /// Opening or reading one container's log stream failed.
    #[error("failed to stream logs of pod/{pod}/{container} in namespace {namespace}: {source}")]
    Stream {
        namespace: String,
        pod: String,
        container: String,
        #[source]
        source: BoxError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid log options: {0}")]
    InvalidOptions(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("failed to write log output: {0}")]
    Output(#[from] std::io::Error),

    #[error(transparent)]
    Kube(kube::Error),

    #[error(transparent)]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error(transparent)]
    InferConfig(#[from] kube::config::InferConfigError),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<kube::Error> for Error {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => Error::NotFound(resp.message),
            other => Error::Kube(other),
        }
    }
}
