//! Remote command construction

use std::time::Duration;

/// Default privilege escalation prefix, keeps the caller's environment
pub const DEFAULT_ELEVATION_PREFIX: &str = "sudo -E";

/// A shell command to run on the remote host
///
/// Tokens are joined with single spaces and sent as one invocation string.
/// No escaping is performed: tokens containing spaces or shell
/// metacharacters must already be quoted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    tokens: Vec<String>,
    elevated: bool,
    stream_output: bool,
    elevation_prefix: String,
    timeout: Option<Duration>,
}

impl RemoteCommand {
    /// Create a plain, buffered, unelevated command
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            elevated: false,
            stream_output: false,
            elevation_prefix: DEFAULT_ELEVATION_PREFIX.to_string(),
            timeout: None,
        }
    }

    /// Run with escalated privileges
    #[must_use]
    pub fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// Relay stdout line by line while the command runs
    #[must_use]
    pub fn streaming(mut self, stream_output: bool) -> Self {
        self.stream_output = stream_output;
        self
    }

    /// Replace the escalation prefix (default `sudo -E`)
    #[must_use]
    pub fn with_elevation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.elevation_prefix = prefix.into();
        self
    }

    /// Bound how long the command may run
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream_output
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The invocation string sent to the host
    #[must_use]
    pub fn invocation(&self) -> String {
        let joined = self.tokens.join(" ");
        if self.elevated {
            format!("{} {joined}", self.elevation_prefix)
        } else {
            joined
        }
    }
}
