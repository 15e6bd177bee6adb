/// Convenience result type used across the factory.
pub type FactoryResult<T> = Result<T, FactoryError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Per-segment failures (`AssetNotFound`, `Synthesis`, `Media`) are normally caught at segment
/// granularity and turned into an omission; `Usage`, `Encoding` and `NoAssemblableContent` end
/// the run.
#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    /// Invalid configuration or script data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid command invocation.
    #[error("usage error: {0}")]
    Usage(String),

    /// A declared asset could not be found in any candidate directory.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// Both narration providers failed (or produced empty output).
    #[error("synthesis failure: {0}")]
    Synthesis(String),

    /// A provider call failed outside the per-segment fallback chain (ambient generation).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Decoding or measuring a media file failed.
    #[error("media error: {0}")]
    Media(String),

    /// The encoder rejected the timeline or the container could not be written.
    #[error("encoding failure: {0}")]
    Encoding(String),

    /// Every segment was omitted; there is nothing to encode.
    #[error("no assemblable content: {0}")]
    NoAssemblableContent(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FactoryError {
    /// Build a [`FactoryError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`FactoryError::Usage`] value.
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    /// Build a [`FactoryError::AssetNotFound`] value.
    pub fn asset_not_found(msg: impl Into<String>) -> Self {
        Self::AssetNotFound(msg.into())
    }

    /// Build a [`FactoryError::Synthesis`] value.
    pub fn synthesis(msg: impl Into<String>) -> Self {
        Self::Synthesis(msg.into())
    }

    /// Build a [`FactoryError::Media`] value.
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    /// Build a [`FactoryError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`FactoryError::NoAssemblableContent`] value.
    pub fn no_content(msg: impl Into<String>) -> Self {
        Self::NoAssemblableContent(msg.into())
    }

    /// Build a [`FactoryError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for invocation errors that should exit with the usage status.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }
}

impl From<std::io::Error> for FactoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(anyhow::Error::new(err))
    }
}

/// Failure reported by an external provider (narration or sound effects).
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// Credential rejected by the provider.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Account quota or character budget exhausted.
    #[error("quota exhausted: {0}")]
    Quota(String),

    /// Connection-level failure (DNS, TLS, reset, client timeout).
    #[error("network fault: {0}")]
    Network(String),

    /// Any other non-success HTTP status.
    #[error("provider returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// A command-line provider could not be spawned or exited unsuccessfully.
    #[error("provider command failed: {0}")]
    Command(String),

    /// The call exceeded the configured bound.
    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The provider reported success but the output was missing or empty.
    #[error("provider produced no audio: {0}")]
    EmptyOutput(String),

    /// Local IO while persisting the provider output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Map a non-success HTTP response onto the provider taxonomy.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let mut cut = 512;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        if body.contains("quota_exceeded") || status == 429 || status == 402 {
            return Self::Quota(format!("status {status}: {body}"));
        }
        match status {
            401 | 403 => Self::Auth(format!("status {status}: {body}")),
            _ => Self::Status { status, body },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FactoryError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(FactoryError::usage("x").to_string().contains("usage error:"));
        assert!(
            FactoryError::encoding("x")
                .to_string()
                .contains("encoding failure:")
        );
        assert!(
            FactoryError::no_content("x")
                .to_string()
                .contains("no assemblable content:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FactoryError::from(base);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn provider_errors_convert() {
        let err: FactoryError = ProviderError::Timeout(std::time::Duration::from_secs(2)).into();
        assert!(matches!(err, FactoryError::Provider(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            ProviderError::from_status(401, "invalid api key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, r#"{"detail":{"status":"quota_exceeded"}}"#),
            ProviderError::Quota(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, ""),
            ProviderError::Quota(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "oops"),
            ProviderError::Status { status: 500, .. }
        ));
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundary() {
        let body = "가".repeat(400);
        let ProviderError::Status { body, .. } = ProviderError::from_status(500, body) else {
            panic!("expected status error");
        };
        assert!(body.len() <= 512);
        assert!(body.chars().all(|c| c == '가'));
    }
}
