/// Errors reported synchronously to the caller of an assessment.
///
/// Upstream provider failures never show up here; they are absorbed inside
/// the threat-intel and content-analysis modules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssessError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("Invalid URL format '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

impl AssessError {
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            AssessError::InvalidUrl { .. } | AssessError::UnsupportedScheme(_)
        )
    }
}
