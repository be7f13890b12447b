use crate::error::AssessError;
use serde::Deserialize;
use url::Url;

/// Incoming assessment request. Fields are optional so that a missing value
/// is reported as a client error instead of a decode failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssessmentRequest {
    pub url: Option<String>,
    pub content: Option<String>,
}

impl AssessmentRequest {
    pub fn require_url(&self) -> Result<&str, AssessError> {
        match self.url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(AssessError::MissingField("URL")),
        }
    }

    pub fn require_content(&self) -> Result<&str, AssessError> {
        self.content
            .as_deref()
            .ok_or(AssessError::MissingField("Content"))
    }
}

/// Parse an absolute `http`/`https` URL.
pub fn parse_target_url(raw: &str) -> Result<Url, AssessError> {
    let url = Url::parse(raw.trim()).map_err(|e| AssessError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(AssessError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AssessError::InvalidUrl {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_url() {
        assert!(parse_target_url("https://example.com/").is_ok());
        assert!(parse_target_url("http://192.168.0.1/login").is_ok());

        assert!(matches!(
            parse_target_url("not a url"),
            Err(AssessError::InvalidUrl { .. })
        ));
        assert!(matches!(
            parse_target_url("/relative/path"),
            Err(AssessError::InvalidUrl { .. })
        ));
        assert_eq!(
            parse_target_url("ftp://example.com/file"),
            Err(AssessError::UnsupportedScheme("ftp".to_string()))
        );
        assert!(parse_target_url("javascript:alert(1)")
            .unwrap_err()
            .is_format_error());
    }

    #[test]
    fn test_required_fields() {
        let request = AssessmentRequest::default();
        assert_eq!(
            request.require_url(),
            Err(AssessError::MissingField("URL"))
        );
        assert_eq!(
            request.require_content(),
            Err(AssessError::MissingField("Content"))
        );

        let request: AssessmentRequest =
            serde_json::from_str(r#"{"url": "https://example.com", "content": ""}"#).unwrap();
        assert_eq!(request.require_url(), Ok("https://example.com"));
        assert_eq!(request.require_content(), Ok(""));
    }
}
