use reqwest::StatusCode;
use thiserror::Error;

/// Failure classes shared by every upstream integration.
///
/// Permanent variants stop the retry wrapper on the first attempt; the rest
/// are retried up to the configured bound.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0} credentials missing")]
    MissingCredential(String),

    #[error("{service} rejected credentials ({status})")]
    Unauthorized { service: String, status: u16 },

    #[error("{service} refused request ({status}): {body}")]
    Rejected { service: String, status: u16, body: String },

    #[error("{service} unavailable ({status}): {body}")]
    Upstream { service: String, status: u16, body: String },

    #[error("{service} returned an unexpected payload: {detail}")]
    Malformed { service: String, detail: String },
}

impl BotError {
    pub fn from_status(service: &str, status: StatusCode, body: String) -> Self {
        let code = status.as_u16();
        let service = service.to_string();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BotError::Unauthorized { service, status: code },
            StatusCode::TOO_MANY_REQUESTS => BotError::Upstream { service, status: code, body },
            s if s.is_client_error() => BotError::Rejected { service, status: code, body },
            _ => BotError::Upstream { service, status: code, body },
        }
    }

    pub fn malformed(service: &str, detail: impl Into<String>) -> Self {
        BotError::Malformed { service: service.to_string(), detail: detail.into() }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BotError::MissingCredential(_) | BotError::Unauthorized { .. } | BotError::Rejected { .. }
        )
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, BotError::MissingCredential(_) | BotError::Unauthorized { .. })
    }
}

/// True when any error in the chain is a permanent `BotError`.
pub fn is_permanent(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<BotError>().map_or(false, BotError::is_permanent))
}

pub fn is_auth_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<BotError>().map_or(false, BotError::is_auth_failure))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn status_codes_map_to_classes() {
        let e = BotError::from_status("x", StatusCode::UNAUTHORIZED, String::new());
        assert!(e.is_permanent() && e.is_auth_failure());

        let e = BotError::from_status("x", StatusCode::TOO_MANY_REQUESTS, String::new());
        assert!(!e.is_permanent());

        let e = BotError::from_status("x", StatusCode::BAD_REQUEST, "bad".into());
        assert!(e.is_permanent());
        assert!(!e.is_auth_failure());

        let e = BotError::from_status("x", StatusCode::BAD_GATEWAY, String::new());
        assert!(!e.is_permanent());
    }

    #[test]
    fn classification_survives_context() {
        let err: anyhow::Result<()> = Err(BotError::MissingCredential("gemini".into()).into());
        let err = err.context("generation failed").unwrap_err();
        assert!(is_permanent(&err));
        assert!(is_auth_failure(&err));

        let plain = anyhow::anyhow!("connection reset");
        assert!(!is_permanent(&plain));
    }
}
