use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Login stage type the server uses for plain password re-authentication.
pub const LOGIN_STAGE_PASSWORD: &str = "m.login.password";

/// Standard `errcode` values a homeserver answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "M_UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "M_FORBIDDEN")]
    Forbidden,
    #[serde(rename = "M_NOT_FOUND")]
    NotFound,
    #[serde(rename = "M_INVALID_PARAM")]
    InvalidParam,
    #[serde(rename = "M_LIMIT_EXCEEDED")]
    LimitExceeded,
    #[serde(other, rename = "M_UNKNOWN")]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "M_UNAUTHORIZED",
            ErrorCode::Forbidden => "M_FORBIDDEN",
            ErrorCode::NotFound => "M_NOT_FOUND",
            ErrorCode::InvalidParam => "M_INVALID_PARAM",
            ErrorCode::LimitExceeded => "M_LIMIT_EXCEEDED",
            ErrorCode::Unknown => "M_UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by a failed client-server API call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{errcode}: {error}")]
pub struct ApiException {
    pub errcode: ErrorCode,
    pub error: String,
}

impl ApiException {
    pub fn new(errcode: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            errcode,
            error: error.into(),
        }
    }
}

/// One acceptable sequence of login stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFlow {
    pub stages: Vec<String>,
}

impl AuthFlow {
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
        }
    }
}

/// The server refused a privileged call until the user re-authenticates.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("interactive authentication required (session {session})")]
pub struct InteractiveAuthRequired {
    pub session: String,
    pub flows: Vec<AuthFlow>,
}

impl InteractiveAuthRequired {
    pub fn supports_password(&self) -> bool {
        self.flows
            .iter()
            .any(|flow| flow.stages.iter().any(|stage| stage == LOGIN_STAGE_PASSWORD))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_stage_is_found_in_any_flow() {
        let err = InteractiveAuthRequired {
            session: "sess".into(),
            flows: vec![
                AuthFlow::new(["m.login.sso"]),
                AuthFlow::new(["m.login.recaptcha", LOGIN_STAGE_PASSWORD]),
            ],
        };
        assert!(err.supports_password());
    }

    #[test]
    fn sso_only_flows_do_not_support_password() {
        let err = InteractiveAuthRequired {
            session: "sess".into(),
            flows: vec![AuthFlow::new(["m.login.sso"])],
        };
        assert!(!err.supports_password());
    }

    #[test]
    fn unknown_errcodes_decode_as_unknown() {
        let err: ApiException =
            serde_json::from_str(r#"{"errcode":"M_USER_DEACTIVATED","error":"gone"}"#)
                .expect("error body");
        assert_eq!(err.errcode, ErrorCode::Unknown);
        assert_eq!(err.to_string(), "M_UNKNOWN: gone");

        let err: ApiException =
            serde_json::from_str(r#"{"errcode":"M_FORBIDDEN","error":"Invalid password"}"#)
                .expect("error body");
        assert_eq!(err, ApiException::new(ErrorCode::Forbidden, "Invalid password"));
    }

    #[test]
    fn interactive_auth_message_names_session() {
        let err: Box<dyn std::error::Error + Send + Sync> = Box::new(InteractiveAuthRequired {
            session: "abc".into(),
            flows: Vec::new(),
        });
        assert_eq!(
            err.to_string(),
            "interactive authentication required (session abc)"
        );
    }
}
