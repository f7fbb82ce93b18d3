//! User-facing failure modeling for device and verification screens.

use shared::error::{ApiException, ErrorCode, InteractiveAuthRequired};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Transport,
    Crypto,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    Refresh,
    Rename,
    Delete,
    Password,
    Verify,
    ManualVerify,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    /// Prefers the typed SDK error when there is one, then falls back to the message.
    pub fn from_error(context: UiErrorContext, err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let category = if err.downcast_ref::<InteractiveAuthRequired>().is_some() {
            Some(UiErrorCategory::Auth)
        } else if let Some(api) = err.downcast_ref::<ApiException>() {
            match api.errcode {
                ErrorCode::Unauthorized | ErrorCode::Forbidden => Some(UiErrorCategory::Auth),
                ErrorCode::InvalidParam | ErrorCode::NotFound => Some(UiErrorCategory::Validation),
                ErrorCode::LimitExceeded => Some(UiErrorCategory::Transport),
                ErrorCode::Unknown => None,
            }
        } else {
            None
        };

        match category {
            Some(category) => Self {
                category,
                context,
                message,
            },
            None => Self::from_message(context, message),
        }
    }

    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("401")
            || message_lower.contains("403")
            || message_lower.contains("unauthorized")
            || message_lower.contains("forbidden")
            || message_lower.contains("invalid password")
            || message_lower.contains("invalid credential")
        {
            UiErrorCategory::Auth
        } else if message_lower.contains("olm")
            || message_lower.contains("signature")
            || message_lower.contains("keys")
            || message_lower.contains("crypto")
        {
            UiErrorCategory::Crypto
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("unknown device")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connection")
            || message_lower.contains("network")
            || message_lower.contains("unavailable")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
