//! Progress of a single asynchronous value as seen by a screen.

use crate::errors::UiError;

/// Exactly one tag is active at a time. Each operation moves it forward
/// `Uninitialized -> Loading -> Success | Fail`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Async<T> {
    #[default]
    Uninitialized,
    Loading,
    Success(T),
    Fail(UiError),
}

impl<T> Async<T> {
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::Uninitialized)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UiError> {
        match self {
            Self::Fail(err) => Some(err),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Async<U> {
        match self {
            Self::Uninitialized => Async::Uninitialized,
            Self::Loading => Async::Loading,
            Self::Success(value) => Async::Success(f(value)),
            Self::Fail(err) => Async::Fail(err),
        }
    }
}

impl<T> From<Result<T, UiError>> for Async<T> {
    fn from(value: Result<T, UiError>) -> Self {
        match value {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Fail(err),
        }
    }
}
