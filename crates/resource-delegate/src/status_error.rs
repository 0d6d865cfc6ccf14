//! The wire-facing error boundary (spec.md §4.7, §6, §7): every error a
//! [`crate::delegate::ResourceDelegate`] operation can surface is funneled
//! through [`StatusError`] before it crosses the façade, so call sites never
//! construct a status-coded body ad hoc.

use std::fmt;

/// The status-code taxonomy of spec.md §7.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatusErrorKind {
    NotFound,
    AlreadyExists,
    Forbidden,
    Unauthorized,
    BadRequest,
    Conflict,
    Internal,
}

impl StatusErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            StatusErrorKind::NotFound => 404,
            StatusErrorKind::AlreadyExists => 409,
            StatusErrorKind::Forbidden => 403,
            StatusErrorKind::Unauthorized => 401,
            StatusErrorKind::BadRequest => 400,
            StatusErrorKind::Conflict => 409,
            StatusErrorKind::Internal => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusErrorKind::NotFound => "NotFound",
            StatusErrorKind::AlreadyExists => "AlreadyExists",
            StatusErrorKind::Forbidden => "Forbidden",
            StatusErrorKind::Unauthorized => "Unauthorized",
            StatusErrorKind::BadRequest => "BadRequest",
            StatusErrorKind::Conflict => "Conflict",
            StatusErrorKind::Internal => "InternalError",
        }
    }
}

/// The wire body shape of spec.md §6: `{kind: Status, code, reason, message}`.
#[derive(Clone, Debug, serde::Serialize)]
pub struct StatusError {
    pub kind: StatusErrorKind,
    pub code: u16,
    pub reason: String,
    pub message: String,
}

// `StatusErrorKind` needs to serialize as its reason string on the wire.
impl serde::Serialize for StatusErrorKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.reason())
    }
}

impl StatusError {
    pub fn new(kind: StatusErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            code: kind.http_status(),
            reason: kind.reason().to_string(),
            message,
            kind,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::AlreadyExists, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusErrorKind::Forbidden, message)
    }

    /// `MissingUserInfo` (spec.md §4.7): absent authenticated user in the
    /// request context. Egresses as `InternalError`, matching the spec's
    /// "translated to InternalError on egress unless a status-typed error
    /// wraps it" rule — callers never see the distinct reason on the wire.
    pub fn missing_user_info() -> Self {
        Self::new(StatusErrorKind::Internal, "Internal error occurred: missing user info")
    }

    /// `convertError(err)` (spec.md §4.7): already-status errors pass
    /// through unchanged; anything else becomes an internal-error status.
    pub fn convert<E: std::error::Error>(err: E) -> Self {
        Self::new(
            StatusErrorKind::Internal,
            format!("Internal error occurred: {err}"),
        )
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.reason, self.code, self.message)
    }
}

impl std::error::Error for StatusError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for StatusError {
    fn into_response(self) -> axum::response::Response {
        let status =
            axum::http::StatusCode::from_u16(self.code).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_user_info_egresses_as_internal() {
        let err = StatusError::missing_user_info();
        assert_eq!(err.kind, StatusErrorKind::Internal);
        assert_eq!(err.code, 500);
    }

    #[test]
    fn convert_wraps_generic_errors_as_internal() {
        #[derive(Debug)]
        struct Boom;
        impl fmt::Display for Boom {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "boom")
            }
        }
        impl std::error::Error for Boom {}

        let converted = StatusError::convert(Boom);
        assert_eq!(converted.kind, StatusErrorKind::Internal);
        assert!(converted.message.contains("boom"));
    }
}
