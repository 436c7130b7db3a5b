use chrono::{DateTime, NaiveDate};
use db::{
    models::{Media, Session},
    Database, LockedDb,
};
use filters::{Forbidden, InvalidToken, Unauthenticated};
use log::error;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::{http::StatusCode, Rejection, Reply};

#[derive(Serialize)]
pub struct FailureResponse {
    success: bool,
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl FailureResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            error: None,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub enum ErrorCode {
    MissingCredentials,
    InvalidCredentials,
    InsufficientAuthorization,
    MalformedData,
    MissingFields,
    InvalidOldPassword,
    PasswordTooSimple,
    InvalidEmail,
    InvalidDate,
    Conflict,
    NoActiveSession,
    NotFound,
    MethodNotAllowed,
    InternalServerError,
}

/// Every failure a handler reports, rendered by [`handle_rejection`]
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    /// Raw cause, only shown in development mode
    pub detail: Option<String>,
}

impl warp::reject::Reject for ApiError {}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn bad_request(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn missing_fields() -> Self {
        Self::bad_request(ErrorCode::MissingFields, "Missing required fields")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            ErrorCode::InsufficientAuthorization,
            message,
        )
    }

    /// Store failure on a write route: business-rule violations are all reported as 400
    pub fn rejected_write(err: db::Error) -> Self {
        let mut api_error = Self::from(err);
        if api_error.status != StatusCode::INTERNAL_SERVER_ERROR {
            api_error.status = StatusCode::BAD_REQUEST;
        }
        api_error
    }

    /// 500, with `detail` only shown in development
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::InternalServerError,
                "Server error",
            )
        }
    }

    pub fn rejection(self) -> Rejection {
        warp::reject::custom(self)
    }
}

impl From<db::Error> for ApiError {
    fn from(err: db::Error) -> Self {
        match err {
            db::Error::Validation(message) => Self::bad_request(ErrorCode::MalformedData, message),
            db::Error::Conflict(message) => Self::bad_request(ErrorCode::Conflict, message),
            db::Error::NotFound(message) => Self::not_found(message),
            db::Error::Forbidden(message) => Self::forbidden(message),
            err => Self::internal(err.to_string()),
        }
    }
}

pub async fn handle_rejection(
    err: Rejection,
    development: bool,
) -> Result<impl Reply, Infallible> {
    let (status, mut response) = if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            FailureResponse::new(ErrorCode::NotFound, "Not found"),
        )
    } else if let Some(api_error) = err.find::<ApiError>() {
        if api_error.status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(
                "{}: {}",
                api_error.message,
                api_error.detail.as_deref().unwrap_or("no detail")
            );
        }

        let mut response = FailureResponse::new(api_error.code, api_error.message.as_str());
        response.error = api_error.detail.clone();
        (api_error.status, response)
    } else if err.find::<Unauthenticated>().is_some() {
        (
            StatusCode::UNAUTHORIZED,
            FailureResponse::new(ErrorCode::MissingCredentials, "No token provided"),
        )
    } else if err.find::<InvalidToken>().is_some() {
        (
            StatusCode::FORBIDDEN,
            FailureResponse::new(ErrorCode::InvalidCredentials, "Invalid token"),
        )
    } else if err.find::<Forbidden>().is_some() {
        (
            StatusCode::FORBIDDEN,
            FailureResponse::new(ErrorCode::InsufficientAuthorization, "Access denied"),
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        let mut response = FailureResponse::new(ErrorCode::MalformedData, "Malformed request body");
        response.error = Some(e.to_string());
        (StatusCode::BAD_REQUEST, response)
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        let mut response = FailureResponse::new(ErrorCode::MalformedData, "Malformed query");
        response.error = Some(e.to_string());
        (StatusCode::BAD_REQUEST, response)
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            FailureResponse::new(ErrorCode::MalformedData, "Payload too large"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            FailureResponse::new(ErrorCode::MethodNotAllowed, "Method not allowed"),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            FailureResponse::new(ErrorCode::InternalServerError, "Server error"),
        )
    };

    if !development {
        response.error = None;
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&response),
        status,
    ))
}

#[derive(Serialize)]
pub struct SimpleSuccessResponse {
    success: bool,
}

impl SimpleSuccessResponse {
    pub fn new() -> Self {
        Self { success: true }
    }
}

#[derive(Deserialize, Debug)]
pub struct PaginatedQueryableListRequest {
    pub query: Option<String>,
    pub page: Option<usize>,
}

impl PaginatedQueryableListRequest {
    /// Requested page, with anything below 1 treated as the first page; `None` lists everything
    pub fn normalized_page_number(&self) -> Option<usize> {
        self.page.map(|v| if v >= 1 { v } else { 1 })
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp
pub fn parse_day(value: &str) -> Result<NaiveDate, ApiError> {
    let value = value.trim();

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(value).map(|t| t.date_naive()))
        .map_err(|_| {
            ApiError::bad_request(ErrorCode::InvalidDate, format!("Invalid date: {}", value))
        })
}

/// Non-blank trimmed text, `None` otherwise
pub fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// A past session as shown to students and parents
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistoryEntry<'a> {
    #[serde(flatten)]
    pub session: &'a Session,
    pub tutor_name: &'a str,
    pub media: Vec<&'a Media>,
}

impl<'a> SessionHistoryEntry<'a> {
    /// Sessions of `student_id` started at or before `now`, newest first
    pub fn list_for_student(
        db: &'a LockedDb,
        student_id: u32,
        now: DateTime<chrono::Utc>,
    ) -> Vec<Self> {
        let mut sessions: Vec<&Session> = db
            .session_list_by_student(student_id)
            .into_iter()
            .filter(|s| s.start_time <= now)
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        sessions
            .into_iter()
            .map(|session| Self {
                session,
                tutor_name: db
                    .tutor_get(session.tutor_id)
                    .and_then(|t| db.user_get(t.user_id))
                    .map(|u| u.name.as_str())
                    .unwrap_or(""),
                media: db.media_list_by_session(session.id),
            })
            .collect()
    }
}
