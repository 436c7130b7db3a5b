use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{required, ApiError, ErrorCode, SimpleSuccessResponse};
use db::{
    models::{Role, User},
    password, Database, Db,
};
use filters::{authed, with_db, with_tokens, Caller, TokenSigner};

#[derive(Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse<'a> {
    token: &'a str,
    user: LoginResponseUser<'a>,
    role: Role,
}

#[derive(Serialize)]
struct LoginResponseUser<'a> {
    id: u32,
    name: &'a str,
    email: &'a str,
    role: Role,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    old_password: Option<String>,
    password: Option<String>,
}

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login_route = warp::path!("api" / "auth" / "login")
        .and(warp::post())
        .and(with_db(db.clone()))
        .and(with_tokens(tokens.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(login)
        .boxed();

    let password_route = warp::path!("api" / "auth" / "password")
        .and(warp::put())
        .and(authed(db, tokens))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(change_password)
        .boxed();

    login_route.or(password_route)
}

fn invalid_credentials() -> Rejection {
    ApiError::new(
        StatusCode::UNAUTHORIZED,
        ErrorCode::InvalidCredentials,
        "Invalid credentials",
    )
    .rejection()
}

async fn login(
    db: Db,
    tokens: TokenSigner,
    request: LoginRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (email, password) = match (required(&request.email), request.password.as_deref()) {
        (Some(email), Some(password)) if !password.is_empty() => (email, password),
        _ => {
            return Err(ApiError::bad_request(
                ErrorCode::MissingFields,
                "Email and password are required",
            )
            .rejection())
        }
    };

    // Hash verification is slow, so it runs without holding the store
    let user: User = {
        let db = db.lock().await;
        db.user_get_by_email(email)
            .cloned()
            .ok_or_else(invalid_credentials)?
    };

    if !password::verify(password, &user.password_hash) {
        return Err(invalid_credentials());
    }

    let token = tokens
        .issue(&user, Utc::now())
        .ok_or_else(|| ApiError::internal("Could not sign token").rejection())?;
    info!("{} logged in as {}", user.email, user.role.as_str());

    Ok(warp::reply::json(&LoginResponse {
        token: &token,
        user: LoginResponseUser {
            id: user.id,
            name: &user.name,
            email: &user.email,
            role: user.role,
        },
        role: user.role,
    }))
}

async fn change_password(
    caller: Caller,
    db: Db,
    request: ChangePasswordRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (old_password, new_password) =
        match (request.old_password.as_deref(), request.password.as_deref()) {
            (Some(old), Some(new)) => (old, new),
            _ => return Err(ApiError::missing_fields().rejection()),
        };

    let current_hash = {
        let db = db.lock().await;
        db.user_get(caller.id)
            .map(|u| u.password_hash.clone())
            .ok_or_else(|| ApiError::not_found("User not found").rejection())?
    };

    if !password::verify(old_password, &current_hash) {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            ErrorCode::InvalidOldPassword,
            "Old password is incorrect",
        )
        .rejection());
    }

    if !password::is_strong_enough(new_password) {
        return Err(ApiError::bad_request(
            ErrorCode::PasswordTooSimple,
            "Password must be at least 8 characters long and contain a letter and a digit",
        )
        .rejection());
    }

    let new_hash = password::hash(new_password).map_err(|e| ApiError::from(e).rejection())?;

    let mut db = db.lock().await;
    db.user_set_password_hash(caller.id, new_hash)
        .map_err(|e| ApiError::from(e).rejection())?;

    Ok(warp::reply::json(&SimpleSuccessResponse::new()))
}
