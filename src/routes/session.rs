use chrono::Utc;
use serde::Deserialize;
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{required, ApiError, ErrorCode};
use db::{models::Role, Database, Db, NewSession};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const TUTOR: &[Role] = &[Role::Tutor];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let start_route = warp::path!("api" / "session" / "start")
        .and(warp::post())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(start)
        .boxed();

    let end_route = warp::path!("api" / "session" / "end")
        .and(warp::post())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(end)
        .boxed();

    let active_route = warp::path!("api" / "session" / "active")
        .and(warp::get())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and_then(active)
        .boxed();

    start_route.or(end_route).or(active_route)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    student_id: Option<u32>,
    subject: Option<String>,
    topic: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndRequest {
    session_id: Option<u32>,
    image_proof_url: Option<String>,
}

async fn start(
    caller: Caller,
    db: Db,
    request: StartRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let session = match (
        request.student_id,
        required(&request.subject),
        required(&request.topic),
    ) {
        (Some(student_id), Some(subject), Some(topic)) => NewSession {
            student_id,
            subject: subject.to_string(),
            topic: topic.to_string(),
        },
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let mut db = db.lock().await;
    let session = db
        .session_start(caller.id, session, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::with_status(
        warp::reply::json(&session),
        StatusCode::CREATED,
    ))
}

async fn end(
    caller: Caller,
    db: Db,
    request: EndRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (session_id, url) = match (request.session_id, required(&request.image_proof_url)) {
        (Some(session_id), Some(url)) => (session_id, url),
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let mut db = db.lock().await;
    let session = db
        .session_end(caller.id, session_id, url, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::json(&session))
}

async fn active(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    match db.session_active(caller.id) {
        Ok(Some(session)) => Ok(warp::reply::json(session)),
        Ok(None) => Err(ApiError::new(
            StatusCode::NOT_FOUND,
            ErrorCode::NoActiveSession,
            "No active session found",
        )
        .rejection()),
        Err(e) => Err(ApiError::from(e).rejection()),
    }
}
