use chrono::{Local, Utc};
use serde::Deserialize;
use warp::{Filter, Rejection, Reply};

use super::globals::{ApiError, ErrorCode};
use crate::reports::{attendance_summary, DateRange};
use db::{models::Role, Database, Db};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let login_route = warp::path!("api" / "attendance" / "login")
        .and(warp::post())
        .and(authed_with_role(db, tokens, &[Role::Tutor]))
        .and(with_db(db.clone()))
        .and_then(login)
        .boxed();

    let logout_route = warp::path!("api" / "attendance" / "logout")
        .and(warp::post())
        .and(authed_with_role(db, tokens, &[Role::Tutor]))
        .and(with_db(db.clone()))
        .and_then(logout)
        .boxed();

    let summary_route = warp::path!("api" / "attendance" / "summary")
        .and(warp::get())
        .and(authed_with_role(db, tokens, &[Role::Admin]))
        .and(with_db(db.clone()))
        .and(warp::query::<SummaryRequest>())
        .and_then(summary)
        .boxed();

    login_route.or(logout_route).or(summary_route)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryRequest {
    tutor_id: Option<u32>,
    start: Option<String>,
    end: Option<String>,
}

async fn login(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let mut db = db.lock().await;

    let attendance = db
        .attendance_login(caller.id, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::json(&attendance))
}

async fn logout(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let mut db = db.lock().await;

    let attendance = db
        .attendance_logout(caller.id, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::json(&attendance))
}

async fn summary(
    _caller: Caller,
    db: Db,
    request: SummaryRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let range = DateRange::from_query(request.start.as_deref(), request.end.as_deref(), &Local)
        .map_err(|message| ApiError::bad_request(ErrorCode::InvalidDate, message).rejection())?;

    let db = db.lock().await;
    let records = db.attendance_list(request.tutor_id);

    Ok(warp::reply::json(&attendance_summary(&records, range, &Local)))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use warp::http::StatusCode;

    fn post(bearer: &str, path: &str) -> warp::test::RequestBuilder {
        warp::test::request()
            .method("POST")
            .path(path)
            .header("authorization", bearer)
    }

    #[tokio::test]
    async fn one_open_record_per_tutor() {
        let fixture = Fixture::new();
        let tom = fixture.tutor("Tom").await;
        let bearer = fixture.bearer(tom.user_id).await;

        let (status, body) = fixture.call(post(&bearer, "/api/attendance/logout")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No active login session found for this tutor");

        let (status, _) = fixture.call(post(&bearer, "/api/attendance/login")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = fixture.call(post(&bearer, "/api/attendance/login")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Tutor already has an active login session");

        let (status, body) = fixture.call(post(&bearer, "/api/attendance/logout")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duration"], 0);
    }

    #[tokio::test]
    async fn summary_is_admin_only_and_checks_dates() {
        let fixture = Fixture::new();
        let admin = fixture.admin("Root").await;
        let tom = fixture.tutor("Tom").await;

        let tutor_bearer = fixture.bearer(tom.user_id).await;
        let (status, _) = fixture
            .call(
                warp::test::request()
                    .path("/api/attendance/summary")
                    .header("authorization", tutor_bearer.as_str()),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin_bearer = fixture.bearer(admin).await;
        let (status, body) = fixture
            .call(
                warp::test::request()
                    .path("/api/attendance/summary?start=2024-01-01&end=soon")
                    .header("authorization", admin_bearer.as_str()),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidDate");

        let (status, body) = fixture
            .call(
                warp::test::request()
                    .path("/api/attendance/summary?tutorId=1")
                    .header("authorization", admin_bearer.as_str()),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }
}
