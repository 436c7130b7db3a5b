use chrono::Utc;
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{parse_day, required, ApiError};
use db::{
    models::{Leave, LeaveStatus, Role},
    Database, Db, NewLeave,
};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let apply_route = warp::path!("api" / "leaves" / "apply")
        .and(warp::post())
        .and(authed_with_role(db, tokens, &[Role::Tutor]))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(apply)
        .boxed();

    let status_route = warp::path!("api" / "leaves" / "status")
        .and(warp::patch())
        .and(authed_with_role(db, tokens, &[Role::Admin]))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(update_status)
        .boxed();

    let history_route = warp::path!("api" / "leaves" / "history")
        .and(warp::get())
        .and(authed_with_role(db, tokens, &[Role::Tutor, Role::Admin]))
        .and(with_db(db.clone()))
        .and(warp::query::<HistoryRequest>())
        .and_then(history)
        .boxed();

    apply_route.or(status_route).or(history_route)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyRequest {
    start_date: Option<String>,
    end_date: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    leave_id: Option<u32>,
    status: Option<LeaveStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRequest {
    tutor_id: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LeaveView<'a> {
    #[serde(flatten)]
    leave: &'a Leave,
    tutor_name: &'a str,
}

async fn apply(
    caller: Caller,
    db: Db,
    request: ApplyRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (start_date, end_date, reason) = match (
        required(&request.start_date),
        required(&request.end_date),
        required(&request.reason),
    ) {
        (Some(start), Some(end), Some(reason)) => (start, end, reason),
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let leave = NewLeave {
        start_date: parse_day(start_date).map_err(ApiError::rejection)?,
        end_date: parse_day(end_date).map_err(ApiError::rejection)?,
        reason: reason.to_string(),
    };

    let mut db = db.lock().await;
    let leave = db
        .leave_apply(caller.id, leave, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::with_status(
        warp::reply::json(&leave),
        StatusCode::CREATED,
    ))
}

async fn update_status(
    caller: Caller,
    db: Db,
    request: StatusRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (leave_id, status) = match (request.leave_id, request.status) {
        (Some(leave_id), Some(status)) => (leave_id, status),
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let mut db = db.lock().await;
    let leave = db
        .leave_set_status(leave_id, caller.id, status, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::json(&leave))
}

async fn history(
    caller: Caller,
    db: Db,
    request: HistoryRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let tutor_id = match caller.role {
        Role::Tutor => Some(
            db.tutor_get_by_user(caller.id)
                .map(|t| t.id)
                .ok_or_else(|| ApiError::not_found("Tutor profile not found").rejection())?,
        ),
        _ => request.tutor_id,
    };

    let leaves: Vec<LeaveView> = db
        .leave_list(tutor_id)
        .into_iter()
        .map(|leave| LeaveView {
            leave,
            tutor_name: db
                .tutor_get(leave.tutor_id)
                .and_then(|t| db.user_get(t.user_id))
                .map(|u| u.name.as_str())
                .unwrap_or(""),
        })
        .collect();

    Ok(warp::reply::json(&leaves))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use serde_json::{json, Value};
    use warp::http::StatusCode;

    fn send(method: &str, path: &str, bearer: &str, body: Value) -> warp::test::RequestBuilder {
        warp::test::request()
            .method(method)
            .path(path)
            .header("authorization", bearer)
            .json(&body)
    }

    #[tokio::test]
    async fn apply_then_decide_once() {
        let fixture = Fixture::new();
        let admin = fixture.admin("Root").await;
        let tom = fixture.tutor("Tom").await;
        let tutor_bearer = fixture.bearer(tom.user_id).await;
        let admin_bearer = fixture.bearer(admin).await;

        let (status, leave) = fixture
            .call(send(
                "POST",
                "/api/leaves/apply",
                &tutor_bearer,
                json!({ "startDate": "2024-06-03", "endDate": "2024-06-05", "reason": "Exams" }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(leave["status"], "PENDING");

        let decide = |status: &str| {
            send(
                "PATCH",
                "/api/leaves/status",
                &admin_bearer,
                json!({ "leaveId": leave["id"], "status": status }),
            )
        };

        let (status, decided) = fixture.call(decide("APPROVED")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(decided["approvedById"], admin);

        let (status, body) = fixture.call(decide("REJECTED")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "Conflict");
    }

    #[tokio::test]
    async fn apply_validation() {
        let fixture = Fixture::new();
        let tom = fixture.tutor("Tom").await;
        let bearer = fixture.bearer(tom.user_id).await;

        let (status, _) = fixture
            .call(send(
                "POST",
                "/api/leaves/apply",
                &bearer,
                json!({ "startDate": "2024-06-03", "reason": "Exams" }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = fixture
            .call(send(
                "POST",
                "/api/leaves/apply",
                &bearer,
                json!({ "startDate": "2024-06-05", "endDate": "2024-06-03", "reason": "Exams" }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_depends_on_the_role() {
        let fixture = Fixture::new();
        let admin = fixture.admin("Root").await;
        let tom = fixture.tutor("Tom").await;
        let ann = fixture.tutor("Ann").await;
        let sam = fixture.student("Sam", None).await;

        for tutor in [tom, ann] {
            let bearer = fixture.bearer(tutor.user_id).await;
            fixture
                .call(send(
                    "POST",
                    "/api/leaves/apply",
                    &bearer,
                    json!({ "startDate": "2024-06-03", "endDate": "2024-06-03", "reason": "Off" }),
                ))
                .await;
        }

        let history = |bearer: &str, query: &str| {
            warp::test::request()
                .path(&format!("/api/leaves/history{}", query))
                .header("authorization", bearer)
        };

        let tom_bearer = fixture.bearer(tom.user_id).await;
        let (_, own) = fixture.call(history(&tom_bearer, "?tutorId=2")).await;
        assert_eq!(own.as_array().map(Vec::len), Some(1));
        assert_eq!(own[0]["tutorName"], "Tom");

        let admin_bearer = fixture.bearer(admin).await;
        let (_, all) = fixture.call(history(&admin_bearer, "")).await;
        assert_eq!(all.as_array().map(Vec::len), Some(2));
        let (_, filtered) = fixture.call(history(&admin_bearer, "?tutorId=2")).await;
        assert_eq!(filtered[0]["tutorName"], "Ann");

        let sam_bearer = fixture.bearer(sam.user_id).await;
        let (status, _) = fixture.call(history(&sam_bearer, "")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
