use log::debug;
use warp::{Filter, Rejection, Reply};

use super::globals::ApiError;
use db::{Database, Db};
use filters::{authed, with_db, Caller, TokenSigner};

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let list_route = warp::path!("api" / "notifications")
        .and(warp::get())
        .and(authed(db, tokens))
        .and(with_db(db.clone()))
        .and_then(list)
        .boxed();

    let read_route = warp::path!("api" / "notifications" / u32 / "read")
        .and(warp::patch())
        .and(authed(db, tokens))
        .and(with_db(db.clone()))
        .and_then(mark_read)
        .boxed();

    list_route.or(read_route)
}

/// Inbox of the caller, newest first
pub async fn list(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    Ok(warp::reply::json(&db.notification_list(caller.id)))
}

async fn mark_read(id: u32, caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let mut db = db.lock().await;

    let notification = db
        .notification_mark_read(caller.id, id)
        .map_err(|e| ApiError::from(e).rejection())?;

    debug!("User {} read notification {}", caller.id, notification.id);

    Ok(warp::reply::json(&notification))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use chrono::Utc;
    use db::{models::NotificationType, Database};
    use warp::http::StatusCode;

    #[tokio::test]
    async fn only_the_recipient_can_mark_as_read() {
        let fixture = Fixture::new();
        let sam = fixture.student("Sam", None).await;
        let zoe = fixture.student("Zoe", None).await;

        let id = {
            let mut db = fixture.db.lock().await;
            db.notification_create(
                sam.user_id,
                NotificationType::HomeworkPending,
                "Homework Assigned",
                "Read chapter 2",
                Utc::now(),
            )
            .unwrap()
            .id
        };

        let read = |bearer: &str| {
            warp::test::request()
                .method("PATCH")
                .path(&format!("/api/notifications/{}/read", id))
                .header("authorization", bearer)
        };

        let zoe_bearer = fixture.bearer(zoe.user_id).await;
        let (status, _) = fixture.call(read(&zoe_bearer)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let sam_bearer = fixture.bearer(sam.user_id).await;
        let (status, body) = fixture.call(read(&sam_bearer)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRead"], true);
        assert_eq!(body["type"], "homework_pending");

        let (_, list) = fixture
            .call(
                warp::test::request()
                    .path("/api/notifications")
                    .header("authorization", sam_bearer.as_str()),
            )
            .await;
        assert_eq!(list.as_array().map(Vec::len), Some(1));
    }
}
