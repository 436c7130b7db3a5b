use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use warp::{Filter, Rejection, Reply};

use super::{
    globals::{ApiError, SessionHistoryEntry},
    notification,
};
use crate::reports::weekly_progress;
use db::{
    models::{HomeworkStatus, Role, Session, Student},
    Database, Db, LockedDb,
};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const STUDENT: &[Role] = &[Role::Student];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let profile_route = warp::path!("api" / "student" / "profile")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and_then(profile)
        .boxed();

    let progress_route = warp::path!("api" / "student" / "progress")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and_then(progress)
        .boxed();

    let homework_route = warp::path!("api" / "student" / "homework")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and(warp::query::<HomeworkRequest>())
        .and_then(homework)
        .boxed();

    let upcoming_route = warp::path!("api" / "student" / "upcoming")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and_then(upcoming)
        .boxed();

    let history_route = warp::path!("api" / "student" / "history")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and_then(history)
        .boxed();

    let notifications_route = warp::path!("api" / "student" / "notifications")
        .and(warp::get())
        .and(authed_with_role(db, tokens, STUDENT))
        .and(with_db(db.clone()))
        .and_then(notification::list)
        .boxed();

    profile_route
        .or(progress_route)
        .or(homework_route)
        .or(upcoming_route)
        .or(history_route)
        .or(notifications_route)
}

#[derive(Deserialize)]
pub struct HomeworkRequest {
    pub status: Option<HomeworkStatus>,
}

fn own_profile<'a>(db: &'a LockedDb, caller: &Caller) -> Result<&'a Student, Rejection> {
    db.student_get_by_user(caller.id)
        .ok_or_else(|| ApiError::not_found("Student profile not found").rejection())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse<'a> {
    id: u32,
    user_id: u32,
    name: &'a str,
    email: &'a str,
    parent: Option<Contact<'a>>,
}

#[derive(Serialize)]
struct Contact<'a> {
    id: u32,
    name: &'a str,
    email: &'a str,
}

async fn profile(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_profile(&db, &caller)?;
    let user = db
        .user_get(student.user_id)
        .ok_or_else(|| ApiError::not_found("User not found").rejection())?;

    let parent = student.parent_id.and_then(|id| db.parent_get(id)).and_then(|p| {
        db.user_get(p.user_id).map(|u| Contact {
            id: p.id,
            name: &u.name,
            email: &u.email,
        })
    });

    Ok(warp::reply::json(&ProfileResponse {
        id: student.id,
        user_id: user.id,
        name: &user.name,
        email: &user.email,
        parent,
    }))
}

async fn progress(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_profile(&db, &caller)?;

    Ok(warp::reply::json(&weekly_progress(
        &*db,
        student.id,
        Local::now().date_naive(),
        &Local,
    )))
}

async fn homework(
    caller: Caller,
    db: Db,
    request: HomeworkRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_profile(&db, &caller)?;

    Ok(warp::reply::json(&db.homework_list(student.id, request.status)))
}

async fn upcoming(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_profile(&db, &caller)?;
    let now = Utc::now();

    let mut sessions: Vec<&Session> = db
        .session_list_by_student(student.id)
        .into_iter()
        .filter(|s| s.start_time > now)
        .collect();
    sessions.sort_by_key(|s| s.start_time);

    Ok(warp::reply::json(&sessions))
}

async fn history(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_profile(&db, &caller)?;

    Ok(warp::reply::json(&SessionHistoryEntry::list_for_student(
        &db,
        student.id,
        Utc::now(),
    )))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use chrono::{Duration, Utc};
    use db::{Database, NewHomework, NewSession};
    use warp::http::StatusCode;

    fn get(bearer: &str, path: &str) -> warp::test::RequestBuilder {
        warp::test::request().path(path).header("authorization", bearer)
    }

    #[tokio::test]
    async fn portal_views() {
        let fixture = Fixture::new();
        let tom = fixture.tutor("Tom").await;
        let paula = fixture.parent("Paula").await;
        let sam = fixture.student("Sam", Some(paula)).await;

        {
            let mut db = fixture.db.lock().await;
            let start = Utc::now() - Duration::minutes(30);
            let session = db
                .session_start(
                    tom.user_id,
                    NewSession {
                        student_id: sam.profile_id,
                        subject: "Maths".to_string(),
                        topic: "Sets".to_string(),
                    },
                    start,
                )
                .unwrap();
            db.session_end(tom.user_id, session.id, "https://img/1", start + Duration::minutes(20))
                .unwrap();
            db.homework_assign(
                tom.user_id,
                NewHomework {
                    student_id: sam.profile_id,
                    title: "Exercise 1".to_string(),
                    description: None,
                    due_date: None,
                },
                Utc::now(),
            )
            .unwrap();
        }

        let bearer = fixture.bearer(sam.user_id).await;

        let (status, profile) = fixture.call(get(&bearer, "/api/student/profile")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["parent"]["name"], "Paula");

        let (_, history) = fixture.call(get(&bearer, "/api/student/history")).await;
        assert_eq!(history[0]["tutorName"], "Tom");
        assert_eq!(history[0]["duration"], 20);
        assert_eq!(history[0]["media"][0]["url"], "https://img/1");

        let (_, upcoming) = fixture.call(get(&bearer, "/api/student/upcoming")).await;
        assert_eq!(upcoming, serde_json::json!([]));

        let (_, pending) = fixture
            .call(get(&bearer, "/api/student/homework?status=PENDING"))
            .await;
        assert_eq!(pending[0]["title"], "Exercise 1");
        let (_, reviewed) = fixture
            .call(get(&bearer, "/api/student/homework?status=REVIEWED"))
            .await;
        assert_eq!(reviewed, serde_json::json!([]));

        let (_, notifications) = fixture
            .call(get(&bearer, "/api/student/notifications"))
            .await;
        assert_eq!(notifications[0]["type"], "homework_pending");

        let (status, progress) = fixture.call(get(&bearer, "/api/student/progress")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(progress["totalSessions"].is_u64());
    }

    #[tokio::test]
    async fn other_roles_are_turned_away() {
        let fixture = Fixture::new();
        let paula = fixture.parent("Paula").await;
        let bearer = fixture.bearer(paula.user_id).await;

        let (status, _) = fixture.call(get(&bearer, "/api/student/profile")).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
