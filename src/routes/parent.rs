use chrono::Utc;
use serde::Serialize;
use warp::{Filter, Rejection, Reply};

use super::{
    globals::{ApiError, SessionHistoryEntry},
    notification,
    student::HomeworkRequest,
};
use db::{
    models::{Parent, Role, Student},
    Database, Db, LockedDb,
};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const PARENT: &[Role] = &[Role::Parent];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let children_route = warp::path!("api" / "parent" / "children")
        .and(warp::get())
        .and(authed_with_role(db, tokens, PARENT))
        .and(with_db(db.clone()))
        .and_then(children)
        .boxed();

    let history_route = warp::path!("api" / "parent" / "children" / u32 / "history")
        .and(warp::get())
        .and(authed_with_role(db, tokens, PARENT))
        .and(with_db(db.clone()))
        .and_then(child_history)
        .boxed();

    let homework_route = warp::path!("api" / "parent" / "children" / u32 / "homework")
        .and(warp::get())
        .and(authed_with_role(db, tokens, PARENT))
        .and(with_db(db.clone()))
        .and(warp::query::<HomeworkRequest>())
        .and_then(child_homework)
        .boxed();

    let notifications_route = warp::path!("api" / "parent" / "notifications")
        .and(warp::get())
        .and(authed_with_role(db, tokens, PARENT))
        .and(with_db(db.clone()))
        .and_then(notification::list)
        .boxed();

    children_route
        .or(history_route)
        .or(homework_route)
        .or(notifications_route)
}

fn own_profile<'a>(db: &'a LockedDb, caller: &Caller) -> Result<&'a Parent, Rejection> {
    db.parent_get_by_user(caller.id)
        .ok_or_else(|| ApiError::not_found("Parent profile not found").rejection())
}

/// The student, as long as it is a child of the caller
fn own_child<'a>(
    db: &'a LockedDb,
    caller: &Caller,
    student_id: u32,
) -> Result<&'a Student, Rejection> {
    let parent = own_profile(db, caller)?;

    db.student_get(student_id)
        .filter(|s| s.parent_id == Some(parent.id))
        .ok_or_else(|| ApiError::forbidden("Not authorized to view this student").rejection())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Child<'a> {
    id: u32,
    user_id: u32,
    name: &'a str,
    email: &'a str,
}

async fn children(caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let parent = own_profile(&db, &caller)?;

    let children: Vec<Child> = db
        .student_list_by_parent(parent.id)
        .into_iter()
        .filter_map(|s| {
            db.user_get(s.user_id).map(|u| Child {
                id: s.id,
                user_id: u.id,
                name: &u.name,
                email: &u.email,
            })
        })
        .collect();

    Ok(warp::reply::json(&children))
}

async fn child_history(
    student_id: u32,
    caller: Caller,
    db: Db,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_child(&db, &caller, student_id)?;

    Ok(warp::reply::json(&SessionHistoryEntry::list_for_student(
        &db,
        student.id,
        Utc::now(),
    )))
}

async fn child_homework(
    student_id: u32,
    caller: Caller,
    db: Db,
    request: HomeworkRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;
    let student = own_child(&db, &caller, student_id)?;

    Ok(warp::reply::json(&db.homework_list(student.id, request.status)))
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use chrono::{Duration, Utc};
    use db::{Database, NewSession};
    use serde_json::{json, Value};
    use warp::http::StatusCode;

    fn get(bearer: &str, path: &str) -> warp::test::RequestBuilder {
        warp::test::request().path(path).header("authorization", bearer)
    }

    #[tokio::test]
    async fn parents_only_see_their_children() {
        let fixture = Fixture::new();
        let tom = fixture.tutor("Tom").await;
        let paula = fixture.parent("Paula").await;
        let peter = fixture.parent("Peter").await;
        let sam = fixture.student("Sam", Some(paula)).await;
        let zoe = fixture.student("Zoe", Some(peter)).await;

        {
            let mut db = fixture.db.lock().await;
            let start = Utc::now() - Duration::hours(1);
            let session = db
                .session_start(
                    tom.user_id,
                    NewSession {
                        student_id: sam.profile_id,
                        subject: "Physics".to_string(),
                        topic: "Optics".to_string(),
                    },
                    start,
                )
                .unwrap();
            let end = start + Duration::minutes(45);
            db.session_end(tom.user_id, session.id, "https://img/2", end).unwrap();
        }

        let bearer = fixture.bearer(paula.user_id).await;

        let (status, children) = fixture.call(get(&bearer, "/api/parent/children")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(children.as_array().map(Vec::len), Some(1));
        assert_eq!(children[0]["name"], "Sam");

        let (status, history) = fixture
            .call(get(
                &bearer,
                &format!("/api/parent/children/{}/history", sam.profile_id),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history[0]["subject"], "Physics");

        let (status, _) = fixture
            .call(get(
                &bearer,
                &format!("/api/parent/children/{}/history", zoe.profile_id),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = fixture
            .call(get(
                &bearer,
                &format!("/api/parent/children/{}/homework", zoe.profile_id),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, notifications) = fixture
            .call(get(&bearer, "/api/parent/notifications"))
            .await;
        assert_eq!(notifications[0]["type"], "session_end");
    }

    #[tokio::test]
    async fn parent_account_without_a_profile() {
        let fixture = Fixture::new();
        let paula = fixture.parent("Paula").await;

        // Reload the store with the parent profile rows gone
        let dump = fixture.db.lock().await.dump_as_json().unwrap();
        let mut tables: Value = serde_json::from_str(&dump).unwrap();
        tables["parents"] = json!({});

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, tables.to_string()).unwrap();

        let fixture = Fixture {
            db: db::new_db(path.to_str().unwrap()).unwrap(),
            tokens: fixture.tokens,
        };
        let bearer = fixture.bearer(paula.user_id).await;

        let (status, body) = fixture.call(get(&bearer, "/api/parent/children")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Parent profile not found");
    }
}
