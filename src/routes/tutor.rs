use chrono::Utc;
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{parse_day, required, ApiError};
use db::{
    models::{HomeworkStatus, Role},
    Database, Db, NewHomework,
};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const TUTOR: &[Role] = &[Role::Tutor];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let students_route = warp::path!("api" / "tutor" / "students")
        .and(warp::get())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and_then(students)
        .boxed();

    let assign_route = warp::path!("api" / "tutor" / "homework")
        .and(warp::post())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(assign_homework)
        .boxed();

    let status_route = warp::path!("api" / "tutor" / "homework" / "status")
        .and(warp::patch())
        .and(authed_with_role(db, tokens, TUTOR))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(update_homework_status)
        .boxed();

    students_route.or(assign_route).or(status_route)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentEntry<'a> {
    id: u32,
    user_id: u32,
    name: &'a str,
    email: &'a str,
    parent_id: Option<u32>,
    parent_name: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignRequest {
    student_id: Option<u32>,
    title: Option<String>,
    description: Option<String>,
    due_date: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest {
    homework_id: Option<u32>,
    status: Option<HomeworkStatus>,
}

async fn students(_caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (_, students) = db.student_list(None, None);

    let students: Vec<StudentEntry> = students
        .into_iter()
        .filter_map(|s| {
            let user = db.user_get(s.user_id)?;
            let parent_name = s
                .parent_id
                .and_then(|id| db.parent_get(id))
                .and_then(|p| db.user_get(p.user_id))
                .map(|u| u.name.as_str());

            Some(StudentEntry {
                id: s.id,
                user_id: user.id,
                name: &user.name,
                email: &user.email,
                parent_id: s.parent_id,
                parent_name,
            })
        })
        .collect();

    Ok(warp::reply::json(&students))
}

async fn assign_homework(
    caller: Caller,
    db: Db,
    request: AssignRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (student_id, title) = match (request.student_id, required(&request.title)) {
        (Some(student_id), Some(title)) => (student_id, title),
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let due_date = match required(&request.due_date) {
        Some(date) => Some(parse_day(date).map_err(ApiError::rejection)?),
        None => None,
    };

    let homework = NewHomework {
        student_id,
        title: title.to_string(),
        description: required(&request.description).map(str::to_string),
        due_date,
    };

    let mut db = db.lock().await;
    let homework = db
        .homework_assign(caller.id, homework, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::with_status(
        warp::reply::json(&homework),
        StatusCode::CREATED,
    ))
}

async fn update_homework_status(
    caller: Caller,
    db: Db,
    request: StatusRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (homework_id, status) = match (request.homework_id, request.status) {
        (Some(homework_id), Some(status)) => (homework_id, status),
        _ => return Err(ApiError::missing_fields().rejection()),
    };

    let mut db = db.lock().await;
    let homework = db
        .homework_set_status(caller.id, homework_id, status)
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(warp::reply::json(&homework))
}
