use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warp::{http::StatusCode, Filter, Rejection, Reply};

use super::globals::{required, ApiError, ErrorCode, PaginatedQueryableListRequest};
use db::{models::Role, password, Database, Db, Enrolled, LockedDb, NewAccount};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const ADMIN: &[Role] = &[Role::Admin];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let create_tutor_route = warp::path!("api" / "admin" / "tutors")
        .and(warp::post())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(create_tutor)
        .boxed();

    let create_student_route = warp::path!("api" / "admin" / "students")
        .and(warp::post())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(create_student)
        .boxed();

    let create_parent_route = warp::path!("api" / "admin" / "parents")
        .and(warp::post())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::body::content_length_limit(1024 * 16).and(warp::body::json()))
        .and_then(create_parent)
        .boxed();

    let list_tutors_route = warp::path!("api" / "admin" / "tutors")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<PaginatedQueryableListRequest>())
        .and_then(list_tutors)
        .boxed();

    let list_students_route = warp::path!("api" / "admin" / "students")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<PaginatedQueryableListRequest>())
        .and_then(list_students)
        .boxed();

    let list_parents_route = warp::path!("api" / "admin" / "parents")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<PaginatedQueryableListRequest>())
        .and_then(list_parents)
        .boxed();

    create_tutor_route
        .or(create_student_route)
        .or(create_parent_route)
        .or(list_tutors_route)
        .or(list_students_route)
        .or(list_parents_route)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMember {
    name: Option<String>,
    email: Option<String>,
    parent_id: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum ProfileId {
    TutorId(u32),
    StudentId(u32),
    ParentId(u32),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountCreatedResponse<'a> {
    message: String,
    email: &'a str,
    temporary_password: &'a str,
    #[serde(flatten)]
    profile_id: ProfileId,
    user_id: u32,
}

/// Checked account data, plus the clear temporary password to hand back once
fn new_account(request: &NewMember) -> Result<(NewAccount, String), Rejection> {
    let (name, email) = match (required(&request.name), required(&request.email)) {
        (Some(name), Some(email)) => (name, email),
        _ => {
            return Err(ApiError::bad_request(
                ErrorCode::MissingFields,
                "Name and email are required",
            )
            .rejection())
        }
    };

    if !email.contains('@') {
        return Err(ApiError::bad_request(ErrorCode::InvalidEmail, "Invalid email").rejection());
    }

    let temporary_password = password::generate_temporary();
    let password_hash =
        password::hash(&temporary_password).map_err(|e| ApiError::from(e).rejection())?;

    Ok((
        NewAccount {
            name: name.to_string(),
            email: email.to_string(),
            password_hash,
        },
        temporary_password,
    ))
}

fn created_reply(
    db: &LockedDb,
    role: Role,
    enrolled: Enrolled,
    temporary_password: &str,
) -> warp::reply::WithStatus<warp::reply::Json> {
    let email = db
        .user_get(enrolled.user_id)
        .map(|u| u.email.as_str())
        .unwrap_or("");

    let (label, profile_id) = match role {
        Role::Tutor => ("Tutor", ProfileId::TutorId(enrolled.profile_id)),
        Role::Parent => ("Parent", ProfileId::ParentId(enrolled.profile_id)),
        _ => ("Student", ProfileId::StudentId(enrolled.profile_id)),
    };

    warp::reply::with_status(
        warp::reply::json(&AccountCreatedResponse {
            message: format!("{} added successfully", label),
            email,
            temporary_password,
            profile_id,
            user_id: enrolled.user_id,
        }),
        StatusCode::CREATED,
    )
}

async fn create_tutor(
    _caller: Caller,
    db: Db,
    request: NewMember,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (account, temporary_password) = new_account(&request)?;

    let mut db = db.lock().await;
    let enrolled = db
        .tutor_add(account, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(created_reply(&db, Role::Tutor, enrolled, &temporary_password))
}

async fn create_student(
    _caller: Caller,
    db: Db,
    request: NewMember,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (account, temporary_password) = new_account(&request)?;

    let mut db = db.lock().await;
    let enrolled = db
        .student_add(account, request.parent_id, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(created_reply(&db, Role::Student, enrolled, &temporary_password))
}

async fn create_parent(
    _caller: Caller,
    db: Db,
    request: NewMember,
) -> Result<impl warp::Reply, warp::Rejection> {
    let (account, temporary_password) = new_account(&request)?;

    let mut db = db.lock().await;
    let enrolled = db
        .parent_add(account, Utc::now())
        .map_err(|e| ApiError::rejected_write(e).rejection())?;

    Ok(created_reply(&db, Role::Parent, enrolled, &temporary_password))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Member<'a> {
    id: u32,
    user_id: u32,
    name: &'a str,
    email: &'a str,
    created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_name: Option<&'a str>,
}

impl<'a> Member<'a> {
    fn new(db: &'a LockedDb, id: u32, user_id: u32) -> Self {
        let user = db.user_get(user_id);

        Self {
            id,
            user_id,
            name: user.map(|u| u.name.as_str()).unwrap_or(""),
            email: user.map(|u| u.email.as_str()).unwrap_or(""),
            created_at: user.map(|u| u.created_at),
            parent_id: None,
            parent_name: None,
        }
    }
}

#[derive(Serialize)]
struct ListResponse<'a> {
    total: usize,
    members: Vec<Member<'a>>,
}

async fn list_tutors(
    _caller: Caller,
    db: Db,
    request: PaginatedQueryableListRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (total, tutors) =
        db.tutor_list(request.normalized_page_number(), request.query.as_deref());

    let members = tutors
        .into_iter()
        .map(|t| Member::new(&db, t.id, t.user_id))
        .collect();

    Ok(warp::reply::json(&ListResponse { total, members }))
}

async fn list_students(
    _caller: Caller,
    db: Db,
    request: PaginatedQueryableListRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (total, students) =
        db.student_list(request.normalized_page_number(), request.query.as_deref());

    let members = students
        .into_iter()
        .map(|s| {
            let parent = s
                .parent_id
                .and_then(|id| db.parent_get(id))
                .and_then(|p| db.user_get(p.user_id));

            Member {
                parent_id: s.parent_id,
                parent_name: parent.map(|u| u.name.as_str()),
                ..Member::new(&db, s.id, s.user_id)
            }
        })
        .collect();

    Ok(warp::reply::json(&ListResponse { total, members }))
}

async fn list_parents(
    _caller: Caller,
    db: Db,
    request: PaginatedQueryableListRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    let (total, parents) =
        db.parent_list(request.normalized_page_number(), request.query.as_deref());

    let members = parents
        .into_iter()
        .map(|p| Member::new(&db, p.id, p.user_id))
        .collect();

    Ok(warp::reply::json(&ListResponse { total, members }))
}
