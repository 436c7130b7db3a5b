use chrono::Local;
use serde::Deserialize;
use warp::{Filter, Rejection, Reply};

use super::globals::{parse_day, ApiError, ErrorCode};
use crate::reports::{self, DateRange};
use db::{models::Role, Db};
use filters::{authed_with_role, with_db, Caller, TokenSigner};

const ADMIN: &[Role] = &[Role::Admin];

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let tutors_route = warp::path!("api" / "reports" / "tutors")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<RangeRequest>())
        .and_then(tutors)
        .boxed();

    let students_route = warp::path!("api" / "reports" / "students")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<RangeRequest>())
        .and_then(students)
        .boxed();

    let academy_route = warp::path!("api" / "reports" / "academy-summary")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and(warp::query::<DayRequest>())
        .and_then(academy_summary)
        .boxed();

    let overall_route = warp::path!("api" / "reports" / "overall-stats")
        .and(warp::get())
        .and(authed_with_role(db, tokens, ADMIN))
        .and(with_db(db.clone()))
        .and_then(overall_stats)
        .boxed();

    tutors_route
        .or(students_route)
        .or(academy_route)
        .or(overall_route)
}

#[derive(Deserialize)]
struct RangeRequest {
    start: Option<String>,
    end: Option<String>,
}

impl RangeRequest {
    fn range(&self) -> Result<Option<DateRange>, Rejection> {
        DateRange::from_query(self.start.as_deref(), self.end.as_deref(), &Local)
            .map_err(|message| ApiError::bad_request(ErrorCode::InvalidDate, message).rejection())
    }
}

#[derive(Deserialize)]
struct DayRequest {
    date: Option<String>,
}

async fn tutors(
    _caller: Caller,
    db: Db,
    request: RangeRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let range = request.range()?;
    let db = db.lock().await;

    Ok(warp::reply::json(&reports::tutor_report(&*db, range)))
}

async fn students(
    _caller: Caller,
    db: Db,
    request: RangeRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let range = request.range()?;
    let db = db.lock().await;

    Ok(warp::reply::json(&reports::student_report(&*db, range, &Local)))
}

async fn academy_summary(
    _caller: Caller,
    db: Db,
    request: DayRequest,
) -> Result<impl warp::Reply, warp::Rejection> {
    let date = match request.date.as_deref() {
        Some(date) => parse_day(date).map_err(ApiError::rejection)?,
        None => Local::now().date_naive(),
    };

    let db = db.lock().await;

    Ok(warp::reply::json(&reports::academy_summary(&*db, date, &Local)))
}

async fn overall_stats(_caller: Caller, db: Db) -> Result<impl warp::Reply, warp::Rejection> {
    let db = db.lock().await;

    Ok(warp::reply::json(&reports::overall_stats(&*db)))
}
