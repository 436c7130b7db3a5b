use warp::{Filter, Rejection, Reply};

use db::Db;
use filters::TokenSigner;

mod admin;
mod attendance;
mod auth;
mod globals;
mod leave;
mod notification;
mod parent;
mod report;
mod session;
mod student;
mod tutor;

#[cfg(test)]
mod testing;

use globals::handle_rejection;

pub fn routes(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index_route = warp::path::end()
        .and(warp::get())
        .map(|| "MentorLog API running");

    index_route
        .or(auth::routes(db, tokens))
        .or(admin::routes(db, tokens))
        .or(session::routes(db, tokens))
        .or(notification::routes(db, tokens))
        .or(attendance::routes(db, tokens))
        .or(leave::routes(db, tokens))
        .or(report::routes(db, tokens))
        .or(student::routes(db, tokens))
        .or(parent::routes(db, tokens))
        .or(tutor::routes(db, tokens))
}

/// All routes behind CORS, with failures rendered as JSON
pub fn api(
    db: &Db,
    tokens: &TokenSigner,
    development: bool,
) -> impl Filter<Extract = (impl Reply,), Error = std::convert::Infallible> + Clone {
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE"])
        .allow_headers(vec!["content-type", "authorization"]);

    routes(db, tokens)
        .with(cors)
        // Before logging for correct status codes
        .recover(move |err| handle_rejection(err, development))
}
