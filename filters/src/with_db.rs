use crate::TokenSigner;
use db::Db;
use std::convert::Infallible;
use warp::Filter;

/// Simple filter to add the database to the request
pub fn with_db(db: Db) -> impl Filter<Extract = (Db,), Error = Infallible> + Clone {
    warp::any().map(move || db.clone())
}

pub fn with_tokens(
    tokens: TokenSigner,
) -> impl Filter<Extract = (TokenSigner,), Error = Infallible> + Clone {
    warp::any().map(move || tokens.clone())
}
