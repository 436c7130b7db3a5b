use chrono::Utc;
use db::{models::Role, Database, Db};
use log::debug;
use warp::{Filter, Rejection};

use crate::{with_db, with_tokens, TokenSigner};

/// The authenticated user behind a request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Caller {
    pub id: u32,
    pub role: Role,
}

/// Filter that checks if the user is authenticated or not, and rejects the request if he/she isn't
pub fn authed(
    db: &Db,
    tokens: &TokenSigner,
) -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    with_db(db.clone())
        .and(with_tokens(tokens.clone()))
        .and(warp::header::optional::<String>("authorization"))
        .and_then(guard)
}

/// Filters that checks if the user has one of the requested roles, and rejects the request if
/// he/she doesn't have the authorization ; also checks if the user is authenticated.
pub fn authed_with_role(
    db: &Db,
    tokens: &TokenSigner,
    roles: &'static [Role],
) -> impl Filter<Extract = (Caller,), Error = Rejection> + Clone {
    authed(db, tokens)
        .map(move |caller| (caller, roles))
        .untuple_one()
        .and_then(guard_role)
}

/// No credential at all
#[derive(Debug)]
pub struct Unauthenticated;

impl warp::reject::Reject for Unauthenticated {}

/// A credential was sent but can't be trusted
#[derive(Debug)]
pub struct InvalidToken;

impl warp::reject::Reject for InvalidToken {}

/// Authenticated, but the role is not allowed on this route
#[derive(Debug)]
pub struct Forbidden;

impl warp::reject::Reject for Forbidden {}

async fn guard(
    db: Db,
    tokens: TokenSigner,
    authorization: Option<String>,
) -> Result<Caller, warp::Rejection> {
    let authorization = match authorization {
        Some(authorization) => authorization,
        None => return Err(warp::reject::custom(Unauthenticated)),
    };

    let (auth_type, token) = {
        let mut parts = authorization.splitn(2, ' ');
        (parts.next().unwrap_or(""), parts.next().unwrap_or("").trim())
    };

    if !auth_type.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(warp::reject::custom(Unauthenticated));
    }

    let claims = tokens.verify(token, Utc::now()).map_err(|e| {
        debug!("Rejected token: {:?}", e);
        warp::reject::custom(InvalidToken)
    })?;

    // The role is re-checked against the store, so a deleted or changed account loses access
    // without waiting for its tokens to expire
    let db = db.lock().await;
    match db.user_get(claims.sub) {
        Some(user) if user.role == claims.role => Ok(Caller {
            id: user.id,
            role: user.role,
        }),
        _ => Err(warp::reject::custom(InvalidToken)),
    }
}

async fn guard_role(
    caller: Caller,
    wanted_roles: &'static [Role],
) -> Result<Caller, warp::Rejection> {
    if wanted_roles.contains(&caller.role) {
        Ok(caller)
    } else {
        Err(warp::reject::custom(Forbidden))
    }
}
