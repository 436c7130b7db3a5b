use chrono::{Duration, Utc};
use db::{new_memory_db, password, Database, Db, Enrolled, NewAccount};
use filters::TokenSigner;
use serde_json::Value;
use warp::{http::StatusCode, test::RequestBuilder};

pub const PASSWORD: &str = "Passw0rd";

pub struct Fixture {
    pub db: Db,
    pub tokens: TokenSigner,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            db: new_memory_db(),
            tokens: TokenSigner::new("test secret", Duration::days(30)),
        }
    }

    fn account(name: &str) -> NewAccount {
        NewAccount {
            name: name.to_string(),
            email: format!("{}@mentorlog.test", name.to_lowercase()),
            password_hash: password::hash(PASSWORD).unwrap(),
        }
    }

    pub async fn admin(&self, name: &str) -> u32 {
        let mut db = self.db.lock().await;
        db.admin_ensure(Self::account(name), Utc::now()).unwrap().id
    }

    pub async fn tutor(&self, name: &str) -> Enrolled {
        let mut db = self.db.lock().await;
        db.tutor_add(Self::account(name), Utc::now()).unwrap()
    }

    pub async fn parent(&self, name: &str) -> Enrolled {
        let mut db = self.db.lock().await;
        db.parent_add(Self::account(name), Utc::now()).unwrap()
    }

    pub async fn student(&self, name: &str, parent: Option<Enrolled>) -> Enrolled {
        let mut db = self.db.lock().await;
        db.student_add(
            Self::account(name),
            parent.map(|p| p.profile_id),
            Utc::now(),
        )
        .unwrap()
    }

    pub async fn bearer(&self, user_id: u32) -> String {
        let db = self.db.lock().await;
        let user = db.user_get(user_id).unwrap();
        format!("Bearer {}", self.tokens.issue(user, Utc::now()).unwrap())
    }

    /// Sends the request through the whole API, recover included
    pub async fn call(&self, request: RequestBuilder) -> (StatusCode, Value) {
        let api = super::api(&self.db, &self.tokens, false);
        let response = request.reply(&api).await;

        let body = serde_json::from_slice(response.body()).unwrap_or(Value::Null);
        (response.status(), body)
    }
}
