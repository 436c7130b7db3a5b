use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

mod error;
mod json;
pub mod models;
mod notify;
pub mod password;
pub mod seed;
mod sessions;
mod tables;

pub use error::{Error, Result};
pub use json::JSONDatabase;
use models::{
    Attendance, Homework, HomeworkStatus, Leave, LeaveStatus, Media, Notification,
    NotificationType, Parent, Session, Student, Tutor, User,
};

pub const PAGE_SIZE: usize = 10;

pub type Db = Arc<Mutex<JSONDatabase>>;
pub type LockedDb<'a> = MutexGuard<'a, JSONDatabase>;

/// Opens (or creates) the store persisted at `filename`
pub fn new_db(filename: &str) -> Result<Db> {
    Ok(Arc::new(Mutex::new(JSONDatabase::open(filename)?)))
}

/// Store that lives only in memory, used by tests
pub fn new_memory_db() -> Db {
    Arc::new(Mutex::new(JSONDatabase::in_memory()))
}

// While the trait only has one impl, it keeps the store API in one place
pub trait Database {
    fn dump_as_json(&self) -> std::result::Result<String, serde_json::Error>;

    fn user_get(&self, id: u32) -> Option<&User>;
    fn user_get_by_email(&self, email: &str) -> Option<&User>;
    fn user_set_password_hash(&mut self, id: u32, password_hash: String) -> Result<()>;
    /// Creates the administrator if missing, otherwise resets its password and role.
    /// An email already used by a tutor, student or parent is a conflict.
    fn admin_ensure(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<User>;

    fn tutor_add(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<Enrolled>;
    fn tutor_get(&self, id: u32) -> Option<&Tutor>;
    fn tutor_get_by_user(&self, user_id: u32) -> Option<&Tutor>;
    fn tutor_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Tutor>);

    fn student_add(
        &mut self,
        account: NewAccount,
        parent_id: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Enrolled>;
    fn student_get(&self, id: u32) -> Option<&Student>;
    fn student_get_by_user(&self, user_id: u32) -> Option<&Student>;
    fn student_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Student>);
    fn student_list_by_parent(&self, parent_id: u32) -> Vec<&Student>;

    fn parent_add(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<Enrolled>;
    fn parent_get(&self, id: u32) -> Option<&Parent>;
    fn parent_get_by_user(&self, user_id: u32) -> Option<&Parent>;
    fn parent_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Parent>);

    fn session_start(
        &mut self,
        tutor_user_id: u32,
        session: NewSession,
        now: DateTime<Utc>,
    ) -> Result<Session>;
    fn session_end(
        &mut self,
        tutor_user_id: u32,
        session_id: u32,
        image_proof_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Session>;
    /// `Ok(None)` when the tutor exists but has no session in progress
    fn session_active(&self, tutor_user_id: u32) -> Result<Option<&Session>>;
    fn session_list(&self) -> Vec<&Session>;
    fn session_list_by_student(&self, student_id: u32) -> Vec<&Session>;
    fn media_list_by_session(&self, session_id: u32) -> Vec<&Media>;

    fn notification_create(
        &mut self,
        user_id: u32,
        kind: NotificationType,
        title: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Notification>;
    /// Newest first
    fn notification_list(&self, user_id: u32) -> Vec<&Notification>;
    fn notification_mark_read(&mut self, user_id: u32, id: u32) -> Result<Notification>;

    fn leave_apply(
        &mut self,
        tutor_user_id: u32,
        leave: NewLeave,
        now: DateTime<Utc>,
    ) -> Result<Leave>;
    fn leave_set_status(
        &mut self,
        leave_id: u32,
        admin_user_id: u32,
        status: LeaveStatus,
        now: DateTime<Utc>,
    ) -> Result<Leave>;
    fn leave_list(&self, tutor_id: Option<u32>) -> Vec<&Leave>;

    fn attendance_login(&mut self, tutor_user_id: u32, now: DateTime<Utc>) -> Result<Attendance>;
    fn attendance_logout(&mut self, tutor_user_id: u32, now: DateTime<Utc>)
        -> Result<Attendance>;
    fn attendance_list(&self, tutor_id: Option<u32>) -> Vec<&Attendance>;

    fn homework_assign(
        &mut self,
        tutor_user_id: u32,
        homework: NewHomework,
        now: DateTime<Utc>,
    ) -> Result<Homework>;
    fn homework_set_status(
        &mut self,
        tutor_user_id: u32,
        homework_id: u32,
        status: HomeworkStatus,
    ) -> Result<Homework>;
    /// Newest first
    fn homework_list(&self, student_id: u32, status: Option<HomeworkStatus>) -> Vec<&Homework>;

    fn tutor_count(&self) -> usize;
    fn student_count(&self) -> usize;
}

/// Normalized form under which emails are indexed
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Ids handed back by the enrollment operations
#[derive(Debug, Clone, Copy)]
pub struct Enrolled {
    pub user_id: u32,
    pub profile_id: u32,
}

pub struct NewSession {
    pub student_id: u32,
    pub subject: String,
    pub topic: String,
}

pub struct NewLeave {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

pub struct NewHomework {
    pub student_id: u32,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}
