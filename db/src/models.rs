use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Tutor,
    Student,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Tutor => "TUTOR",
            Self::Student => "STUDENT",
            Self::Parent => "PARENT",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tutor {
    pub id: u32,
    pub user_id: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: u32,
    pub user_id: u32,
    pub parent_id: Option<u32>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Parent {
    pub id: u32,
    pub user_id: u32,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: u32,
    pub tutor_id: u32,
    pub student_id: u32,
    pub subject: String,
    pub topic: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes, only known once the session has ended
    pub duration: Option<u32>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn minutes(&self) -> u32 {
        self.duration.unwrap_or(0)
    }
}

/// Proof (usually a photo) attached to a session when it ends
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: u32,
    pub session_id: u32,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Leave {
    pub id: u32,
    pub tutor_id: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: LeaveStatus,
    /// User id of the administrator who decided
    pub approved_by_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HomeworkStatus {
    Pending,
    Submitted,
    Reviewed,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Homework {
    pub id: u32,
    pub student_id: u32,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: HomeworkStatus,
    /// User id of the tutor
    pub assigned_by_id: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    SessionStart,
    SessionEnd,
    HomeworkPending,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: u32,
    pub user_id: u32,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A tutor's working period, from clock-in to clock-out
#[derive(Clone, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: u32,
    pub tutor_id: u32,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    pub duration: Option<u32>,
}
