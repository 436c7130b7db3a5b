use bimap::BiMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{
    Attendance, Homework, Leave, Media, Notification, Parent, Role, Session, Student, Tutor, User,
};
use crate::{normalize_email, Error, NewAccount, Result, PAGE_SIZE};

/// Every row of the store.
///
/// Rows are keyed by id; ids are allocated from per-table counters and never reused. The whole
/// struct is cloned to snapshot the store before a write, see `JSONDatabase::transaction`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub(crate) struct Tables {
    pub users: BTreeMap<u32, User>,
    /// normalized email <-> user id
    pub emails: BiMap<String, u32>,
    pub tutors: BTreeMap<u32, Tutor>,
    pub students: BTreeMap<u32, Student>,
    pub parents: BTreeMap<u32, Parent>,
    pub sessions: BTreeMap<u32, Session>,
    pub media: BTreeMap<u32, Media>,
    pub leaves: BTreeMap<u32, Leave>,
    pub homeworks: BTreeMap<u32, Homework>,
    pub notifications: BTreeMap<u32, Notification>,
    pub attendances: BTreeMap<u32, Attendance>,
    pub next_user_id: u32,
    pub next_tutor_id: u32,
    pub next_student_id: u32,
    pub next_parent_id: u32,
    pub next_session_id: u32,
    pub next_media_id: u32,
    pub next_leave_id: u32,
    pub next_homework_id: u32,
    pub next_notification_id: u32,
    pub next_attendance_id: u32,
}

pub(crate) fn next_id(counter: &mut u32) -> u32 {
    *counter += 1;
    *counter
}

impl Tables {
    pub fn user_add(&mut self, account: NewAccount, role: Role, now: DateTime<Utc>) -> Result<u32> {
        let email = normalize_email(&account.email);

        if self.emails.contains_left(&email) {
            return Err(Error::conflict("User with this email already exists"));
        }

        let id = next_id(&mut self.next_user_id);
        self.emails.insert(email.clone(), id);
        self.users.insert(
            id,
            User {
                id,
                name: account.name.trim().to_string(),
                email,
                password_hash: account.password_hash,
                role,
                created_at: now,
            },
        );

        Ok(id)
    }

    pub fn user_by_email(&self, email: &str) -> Option<&User> {
        let id = self.emails.get_by_left(&normalize_email(email))?;
        self.users.get(id)
    }

    pub fn user_name(&self, user_id: u32) -> &str {
        self.users
            .get(&user_id)
            .map(|u| u.name.as_str())
            .unwrap_or("")
    }

    pub fn tutor_by_user(&self, user_id: u32) -> Option<&Tutor> {
        self.tutors.values().find(|t| t.user_id == user_id)
    }

    pub fn student_by_user(&self, user_id: u32) -> Option<&Student> {
        self.students.values().find(|s| s.user_id == user_id)
    }

    pub fn parent_by_user(&self, user_id: u32) -> Option<&Parent> {
        self.parents.values().find(|p| p.user_id == user_id)
    }

    /// Resolves the tutor profile of an authenticated user
    pub fn require_tutor(&self, tutor_user_id: u32) -> Result<Tutor> {
        self.tutor_by_user(tutor_user_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Tutor profile not found"))
    }
}

/// Filters `collection` on `query` (matched against the name returned by `property`) and returns
/// the total number of matches along with the requested page. Without a page, every match is
/// returned.
pub(crate) fn _search<'a, T, F>(
    collection: impl Iterator<Item = &'a T>,
    property: F,
    page: Option<usize>,
    query: Option<&str>,
) -> (usize, Vec<&'a T>)
where
    F: Fn(&T) -> String,
{
    let mut filter = contains_query(query, property);
    let mut total = 0;
    let mut skipped = 0;
    let mut results: Vec<&T> = Vec::new();
    let to_skip = page
        .map(|p| p.saturating_sub(1).saturating_mul(PAGE_SIZE))
        .unwrap_or(0);
    let page_size = page.map(|_| PAGE_SIZE).unwrap_or(usize::MAX);

    for row in collection {
        if !filter(&row) {
            continue;
        }

        total += 1;

        if skipped < to_skip {
            skipped += 1;
        } else if results.len() < page_size {
            results.push(row);
        }
    }

    (total, results)
}

/// Returns a function to be used as a filter that checks if the provided query is contained in the
/// object string.
fn contains_query<T, F>(query: Option<&str>, property: F) -> impl FnMut(&&T) -> bool
where
    F: Fn(&T) -> String,
{
    let normalize = |s: &str| unidecode::unidecode(s.trim()).to_ascii_lowercase();
    let query = query.map(|d| truncate(d, 50)).map(normalize);

    move |object: &&T| {
        if let Some(query) = &query {
            let name = property(object);
            let name = normalize(&name);
            name.contains(query)
        } else {
            true
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        None => s,
        Some((idx, _)) => &s[..idx],
    }
}
