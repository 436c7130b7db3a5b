use chrono::{DateTime, Utc};

use crate::models::{Notification, NotificationType, Role};
use crate::tables::{next_id, Tables};
use crate::{Error, Result};

impl Tables {
    pub fn notification_add(
        &mut self,
        user_id: u32,
        kind: NotificationType,
        title: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        if !self.users.contains_key(&user_id) {
            return Err(Error::not_found("User not found"));
        }

        let notification = Notification {
            id: next_id(&mut self.next_notification_id),
            user_id,
            kind,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: now,
        };

        self.notifications
            .insert(notification.id, notification.clone());

        Ok(notification)
    }

    /// Fan-out of a student event to the people watching over the student: the linked parent
    /// first, then every administrator.
    pub fn notify_stakeholders(
        &mut self,
        student_id: u32,
        kind: NotificationType,
        title: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let student = self
            .students
            .get(&student_id)
            .ok_or_else(|| Error::not_found("Student not found"))?;

        let parent_user_id = student
            .parent_id
            .and_then(|parent_id| self.parents.get(&parent_id))
            .map(|parent| parent.user_id);

        let admins: Vec<u32> = self
            .users
            .values()
            .filter(|u| u.role == Role::Admin)
            .map(|u| u.id)
            .collect();

        let recipients: Vec<u32> = parent_user_id.into_iter().chain(admins).collect();

        for user_id in &recipients {
            self.notification_add(*user_id, kind, title, message, now)?;
        }

        Ok(recipients.len())
    }

    /// Stakeholder fan-out plus a direct notification to the student
    pub fn notify_student_and_stakeholders(
        &mut self,
        student_id: u32,
        kind: NotificationType,
        title: &str,
        (stakeholders_message, student_message): (&str, &str),
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let student_user_id = self
            .students
            .get(&student_id)
            .map(|s| s.user_id)
            .ok_or_else(|| Error::not_found("Student not found"))?;

        let count = self.notify_stakeholders(student_id, kind, title, stakeholders_message, now)?;
        self.notification_add(student_user_id, kind, title, student_message, now)?;

        Ok(count + 1)
    }
}

pub(crate) fn session_started_messages(
    student_name: &str,
    subject: &str,
    topic: &str,
) -> (String, String) {
    (
        format!(
            "Tutoring session for {} - {} ({}) has started.",
            student_name, subject, topic
        ),
        format!(
            "Your tutoring session for {} ({}) has started.",
            subject, topic
        ),
    )
}

pub(crate) fn session_ended_messages(
    student_name: &str,
    subject: &str,
    duration: u32,
) -> (String, String) {
    (
        format!(
            "Tutoring session for {} - {} ended. Duration: {} mins.",
            student_name, subject, duration
        ),
        format!(
            "Your tutoring session for {} ended. Duration: {} mins.",
            subject, duration
        ),
    )
}

pub(crate) fn homework_assigned_messages(student_name: &str, title: &str) -> (String, String) {
    (
        format!("New homework for {}: {}", student_name, title),
        format!("You have new homework: {}", title),
    )
}
