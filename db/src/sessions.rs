use chrono::{DateTime, Utc};
use log::info;

use crate::models::{Media, NotificationType, Session};
use crate::notify::{session_ended_messages, session_started_messages};
use crate::tables::{next_id, Tables};
use crate::{Error, NewSession, Result};

/// Whole minutes between `start` and `end`, never less than one
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    let minutes = (end - start).num_minutes();
    minutes.clamp(1, u32::MAX as i64) as u32
}

impl Tables {
    pub fn active_session_of(&self, tutor_id: u32) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.tutor_id == tutor_id && s.is_active())
    }

    pub fn session_start(
        &mut self,
        tutor_user_id: u32,
        request: NewSession,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let tutor = self.require_tutor(tutor_user_id)?;

        if self.active_session_of(tutor.id).is_some() {
            return Err(Error::conflict("Tutor already has an active session"));
        }

        let student = self
            .students
            .get(&request.student_id)
            .cloned()
            .ok_or_else(|| Error::not_found("Student not found"))?;

        let session = Session {
            id: next_id(&mut self.next_session_id),
            tutor_id: tutor.id,
            student_id: student.id,
            subject: request.subject,
            topic: request.topic,
            start_time: now,
            end_time: None,
            duration: None,
        };
        self.sessions.insert(session.id, session.clone());

        let (stakeholders, own) = session_started_messages(
            self.user_name(student.user_id),
            &session.subject,
            &session.topic,
        );
        self.notify_student_and_stakeholders(
            student.id,
            NotificationType::SessionStart,
            "Session Started",
            (&stakeholders, &own),
            now,
        )?;

        info!(
            "Session {} started (tutor {}, student {})",
            session.id, tutor.id, student.id
        );

        Ok(session)
    }

    pub fn session_end(
        &mut self,
        tutor_user_id: u32,
        session_id: u32,
        image_proof_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        let tutor = self.require_tutor(tutor_user_id)?;

        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::not_found("Session not found"))?;

        if session.tutor_id != tutor.id {
            return Err(Error::forbidden(
                "Unauthorized: Session does not belong to this tutor",
            ));
        }

        if !session.is_active() {
            return Err(Error::conflict("Session already ended"));
        }

        let duration = duration_minutes(session.start_time, now);
        session.end_time = Some(now);
        session.duration = Some(duration);
        let session = session.clone();

        let media = Media {
            id: next_id(&mut self.next_media_id),
            session_id,
            url: image_proof_url.to_string(),
            created_at: now,
        };
        self.media.insert(media.id, media);

        let student_user_id = self
            .students
            .get(&session.student_id)
            .map(|s| s.user_id)
            .ok_or_else(|| Error::not_found("Student not found"))?;

        let (stakeholders, own) =
            session_ended_messages(self.user_name(student_user_id), &session.subject, duration);
        self.notify_student_and_stakeholders(
            session.student_id,
            NotificationType::SessionEnd,
            "Session Ended",
            (&stakeholders, &own),
            now,
        )?;

        info!("Session {} ended after {} min", session.id, duration);

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn duration_is_floored_to_the_minute() {
        assert_eq!(duration_minutes(t0(), t0() + Duration::seconds(299)), 4);
        assert_eq!(duration_minutes(t0(), t0() + Duration::minutes(5)), 5);
        assert_eq!(duration_minutes(t0(), t0() + Duration::minutes(90)), 90);
    }

    #[test]
    fn duration_is_at_least_one_minute() {
        assert_eq!(duration_minutes(t0(), t0()), 1);
        assert_eq!(duration_minutes(t0(), t0() + Duration::seconds(59)), 1);
        // Clock skew must not produce a zero or negative duration
        assert_eq!(duration_minutes(t0(), t0() - Duration::minutes(3)), 1);
    }
}
