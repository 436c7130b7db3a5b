use chrono::{DateTime, Utc};
use log::{info, warn};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use super::{
    models::{
        Attendance, Homework, HomeworkStatus, Leave, LeaveStatus, Media, Notification,
        NotificationType, Parent, Role, Session, Student, Tutor, User,
    },
    notify::homework_assigned_messages,
    tables::{_search, next_id, Tables},
    Database, Enrolled, Error, NewAccount, NewHomework, NewLeave, NewSession, Result,
};

/// Store keeping every table in memory and writing them to a JSON file after each change.
pub struct JSONDatabase {
    filename: Option<PathBuf>,
    tables: Tables,
}

impl JSONDatabase {
    /// Loads the store from `filename`, or creates an empty one there if the file doesn't exist
    pub fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref().to_path_buf();

        if filename.exists() {
            let tables = Self::from_file(&filename)?;
            info!("Loaded database from {}", filename.display());
            return Ok(Self {
                filename: Some(filename),
                tables,
            });
        }

        let db = Self {
            filename: Some(filename),
            tables: Tables::default(),
        };
        db.persist()?;

        Ok(db)
    }

    pub fn in_memory() -> Self {
        Self {
            filename: None,
            tables: Tables::default(),
        }
    }

    fn from_file(filename: &Path) -> Result<Tables> {
        let contents = {
            let mut file = File::open(filename)?;
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            contents
        };

        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes to a sibling file first so a crash never leaves a truncated database behind
    fn persist(&self) -> Result<()> {
        let filename = match &self.filename {
            Some(filename) => filename,
            None => return Ok(()),
        };

        let tmp = filename.with_extension("json.tmp");
        {
            let mut output = File::create(&tmp)?;
            write!(output, "{}", self.dump_as_json()?)?;
            output.sync_all()?;
        }
        fs::rename(&tmp, filename)?;

        Ok(())
    }

    /// Runs `change` against the tables and persists the result. If either step fails, the
    /// tables are put back the way they were, so a failed operation has no visible effect.
    fn transaction<T>(&mut self, change: impl FnOnce(&mut Tables) -> Result<T>) -> Result<T> {
        let snapshot = self.tables.clone();

        let result = change(&mut self.tables).and_then(|value| {
            self.persist()?;
            Ok(value)
        });

        if let Err(e) = &result {
            if e.is_internal() {
                warn!("Rolling back database change: {}", e);
            }
            self.tables = snapshot;
        }

        result
    }

    fn enroll(
        &mut self,
        account: NewAccount,
        role: Role,
        profile: impl FnOnce(&mut Tables, u32) -> Result<u32>,
        now: DateTime<Utc>,
    ) -> Result<Enrolled> {
        let enrolled = self.transaction(|tables| {
            let user_id = tables.user_add(account, role, now)?;
            let profile_id = profile(tables, user_id)?;
            Ok(Enrolled {
                user_id,
                profile_id,
            })
        })?;

        info!(
            "Enrolled {} (user {}, profile {})",
            role.as_str(),
            enrolled.user_id,
            enrolled.profile_id
        );

        Ok(enrolled)
    }

    fn profile_name(&self, user_id: u32) -> String {
        self.tables.user_name(user_id).to_string()
    }
}

impl Database for JSONDatabase {
    fn dump_as_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(&self.tables)
    }

    fn user_get(&self, id: u32) -> Option<&User> {
        self.tables.users.get(&id)
    }

    fn user_get_by_email(&self, email: &str) -> Option<&User> {
        self.tables.user_by_email(email)
    }

    fn user_set_password_hash(&mut self, id: u32, password_hash: String) -> Result<()> {
        self.transaction(|tables| {
            let user = tables
                .users
                .get_mut(&id)
                .ok_or_else(|| Error::not_found("User not found"))?;
            user.password_hash = password_hash;
            Ok(())
        })
    }

    fn admin_ensure(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<User> {
        self.transaction(|tables| {
            let existing = tables.user_by_email(&account.email).map(|u| u.id);

            let id = match existing {
                Some(id) => {
                    let has_profile = tables.tutor_by_user(id).is_some()
                        || tables.student_by_user(id).is_some()
                        || tables.parent_by_user(id).is_some();
                    if has_profile {
                        return Err(Error::conflict(
                            "Email belongs to a tutor, student or parent",
                        ));
                    }

                    let user = tables
                        .users
                        .get_mut(&id)
                        .ok_or_else(|| Error::not_found("User not found"))?;
                    user.password_hash = account.password_hash;
                    user.role = Role::Admin;
                    id
                }
                None => tables.user_add(account, Role::Admin, now)?,
            };

            tables
                .users
                .get(&id)
                .cloned()
                .ok_or_else(|| Error::not_found("User not found"))
        })
    }

    fn tutor_add(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<Enrolled> {
        self.enroll(
            account,
            Role::Tutor,
            |tables, user_id| {
                let id = next_id(&mut tables.next_tutor_id);
                tables.tutors.insert(id, Tutor { id, user_id });
                Ok(id)
            },
            now,
        )
    }

    fn tutor_get(&self, id: u32) -> Option<&Tutor> {
        self.tables.tutors.get(&id)
    }

    fn tutor_get_by_user(&self, user_id: u32) -> Option<&Tutor> {
        self.tables.tutor_by_user(user_id)
    }

    fn tutor_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Tutor>) {
        _search(
            self.tables.tutors.values(),
            |t: &Tutor| self.profile_name(t.user_id),
            page,
            query,
        )
    }

    fn student_add(
        &mut self,
        account: NewAccount,
        parent_id: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Enrolled> {
        self.enroll(
            account,
            Role::Student,
            |tables, user_id| {
                if let Some(parent_id) = parent_id {
                    if !tables.parents.contains_key(&parent_id) {
                        return Err(Error::validation("Parent not found"));
                    }
                }

                let id = next_id(&mut tables.next_student_id);
                tables.students.insert(
                    id,
                    Student {
                        id,
                        user_id,
                        parent_id,
                    },
                );
                Ok(id)
            },
            now,
        )
    }

    fn student_get(&self, id: u32) -> Option<&Student> {
        self.tables.students.get(&id)
    }

    fn student_get_by_user(&self, user_id: u32) -> Option<&Student> {
        self.tables.student_by_user(user_id)
    }

    fn student_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Student>) {
        _search(
            self.tables.students.values(),
            |s: &Student| self.profile_name(s.user_id),
            page,
            query,
        )
    }

    fn student_list_by_parent(&self, parent_id: u32) -> Vec<&Student> {
        self.tables
            .students
            .values()
            .filter(|s| s.parent_id == Some(parent_id))
            .collect()
    }

    fn parent_add(&mut self, account: NewAccount, now: DateTime<Utc>) -> Result<Enrolled> {
        self.enroll(
            account,
            Role::Parent,
            |tables, user_id| {
                let id = next_id(&mut tables.next_parent_id);
                tables.parents.insert(id, Parent { id, user_id });
                Ok(id)
            },
            now,
        )
    }

    fn parent_get(&self, id: u32) -> Option<&Parent> {
        self.tables.parents.get(&id)
    }

    fn parent_get_by_user(&self, user_id: u32) -> Option<&Parent> {
        self.tables.parent_by_user(user_id)
    }

    fn parent_list(&self, page: Option<usize>, query: Option<&str>) -> (usize, Vec<&Parent>) {
        _search(
            self.tables.parents.values(),
            |p: &Parent| self.profile_name(p.user_id),
            page,
            query,
        )
    }

    fn session_start(
        &mut self,
        tutor_user_id: u32,
        session: NewSession,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        self.transaction(|tables| tables.session_start(tutor_user_id, session, now))
    }

    fn session_end(
        &mut self,
        tutor_user_id: u32,
        session_id: u32,
        image_proof_url: &str,
        now: DateTime<Utc>,
    ) -> Result<Session> {
        self.transaction(|tables| {
            tables.session_end(tutor_user_id, session_id, image_proof_url, now)
        })
    }

    fn session_active(&self, tutor_user_id: u32) -> Result<Option<&Session>> {
        let tutor = self.tables.require_tutor(tutor_user_id)?;
        Ok(self.tables.active_session_of(tutor.id))
    }

    fn session_list(&self) -> Vec<&Session> {
        self.tables.sessions.values().collect()
    }

    fn session_list_by_student(&self, student_id: u32) -> Vec<&Session> {
        self.tables
            .sessions
            .values()
            .filter(|s| s.student_id == student_id)
            .collect()
    }

    fn media_list_by_session(&self, session_id: u32) -> Vec<&Media> {
        self.tables
            .media
            .values()
            .filter(|m| m.session_id == session_id)
            .collect()
    }

    fn notification_create(
        &mut self,
        user_id: u32,
        kind: NotificationType,
        title: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Notification> {
        self.transaction(|tables| tables.notification_add(user_id, kind, title, message, now))
    }

    fn notification_list(&self, user_id: u32) -> Vec<&Notification> {
        let mut notifications: Vec<&Notification> = self
            .tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        notifications
    }

    fn notification_mark_read(&mut self, user_id: u32, id: u32) -> Result<Notification> {
        self.transaction(|tables| {
            let notification = tables
                .notifications
                .get_mut(&id)
                .filter(|n| n.user_id == user_id)
                .ok_or_else(|| Error::not_found("Notification not found"))?;
            notification.is_read = true;
            Ok(notification.clone())
        })
    }

    fn leave_apply(
        &mut self,
        tutor_user_id: u32,
        leave: NewLeave,
        now: DateTime<Utc>,
    ) -> Result<Leave> {
        if leave.end_date < leave.start_date {
            return Err(Error::validation("End date is before start date"));
        }

        self.transaction(|tables| {
            let tutor = tables.require_tutor(tutor_user_id)?;

            let leave = Leave {
                id: next_id(&mut tables.next_leave_id),
                tutor_id: tutor.id,
                start_date: leave.start_date,
                end_date: leave.end_date,
                reason: leave.reason,
                status: LeaveStatus::Pending,
                approved_by_id: None,
                created_at: now,
                updated_at: now,
            };
            tables.leaves.insert(leave.id, leave.clone());

            Ok(leave)
        })
    }

    fn leave_set_status(
        &mut self,
        leave_id: u32,
        admin_user_id: u32,
        status: LeaveStatus,
        now: DateTime<Utc>,
    ) -> Result<Leave> {
        if status == LeaveStatus::Pending {
            return Err(Error::validation("Status must be APPROVED or REJECTED"));
        }

        let leave = self.transaction(|tables| {
            let leave = tables
                .leaves
                .get_mut(&leave_id)
                .ok_or_else(|| Error::not_found("Leave not found"))?;

            if leave.status != LeaveStatus::Pending {
                return Err(Error::conflict("Leave has already been decided"));
            }

            leave.status = status;
            leave.approved_by_id = Some(admin_user_id);
            leave.updated_at = now;

            Ok(leave.clone())
        })?;

        info!("Leave {} set to {:?} by user {}", leave.id, status, admin_user_id);

        Ok(leave)
    }

    fn leave_list(&self, tutor_id: Option<u32>) -> Vec<&Leave> {
        let mut leaves: Vec<&Leave> = self
            .tables
            .leaves
            .values()
            .filter(|l| tutor_id.map(|id| l.tutor_id == id).unwrap_or(true))
            .collect();
        leaves.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        leaves
    }

    fn attendance_login(&mut self, tutor_user_id: u32, now: DateTime<Utc>) -> Result<Attendance> {
        self.transaction(|tables| {
            let tutor = tables.require_tutor(tutor_user_id)?;

            let open = tables
                .attendances
                .values()
                .any(|a| a.tutor_id == tutor.id && a.logout_time.is_none());
            if open {
                return Err(Error::conflict("Tutor already has an active login session"));
            }

            let attendance = Attendance {
                id: next_id(&mut tables.next_attendance_id),
                tutor_id: tutor.id,
                login_time: now,
                logout_time: None,
                duration: None,
            };
            tables.attendances.insert(attendance.id, attendance.clone());

            Ok(attendance)
        })
    }

    fn attendance_logout(
        &mut self,
        tutor_user_id: u32,
        now: DateTime<Utc>,
    ) -> Result<Attendance> {
        self.transaction(|tables| {
            let tutor = tables.require_tutor(tutor_user_id)?;

            let attendance = tables
                .attendances
                .values_mut()
                .find(|a| a.tutor_id == tutor.id && a.logout_time.is_none())
                .ok_or_else(|| {
                    Error::not_found("No active login session found for this tutor")
                })?;

            // Unlike teaching sessions, a sub-minute clock-in counts as zero
            let minutes = (now - attendance.login_time).num_minutes().max(0) as u32;
            attendance.logout_time = Some(now);
            attendance.duration = Some(minutes);

            Ok(attendance.clone())
        })
    }

    fn attendance_list(&self, tutor_id: Option<u32>) -> Vec<&Attendance> {
        self.tables
            .attendances
            .values()
            .filter(|a| tutor_id.map(|id| a.tutor_id == id).unwrap_or(true))
            .collect()
    }

    fn homework_assign(
        &mut self,
        tutor_user_id: u32,
        homework: NewHomework,
        now: DateTime<Utc>,
    ) -> Result<Homework> {
        self.transaction(|tables| {
            tables.require_tutor(tutor_user_id)?;

            let student = tables
                .students
                .get(&homework.student_id)
                .cloned()
                .ok_or_else(|| Error::not_found("Student not found"))?;

            let homework = Homework {
                id: next_id(&mut tables.next_homework_id),
                student_id: student.id,
                title: homework.title,
                description: homework.description,
                due_date: homework.due_date,
                status: HomeworkStatus::Pending,
                assigned_by_id: tutor_user_id,
                created_at: now,
            };
            tables.homeworks.insert(homework.id, homework.clone());

            let (stakeholders, own) =
                homework_assigned_messages(tables.user_name(student.user_id), &homework.title);
            tables.notify_student_and_stakeholders(
                student.id,
                NotificationType::HomeworkPending,
                "Homework Assigned",
                (&stakeholders, &own),
                now,
            )?;

            Ok(homework)
        })
    }

    fn homework_set_status(
        &mut self,
        tutor_user_id: u32,
        homework_id: u32,
        status: HomeworkStatus,
    ) -> Result<Homework> {
        self.transaction(|tables| {
            let homework = tables
                .homeworks
                .get_mut(&homework_id)
                .ok_or_else(|| Error::not_found("Homework not found"))?;

            if homework.assigned_by_id != tutor_user_id {
                return Err(Error::forbidden("Homework was assigned by another tutor"));
            }

            homework.status = status;
            Ok(homework.clone())
        })
    }

    fn homework_list(&self, student_id: u32, status: Option<HomeworkStatus>) -> Vec<&Homework> {
        let mut homeworks: Vec<&Homework> = self
            .tables
            .homeworks
            .values()
            .filter(|h| h.student_id == student_id)
            .filter(|h| status.map(|s| h.status == s).unwrap_or(true))
            .collect();
        homeworks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        homeworks
    }

    fn tutor_count(&self) -> usize {
        self.tables.tutors.len()
    }

    fn student_count(&self) -> usize {
        self.tables.students.len()
    }
}
