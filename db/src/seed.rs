use chrono::Utc;
use log::info;

use crate::{models::User, password, Database, NewAccount, Result};

pub const ADMIN_NAME: &str = "System Admin";

/// Makes sure the configured administrator can log in: creates the account on first start, and
/// resets its password and role on later starts.
pub fn ensure_admin(db: &mut impl Database, email: &str, admin_password: &str) -> Result<User> {
    let existed = db.user_get_by_email(email).is_some();

    let admin = db.admin_ensure(
        NewAccount {
            name: ADMIN_NAME.to_string(),
            email: email.to_string(),
            password_hash: password::hash(admin_password)?,
        },
        Utc::now(),
    )?;

    if existed {
        info!("Admin {} already exists, password updated", admin.email);
    } else {
        info!("Admin {} created", admin.email);
    }

    Ok(admin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::Role, JSONDatabase};

    #[test]
    fn second_bootstrap_resets_the_password() {
        let mut db = JSONDatabase::in_memory();

        let first = ensure_admin(&mut db, "admin@mentorlog.com", "Admin@123").unwrap();
        let second = ensure_admin(&mut db, "Admin@MentorLog.com", "Changed@456").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.role, Role::Admin);
        assert!(password::verify("Changed@456", &second.password_hash));
        assert!(!password::verify("Admin@123", &second.password_hash));
    }
}
