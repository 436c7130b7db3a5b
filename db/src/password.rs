use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{seq::SliceRandom, Rng};

use crate::{Error, Result};

const TEMPORARY_PASSWORD_LENGTH: usize = 8;
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Hashes `password` into a PHC string (argon2id, random salt)
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::encode_b64(&rand::random::<[u8; 16]>())
        .map_err(|e| Error::Hashing(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hashing(e.to_string()))
}

/// Checks `password` against a PHC string; a malformed hash never verifies
pub fn verify(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Generates the one-time password handed out at enrollment: 8 alphanumeric characters with at
/// least one uppercase letter, one lowercase letter and one digit.
pub fn generate_temporary() -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [UPPERCASE, LOWERCASE, DIGITS].concat();

    let mut password: Vec<u8> = vec![
        UPPERCASE[rng.gen_range(0..UPPERCASE.len())],
        LOWERCASE[rng.gen_range(0..LOWERCASE.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
    ];

    while password.len() < TEMPORARY_PASSWORD_LENGTH {
        password.push(all[rng.gen_range(0..all.len())]);
    }

    password.shuffle(&mut rng);
    password.into_iter().map(char::from).collect()
}

/// Minimal policy for passwords chosen by users
pub fn is_strong_enough(password: &str) -> bool {
    password.chars().count() >= TEMPORARY_PASSWORD_LENGTH
        && password.chars().any(|c| c.is_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hashed = hash("Admin@123").unwrap();

        assert!(hashed.starts_with("$argon2"));
        assert!(verify("Admin@123", &hashed));
        assert!(!verify("admin@123", &hashed));
        assert!(!verify("Admin@123", "plain-text"));
    }

    #[test]
    fn temporary_passwords_follow_the_policy() {
        for _ in 0..200 {
            let password = generate_temporary();

            assert_eq!(password.len(), 8);
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(is_strong_enough(&password));
        }
    }

    #[test]
    fn weak_passwords() {
        assert!(!is_strong_enough("short1"));
        assert!(!is_strong_enough("onlyletters"));
        assert!(!is_strong_enough("12345678"));
        assert!(is_strong_enough("letters4ever"));
    }
}
