//! Salted PBKDF2-HMAC-SHA256 password hashes.
//!
//! Stored format: `pbkdf2:sha256:<iterations>$<salt>$<hex digest>`.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const METHOD_PREFIX: &str = "pbkdf2";
const DIGEST_NAME: &str = "sha256";
const SALT_LENGTH: usize = 16;
const DIGEST_LENGTH: usize = 32;

fn derive(password: &str, salt: &str, iterations: u32) -> [u8; DIGEST_LENGTH] {
    let mut out = [0u8; DIGEST_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), iterations, &mut out);
    out
}

fn random_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}

/// Hash `password` with a fresh random salt
pub fn generate_password_hash(password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);
    let salt = random_salt();
    let digest = derive(password, &salt, iterations);
    format!(
        "{}:{}:{}${}${}",
        METHOD_PREFIX,
        DIGEST_NAME,
        iterations,
        salt,
        hex::encode(digest)
    )
}

/// Check `password` against a stored hash. Anything unparseable is a mismatch.
pub fn check_password_hash(stored: &str, password: &str) -> bool {
    let mut parts = stored.splitn(3, '$');
    let (Some(method), Some(salt), Some(expected_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    let mut method_parts = method.split(':');
    let iterations = match (method_parts.next(), method_parts.next(), method_parts.next()) {
        (Some(METHOD_PREFIX), Some(DIGEST_NAME), Some(rounds)) => match rounds.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => return false,
        },
        _ => return false,
    };
    if method_parts.next().is_some() {
        return false;
    }

    let expected = match hex::decode(expected_hex) {
        Ok(bytes) if bytes.len() == DIGEST_LENGTH => bytes,
        _ => return false,
    };

    let actual = derive(password, salt, iterations);
    actual[..].ct_eq(&expected[..]).into()
}
