//! Verifying a cleartext password against a stored role password hash.
//!
//! Ports the exact acceptance rules a reconciler needs to tell "no change"
//! apart from "rotate the password" without ever sending a cleartext
//! comparison to the server. The oddity where an already-hashed value is
//! accepted verbatim is intentional (see module-level note on
//! [`verify_password`]) — it is what lets a desired-state document embed a
//! previously-dumped hash without forcing a rotation on every run.

use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use md5::Md5;
use pbkdf2::pbkdf2_hmac;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

static MD5_HASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^md5[0-9a-f]{32}$").expect("static regex is valid"));

static SCRAM_HASH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SCRAM-(SHA-1|SHA-256|SHA-512)\$(\d+):([^$]+)\$([^:]+):(.+)$")
        .expect("static regex is valid")
});

/// Returns true iff `plain` is the same secret the stored value `hashed`
/// represents for `username`.
///
/// `hashed == plain` is accepted outright: a desired-state document is
/// allowed to hold a hash verbatim (as produced by a previous `--dump`)
/// rather than a cleartext password.
#[must_use]
pub fn verify_password(hashed: &str, username: &str, plain: &str) -> bool {
    if hashed == plain {
        return true;
    }
    if let Some(suffix) = hashed.strip_prefix("md5") {
        if !MD5_HASH.is_match(hashed) {
            return false;
        }
        let digest = Md5::digest(format!("{plain}{username}").as_bytes());
        return hex::encode(digest).eq_ignore_ascii_case(suffix);
    }
    let Some(caps) = SCRAM_HASH.captures(hashed) else {
        return false;
    };
    let Ok(iterations) = caps[2].parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(stored_key), Ok(server_key)) = (
        BASE64.decode(&caps[3]),
        BASE64.decode(&caps[4]),
        BASE64.decode(&caps[5]),
    ) else {
        return false;
    };

    match &caps[1] {
        "SHA-1" => verify_scram_sha1(plain, iterations, &salt, &stored_key, &server_key),
        "SHA-256" => verify_scram_sha256(plain, iterations, &salt, &stored_key, &server_key),
        "SHA-512" => verify_scram_sha512(plain, iterations, &salt, &stored_key, &server_key),
        _ => false,
    }
}

macro_rules! scram_verifier {
    ($name:ident, $digest:ty) => {
        fn $name(plain: &str, iterations: u32, salt: &[u8], stored_key: &[u8], server_key: &[u8]) -> bool {
            // SCRAM's digest key is always 32 bytes, independent of the hash
            // algorithm used for HMAC/PBKDF2 itself (original_source/passwords.go's
            // pbkdf2.Key(..., 32, hgf)).
            let mut digest_key = [0u8; 32];
            pbkdf2_hmac::<$digest>(plain.as_bytes(), salt, iterations, &mut digest_key);

            let Ok(mut mac) = Hmac::<$digest>::new_from_slice(&digest_key) else {
                return false;
            };
            mac.update(b"Client Key");
            let client_key = mac.finalize().into_bytes();

            let Ok(mut server_mac) = Hmac::<$digest>::new_from_slice(&digest_key) else {
                return false;
            };
            server_mac.update(b"Server Key");
            let computed_server_key = server_mac.finalize().into_bytes();

            let hashed_client_key = <$digest>::digest(client_key);
            hashed_client_key.as_slice() == stored_key && computed_server_key.as_slice() == server_key
        }
    };
}

scram_verifier!(verify_scram_sha1, Sha1);
scram_verifier!(verify_scram_sha256, Sha256);
scram_verifier!(verify_scram_sha512, Sha512);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_equality_accepts_a_verbatim_hash() {
        assert!(verify_password("already-a-hash", "alice", "already-a-hash"));
    }

    #[test]
    fn md5_hash_matches_the_right_password() {
        let digest = Md5::digest(b"hunter2alice");
        let hashed = format!("md5{}", hex::encode(digest));
        assert!(verify_password(&hashed, "alice", "hunter2"));
        assert!(!verify_password(&hashed, "alice", "wrong"));
    }

    #[test]
    fn md5_hash_is_username_bound() {
        let digest = Md5::digest(b"hunter2alice");
        let hashed = format!("md5{}", hex::encode(digest));
        assert!(!verify_password(&hashed, "bob", "hunter2"));
    }

    macro_rules! scram_round_trip_test {
        ($test_name:ident, $algorithm:literal, $digest:ty) => {
            #[test]
            fn $test_name() {
                let salt = b"0123456789abcdef";
                let iterations = 4096u32;
                let mut digest_key = [0u8; 32];
                pbkdf2_hmac::<$digest>(b"hunter2", salt, iterations, &mut digest_key);
                let mut client_mac = Hmac::<$digest>::new_from_slice(&digest_key).unwrap();
                client_mac.update(b"Client Key");
                let client_key = client_mac.finalize().into_bytes();
                let stored_key = <$digest>::digest(client_key);
                let mut server_mac = Hmac::<$digest>::new_from_slice(&digest_key).unwrap();
                server_mac.update(b"Server Key");
                let server_key = server_mac.finalize().into_bytes();

                let hashed = format!(
                    concat!("SCRAM-", $algorithm, "${}:{}${}:{}"),
                    iterations,
                    BASE64.encode(salt),
                    BASE64.encode(stored_key),
                    BASE64.encode(server_key)
                );

                assert!(verify_password(&hashed, "alice", "hunter2"));
                assert!(!verify_password(&hashed, "alice", "wrong"));
            }
        };
    }

    // Each algorithm's digest key is 32 bytes regardless of the hash's own
    // output size (20 for SHA-1, 64 for SHA-512) — these three catch a
    // hardcoded-vs-derived buffer length regression that SHA-256 alone
    // cannot, since 32 happens to be SHA-256's own output size too.
    scram_round_trip_test!(scram_sha1_round_trips, "SHA-1", Sha1);
    scram_round_trip_test!(scram_sha256_round_trips, "SHA-256", Sha256);
    scram_round_trip_test!(scram_sha512_round_trips, "SHA-512", Sha512);

    #[test]
    fn malformed_hash_is_rejected_not_panicked_on() {
        assert!(!verify_password("SCRAM-SHA-256$not-a-number:salt$k:s", "alice", "hunter2"));
        assert!(!verify_password("md5not-even-hex", "alice", "hunter2"));
    }
}
