//! Mailbox address syntax checks.
//!
//! Acceptance is deliberately narrower than RFC 5321: a dotted-atom local
//! part and domain with a 2-6 character lowercase TLD. Anything else is a
//! syntax error at the protocol level.

use std::sync::LazyLock;

use regex::Regex;

static MAILBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9]+([._-]?[A-Za-z0-9]+)*@[A-Za-z0-9]+([._-]?[A-Za-z0-9]+)*\.[a-z]{2,6}$")
        .expect("mailbox pattern is valid")
});

/// Returns `true` if `addr` is an acceptable mailbox address.
pub fn is_valid(addr: &str) -> bool {
    MAILBOX.is_match(addr)
}

/// The part of the address before `@`.
pub fn local_part(addr: &str) -> &str {
    addr.split_once('@').map_or(addr, |(local, _)| local)
}

/// The part of the address after `@`.
pub fn domain(addr: &str) -> &str {
    addr.split_once('@').map_or(addr, |(_, host)| host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_mailboxes() {
        for addr in [
            "a@b.co",
            "user@example.com",
            "first.last@mail.example.org",
            "a_b-c@host-1.io",
            "User123@Example.com",
        ] {
            assert!(is_valid(addr), "{addr} should be accepted");
        }
    }

    #[test]
    fn rejects_malformed_mailboxes() {
        for addr in [
            "",
            "user",
            "user@",
            "@example.com",
            "user@example",
            "a@b.c",           // TLD too short
            "a@b.abcdefg",     // TLD too long
            ".user@example.com",
            "user.@example.com",
            "user@.example.com",
            "user@example.COM", // TLD must be lowercase
            "us er@example.com",
            "<a@b.co>",
        ] {
            assert!(!is_valid(addr), "{addr} should be rejected");
        }
    }

    #[test]
    fn splits_local_part_and_domain() {
        assert_eq!(local_part("user@example.com"), "user");
        assert_eq!(domain("user@example.com"), "example.com");
    }
}
