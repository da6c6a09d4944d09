//! SMTP command line recognition.
//!
//! A command line is everything up to CRLF. `MAIL` and `RCPT` are only
//! recognized with their full `MAIL FROM:` / `RCPT TO:` prefixes; every
//! other verb must be followed by end-of-line or whitespace. Recognition is
//! ASCII case-insensitive throughout.

use core::fmt::{self, Display, Formatter};

use crate::address;

/// Byte offset of the argument in a `MAIL FROM:` line.
const MAIL_FROM_PREFIX: usize = "MAIL FROM:".len();
/// Byte offset of the argument in a `RCPT TO:` line.
const RCPT_TO_PREFIX: usize = "RCPT TO:".len();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Ehlo,
    Helo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Vrfy,
    Expn,
    Help,
    Noop,
    Quit,
}

impl Display for Verb {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Ehlo => "EHLO",
            Self::Helo => "HELO",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy => "VRFY",
            Self::Expn => "EXPN",
            Self::Help => "HELP",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        })
    }
}

impl Verb {
    /// Recognizes the verb of a command line (without the trailing CRLF).
    /// Returns `None` for anything that should get `500 Command
    /// unrecognized.`.
    pub fn recognize(line: &[u8]) -> Option<Self> {
        if starts_with_ignore_case(line, b"MAIL FROM:") {
            return Some(Self::Mail);
        }
        if starts_with_ignore_case(line, b"RCPT TO:") {
            return Some(Self::Rcpt);
        }

        let verb = match line.get(..4)? {
            v if v.eq_ignore_ascii_case(b"EHLO") => Self::Ehlo,
            v if v.eq_ignore_ascii_case(b"HELO") => Self::Helo,
            v if v.eq_ignore_ascii_case(b"DATA") => Self::Data,
            v if v.eq_ignore_ascii_case(b"RSET") => Self::Rset,
            v if v.eq_ignore_ascii_case(b"VRFY") => Self::Vrfy,
            v if v.eq_ignore_ascii_case(b"EXPN") => Self::Expn,
            v if v.eq_ignore_ascii_case(b"HELP") => Self::Help,
            v if v.eq_ignore_ascii_case(b"NOOP") => Self::Noop,
            v if v.eq_ignore_ascii_case(b"QUIT") => Self::Quit,
            _ => return None,
        };

        // The verb must stand alone: "NOOPx" is not a command.
        match line.get(4) {
            None => Some(verb),
            Some(next) if next.is_ascii_whitespace() => Some(verb),
            Some(_) => None,
        }
    }
}

/// Extracts and validates the `<addr>` argument of a `MAIL FROM:` line.
pub fn parse_mail_path(line: &[u8]) -> Option<String> {
    bracketed_address(line.get(MAIL_FROM_PREFIX..)?)
}

/// Extracts and validates the `<addr>` argument of a `RCPT TO:` line.
pub fn parse_rcpt_path(line: &[u8]) -> Option<String> {
    bracketed_address(line.get(RCPT_TO_PREFIX..)?)
}

/// Returns `true` if anything other than whitespace follows the verb.
/// Only checked for the verbs that take no arguments at all.
pub fn has_parameters(line: &[u8]) -> bool {
    line.get(4..)
        .is_some_and(|rest| rest.iter().any(|byte| !byte.is_ascii_whitespace()))
}

fn bracketed_address(rest: &[u8]) -> Option<String> {
    let rest = rest.strip_prefix(b"<")?;
    let close = rest.iter().position(|&byte| byte == b'>')?;
    let addr = std::str::from_utf8(&rest[..close]).ok()?;
    address::is_valid(addr).then(|| addr.to_string())
}

fn starts_with_ignore_case(line: &[u8], prefix: &[u8]) -> bool {
    line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_verbs_case_insensitively() {
        assert_eq!(Verb::recognize(b"EHLO x"), Some(Verb::Ehlo));
        assert_eq!(Verb::recognize(b"ehlo x"), Some(Verb::Ehlo));
        assert_eq!(Verb::recognize(b"Noop"), Some(Verb::Noop));
        assert_eq!(Verb::recognize(b"quit"), Some(Verb::Quit));
        assert_eq!(Verb::recognize(b"rSeT"), Some(Verb::Rset));
        assert_eq!(Verb::recognize(b"mail from:<a@b.co>"), Some(Verb::Mail));
        assert_eq!(Verb::recognize(b"RCPT TO:<a@b.co>"), Some(Verb::Rcpt));
    }

    #[test]
    fn rejects_fused_or_partial_verbs() {
        assert_eq!(Verb::recognize(b"NOOPx"), None);
        assert_eq!(Verb::recognize(b"MAIL"), None);
        assert_eq!(Verb::recognize(b"MAILFROM:<a@b.co>"), None);
        assert_eq!(Verb::recognize(b"RCPT <a@b.co>"), None);
        assert_eq!(Verb::recognize(b"EH"), None);
        assert_eq!(Verb::recognize(b""), None);
        assert_eq!(Verb::recognize(b"FOO bar"), None);
    }

    #[test]
    fn parses_bracketed_addresses() {
        assert_eq!(
            parse_mail_path(b"MAIL FROM:<a@b.co>"),
            Some("a@b.co".to_string())
        );
        assert_eq!(
            parse_rcpt_path(b"RCPT TO:<user@example.com>"),
            Some("user@example.com".to_string())
        );
        // Text after the closing bracket is ignored.
        assert_eq!(
            parse_mail_path(b"MAIL FROM:<a@b.co> SIZE=1"),
            Some("a@b.co".to_string())
        );
    }

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(parse_mail_path(b"MAIL FROM:a@b.co"), None);
        assert_eq!(parse_mail_path(b"MAIL FROM: <a@b.co>"), None);
        assert_eq!(parse_mail_path(b"MAIL FROM:<a@b.co"), None);
        assert_eq!(parse_mail_path(b"MAIL FROM:<not-an-address>"), None);
        assert_eq!(parse_rcpt_path(b"RCPT TO:<a@b.c>"), None);
    }

    #[test]
    fn detects_trailing_parameters() {
        assert!(!has_parameters(b"DATA"));
        assert!(!has_parameters(b"RSET  "));
        assert!(has_parameters(b"QUIT now"));
        assert!(has_parameters(b"DATA x"));
    }
}
