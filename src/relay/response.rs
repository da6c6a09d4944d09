//! Reply parsing for the outbound SMTP client.

use crate::relay::client::ClientError;

/// A complete (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    /// Returns `true` for a 2xx completion reply.
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// All reply lines joined for logging and error messages.
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Parses one complete reply from the front of `buffer`, returning it
    /// together with the number of bytes consumed, or `None` if the buffer
    /// does not yet hold a full reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, ClientError> {
        let mut consumed = 0;
        let mut lines = Vec::new();
        let mut code = None;

        loop {
            let rest = &buffer[consumed..];
            let Some(eol) = rest.windows(2).position(|window| window == b"\r\n") else {
                return Ok(None);
            };

            let line = std::str::from_utf8(&rest[..eol])
                .map_err(|_| ClientError::Malformed("reply is not valid UTF-8".to_string()))?;
            if line.len() < 3 {
                return Err(ClientError::Malformed(line.to_string()));
            }

            let line_code: u16 = line[..3]
                .parse()
                .map_err(|_| ClientError::Malformed(line.to_string()))?;
            match code {
                None => code = Some(line_code),
                Some(first) if first != line_code => {
                    return Err(ClientError::Malformed(format!(
                        "status code changed mid-reply: {first} then {line_code}"
                    )));
                }
                Some(_) => {}
            }

            let (last, text) = match line.as_bytes().get(3) {
                None => (true, ""),
                Some(b' ') => (true, &line[4..]),
                Some(b'-') => (false, &line[4..]),
                Some(_) => return Err(ClientError::Malformed(line.to_string())),
            };

            lines.push(text.to_string());
            consumed += eol + 2;

            if last {
                return Ok(Some((Self { code: line_code, lines }, consumed)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_line_reply() {
        let (reply, consumed) = Response::parse(b"250 OK\r\n").unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, ["OK"]);
        assert_eq!(consumed, 8);
        assert!(reply.is_success());
    }

    #[test]
    fn parses_a_multi_line_reply() {
        let input = b"250-mail.example.com\r\n250-SIZE 10000000\r\n250 HELP\r\n";
        let (reply, consumed) = Response::parse(input).unwrap().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines, ["mail.example.com", "SIZE 10000000", "HELP"]);
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn waits_for_a_complete_reply() {
        assert_eq!(Response::parse(b"").unwrap(), None);
        assert_eq!(Response::parse(b"250 O").unwrap(), None);
        assert_eq!(Response::parse(b"250-first\r\n250 seco").unwrap(), None);
    }

    #[test]
    fn leaves_trailing_bytes_unconsumed() {
        let (reply, consumed) = Response::parse(b"354 go ahead\r\n250 next\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(reply.code, 354);
        assert_eq!(consumed, 14);
    }

    #[test]
    fn rejects_malformed_replies() {
        assert!(Response::parse(b"2x0 nope\r\n").is_err());
        assert!(Response::parse(b"25\r\n").is_err());
        assert!(Response::parse(b"250_text\r\n").is_err());
        assert!(Response::parse(b"250-a\r\n354 b\r\n").is_err());
    }
}
