use core::fmt::{self, Display, Formatter};

/// The fixed reply lines this server sends. Each is written to the wire as
/// `text + CRLF`; the greeting is formatted separately since it carries the
/// listener address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Goodbye,
    StartMailInput,
    LineTooLong,
    Unrecognized,
    NoParameters,
    SyntaxError,
    NotImplemented,
    SendHeloFirst,
    SendMailFirst,
    SendRcptFirst,
    TooMuchMailData,
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Ok => "250 OK",
            Self::Goodbye => "221 Service closing transmission channel",
            Self::StartMailInput => "354 Start mail input; end with <CRLF>.<CRLF>",
            Self::LineTooLong => "500 Command line too long.",
            Self::Unrecognized => "500 Command unrecognized.",
            Self::NoParameters => "501 Command not accept parameters.",
            Self::SyntaxError => "501 Syntax error in arguments.",
            Self::NotImplemented => "502 Command not implemented.",
            Self::SendHeloFirst => "503 Send command HELO/EHLO first.",
            Self::SendMailFirst => "503 Send command MAIL first.",
            Self::SendRcptFirst => "503 Send command RCPT first.",
            Self::TooMuchMailData => "552 Too much mail data",
        })
    }
}
