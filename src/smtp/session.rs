//! The per-connection SMTP state machine.
//!
//! A session consumes raw bytes from the transport and produces replies.
//! Command handling follows the mail-transaction ordering of RFC 5321
//! (`MAIL`, then one or more `RCPT`, then `DATA`); the `Data` state streams
//! the payload into a spool file until the `<CRLF>.<CRLF>` terminator.

use std::sync::Arc;

use crate::{
    address,
    config::Config,
    envelope::Envelope,
    incoming, internal,
    smtp::{
        command::{self, Verb},
        reply::Reply,
    },
    spool::SpoolFile,
};

/// Upper bound on the message payload.
pub const MAX_MAIL_SIZE: u64 = 70 * 1024 * 1024;
/// Upper bound on a command line, excluding CRLF.
pub const MAX_CMDLINE_SIZE: usize = 512;

/// End-of-data marker.
const TERMINATOR: &[u8] = b"\r\n.\r\n";
/// Minimum buffered bytes before a mid-payload flush to disk. Four bytes are
/// always held back so a terminator straddling reads is never missed.
const FLUSH_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Prepare,
    Ready,
    Mail,
    Rcpt,
    Data,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    ConnectionKeepAlive,
    ConnectionClose,
}

pub struct Session {
    config: Arc<Config>,
    state: State,
    mail_from: String,
    mail_to: Vec<String>,
    spool: Option<SpoolFile>,
    recv_size: u64,
    max_mail_size: u64,
    buffer: Vec<u8>,
}

impl Session {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            state: State::default(),
            mail_from: String::new(),
            mail_to: Vec::new(),
            spool: None,
            recv_size: 0,
            max_mail_size: MAX_MAIL_SIZE,
            buffer: Vec::new(),
        }
    }

    /// Overrides the payload size cap.
    #[must_use]
    pub fn max_mail_size(mut self, limit: u64) -> Self {
        self.max_mail_size = limit;
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Feeds received bytes through the state machine, pushing any replies
    /// (in order) onto `replies`.
    pub fn receive(&mut self, input: &[u8], replies: &mut Vec<Reply>) -> anyhow::Result<Event> {
        self.buffer.extend_from_slice(input);

        loop {
            if self.state == State::Data {
                if !self.recv_data(replies)? {
                    return Ok(Event::ConnectionKeepAlive);
                }
                continue;
            }

            let Some(crlf) = find(&self.buffer, b"\r\n") else {
                return Ok(Event::ConnectionKeepAlive);
            };

            let line = self.buffer[..crlf].to_vec();
            self.buffer.drain(..crlf + 2);

            if crlf > MAX_CMDLINE_SIZE {
                replies.push(Reply::LineTooLong);
                continue;
            }

            let Some(verb) = Verb::recognize(&line) else {
                replies.push(Reply::Unrecognized);
                continue;
            };

            incoming!("{verb}");

            if matches!(verb, Verb::Data | Verb::Rset | Verb::Quit)
                && command::has_parameters(&line)
            {
                replies.push(Reply::NoParameters);
                continue;
            }

            match verb {
                Verb::Helo | Verb::Vrfy | Verb::Expn | Verb::Help => {
                    replies.push(Reply::NotImplemented);
                }
                Verb::Noop => replies.push(Reply::Ok),
                Verb::Ehlo | Verb::Rset => {
                    self.reset();
                    replies.push(Reply::Ok);
                }
                Verb::Quit => {
                    replies.push(Reply::Goodbye);
                    return Ok(Event::ConnectionClose);
                }
                Verb::Mail | Verb::Rcpt | Verb::Data => {
                    self.mail_transaction(verb, &line, replies)?;
                }
            }
        }
    }

    /// Clears the in-progress transaction. Dropping the spool file unlinks
    /// it from `tmp/`.
    fn reset(&mut self) {
        self.state = State::Ready;
        self.mail_from.clear();
        self.mail_to.clear();
        self.spool = None;
        self.recv_size = 0;
    }

    fn mail_transaction(
        &mut self,
        verb: Verb,
        line: &[u8],
        replies: &mut Vec<Reply>,
    ) -> anyhow::Result<()> {
        match self.state {
            State::Ready => {
                if verb != Verb::Mail {
                    replies.push(bad_sequence(self.state, verb));
                } else if let Some(addr) = command::parse_mail_path(line) {
                    self.mail_from = addr;
                    self.state = State::Mail;
                    replies.push(Reply::Ok);
                } else {
                    replies.push(Reply::SyntaxError);
                }
            }
            State::Mail => {
                if verb != Verb::Rcpt {
                    replies.push(bad_sequence(self.state, verb));
                } else if let Some(addr) = command::parse_rcpt_path(line) {
                    self.mail_to.push(addr);
                    self.state = State::Rcpt;
                    replies.push(Reply::Ok);
                } else {
                    replies.push(Reply::SyntaxError);
                }
            }
            State::Rcpt => match verb {
                Verb::Rcpt => {
                    if let Some(addr) = command::parse_rcpt_path(line) {
                        self.mail_to.push(addr);
                        replies.push(Reply::Ok);
                    } else {
                        replies.push(Reply::SyntaxError);
                    }
                }
                Verb::Data => {
                    replies.push(Reply::StartMailInput);
                    self.ready_recv_data()?;
                    self.state = State::Data;
                }
                _ => replies.push(bad_sequence(self.state, verb)),
            },
            State::Prepare => replies.push(bad_sequence(self.state, verb)),
            // Data-state bytes never reach command dispatch.
            State::Data => {}
        }

        Ok(())
    }

    /// Opens the spool file and writes the envelope header ahead of the
    /// message data.
    fn ready_recv_data(&mut self) -> anyhow::Result<()> {
        let header = Envelope::encode_header(&self.mail_from, &self.mail_to)?;
        let spool = SpoolFile::create(
            &self.config.tmp_dir,
            address::local_part(&self.mail_from),
            &header,
        )?;
        self.spool = Some(spool);
        self.recv_size = 0;
        Ok(())
    }

    /// Consumes buffered payload bytes. Returns `false` when more input is
    /// needed before any progress can be made.
    fn recv_data(&mut self, replies: &mut Vec<Reply>) -> anyhow::Result<bool> {
        if self.buffer.len() < TERMINATOR.len() {
            return Ok(false);
        }

        if let Some(end) = find(&self.buffer, TERMINATOR) {
            self.recv_size += end as u64;
            if self.recv_size > self.max_mail_size {
                self.reset();
                replies.push(Reply::TooMuchMailData);
            } else {
                if let Some(mut spool) = self.spool.take() {
                    spool.write(&self.buffer[..end])?;
                    let queued = spool.promote(&self.config.queue_dir)?;
                    internal!(
                        level = INFO,
                        "mail from <{}> queued as {}",
                        self.mail_from,
                        queued.display()
                    );
                }
                self.reset();
                replies.push(Reply::Ok);
            }
            self.buffer.drain(..end + TERMINATOR.len());
        } else {
            if self.buffer.len() < FLUSH_THRESHOLD {
                return Ok(false);
            }
            // Hold back the last 4 bytes in case they begin the terminator.
            let len = self.buffer.len() - (TERMINATOR.len() - 1);
            self.recv_size += len as u64;
            if self.recv_size <= self.max_mail_size {
                if let Some(spool) = self.spool.as_mut() {
                    spool.write(&self.buffer[..len])?;
                }
            }
            self.buffer.drain(..len);
        }

        Ok(true)
    }
}

/// Tells the client which step of the transaction it skipped. Before the
/// greeting exchange, that step is always HELO/EHLO.
const fn bad_sequence(state: State, verb: Verb) -> Reply {
    match (state, verb) {
        (State::Prepare, _) => Reply::SendHeloFirst,
        (_, Verb::Rcpt) => Reply::SendMailFirst,
        (_, Verb::Data) => Reply::SendRcptFirst,
        _ => Reply::SendHeloFirst,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
