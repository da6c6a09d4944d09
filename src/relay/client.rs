//! The outbound SMTP client used to hand a mail to a destination MX host.

use std::{future::Future, pin::Pin, time::Duration};

use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::{internal, relay::response::Response};

/// Initial read buffer size for server replies.
const BUFFER_SIZE: usize = 8192;
/// Cap on reply buffer growth.
const MAX_BUFFER_SIZE: usize = 64 * 1024;
/// Per-command reply deadline.
const REPLY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Timed out waiting for a reply")]
    Timeout,

    #[error("Malformed reply: {0}")]
    Malformed(String),

    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },
}

/// A fully composed outbound message: envelope plus synthesized headers.
#[derive(Debug, Clone, Default)]
pub struct Email {
    pub from: String,
    pub to: Vec<String>,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

/// Hands mail to a destination host. Implemented over real TCP by
/// [`SmtpSender`]; tests substitute their own.
pub trait MailSender: Send + Sync + std::fmt::Debug {
    fn send(
        &self,
        host: String,
        port: u16,
        email: Email,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>>;
}

/// The production sender: one plain-TCP SMTP transaction per call.
#[derive(Debug, Clone)]
pub struct SmtpSender {
    helo_name: String,
}

impl Default for SmtpSender {
    fn default() -> Self {
        Self {
            helo_name: "localhost".to_string(),
        }
    }
}

impl SmtpSender {
    pub fn new(helo_name: impl Into<String>) -> Self {
        Self {
            helo_name: helo_name.into(),
        }
    }

    async fn deliver(&self, host: &str, port: u16, email: &Email) -> Result<(), ClientError> {
        let mut client = Connection::open(host, port).await?;

        client.expect("greeting", 220).await?;
        client
            .command("EHLO", &format!("EHLO {}", self.helo_name), 250)
            .await?;
        client
            .command("MAIL", &format!("MAIL FROM:<{}>", email.from), 250)
            .await?;
        for rcpt in &email.to {
            client
                .command("RCPT", &format!("RCPT TO:<{rcpt}>"), 250)
                .await?;
        }
        client.command("DATA", "DATA", 354).await?;
        client.payload(email).await?;

        // Best-effort goodbye; the mail is already accepted.
        if let Err(err) = client.command("QUIT", "QUIT", 221).await {
            internal!("{host} rejected QUIT: {err}");
        }

        Ok(())
    }
}

impl MailSender for SmtpSender {
    fn send(
        &self,
        host: String,
        port: u16,
        email: Email,
    ) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move { self.deliver(&host, port, &email).await })
    }
}

struct Connection {
    stream: TcpStream,
    buffer: Vec<u8>,
    filled: usize,
}

impl Connection {
    async fn open(host: &str, port: u16) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self {
            stream,
            buffer: vec![0_u8; BUFFER_SIZE],
            filled: 0,
        })
    }

    /// Sends one command line and requires the reply code `expected`.
    async fn command(
        &mut self,
        name: &'static str,
        line: &str,
        expected: u16,
    ) -> Result<Response, ClientError> {
        self.stream.write_all(format!("{line}\r\n").as_bytes()).await?;
        self.expect(name, expected).await
    }

    /// Sends the message headers and data, terminated with `.`, and requires
    /// the final 250.
    async fn payload(&mut self, email: &Email) -> Result<Response, ClientError> {
        for (name, value) in &email.headers {
            self.stream
                .write_all(format!("{name}: {value}\r\n").as_bytes())
                .await?;
        }
        self.stream.write_all(b"\r\n").await?;
        self.stream.write_all(&email.data).await?;

        if !email.data.ends_with(b"\r\n") {
            self.stream.write_all(b"\r\n").await?;
        }
        self.stream.write_all(b".\r\n").await?;

        self.expect("DATA", 250).await
    }

    async fn expect(&mut self, command: &'static str, code: u16) -> Result<Response, ClientError> {
        let reply = self.read_reply().await?;
        if reply.code == code {
            Ok(reply)
        } else {
            Err(ClientError::Rejected {
                command,
                code: reply.code,
                message: reply.message(),
            })
        }
    }

    async fn read_reply(&mut self) -> Result<Response, ClientError> {
        loop {
            if let Some((reply, consumed)) = Response::parse(&self.buffer[..self.filled])? {
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;
                return Ok(reply);
            }

            if self.filled >= self.buffer.len() {
                let grown = self.buffer.len() * 2;
                if grown > MAX_BUFFER_SIZE {
                    return Err(ClientError::Malformed(format!(
                        "reply exceeds {MAX_BUFFER_SIZE} bytes"
                    )));
                }
                self.buffer.resize(grown, 0);
            }

            let read = tokio::time::timeout(
                REPLY_TIMEOUT,
                self.stream.read(&mut self.buffer[self.filled..]),
            )
            .await
            .map_err(|_| ClientError::Timeout)??;
            if read == 0 {
                return Err(ClientError::ConnectionClosed);
            }
            self.filled += read;
        }
    }
}
