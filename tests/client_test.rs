//! Outbound SMTP client behavior against a scripted destination server.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::SocketAddr;

use postern::relay::{ClientError, Email, MailSender, SmtpSender};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    task::JoinHandle,
};

/// A one-connection SMTP destination. Replies 550 to `RCPT TO:<{reject}>`
/// when a rejection is scripted, otherwise accepts everything. Returns every
/// line the client sent.
async fn mock_destination(reject: Option<&str>) -> (SocketAddr, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let reject = reject.map(|rcpt| format!("RCPT TO:<{rcpt}>"));

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("accept");
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut received = Vec::new();
        let mut in_payload = false;

        write.write_all(b"220 mock ready\r\n").await.expect("greet");

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                return received;
            }
            let line = line.trim_end().to_string();
            received.push(line.clone());

            if in_payload {
                if line == "." {
                    in_payload = false;
                    write.write_all(b"250 accepted\r\n").await.expect("reply");
                }
                continue;
            }

            let reply: &[u8] = if Some(&line) == reject.as_ref() {
                b"550 mailbox unavailable\r\n"
            } else if line == "DATA" {
                in_payload = true;
                b"354 go ahead\r\n"
            } else if line == "QUIT" {
                write.write_all(b"221 bye\r\n").await.expect("reply");
                return received;
            } else {
                b"250 OK\r\n"
            };
            write.write_all(reply).await.expect("reply");
        }
    });

    (addr, handle)
}

fn email() -> Email {
    Email {
        from: "a@b.co".to_string(),
        to: vec!["c@d.co".to_string()],
        headers: vec![
            ("From".to_string(), "a<a@b.co>".to_string()),
            ("To".to_string(), "c<c@d.co>".to_string()),
            ("Subject".to_string(), "hello".to_string()),
        ],
        data: b"hi".to_vec(),
    }
}

#[tokio::test]
async fn drives_a_complete_transaction() {
    let (addr, handle) = mock_destination(None).await;

    let sender = SmtpSender::new("relay.test");
    sender
        .send(addr.ip().to_string(), addr.port(), email())
        .await
        .expect("send");

    let received = handle.await.expect("mock server");
    assert_eq!(
        received,
        [
            "EHLO relay.test",
            "MAIL FROM:<a@b.co>",
            "RCPT TO:<c@d.co>",
            "DATA",
            "From: a<a@b.co>",
            "To: c<c@d.co>",
            "Subject: hello",
            "",
            "hi",
            ".",
            "QUIT",
        ]
    );
}

#[tokio::test]
async fn surfaces_recipient_rejection() {
    let (addr, _handle) = mock_destination(Some("c@d.co")).await;

    let sender = SmtpSender::new("relay.test");
    let err = sender
        .send(addr.ip().to_string(), addr.port(), email())
        .await
        .expect_err("rejection should fail the send");

    match err {
        ClientError::Rejected { command, code, .. } => {
            assert_eq!(command, "RCPT");
            assert_eq!(code, 550);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn refused_connection_is_an_error() {
    // Bind then drop to get a port with no listener.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let sender = SmtpSender::default();
    let err = sender
        .send(addr.ip().to_string(), addr.port(), email())
        .await
        .expect_err("connect should fail");
    assert!(matches!(err, ClientError::Io(_)), "{err:?}");
}
