//! The inbound TCP acceptor.
//!
//! One task per connection; all session state lives inside that task, so no
//! synchronization is needed. A connection that stays silent for 30 seconds
//! is closed without a reply.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

use crate::{
    config::Config,
    internal, outgoing,
    smtp::session::{Event, Session},
};

const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Server {
    config: Arc<Config>,
}

impl Server {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Binds the configured port and accepts connections until an accept
    /// error occurs.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        self.serve_with(listener).await
    }

    /// Accepts connections on an already-bound listener.
    pub async fn serve_with(&self, listener: TcpListener) -> anyhow::Result<()> {
        let local = listener.local_addr()?;
        internal!(level = INFO, "smtp service ready on {local}");

        loop {
            let (stream, peer) = listener.accept().await?;
            let config = Arc::clone(&self.config);

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, peer, local, config).await {
                    internal!(level = ERROR, "session with {peer} failed: {err}");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    local: SocketAddr,
    config: Arc<Config>,
) -> anyhow::Result<()> {
    internal!("connected to {peer}");

    let greeting = format!("220 {local} Simple Mail Transfer Service Ready");
    outgoing!("{greeting}");
    stream.write_all(format!("{greeting}\r\n").as_bytes()).await?;

    let mut session = Session::new(config);
    let mut chunk = [0_u8; 4096];
    let mut replies = Vec::new();

    loop {
        let read = match timeout(IDLE_TIMEOUT, stream.read(&mut chunk)).await {
            Ok(read) => read?,
            Err(_elapsed) => {
                internal!("closing idle connection from {peer}");
                return Ok(());
            }
        };

        if read == 0 {
            internal!("connection closed by {peer}");
            return Ok(());
        }

        replies.clear();
        let event = session.receive(&chunk[..read], &mut replies)?;

        for reply in &replies {
            outgoing!("{reply}");
            stream.write_all(format!("{reply}\r\n").as_bytes()).await?;
        }

        if event == Event::ConnectionClose {
            return Ok(());
        }
    }
}
