//! The relay service.
//!
//! Runs on its own loop, owns the map of in-flight mails, and talks to the
//! inbound side only through the filesystem: a queue file appearing in
//! `queue/` is the handoff, and the rename into `sent/` or `fail/` is the
//! terminal signal.

pub mod client;
pub mod dns;
pub mod mail;
pub mod response;

pub use client::{ClientError, Email, MailSender, SmtpSender};
pub use dns::{MxLookup, MxResolver};
pub use mail::RelayMail;

use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use crate::{config::Config, internal};

const SCAN_INTERVAL: Duration = Duration::from_millis(1000);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

pub struct Relay {
    config: Arc<Config>,
    resolver: Arc<dyn MxResolver>,
    sender: Arc<dyn MailSender>,
    /// In-flight mails keyed by queue path. Membership here is the sole
    /// source of truth for "already being relayed".
    active: HashMap<PathBuf, RelayMail>,
}

impl Relay {
    pub fn new(
        config: Arc<Config>,
        resolver: Arc<dyn MxResolver>,
        sender: Arc<dyn MailSender>,
    ) -> Self {
        Self {
            config,
            resolver,
            sender,
            active: HashMap::new(),
        }
    }

    /// Runs the queue scanner and the task-progress ticks forever.
    pub async fn serve(mut self) -> anyhow::Result<()> {
        internal!(level = INFO, "relay service started");

        let mut scan = tokio::time::interval(SCAN_INTERVAL);
        let mut progress = tokio::time::interval(PROGRESS_INTERVAL);

        loop {
            tokio::select! {
                _ = scan.tick() => self.scan().await,
                _ = progress.tick() => self.progress().await,
            }
        }
    }

    /// One pass over `queue/`: every file not already in the active map is
    /// claimed and its relay started. Enumeration errors are logged and the
    /// pass is retried on the next interval.
    pub async fn scan(&mut self) {
        let entries = match std::fs::read_dir(&self.config.queue_dir) {
            Ok(entries) => entries,
            Err(err) => {
                internal!(
                    level = ERROR,
                    "unable to read {}: {err}",
                    self.config.queue_dir.display()
                );
                return;
            }
        };

        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if self.active.contains_key(&path) {
                // Relaying...
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            internal!(level = INFO, "ready to relay mail ({name})");

            match RelayMail::load(&path) {
                Ok(mut mail) => {
                    mail.build(self.resolver.as_ref()).await;
                    mail.start(&self.sender);
                    self.active.insert(path, mail);
                }
                Err(err) => {
                    internal!(level = ERROR, "unable to load queued mail {name}: {err}");
                    let target = self.config.fail_dir.join(&name);
                    if let Err(err) = std::fs::rename(&path, &target) {
                        internal!(level = ERROR, "unable to move {name} to fail: {err}");
                    }
                }
            }
        }
    }

    /// One progress pass: poll every active mail's tasks and file finished
    /// mails into their terminal directory.
    pub async fn progress(&mut self) {
        let mut done = Vec::new();
        for (path, mail) in &mut self.active {
            if mail.tick().await {
                done.push(path.clone());
            }
        }

        for path in done {
            if let Some(mail) = self.active.remove(&path) {
                if let Err(err) = mail.finish(&self.config) {
                    internal!(
                        level = ERROR,
                        "unable to move relayed mail {}: {err}",
                        path.display()
                    );
                }
            }
        }
    }

    /// Number of mails currently being relayed.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }
}
