//! Per-mail relay fan-out.
//!
//! One [`RelayMail`] exists for every queue file under active relay. Its
//! recipients are grouped by destination domain into [`RelayTask`]s; each
//! task keeps exactly one SMTP attempt in flight. The service polls tasks
//! for completion and files the mail into `sent/` or `fail/` once every
//! task is terminal.

use std::{
    collections::{HashMap, VecDeque},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::task::JoinHandle;

use crate::{
    address,
    config::Config,
    envelope::Envelope,
    internal,
    relay::{
        client::{ClientError, Email, MailSender},
        dns::MxResolver,
    },
};

/// Destination port for relayed mail.
const SMTP_PORT: u16 = 25;

#[derive(Debug)]
struct RelayTask {
    host: String,
    recipients: Vec<String>,
    mx_list: VecDeque<String>,
    current_mx: String,
    pending: Option<JoinHandle<Result<(), ClientError>>>,
}

impl RelayTask {
    fn new(host: String) -> Self {
        Self {
            host,
            recipients: Vec::new(),
            mx_list: VecDeque::new(),
            current_mx: String::new(),
            pending: None,
        }
    }
}

#[derive(Debug)]
pub struct RelayMail {
    /// Basename of the queue file, preserved across the terminal rename.
    raw_filename: String,
    /// Full path of the queue file.
    filename: PathBuf,
    envelope: Envelope,
    tasks: HashMap<String, RelayTask>,
    failed: bool,
}

impl RelayMail {
    /// Reads and parses a queue file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw_filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let envelope = Envelope::decode(&std::fs::read(path)?)?;

        Ok(Self {
            raw_filename,
            filename: path.to_path_buf(),
            envelope,
            tasks: HashMap::new(),
            failed: false,
        })
    }

    /// Groups recipients by destination domain and seeds each task's MX
    /// candidate list. A domain with no MX records falls back to the domain
    /// itself.
    pub async fn build(&mut self, resolver: &dyn MxResolver) {
        for rcpt in &self.envelope.to {
            let host = address::domain(rcpt).to_string();
            self.tasks
                .entry(host.clone())
                .or_insert_with(|| RelayTask::new(host))
                .recipients
                .push(rcpt.clone());
        }

        for task in self.tasks.values_mut() {
            let mut mx_list: VecDeque<String> = resolver.mx(task.host.clone()).await.into();
            if mx_list.is_empty() {
                mx_list.push_back(task.host.clone());
            }
            task.mx_list = mx_list;
        }
    }

    /// Starts one send per task.
    pub fn start(&mut self, sender: &Arc<dyn MailSender>) {
        for task in self.tasks.values_mut() {
            // The fallback in build() guarantees at least one candidate.
            let Some(mx) = task.mx_list.pop_front() else {
                continue;
            };
            task.current_mx.clone_from(&mx);

            let email = compose(&self.envelope, &task.recipients);
            let sender = Arc::clone(sender);
            task.pending = Some(tokio::spawn(async move {
                sender.send(mx, SMTP_PORT, email).await
            }));
        }
    }

    /// Observes completed sends and drops their tasks. Returns `true` once
    /// every task is terminal.
    pub async fn tick(&mut self) -> bool {
        let ready: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, task)| {
                task.pending
                    .as_ref()
                    .is_none_or(JoinHandle::is_finished)
            })
            .map(|(host, _)| host.clone())
            .collect();

        for host in ready {
            let Some(mut task) = self.tasks.remove(&host) else {
                continue;
            };
            let Some(pending) = task.pending.take() else {
                continue;
            };

            match pending.await {
                Ok(Ok(())) => {
                    internal!(
                        "mail ({}) handed to {} for {host}",
                        self.raw_filename,
                        task.current_mx
                    );
                }
                Ok(Err(err)) => {
                    internal!(
                        level = ERROR,
                        "(relay): mail <{}> failed to <{}>: {err}",
                        self.filename.display(),
                        task.current_mx
                    );
                    self.failed = true;
                }
                Err(err) => {
                    internal!(
                        level = ERROR,
                        "(relay): mail <{}> send task died: {err}",
                        self.filename.display()
                    );
                    self.failed = true;
                }
            }
        }

        self.tasks.is_empty()
    }

    /// Moves the queue file to its terminal directory, preserving the
    /// original basename.
    pub fn finish(self, config: &Config) -> io::Result<PathBuf> {
        let dir = if self.failed {
            &config.fail_dir
        } else {
            &config.sent_dir
        };
        let target = dir.join(&self.raw_filename);
        std::fs::rename(&self.filename, &target)?;

        if self.failed {
            internal!(level = ERROR, "relay mail ({}) failed", self.raw_filename);
        } else {
            internal!(
                level = INFO,
                "relay mail ({}) successfully",
                self.raw_filename
            );
        }

        Ok(target)
    }
}

/// Synthesizes the outbound message: `From`/`To` display headers and the
/// placeholder `Subject`, with the recipient list narrowed to one task.
fn compose(envelope: &Envelope, recipients: &[String]) -> Email {
    let display = |addr: &String| format!("{}<{}>", address::local_part(addr), addr);

    Email {
        from: envelope.from.clone(),
        to: recipients.to_vec(),
        headers: vec![
            (
                "From".to_string(),
                format!("{}<{}>", address::local_part(&envelope.from), envelope.from),
            ),
            (
                "To".to_string(),
                recipients.iter().map(display).collect::<Vec<_>>().join(","),
            ),
            ("Subject".to_string(), "hello".to_string()),
        ],
        data: envelope.data.clone(),
    }
}
