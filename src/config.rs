use std::{
    fs,
    io,
    os::unix::fs::DirBuilderExt,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Mode for the created mail directories.
const DIR_MODE: u32 = 0o744;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid value {value:?} for key {key:?}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("Unable to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// Process-wide configuration, immutable after startup.
///
/// The four mail subdirectories are always derived from `mail_dir`:
/// `queue/` holds accepted mails awaiting relay, `sent/` and `fail/` hold
/// terminal outcomes, and `tmp/` holds in-progress DATA payloads.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub mail_dir: PathBuf,
    pub queue_dir: PathBuf,
    pub sent_dir: PathBuf,
    pub fail_dir: PathBuf,
    pub tmp_dir: PathBuf,
}

impl Config {
    /// Loads the line-oriented `key value` configuration file.
    ///
    /// Blank lines and lines starting with `#` are ignored, keys are matched
    /// case-insensitively, and a trailing slash on `mail-dir` is stripped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut port = None;
        let mut mail_dir = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut parts = line.split_whitespace();
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };

            if key.eq_ignore_ascii_case("listen-port") {
                port = Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?);
            } else if key.eq_ignore_ascii_case("mail-dir") {
                mail_dir = Some(value.strip_suffix('/').unwrap_or(value).to_string());
            }
        }

        let port = port.ok_or(ConfigError::MissingKey("listen-port"))?;
        let mail_dir = mail_dir.ok_or(ConfigError::MissingKey("mail-dir"))?;

        Ok(Self::from_parts(port, mail_dir))
    }

    /// Builds a configuration from a port and mail directory, deriving the
    /// four subdirectory paths.
    pub fn from_parts(port: u16, mail_dir: impl Into<PathBuf>) -> Self {
        let mail_dir = mail_dir.into();
        Self {
            port,
            queue_dir: mail_dir.join("queue"),
            sent_dir: mail_dir.join("sent"),
            fail_dir: mail_dir.join("fail"),
            tmp_dir: mail_dir.join("tmp"),
            mail_dir,
        }
    }

    /// Creates the mail directory tree (idempotent, mode 0744).
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [
            &self.mail_dir,
            &self.queue_dir,
            &self.sent_dir,
            &self.fail_dir,
            &self.tmp_dir,
        ] {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(DIR_MODE)
                .create(dir)
                .map_err(|source| ConfigError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }

        Ok(())
    }
}
