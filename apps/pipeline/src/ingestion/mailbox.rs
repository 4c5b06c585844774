//! Mailbox access. Only unread messages are fetched, and the `\Seen` flag is
//! set explicitly once a message reached a terminal outcome.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("IMAP connection failed: {0}")]
    Connect(String),

    #[error("IMAP login failed: {0}")]
    Login(String),

    #[error("IMAP error: {0}")]
    Imap(#[from] imap::Error),

    #[error("mailbox task failed: {0}")]
    Task(String),
}

/// One unread message, addressed by its IMAP UID.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub uid: u32,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Mailbox: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<RawMessage>, MailboxError>;

    async fn mark_seen(&self, uids: &[u32]) -> Result<(), MailboxError>;
}

#[derive(Debug, Clone)]
pub struct ImapSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub tls: bool,
}

enum Op {
    FetchUnread,
    MarkSeen(Vec<u32>),
}

/// IMAP over native-tls (or plain TCP). Every call opens its own session on
/// the blocking pool; the `imap` crate is synchronous.
#[derive(Clone)]
pub struct ImapMailbox {
    settings: ImapSettings,
}

impl ImapMailbox {
    pub fn new(settings: ImapSettings) -> Self {
        Self { settings }
    }

    async fn run(&self, op: Op) -> Result<Vec<RawMessage>, MailboxError> {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || run_blocking(&settings, op))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unread(&self) -> Result<Vec<RawMessage>, MailboxError> {
        self.run(Op::FetchUnread).await
    }

    async fn mark_seen(&self, uids: &[u32]) -> Result<(), MailboxError> {
        if uids.is_empty() {
            return Ok(());
        }
        self.run(Op::MarkSeen(uids.to_vec())).await.map(|_| ())
    }
}

fn run_blocking(settings: &ImapSettings, op: Op) -> Result<Vec<RawMessage>, MailboxError> {
    let tcp = TcpStream::connect((settings.host.as_str(), settings.port))
        .map_err(|e| MailboxError::Connect(format!("{}:{}: {e}", settings.host, settings.port)))?;
    tcp.set_read_timeout(Some(IO_TIMEOUT))
        .and_then(|_| tcp.set_write_timeout(Some(IO_TIMEOUT)))
        .map_err(|e| MailboxError::Connect(e.to_string()))?;

    if settings.tls {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| MailboxError::Connect(e.to_string()))?;
        let stream = tls
            .connect(&settings.host, tcp)
            .map_err(|e| MailboxError::Connect(e.to_string()))?;
        with_session(stream, settings, op)
    } else {
        with_session(tcp, settings, op)
    }
}

fn with_session<S: Read + Write>(
    stream: S,
    settings: &ImapSettings,
    op: Op,
) -> Result<Vec<RawMessage>, MailboxError> {
    let mut client = imap::Client::new(stream);
    client.read_greeting()?;
    let mut session = client
        .login(&settings.user, &settings.password)
        .map_err(|e| MailboxError::Login(e.0.to_string()))?;
    session.select("INBOX")?;

    let result = match op {
        Op::FetchUnread => fetch_unread(&mut session),
        Op::MarkSeen(uids) => mark_seen(&mut session, &uids).map(|_| Vec::new()),
    };

    if let Err(e) = session.logout() {
        debug!("IMAP logout failed: {e}");
    }
    result
}

fn fetch_unread<S: Read + Write>(
    session: &mut imap::Session<S>,
) -> Result<Vec<RawMessage>, MailboxError> {
    let mut uids: Vec<u32> = session.uid_search("UNSEEN")?.into_iter().collect();
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    uids.sort_unstable();
    info!("Found {} unread message(s)", uids.len());

    // PEEK leaves \Seen untouched until processing finishes.
    let fetched = session.uid_fetch(uid_set(&uids), "(UID BODY.PEEK[])")?;
    let mut messages: Vec<RawMessage> = fetched
        .iter()
        .filter_map(|f| {
            let uid = f.uid?;
            let body = f.body()?;
            Some(RawMessage {
                uid,
                bytes: body.to_vec(),
            })
        })
        .collect();
    messages.sort_by_key(|m| m.uid);
    Ok(messages)
}

fn mark_seen<S: Read + Write>(
    session: &mut imap::Session<S>,
    uids: &[u32],
) -> Result<(), MailboxError> {
    session.uid_store(uid_set(uids), "+FLAGS (\\Seen)")?;
    debug!("Marked {} message(s) seen", uids.len());
    Ok(())
}

fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
