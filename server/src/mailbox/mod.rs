//! IMAP mailbox adapter: the on-demand trigger path (`SPEC_FULL.md` §6,
//! grounded in `original_source/tarxiv/alerts.py`'s `IMAP` class).
//!
//! The original spawns a background thread with an internal queue; here the
//! blocking `imap` session runs inside `spawn_blocking` and forwards primary
//! names directly over an `mpsc` channel for the caller to feed into
//! `Fusion::build_object`.

mod parse;

use std::net::TcpStream;
use std::time::Duration;

use imap::Session;
use native_tls::TlsStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use parse::extract_names;

use crate::error::AdapterError;

#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub server: String,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub allowed_senders: Vec<String>,
    pub polling_interval: Duration,
}

type ImapSession = Session<TlsStream<TcpStream>>;

fn connect(config: &MailboxConfig) -> Result<ImapSession, AdapterError> {
    let transport_err = |source: anyhow::Error| AdapterError::Transport { survey: "imap".into(), source };
    let tls = native_tls::TlsConnector::new().map_err(|e| transport_err(e.into()))?;
    let client = imap::connect((config.server.as_str(), 993), &config.server, &tls)
        .map_err(|e| transport_err(e.into()))?;
    let mut session = client
        .login(&config.username, &config.password)
        .map_err(|(e, _)| transport_err(e.into()))?;
    session.select(&config.mailbox).map_err(|e| transport_err(e.into()))?;
    Ok(session)
}

/// Poll the mailbox on `config.polling_interval` until `token` cancels,
/// forwarding every extracted primary name onto `sink`. Runs its blocking
/// IMAP session inside `spawn_blocking`; reconnects on transport abort
/// (`IMAP4.abort`/`IMAP4.error` in the original, here any `imap::Error`).
pub async fn run(config: MailboxConfig, sink: mpsc::Sender<String>, token: CancellationToken) -> Result<(), AdapterError> {
    let task_token = token.clone();
    tokio::task::spawn_blocking(move || poll_loop(&config, &sink, &task_token))
        .await
        .map_err(|e| AdapterError::Transport { survey: "imap".into(), source: e.into() })?
}

fn poll_loop(config: &MailboxConfig, sink: &mpsc::Sender<String>, token: &CancellationToken) -> Result<(), AdapterError> {
    let mut session = connect(config)?;
    info!(status = "imap_connected", "imap session connected");

    while !token.is_cancelled() {
        match poll_once(&mut session, config, sink) {
            Ok(()) => {}
            Err(AdapterError::Transport { source, .. }) => {
                warn!(status = "imap_transport_error", error = %source, "imap transport error, reconnecting");
                match connect(config) {
                    Ok(fresh) => session = fresh,
                    Err(e) => {
                        error!(status = "imap_reconnect_failed", error = %e, "imap reconnection failed, stopping poller");
                        return Err(e);
                    }
                }
            }
            Err(e) => error!(status = "imap_poller_error", error = %e, "unexpected imap poller error"),
        }
        std::thread::sleep(config.polling_interval);
    }

    let _ = session.logout();
    Ok(())
}

fn poll_once(session: &mut ImapSession, config: &MailboxConfig, sink: &mpsc::Sender<String>) -> Result<(), AdapterError> {
    let transport_err = |source: anyhow::Error| AdapterError::Transport { survey: "imap".into(), source };

    let uids = session.uid_search("UNSEEN").map_err(|e| transport_err(e.into()))?;
    for uid in uids {
        let messages = session.uid_fetch(uid.to_string(), "BODY.PEEK[]").map_err(|e| transport_err(e.into()))?;
        let Some(message) = messages.iter().next() else { continue };
        let Some(body) = message.body() else { continue };

        let names = match extract_names(body, &config.allowed_senders) {
            Ok(names) => names,
            Err(e) => {
                warn!(status = "mailbox_parse_failed", uid, error = %e, "failed to parse mailbox message, leaving unread");
                continue;
            }
        };

        if names.is_empty() {
            continue;
        }

        for name in &names {
            if sink.blocking_send(name.clone()).is_err() {
                warn!(status = "mailbox_sink_closed", "mailbox sink closed, dropping remaining names");
                return Ok(());
            }
        }

        session
            .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
            .map_err(|e| transport_err(e.into()))?;
    }
    Ok(())
}
