//! One inbound SMTP session: greeting, command loop, data phase, delivery.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use chrono::Utc;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::warn;
use ulid::Ulid;

use mailferry_common::{address::EmailAddress, incoming, internal, outgoing, status::Status};

use super::Shared;
use super::mailbox::ReceivedMessage;
use super::state::SessionStage;
use crate::command::Command;

/// Idle limit while waiting for the next line from the peer.
const LINE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),
}

pub(super) struct Session<Stream: AsyncRead + AsyncWrite + Send> {
    reader: BufReader<ReadHalf<Stream>>,
    writer: WriteHalf<Stream>,
    peer: SocketAddr,
    shared: Arc<Shared>,
    stage: SessionStage,
    sender: Option<EmailAddress>,
    recipients: Vec<EmailAddress>,
    data: Vec<u8>,
}

/// What the command loop should do after handling one line.
#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

impl<Stream: AsyncRead + AsyncWrite + Send> Session<Stream> {
    pub(super) fn new(stream: Stream, peer: SocketAddr, shared: Arc<Shared>) -> Self {
        let (read, writer) = tokio::io::split(stream);

        Self {
            reader: BufReader::new(read),
            writer,
            peer,
            shared,
            stage: SessionStage::default(),
            sender: None,
            recipients: Vec::new(),
            data: Vec::new(),
        }
    }

    pub(super) async fn run(mut self) -> Result<(), SessionError> {
        internal!("connected: {}", self.peer);

        self.reply_line(&format!(
            "{} {} SMTP service ready",
            Status::ServiceReady,
            self.shared.banner
        ))
        .await?;

        let mut line = Vec::new();
        loop {
            line.clear();

            let read = tokio::time::timeout(LINE_TIMEOUT, self.reader.read_until(b'\n', &mut line))
                .await;
            let Ok(read) = read else {
                warn!(peer = %self.peer, "session idle too long, closing");
                self.reply(Status::Unavailable, "idle timeout, closing connection")
                    .await?;
                return Ok(());
            };

            if read? == 0 {
                internal!("connection closed by {}", self.peer);
                return Ok(());
            }

            let trimmed = trim_line_ending(&line);

            let flow = if self.stage == SessionStage::Data {
                self.on_data_line(trimmed).await?
            } else {
                self.on_command_line(trimmed).await?
            };

            if flow == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn on_command_line(&mut self, raw: &[u8]) -> Result<Flow, SessionError> {
        let Ok(text) = std::str::from_utf8(raw) else {
            self.reply(Status::CommandUnrecognized, "command not recognized")
                .await?;
            return Ok(Flow::Continue);
        };

        let command = Command::parse(text);
        incoming!("{command}");

        match command {
            Command::Quit => {
                self.reply(Status::GoodBye, "bye").await?;
                return Ok(Flow::Close);
            }
            Command::Malformed { verb, reason } => {
                self.reply(
                    Status::SyntaxError,
                    &format!("invalid {verb} argument: {reason}"),
                )
                .await?;
            }
            Command::Unrecognized(_) => {
                self.reply(Status::CommandUnrecognized, "command not recognized")
                    .await?;
            }
            command => match self.stage.accept(&command) {
                // Out of sequence: answer 503, state and buffers untouched.
                None => {
                    self.reply(Status::InvalidCommandSequence, "bad sequence of commands")
                        .await?;
                }
                Some(next) => {
                    self.apply(command, next).await?;
                }
            },
        }

        Ok(Flow::Continue)
    }

    /// Applies an in-sequence command: side effects, reply, then the stage
    /// transition.
    async fn apply(&mut self, command: Command, next: SessionStage) -> Result<(), SessionError> {
        match command {
            Command::Ehlo(host) | Command::Helo(host) => {
                self.reset_transaction();
                let banner = self.shared.banner.clone();
                self.reply_line(&format!("250-{banner} greets {host}")).await?;
                self.reply_line(&format!("250-SIZE {}", self.shared.max_message_size))
                    .await?;
                self.reply_line("250-8BITMIME").await?;
                self.reply_line("250 HELP").await?;
            }
            Command::MailFrom(address) => {
                self.sender = Some(address);
                self.reply(Status::Ok, "ok").await?;
            }
            Command::RcptTo(address) => {
                self.recipients.push(address);
                self.reply(Status::Ok, "ok").await?;
            }
            Command::Data => {
                self.reply(
                    Status::StartMailInput,
                    "start mail input; end with <CRLF>.<CRLF>",
                )
                .await?;
            }
            Command::Rset => {
                self.reset_transaction();
                self.reply(Status::Ok, "ok").await?;
            }
            // Handled before the transition table.
            Command::Quit | Command::Malformed { .. } | Command::Unrecognized(_) => {}
        }

        self.stage = next;
        Ok(())
    }

    async fn on_data_line(&mut self, line: &[u8]) -> Result<Flow, SessionError> {
        if line == b"." {
            self.finish_data().await?;
            return Ok(Flow::Continue);
        }

        // Un-escape dot-stuffing: a line starting with ".." was ".…".
        let line = if line.starts_with(b"..") { &line[1..] } else { line };

        if self.shared.max_message_size > 0
            && self.data.len() + line.len() + 2 > self.shared.max_message_size
        {
            warn!(peer = %self.peer, "message exceeds size limit, rejecting");
            self.reply(Status::ExceededStorage, "message exceeds maximum size")
                .await?;
            self.reset_transaction();
            self.stage = SessionStage::Ready;
            return Ok(Flow::Continue);
        }

        self.data.extend_from_slice(line);
        self.data.extend_from_slice(b"\r\n");
        Ok(Flow::Continue)
    }

    /// End-of-data: parse the accumulated message, file one copy per
    /// recipient, acknowledge, and reset for the next transaction.
    async fn finish_data(&mut self) -> Result<(), SessionError> {
        let raw = std::mem::take(&mut self.data);
        let (headers, body) = split_message(&raw);

        let message = ReceivedMessage {
            id: Ulid::new().to_string(),
            received_at: Utc::now(),
            sender: self.sender.as_ref().map(ToString::to_string),
            recipients: self.recipients.iter().map(ToString::to_string).collect(),
            headers,
            body,
            raw,
            peer: self.peer.ip().to_string(),
        };

        internal!(
            level = DEBUG,
            "message {} accepted for {} recipient(s)",
            message.id,
            message.recipients.len()
        );

        self.shared.store.deliver(message);
        self.reset_transaction();
        self.stage = SessionStage::Ready;
        self.reply(Status::Ok, "ok message accepted").await
    }

    fn reset_transaction(&mut self) {
        self.sender = None;
        self.recipients.clear();
        self.data.clear();
    }

    async fn reply(&mut self, status: Status, text: &str) -> Result<(), SessionError> {
        self.reply_line(&format!("{status} {text}")).await
    }

    async fn reply_line(&mut self, line: &str) -> Result<(), SessionError> {
        outgoing!("{line}");
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await?;
        Ok(())
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Splits a raw message at the first blank line into parsed header fields
/// and the body text. An unparsable header block degrades to an empty
/// header list with the whole message as body.
fn split_message(raw: &[u8]) -> (Vec<(String, String)>, String) {
    match mailparse::parse_headers(raw) {
        Ok((headers, body_offset)) => (
            headers
                .into_iter()
                .map(|header| (header.get_key(), header.get_value()))
                .collect(),
            String::from_utf8_lossy(&raw[body_offset..]).into_owned(),
        ),
        Err(err) => {
            warn!(error = %err, "unparsable message headers, storing verbatim");
            (Vec::new(), String::from_utf8_lossy(raw).into_owned())
        }
    }
}
