//! Per-recipient mailbox storage for received messages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// The folder every accepted message lands in.
pub const INBOX: &str = "inbox";

/// One message accepted by the inbound listener.
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedMessage {
    pub id: String,
    pub received_at: DateTime<Utc>,
    /// Envelope sender, if the peer supplied one.
    pub sender: Option<String>,
    /// Envelope recipients.
    pub recipients: Vec<String>,
    /// Parsed header fields in message order.
    pub headers: Vec<(String, String)>,
    /// Message body, after the first blank line.
    pub body: String,
    /// The complete message as received, after dot-unstuffing.
    pub raw: Vec<u8>,
    /// IP address of the delivering peer.
    pub peer: String,
}

#[derive(Debug, Default)]
struct Mailbox {
    folders: HashMap<String, Vec<ReceivedMessage>>,
}

/// All mailboxes held by one listener instance.
///
/// Mutated only by the inbound listener on message acceptance. Mailboxes
/// are created on demand and never deleted automatically; appends to the
/// same recipient's folder are serialized by the per-entry lock.
#[derive(Debug, Default)]
pub struct MailboxStore {
    mailboxes: DashMap<String, Mailbox>,
    received: Mutex<Vec<ReceivedMessage>>,
}

impl MailboxStore {
    /// Files one copy of `message` into each recipient's inbox and records
    /// it in the received log.
    pub fn deliver(&self, message: ReceivedMessage) {
        for recipient in &message.recipients {
            self.mailboxes
                .entry(recipient.clone())
                .or_default()
                .folders
                .entry(INBOX.to_string())
                .or_default()
                .push(message.clone());
        }

        self.received.lock().push(message);
    }

    /// The contents of one folder, empty when the mailbox or folder does
    /// not exist.
    #[must_use]
    pub fn mailbox(&self, address: &str, folder: &str) -> Vec<ReceivedMessage> {
        self.mailboxes
            .get(address)
            .and_then(|mailbox| mailbox.folders.get(folder).cloned())
            .unwrap_or_default()
    }

    /// Every message accepted by this listener, in arrival order.
    #[must_use]
    pub fn received_messages(&self) -> Vec<ReceivedMessage> {
        self.received.lock().clone()
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.received.lock().len()
    }
}
