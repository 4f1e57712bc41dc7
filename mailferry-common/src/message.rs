use serde::{Deserialize, Serialize};

use crate::address::EmailAddress;

/// An outbound message as handed to the transport core by its caller.
///
/// Immutable once constructed; ownership moves into the delivery engine
/// when the message is sent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub from: EmailAddress,
    pub to: EmailAddress,
    /// Optional display name rendered in the `From` header.
    pub from_name: Option<String>,
    pub subject: String,
    pub body: String,
    /// `true` renders the body as `text/html`, otherwise `text/plain`.
    pub html: bool,
}

impl Message {
    #[must_use]
    pub fn new(
        from: EmailAddress,
        to: EmailAddress,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            from_name: None,
            subject: subject.into(),
            body: body.into(),
            html: false,
        }
    }

    #[must_use]
    pub fn with_from_name(mut self, name: impl Into<String>) -> Self {
        self.from_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn with_html(mut self, html: bool) -> Self {
        self.html = html;
        self
    }
}
