//! The per-connection command state machine.

use crate::command::Command;

/// The stage a session is in. One transaction walks
/// `Connected → Ready → MailFrom → RcptTo → Data` and returns to `Ready`
/// after the end-of-data marker or RSET.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStage {
    /// Connection accepted, greeting sent, no HELO yet.
    #[default]
    Connected,
    /// Peer has identified itself; a transaction may begin.
    Ready,
    /// Sender captured.
    MailFrom,
    /// At least one recipient captured.
    RcptTo,
    /// Between the `354` reply and the end-of-data marker.
    Data,
}

impl SessionStage {
    /// The stage entered when `command` is accepted in this stage, or
    /// `None` when the command is out of sequence (the session answers
    /// `503` and stays put).
    ///
    /// QUIT and the unparsable command variants never reach this table;
    /// they are handled before any transition.
    #[must_use]
    pub fn accept(self, command: &Command) -> Option<Self> {
        match (self, command) {
            (_, Command::Ehlo(_) | Command::Helo(_) | Command::Rset) => Some(Self::Ready),
            (Self::Ready, Command::MailFrom(_)) => Some(Self::MailFrom),
            (Self::MailFrom | Self::RcptTo, Command::RcptTo(_)) => Some(Self::RcptTo),
            (Self::RcptTo, Command::Data) => Some(Self::Data),
            _ => None,
        }
    }
}
