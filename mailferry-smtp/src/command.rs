use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use mailferry_common::address::EmailAddress;

/// A parsed client command.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Ehlo(String),
    Helo(String),
    MailFrom(EmailAddress),
    RcptTo(EmailAddress),
    Data,
    Rset,
    Quit,
    /// A known verb whose argument could not be parsed (answered with 501).
    Malformed { verb: &'static str, reason: String },
    /// Anything else (answered with 500).
    Unrecognized(String),
}

impl Command {
    /// Parses one command line, already stripped of its CRLF.
    ///
    /// Verbs match case-insensitively. A recognizable verb with a bad
    /// argument parses to [`Command::Malformed`]; everything else to
    /// [`Command::Unrecognized`]. Parsing itself never fails.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();

        if prefix_matches(trimmed, "MAIL FROM:") {
            return match parse_path(&trimmed[10..]) {
                Ok(address) => Self::MailFrom(address),
                Err(reason) => Self::Malformed {
                    verb: "MAIL FROM",
                    reason,
                },
            };
        }

        if prefix_matches(trimmed, "RCPT TO:") {
            return match parse_path(&trimmed[8..]) {
                Ok(address) => Self::RcptTo(address),
                Err(reason) => Self::Malformed {
                    verb: "RCPT TO",
                    reason,
                },
            };
        }

        if prefix_matches(trimmed, "EHLO") || prefix_matches(trimmed, "HELO") {
            let ehlo = trimmed[..4].eq_ignore_ascii_case("EHLO");
            let verb = if ehlo { "EHLO" } else { "HELO" };

            return match trimmed.split_once(char::is_whitespace) {
                Some((_, host)) if !host.trim().is_empty() => {
                    let host = host.trim().to_string();
                    if ehlo { Self::Ehlo(host) } else { Self::Helo(host) }
                }
                _ => Self::Malformed {
                    verb,
                    reason: "expected a hostname".to_string(),
                },
            };
        }

        if trimmed.eq_ignore_ascii_case("DATA") {
            Self::Data
        } else if trimmed.eq_ignore_ascii_case("RSET") {
            Self::Rset
        } else if trimmed.eq_ignore_ascii_case("QUIT") {
            Self::Quit
        } else {
            Self::Unrecognized(trimmed.to_string())
        }
    }
}

/// Case-insensitive ASCII prefix check, refusing non-boundary slices.
fn prefix_matches(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Parses the path argument of MAIL FROM / RCPT TO, with or without the
/// surrounding angle brackets.
fn parse_path(rest: &str) -> Result<EmailAddress, String> {
    let candidate = rest.trim();
    let candidate = candidate
        .strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(candidate);

    EmailAddress::from_str(candidate).map_err(|err| err.to_string())
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ehlo(host) => write!(fmt, "EHLO {host}"),
            Self::Helo(host) => write!(fmt, "HELO {host}"),
            Self::MailFrom(address) => write!(fmt, "MAIL FROM:<{address}>"),
            Self::RcptTo(address) => write!(fmt, "RCPT TO:<{address}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Malformed { verb, .. } => write!(fmt, "{verb} <malformed>"),
            Self::Unrecognized(line) => fmt.write_str(line),
        }
    }
}
