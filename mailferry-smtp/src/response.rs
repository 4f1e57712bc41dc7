//! SMTP reply parsing: single and multi-line responses.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("could not parse server reply: {0}")]
pub struct ResponseError(pub String);

/// A complete server reply, possibly spanning several lines.
///
/// Continuation lines carry a `-` in the fourth column; the final line a
/// space. A reply is only acted upon once its final line has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code shared by every line of the reply.
    pub code: u16,
    /// The text of each line, in order, without codes or separators.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The reply text with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// `true` for 2xx replies.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// `true` for 4xx replies.
    #[must_use]
    pub const fn is_temporary_error(&self) -> bool {
        self.code >= 400 && self.code < 500
    }

    /// `true` for 5xx replies.
    #[must_use]
    pub const fn is_permanent_error(&self) -> bool {
        self.code >= 500 && self.code < 600
    }

    /// `true` when a capability line equals `capability` or starts with it
    /// followed by a parameter list (`SIZE 10240000`).
    #[must_use]
    pub fn advertises(&self, capability: &str) -> bool {
        self.lines.iter().any(|line| {
            let line = line.trim().as_bytes();
            let prefix = capability.as_bytes();
            line.eq_ignore_ascii_case(prefix)
                || (line.len() > prefix.len()
                    && line[..prefix.len()].eq_ignore_ascii_case(prefix)
                    && line[prefix.len()] == b' ')
        })
    }

    /// Parses one reply line into `(code, is_last, text)`.
    ///
    /// # Errors
    ///
    /// Fails when the line is shorter than a status code or the fourth
    /// column is neither a space nor a dash.
    pub fn parse_line(line: &str) -> Result<(u16, bool, String), ResponseError> {
        if line.len() < 3 {
            return Err(ResponseError(format!("reply line too short: '{line}'")));
        }

        let code = line[..3]
            .parse::<u16>()
            .map_err(|_| ResponseError(format!("invalid status code in '{line}'")))?;

        let is_last = match line.as_bytes().get(3) {
            None => true,
            Some(b' ') => true,
            Some(b'-') => false,
            Some(other) => {
                return Err(ResponseError(format!(
                    "invalid separator '{}' in reply line",
                    char::from(*other)
                )));
            }
        };

        let text = if line.len() > 4 {
            line[4..].to_string()
        } else {
            String::new()
        };

        Ok((code, is_last, text))
    }

    /// Parses a complete reply from the start of `buffer`.
    ///
    /// Returns `None` while the reply is still incomplete (more data is
    /// needed), otherwise the reply and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Fails on malformed lines or a code change inside a multi-line reply.
    pub fn parse(buffer: &[u8]) -> Result<Option<(Self, usize)>, ResponseError> {
        let text = std::str::from_utf8(buffer)
            .map_err(|err| ResponseError(format!("reply is not valid UTF-8: {err}")))?;

        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut code = None;

        loop {
            let rest = &text[consumed..];
            let Some(line_end) = rest.find('\n') else {
                return Ok(None); // final line not terminated yet
            };

            let line = rest[..line_end].trim_end_matches('\r');
            consumed += line_end + 1;

            if line.is_empty() {
                continue;
            }

            let (line_code, is_last, line_text) = Self::parse_line(line)?;

            match code {
                None => code = Some(line_code),
                Some(code) if code != line_code => {
                    return Err(ResponseError(format!(
                        "status code changed mid-reply: {code} then {line_code}"
                    )));
                }
                Some(_) => {}
            }

            lines.push(line_text);

            if is_last {
                let code = code.unwrap_or(line_code);
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }
}
