//! SMTP response parsing and representation.

use super::error::{ClientError, Result};

/// A single line of an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    /// The SMTP status code (e.g., 220, 250, 550).
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    /// The message text following the status code.
    pub message: String,
}

/// A complete SMTP response, which may span multiple lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The SMTP status code.
    pub code: u16,
    /// All message lines in the response.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// The complete message with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` for a 2xx code.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// Returns `true` for any 4xx or 5xx code.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let Some(head) = line.get(..3) else {
            return Err(ClientError::ParseError(format!(
                "Response line too short: '{line}'"
            )));
        };

        let code = head
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{head}'")))?;

        // A space after the code closes the response; a dash continues it
        let is_last = match line.as_bytes().get(3) {
            None | Some(b' ') => true,
            Some(b'-') => false,
            Some(&c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{}'",
                    c as char
                )));
            }
        };

        let message = line.get(4..).unwrap_or("").to_owned();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete response from the front of `buffer`.
    ///
    /// Returns the parsed response and the number of bytes consumed, or
    /// `None` if the buffer does not yet hold a complete response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::ParseError` if the response is malformed.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let text = std::str::from_utf8(buffer)?;

        let mut lines = Vec::new();
        let mut first_code = None;
        let mut consumed = 0;
        let mut rest = text;

        loop {
            let Some(newline) = rest.find('\n') else {
                // Incomplete final line
                return Ok(None);
            };

            let raw = &rest[..newline];
            consumed += newline + 1;
            rest = &rest[newline + 1..];

            let line = raw.strip_suffix('\r').unwrap_or(raw);
            if line.is_empty() {
                continue;
            }

            let parsed = Self::parse_line(line)?;

            match first_code {
                None => first_code = Some(parsed.code),
                Some(code) if code != parsed.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(parsed.message);

            if parsed.is_last {
                let code = first_code.unwrap_or(parsed.code);
                return Ok(Some((Self::new(code, lines), consumed)));
            }
        }
    }
}
