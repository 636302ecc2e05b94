//! Parsing of inbound SMTP commands.

/// The commands the submission listener understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
}

impl Command {
    /// Parse one command line (without its CRLF).
    ///
    /// Command verbs are case-insensitive per RFC 5321; addresses keep their
    /// original case. Returns `None` for anything unrecognised.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

        match verb.to_ascii_uppercase().as_str() {
            "HELO" => Some(Self::Helo(rest.trim().to_owned())),
            "EHLO" => Some(Self::Ehlo(rest.trim().to_owned())),
            "MAIL" => Self::parse_path(rest, "FROM:").map(Self::MailFrom),
            "RCPT" => Self::parse_path(rest, "TO:").map(Self::RcptTo),
            "DATA" if rest.is_empty() => Some(Self::Data),
            "RSET" if rest.is_empty() => Some(Self::Rset),
            "NOOP" => Some(Self::Noop),
            "QUIT" if rest.is_empty() => Some(Self::Quit),
            _ => None,
        }
    }

    /// Extract the address from `FROM:<addr>` / `TO:<addr>` style arguments.
    ///
    /// Trailing ESMTP parameters (e.g. `SIZE=...`) are tolerated and
    /// ignored; the angle brackets are optional.
    fn parse_path(rest: &str, prefix: &str) -> Option<String> {
        let rest = rest.trim();
        if !rest.get(..prefix.len())?.eq_ignore_ascii_case(prefix) {
            return None;
        }

        let path = rest[prefix.len()..].trim_start();

        let address = if let Some(stripped) = path.strip_prefix('<') {
            stripped.split_once('>').map(|(addr, _)| addr)?
        } else {
            path.split_whitespace().next().unwrap_or("")
        };

        Some(address.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_greetings() {
        assert_eq!(
            Command::parse("HELO client.example.com"),
            Some(Command::Helo("client.example.com".to_owned()))
        );
        assert_eq!(
            Command::parse("ehlo client.example.com"),
            Some(Command::Ehlo("client.example.com".to_owned()))
        );
    }

    #[test]
    fn test_parse_mail_from() {
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com>"),
            Some(Command::MailFrom("sender@example.com".to_owned()))
        );
        // Verb and keyword are case-insensitive
        assert_eq!(
            Command::parse("mail from:<sender@example.com>"),
            Some(Command::MailFrom("sender@example.com".to_owned()))
        );
        // ESMTP parameters are tolerated
        assert_eq!(
            Command::parse("MAIL FROM:<sender@example.com> SIZE=1024"),
            Some(Command::MailFrom("sender@example.com".to_owned()))
        );
        // The null sender is a valid reverse path
        assert_eq!(
            Command::parse("MAIL FROM:<>"),
            Some(Command::MailFrom(String::new()))
        );
    }

    #[test]
    fn test_parse_rcpt_to() {
        assert_eq!(
            Command::parse("RCPT TO:<rcpt@example.com>"),
            Some(Command::RcptTo("rcpt@example.com".to_owned()))
        );
        assert_eq!(
            Command::parse("RCPT TO:rcpt@example.com"),
            Some(Command::RcptTo("rcpt@example.com".to_owned()))
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(Command::parse("DATA"), Some(Command::Data));
        assert_eq!(Command::parse("RSET"), Some(Command::Rset));
        assert_eq!(Command::parse("NOOP"), Some(Command::Noop));
        assert_eq!(Command::parse("noop ignored"), Some(Command::Noop));
        assert_eq!(Command::parse("QUIT"), Some(Command::Quit));
    }

    #[test]
    fn test_unrecognised_input() {
        assert_eq!(Command::parse("VRFY user"), None);
        assert_eq!(Command::parse("MAIL TO:<x@y>"), None);
        assert_eq!(Command::parse("RCPT FROM:<x@y>"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("DATA now"), None);
    }

    #[test]
    fn test_unclosed_bracket_is_rejected() {
        assert_eq!(Command::parse("MAIL FROM:<sender@example.com"), None);
    }
}
