//! Headers of a message or MIME part

use std::{
    fmt::{self, Display, Formatter},
    time::SystemTime,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Maximum line length before folding
///
/// [RFC 5322, section 2.1.1](https://tools.ietf.org/html/rfc5322#section-2.1.1)
const LINE_LIMIT: usize = 78;
/// Raw bytes packed into one encoded word, keeps each word under 75 chars
const ENCODED_WORD_BYTES: usize = 45;

/// A single header line, value already encoded for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValue {
    name: &'static str,
    encoded: String,
}

impl HeaderValue {
    /// Unstructured text, e.g. `Subject`
    ///
    /// Non-ASCII text is written as RFC 2047 encoded words.
    pub fn text(name: &'static str, value: &str) -> Self {
        let value = sanitize(value);
        let encoded = if needs_encoding(&value) {
            encoded_words(&value).join("\r\n ")
        } else {
            fold(name, value.split(' '), " ")
        };

        Self { name, encoded }
    }

    /// A list of mailboxes, e.g. `To`
    pub fn mailboxes<I, S>(name: &'static str, mailboxes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mailboxes: Vec<String> = mailboxes
            .into_iter()
            .map(|mailbox| encode_mailbox(&sanitize(mailbox.as_ref())))
            .collect();

        Self {
            name,
            encoded: fold(name, mailboxes.iter().map(String::as_str), ", "),
        }
    }

    /// A value that is known to be ASCII and short, written as is
    pub fn raw(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            encoded: sanitize(&value.into()),
        }
    }

    /// `Date` in RFC 5322 format
    pub fn date(date: SystemTime) -> Self {
        let mut s = httpdate::fmt_http_date(date);
        // httpdate always ends in ` GMT`, an obsolete zone for email
        if s.ends_with(" GMT") {
            s.truncate(s.len() - "GMT".len());
            s.push_str("-0000");
        }

        Self {
            name: "Date",
            encoded: s,
        }
    }

    /// Header name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value as written on the wire
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

/// An ordered set of headers, at most one per name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    headers: Vec<HeaderValue>,
}

impl Headers {
    /// An empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header
    pub fn set(&mut self, header: HeaderValue) {
        match self
            .headers
            .iter_mut()
            .find(|h| h.name.eq_ignore_ascii_case(header.name))
        {
            Some(existing) => *existing = header,
            None => self.headers.push(header),
        }
    }

    /// Returns the encoded value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(HeaderValue::encoded)
    }

    /// Tells whether a header is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &HeaderValue> {
        self.headers.iter()
    }
}

impl Display for Headers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for header in &self.headers {
            write!(f, "{}: {}\r\n", header.name, header.encoded)?;
        }

        Ok(())
    }
}

/// Replaces line breaks so a value can never inject another header
fn sanitize(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn needs_encoding(value: &str) -> bool {
    !value.chars().all(|c| c.is_ascii() && (c == '\t' || !c.is_ascii_control()))
}

/// Encodes `value` as a series of `=?utf-8?b?...?=` words
///
/// [RFC 2047](https://tools.ietf.org/html/rfc2047). Characters are never
/// split across two words.
fn encoded_words(value: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut start = 0;

    for (idx, c) in value.char_indices() {
        if idx + c.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(encoded_word(&value[start..idx]));
            start = idx;
        }
    }
    if start < value.len() || words.is_empty() {
        words.push(encoded_word(&value[start..]));
    }

    words
}

fn encoded_word(chunk: &str) -> String {
    format!("=?utf-8?b?{}?=", STANDARD.encode(chunk))
}

/// Encodes the display name of a `Name <addr>` mailbox if needed
fn encode_mailbox(mailbox: &str) -> String {
    match mailbox.rfind('<') {
        Some(start) if start > 0 => {
            let name = mailbox[..start].trim().trim_matches('"');
            let addr = &mailbox[start..];
            if needs_encoding(name) {
                format!("{} {addr}", encoded_words(name).join(" "))
            } else if name.chars().any(|c| "()<>[]:;@\\,.\"".contains(c)) {
                format!("\"{}\" {addr}", name.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                format!("{name} {addr}")
            }
        }
        _ => mailbox.to_owned(),
    }
}

/// Joins `items` with `separator`, folding before a line grows too long
fn fold<'a, I>(name: &str, items: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    // `Name: ` precedes the value on the first line
    let mut line_len = name.len() + 2;

    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            if line_len + separator.len() + item.len() > LINE_LIMIT {
                out.push_str(separator.trim_end());
                out.push_str("\r\n ");
                line_len = 1;
            } else {
                out.push_str(separator);
                line_len += separator.len();
            }
        }
        out.push_str(item);
        line_len += item.len();
    }

    out
}

#[cfg(test)]
mod test {
    use std::time::{Duration, SystemTime};

    use pretty_assertions::assert_eq;

    use super::{HeaderValue, Headers};

    #[test]
    fn ascii_subject() {
        let subject = HeaderValue::text("Subject", "Hello, World!");
        assert_eq!(subject.encoded(), "Hello, World!");
    }

    #[test]
    fn utf8_subject() {
        let subject = HeaderValue::text("Subject", "Привет, мир!");
        assert_eq!(subject.encoded(), "=?utf-8?b?0J/RgNC40LLQtdGCLCDQvNC40YAh?=");
    }

    #[test]
    fn long_utf8_subject_is_split() {
        let subject = HeaderValue::text("Subject", &"é".repeat(40));
        let words: Vec<&str> = subject.encoded().split("\r\n ").collect();
        assert_eq!(words.len(), 2);
        assert!(words.iter().all(|w| w.len() <= 75));
    }

    #[test]
    fn line_breaks_are_neutralised() {
        let subject = HeaderValue::text("Subject", "hi\r\nBcc: evil@example.com");
        assert!(!subject.encoded().contains('\n'));
        assert_eq!(subject.encoded(), "hi  Bcc: evil@example.com");
    }

    #[test]
    fn mailbox_list() {
        let to = HeaderValue::mailboxes("To", ["a@x.com", "Zoë <z@x.com>", "Doe, Jane <j@x.com>"]);
        assert_eq!(
            to.encoded(),
            "a@x.com, =?utf-8?b?Wm/Dqw==?= <z@x.com>, \"Doe, Jane\" <j@x.com>"
        );
    }

    #[test]
    fn long_mailbox_list_is_folded() {
        let many: Vec<String> = (0..10).map(|i| format!("recipient{i}@example.com")).collect();
        let to = HeaderValue::mailboxes("To", &many);
        for line in to.encoded().split("\r\n") {
            assert!(line.len() <= 78, "{line}");
        }
        assert_eq!(to.encoded().replace(",\r\n ", ", "), many.join(", "));
    }

    #[test]
    fn date_format() {
        let date = HeaderValue::date(SystemTime::UNIX_EPOCH + Duration::from_secs(784111777));
        assert_eq!(date.encoded(), "Sun, 06 Nov 1994 08:49:37 -0000");
    }

    #[test]
    fn headers_replace_and_format() {
        let mut headers = Headers::new();
        headers.set(HeaderValue::raw("MIME-Version", "1.0"));
        headers.set(HeaderValue::text("Subject", "first"));
        headers.set(HeaderValue::text("subject", "second"));

        assert_eq!(headers.get("Subject"), Some("second"));
        assert_eq!(
            headers.to_string(),
            "MIME-Version: 1.0\r\nsubject: second\r\n"
        );
    }
}
