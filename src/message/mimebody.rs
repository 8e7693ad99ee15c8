use std::io::Write;

use mime::Mime;

use super::{
    attachment::Attachment,
    body::Body,
    header::{HeaderValue, Headers},
};

/// MIME part variants
#[derive(Debug, Clone)]
pub enum Part {
    /// Single part with content
    Single(SinglePart),
    /// Multiple parts of content
    Multi(MultiPart),
}

impl Part {
    /// Headers of the part
    pub fn headers(&self) -> &Headers {
        match self {
            Part::Single(part) => &part.headers,
            Part::Multi(part) => &part.headers,
        }
    }

    /// Writes the part body, headers excluded
    pub(crate) fn format_body(&self, out: &mut Vec<u8>) {
        match self {
            Part::Single(part) => part.format_body(out),
            Part::Multi(part) => part.format_body(out),
        }
    }

    fn format(&self, out: &mut Vec<u8>) {
        write!(out, "{}", self.headers())
            .expect("A Write implementation panicked while formatting headers");
        out.extend_from_slice(b"\r\n");
        self.format_body(out);
    }
}

/// A leaf part: headers plus an encoded body
#[derive(Debug, Clone)]
pub struct SinglePart {
    headers: Headers,
    body: Body,
}

impl SinglePart {
    /// `text/plain` in UTF-8
    pub fn plain(text: String) -> Self {
        Self::text(mime::TEXT_PLAIN_UTF_8, text)
    }

    /// `text/html` in UTF-8
    pub fn html(text: String) -> Self {
        Self::text(mime::TEXT_HTML_UTF_8, text)
    }

    fn text(content_type: Mime, text: String) -> Self {
        Self::new(content_type.to_string(), None, Body::text(text))
    }

    /// A downloadable attachment
    pub fn attachment(attachment: &Attachment) -> Self {
        Self::new(
            format!(
                "{}; {}",
                attachment.content_type(),
                quoted_param("name", attachment.filename())
            ),
            Some(format!(
                "attachment; {}",
                quoted_param("filename", attachment.filename())
            )),
            Body::binary(attachment.content().to_vec()),
        )
    }

    fn new(content_type: String, disposition: Option<String>, body: Body) -> Self {
        let mut headers = Headers::new();
        headers.set(HeaderValue::raw("Content-Type", content_type));
        if let Some(disposition) = disposition {
            headers.set(HeaderValue::raw("Content-Disposition", disposition));
        }
        headers.set(HeaderValue::raw(
            "Content-Transfer-Encoding",
            body.encoding().to_string(),
        ));

        Self { headers, body }
    }

    /// The encoded body
    pub fn body(&self) -> &Body {
        &self.body
    }

    fn format_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.body.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
}

/// The kind of multipart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiPartKind {
    /// Independent parts, e.g. a body and its attachments
    Mixed,
    /// The same content in several representations
    Alternative,
}

impl MultiPartKind {
    fn subtype(self) -> &'static str {
        match self {
            Self::Mixed => "mixed",
            Self::Alternative => "alternative",
        }
    }
}

/// A container of parts separated by a random boundary
#[derive(Debug, Clone)]
pub struct MultiPart {
    headers: Headers,
    boundary: String,
    parts: Vec<Part>,
}

impl MultiPart {
    /// An empty multipart of the given kind
    pub fn new(kind: MultiPartKind) -> Self {
        let boundary = make_boundary();
        let mut headers = Headers::new();
        headers.set(HeaderValue::raw(
            "Content-Type",
            format!("multipart/{}; boundary=\"{boundary}\"", kind.subtype()),
        ));

        Self {
            headers,
            boundary,
            parts: Vec::new(),
        }
    }

    /// Appends a part
    pub fn part(mut self, part: Part) -> Self {
        self.parts.push(part);
        self
    }

    /// Appends a single part
    pub fn singlepart(self, part: SinglePart) -> Self {
        self.part(Part::Single(part))
    }

    /// Appends a nested multipart
    pub fn multipart(self, part: MultiPart) -> Self {
        self.part(Part::Multi(part))
    }

    /// Boundary between the parts
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Contained parts
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    fn format_body(&self, out: &mut Vec<u8>) {
        for part in &self.parts {
            out.extend_from_slice(b"--");
            out.extend_from_slice(self.boundary.as_bytes());
            out.extend_from_slice(b"\r\n");
            part.format(out);
        }

        out.extend_from_slice(b"--");
        out.extend_from_slice(self.boundary.as_bytes());
        out.extend_from_slice(b"--\r\n");
    }
}

/// Create a random MIME boundary.
fn make_boundary() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(40)
        .collect()
}

/// `key="value"`, or the RFC 2231 `key*=utf-8''...` form for non-ASCII
fn quoted_param(key: &str, value: &str) -> String {
    if value.is_ascii() {
        format!(
            "{key}=\"{}\"",
            value.replace('\\', "\\\\").replace('"', "\\\"")
        )
    } else {
        format!(
            "{key}*=utf-8''{}",
            percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC)
        )
    }
}
