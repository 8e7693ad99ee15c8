use std::{
    fmt::{self, Display, Formatter},
    mem,
};

/// `Content-Transfer-Encoding` of a part
///
/// [RFC 2045, section 6](https://tools.ietf.org/html/rfc2045#section-6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTransferEncoding {
    /// ASCII only, lines under 1000 bytes
    SevenBit,
    /// Mostly ASCII text
    QuotedPrintable,
    /// Anything else
    Base64,
}

impl Display for ContentTransferEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SevenBit => "7bit",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
        })
    }
}

/// A part body that has already been encoded
#[derive(Debug, Clone)]
pub struct Body {
    buf: Vec<u8>,
    encoding: ContentTransferEncoding,
}

impl Body {
    /// Encodes text, converting line endings to `CRLF`
    ///
    /// Chooses the cheapest encoding between `7bit`, `quoted-printable` and
    /// `base64`.
    pub fn text(mut text: String) -> Self {
        let encoding = choose(text.as_bytes());
        in_place_crlf_line_endings(&mut text);
        Self::encode(text.into_bytes(), encoding)
    }

    /// Encodes binary content, always as `base64`
    pub fn binary(buf: Vec<u8>) -> Self {
        Self::encode(buf, ContentTransferEncoding::Base64)
    }

    fn encode(buf: Vec<u8>, encoding: ContentTransferEncoding) -> Self {
        let buf = match encoding {
            ContentTransferEncoding::SevenBit => buf,
            ContentTransferEncoding::QuotedPrintable => quoted_printable::encode(buf),
            ContentTransferEncoding::Base64 => {
                let len = email_encoding::body::base64::encoded_len(buf.len());

                let mut out = String::with_capacity(len);
                email_encoding::body::base64::encode(&buf, &mut out)
                    .expect("encode body as base64");
                out.into_bytes()
            }
        };

        Self { buf, encoding }
    }

    /// Returns the `Content-Transfer-Encoding` of this `Body`.
    pub fn encoding(&self) -> ContentTransferEncoding {
        self.encoding
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

fn choose(buf: &[u8]) -> ContentTransferEncoding {
    use email_encoding::body::Encoding;

    // 8bit is never chosen when the server is not known to support it
    match Encoding::choose(buf, false) {
        Encoding::SevenBit => ContentTransferEncoding::SevenBit,
        Encoding::EightBit | Encoding::QuotedPrintable => ContentTransferEncoding::QuotedPrintable,
        Encoding::Base64 => ContentTransferEncoding::Base64,
    }
}

/// In place conversion to CRLF line endings
fn in_place_crlf_line_endings(string: &mut String) {
    let indices = find_all_lf_char_indices(string);

    for i in indices {
        // relies on `indices` being in reverse order
        string.insert(i, '\r');
    }
}

/// Indices where `\r` must be inserted, last one first
fn find_all_lf_char_indices(s: &str) -> Vec<usize> {
    let mut indices = Vec::new();

    let mut found_lf = false;
    for (i, c) in s.char_indices().rev() {
        if mem::take(&mut found_lf) && c != '\r' {
            indices.push(i + c.len_utf8());
        }

        found_lf = c == '\n';
    }

    if found_lf {
        // the first character is `\n`
        indices.push(0);
    }

    indices
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{in_place_crlf_line_endings, Body, ContentTransferEncoding};

    #[test]
    fn seven_bit_text() {
        let body = Body::text("Hello\nworld".to_owned());
        assert_eq!(body.encoding(), ContentTransferEncoding::SevenBit);
        assert_eq!(body.as_bytes(), b"Hello\r\nworld");
    }

    #[test]
    fn mostly_ascii_is_quoted_printable() {
        let body = Body::text("Café au lait".to_owned());
        assert_eq!(body.encoding(), ContentTransferEncoding::QuotedPrintable);
        assert_eq!(body.as_bytes(), b"Caf=C3=A9 au lait");
    }

    #[test]
    fn non_latin_text_is_base64() {
        let body = Body::text("Текст письма в уникоде".to_owned());
        assert_eq!(body.encoding(), ContentTransferEncoding::Base64);
        assert_eq!(
            String::from_utf8(body.as_bytes().to_vec()).unwrap(),
            "0KLQtdC60YHRgiDQv9C40YHRjNC80LAg0LIg0YPQvdC40LrQvtC00LU="
        );
    }

    #[test]
    fn binary_is_base64() {
        let body = Body::binary(vec![0, 159, 146, 150]);
        assert_eq!(body.encoding(), ContentTransferEncoding::Base64);
        assert_eq!(body.as_bytes(), b"AJ+Slg==");
    }

    #[test]
    fn crlf() {
        let mut string = String::from("Send me a ✉️\nwith\nlettre!\n😀");
        in_place_crlf_line_endings(&mut string);
        assert_eq!(string, "Send me a ✉️\r\nwith\r\nlettre!\r\n😀");

        let mut string = String::from("\nalready\r\nmixed\n");
        in_place_crlf_line_endings(&mut string);
        assert_eq!(string, "\r\nalready\r\nmixed\r\n");
    }
}
