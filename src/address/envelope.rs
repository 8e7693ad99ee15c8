/// Protocol level addressing of a message
///
/// The forward path is the union of To, Cc and Bcc in that order. Bcc
/// recipients only ever live here, never in a header. When the union is
/// empty the message is sent back to its sender.
///
/// Addresses are kept as the caller typed them; they are checked when the
/// transport turns them into `MAIL FROM` and `RCPT TO` commands.
#[derive(PartialEq, Eq, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// The envelope recipients' addresses
    forward_path: Vec<String>,
    /// The envelope sender address
    reverse_path: String,
}

impl Envelope {
    /// Creates an envelope, falling back to the sender if `to` is empty
    ///
    /// ```
    /// use envoi::Envelope;
    ///
    /// let envelope = Envelope::new("me@example.com", vec![]);
    /// assert_eq!(envelope.to(), ["me@example.com".to_owned()]);
    /// ```
    pub fn new<S: Into<String>>(from: S, to: Vec<String>) -> Envelope {
        let reverse_path = from.into();
        let forward_path = if to.is_empty() {
            vec![reverse_path.clone()]
        } else {
            to
        };

        Envelope {
            forward_path,
            reverse_path,
        }
    }

    /// Builds the envelope of a message from its recipient lists
    pub(crate) fn from_recipients(from: &str, to: &[String], cc: &[String], bcc: &[String]) -> Self {
        let union = to.iter().chain(cc).chain(bcc).cloned().collect();
        Envelope::new(from, union)
    }

    /// Gets the destination addresses of the envelope.
    pub fn to(&self) -> &[String] {
        self.forward_path.as_slice()
    }

    /// Gets the sender of the envelope.
    pub fn from(&self) -> &str {
        &self.reverse_path
    }
}
