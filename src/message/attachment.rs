use std::{
    error::Error as StdError,
    fmt::{self, Display, Formatter},
    fs,
    io,
    path::{Path, PathBuf},
};

use mime::Mime;

/// Suffixes `mimetypes` style guessing reports as a content encoding
const ENCODING_SUFFIXES: &[&str] = &["gz", "bz2", "xz", "br"];

/// A file read from disk, ready to be attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    content_type: Mime,
    content: Vec<u8>,
}

impl Attachment {
    /// Reads `path` and infers its content type from the file name
    pub fn from_path(path: &Path) -> Result<Self, AttachmentWarning> {
        let is_file = fs::metadata(path)
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(AttachmentWarning::new(path, WarningReason::NotAFile));
        }

        let content = fs::read(path)
            .map_err(|err| AttachmentWarning::new(path, WarningReason::Unreadable(err)))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_owned());

        Ok(Self {
            content_type: guess_content_type(&filename),
            filename,
            content,
        })
    }

    /// Name shown to the recipient
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Inferred MIME type
    pub fn content_type(&self) -> &Mime {
        &self.content_type
    }

    /// Raw file content
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// Infers a MIME type from a file name
///
/// Falls back to `application/octet-stream` when the extension is unknown
/// or names a compression wrapper such as `.gz`.
///
/// ```
/// use envoi::message::guess_content_type;
///
/// assert_eq!(guess_content_type("photo.png").essence_str(), "image/png");
/// assert_eq!(guess_content_type("logs.tar.gz"), mime::APPLICATION_OCTET_STREAM);
/// assert_eq!(guess_content_type("README"), mime::APPLICATION_OCTET_STREAM);
/// ```
pub fn guess_content_type(filename: &str) -> Mime {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let encoded =
        extension == "Z" || ENCODING_SUFFIXES.contains(&extension.to_ascii_lowercase().as_str());

    if encoded {
        return mime::APPLICATION_OCTET_STREAM;
    }

    mime_guess::from_path(filename)
        .first()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM)
}

/// An attachment that was skipped; the message is sent without it
#[derive(Debug)]
pub struct AttachmentWarning {
    path: PathBuf,
    reason: WarningReason,
}

/// Why an attachment was skipped
#[derive(Debug)]
#[non_exhaustive]
pub enum WarningReason {
    /// The path does not exist or is not a regular file
    NotAFile,
    /// The file could not be read
    Unreadable(io::Error),
}

impl AttachmentWarning {
    fn new(path: &Path, reason: WarningReason) -> Self {
        Self {
            path: path.to_path_buf(),
            reason,
        }
    }

    /// Path that was requested
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Why it was skipped
    pub fn reason(&self) -> &WarningReason {
        &self.reason
    }
}

impl Display for AttachmentWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.reason {
            WarningReason::NotAFile => write!(
                f,
                "attachment {} does not exist or is not a file",
                self.path.display()
            ),
            WarningReason::Unreadable(err) => write!(
                f,
                "attachment {} could not be read: {err}",
                self.path.display()
            ),
        }
    }
}

impl StdError for AttachmentWarning {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.reason {
            WarningReason::NotAFile => None,
            WarningReason::Unreadable(err) => Some(err),
        }
    }
}
