//! Email addresses and recipient lists

mod envelope;
mod types;

pub use self::{
    envelope::Envelope,
    types::{Address, AddressError},
};

/// Splits a recipient field on `,` and `;`
///
/// Entries are trimmed and empty entries dropped. Order and duplicates are
/// preserved.
///
/// ```
/// use envoi::address::split_recipients;
///
/// assert_eq!(
///     split_recipients(" a@x.com;b@x.com,, ;a@x.com "),
///     vec!["a@x.com", "b@x.com", "a@x.com"],
/// );
/// ```
pub fn split_recipients(field: &str) -> Vec<String> {
    normalize(field.split([',', ';']))
}

/// Trims every entry and drops the empty ones
pub fn normalize<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.as_ref().trim();
            (!entry.is_empty()).then(|| entry.to_owned())
        })
        .collect()
}
