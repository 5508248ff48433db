use std::borrow::Cow;

/// Normalizes an asset path to forward slashes.
///
/// Lookups are case-sensitive, so nothing else is touched. Borrows when the
/// path is already normalized.
pub fn normalize(path: &str) -> Cow<'_, str> {
    if path.contains('\\') {
        Cow::Owned(path.replace('\\', "/"))
    } else {
        Cow::Borrowed(path)
    }
}
