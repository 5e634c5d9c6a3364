/// Fallback extension when the source path carries none we can infer.
const DEFAULT_EXTENSION: &str = ".mp4";

/// Retrieval strategy for a stored video reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Fully qualified http(s) URL, fetched with a plain GET.
    RemoteUrl(String),
    /// Key resolved against the tenant's object-storage bucket.
    ObjectKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("source path is empty")]
    EmptyPath,
}

/// Classify a stored-asset reference by its transport.
///
/// A path is a `RemoteUrl` iff it starts with an http(s) scheme prefix;
/// everything else is an object-storage key. Pure, no I/O.
pub fn classify(path: &str) -> Result<AssetSource, SourceError> {
    if path.is_empty() {
        return Err(SourceError::EmptyPath);
    }

    if starts_with_ignore_case(path, "http://") || starts_with_ignore_case(path, "https://") {
        Ok(AssetSource::RemoteUrl(path.to_string()))
    } else {
        Ok(AssetSource::ObjectKey(path.to_string()))
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Infer a dotted file extension from a key or URL path.
///
/// Query string and fragment are stripped first so `v.mp4?sig=x` infers
/// `.mp4`. Defaults to `.mp4` when the last segment has no extension.
pub fn infer_extension(path: &str) -> String {
    let trimmed = path
        .split(['?', '#'])
        .next()
        .unwrap_or(path)
        .rsplit('/')
        .next()
        .unwrap_or(path);

    match trimmed.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 8
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
