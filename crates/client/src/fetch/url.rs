//! URL canonicalization and origin checks.
//!
//! Cache keys and origin classification both work on canonical URLs, so
//! `/index.html`, `http://LOCALHOST:8080/index.html#top` and
//! `http://localhost:8080/index.html` all name the same resource.

use url::{ParseError, Url};

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("relative URL needs a base: {0}")]
    Relative(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// for a bare host (`example.com/x`);
///    path-only input (`/x`, `?q`, `./x`) is rejected
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) if is_path_only(trimmed) => {
            return Err(UrlError::Relative(trimmed.to_string()));
        }
        Err(ParseError::RelativeUrlWithoutBase) => {
            Url::parse(&format!("https://{trimmed}")).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
        }
        Err(e) => return Err(UrlError::InvalidUrl(e.to_string())),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

fn is_path_only(input: &str) -> bool {
    input.starts_with(['/', '?', '#', '.'])
}

/// Resolve a request URL against the app origin.
///
/// Input that parses with a scheme of its own is canonicalized as-is;
/// anything else (`/a.html`, `icons/x.png`, `?q=1`,
/// `/login?next=https://app.test/`) is joined onto `base`.
pub fn resolve(base: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    match Url::parse(trimmed) {
        Ok(_) => canonicalize(trimmed),
        Err(ParseError::RelativeUrlWithoutBase) => {
            let mut joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
            joined.set_fragment(None);
            Ok(joined)
        }
        Err(e) => Err(UrlError::InvalidUrl(e.to_string())),
    }
}

/// Same scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

/// Whether the URL's host contains `pattern`.
pub fn host_matches(url: &Url, pattern: &str) -> bool {
    url.host_str().is_some_and(|host| host.contains(pattern))
}
