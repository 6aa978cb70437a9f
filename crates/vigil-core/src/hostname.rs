use url::Url;

/// Schemes the tracker attributes time to. Anything else (browser
/// chrome, extension pages, devtools, ftp, websockets) is invisible:
/// never tracked and never blockable.
const WEB_SCHEMES: &[&str] = &["http", "https"];

/// Extract the hostname a URL should be attributed to.
///
/// Returns `None` for unparseable URLs, non-web schemes, and URLs
/// without a host. Never errors: an input the tracker cannot attribute
/// is simply not an observation.
#[must_use]
pub fn hostname_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    if !WEB_SCHEMES.contains(&url.scheme()) {
        return None;
    }
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}
