//! Recognition of social-media status URLs (`/<screen_name>/status/<id>`).

use std::fmt;

use url::Url;

const STATUS_HOSTS: &[&str] = &["x.com", "twitter.com"];

/// The author handle and post identifier of a status URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReference {
    pub screen_name: String,
    pub status_id: String,
}

impl fmt::Display for StatusReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/status/{}", self.screen_name, self.status_id)
    }
}

pub fn is_twitter_url(url: &Url) -> bool {
    url.host_str().is_some_and(|host| {
        let host = host.trim_start_matches("www.").trim_start_matches("mobile.");
        STATUS_HOSTS.contains(&host)
    })
}

/// Detects a status reference on a status host.
pub fn detect(url: &Url) -> Option<StatusReference> {
    if !is_twitter_url(url) {
        return None;
    }
    detect_path(url.path())
}

/// Detects a status reference from a bare path, regardless of host.
///
/// The first segment is the screen name; the identifier is the non-empty
/// segment right after the first literal `status` segment that follows it.
/// Intermediate segments (`/i/web/status/<id>`) and trailing ones
/// (`/photo/1`, `/video/1`) are allowed.
pub fn detect_path(path: &str) -> Option<StatusReference> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let screen_name = *segments.first()?;
    let status_at = segments.iter().skip(1).position(|s| *s == "status")? + 1;
    let status_id = *segments.get(status_at + 1)?;

    if screen_name.is_empty() || status_id.is_empty() {
        return None;
    }

    Some(StatusReference {
        screen_name: screen_name.to_string(),
        status_id: status_id.to_string(),
    })
}
