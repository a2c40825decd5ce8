//! Rewriting upstream redirects back onto the gateway.

use url::Url;

/// Rewrite `location` when it points into `target`.
///
/// `http://localhost:3000/foo` with target `http://localhost:3000/` and
/// gateway host `localhost:8080` becomes `http://localhost:8080/foo`.
/// Locations on other origins, or that only share a textual prefix with
/// the target (`http://localhost:30001`), are left alone.
pub fn rewrite_location(location: &str, target: &Url, host: &str) -> Option<String> {
    let base = target.as_str().trim_end_matches('/');
    let rest = location.strip_prefix(base)?;

    let rest = match rest.chars().next() {
        None => "/".to_string(),
        Some('/') => rest.to_string(),
        Some('?') | Some('#') => format!("/{}", rest),
        Some(_) => return None,
    };
    Some(format!("http://{}{}", host, rest))
}
