//! Helpers for building debug and public URLs from native paths.

use urlencoding::encode;

/// Percent-encodes every segment of a `/`-separated path.
///
/// Separators are preserved, so
/// `/a/default_pandas_datasource-#asset.html` becomes
/// `/a/default_pandas_datasource-%23asset.html`.
pub fn escape_url_path(path: &str) -> String {
    path.split('/')
        .map(|segment| encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins a URL root and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
