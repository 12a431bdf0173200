pub(crate) mod http;
pub mod retry;

/// Trim trailing slashes so paths can be appended with a leading `/`.
pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
