pub fn get_md5(s: &str) -> String {
    let digest = md5::compute(s);
    format!("{:x}", digest)
}

/// Strip the query string and fragment from a URL-ish string
pub fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Last path segment of a URL, without query or fragment
pub fn basename(url: &str) -> &str {
    let path = strip_query(url).trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

/// Collapse every run of whitespace into a single space
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
