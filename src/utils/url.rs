// src/utils/url.rs

//! URL manipulation utilities.

use url::Url;

/// Reduce a site URL to a comparable key.
///
/// Scheme, a leading `www.` and trailing slashes are dropped, the rest is
/// lower-cased.
///
/// # Examples
/// ```
/// use sitesearch::utils::url::normalize_site_key;
///
/// assert_eq!(normalize_site_key("https://www.Example.ru/"), "example.ru");
/// ```
pub fn normalize_site_key(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let without_www = without_scheme
        .strip_prefix("www.")
        .or_else(|| without_scheme.strip_prefix("WWW."))
        .unwrap_or(without_scheme);
    without_www.trim_end_matches('/').to_lowercase()
}

/// Path of `url` relative to the site root, `/` for the root itself.
///
/// # Examples
/// ```
/// use sitesearch::utils::url::page_path;
/// use url::Url;
///
/// let root = Url::parse("https://a.ru").unwrap();
/// assert_eq!(page_path(&root, "https://a.ru"), "/");
/// assert_eq!(page_path(&root, "https://a.ru/news/1"), "/news/1");
/// ```
pub fn page_path(root: &Url, url: &str) -> String {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    let rest = path_under_root(root, &path).unwrap_or(&path);
    format!("/{}", rest.trim_start_matches('/'))
}

/// Whether a discovered link should become a crawl task.
///
/// The link must share scheme, host and port with `root` and sit under its
/// path. It must also differ from the page it was found on, carry no
/// fragment or query, and not point at a skipped file type. Hosts compare
/// in their parsed form, so `https://сайт.рф` matches its punycode links.
pub fn is_crawlable_link(
    link: &str,
    root: &Url,
    current: &str,
    skip_extensions: &[String],
) -> bool {
    if link.contains('#') || link.contains('?') {
        return false;
    }
    let Ok(parsed) = Url::parse(link) else {
        return false;
    };
    if parsed.scheme() != root.scheme()
        || parsed.host() != root.host()
        || parsed.port_or_known_default() != root.port_or_known_default()
    {
        return false;
    }
    if path_under_root(root, parsed.path()).is_none() {
        return false;
    }
    if link == current || Url::parse(current).is_ok_and(|current| current == parsed) {
        return false;
    }
    !has_skipped_extension(parsed.path(), skip_extensions)
}

/// Remainder of `path` below the root's path, on a segment boundary.
fn path_under_root<'a>(root: &Url, path: &'a str) -> Option<&'a str> {
    let base = root.path().trim_end_matches('/');
    let rest = path.strip_prefix(base)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

fn has_skipped_extension(link: &str, skip_extensions: &[String]) -> bool {
    let last_segment = link.rsplit('/').next().unwrap_or("");
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => skip_extensions
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
