use url::Url;

fn effective_port(url: &Url) -> Option<u16> {
    url.port().or_else(|| match url.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    })
}

fn origin_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = effective_port(url);
    Some(match port {
        Some(p) => format!("{}://{}:{}", url.scheme(), host, p),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Does `entry` (one allowlist member) match `url`, per spec §4.1?
///
/// - An entry containing `://` is compared to the URL's origin
///   (scheme + host + effective port).
/// - An entry starting with `*.` matches the hostname suffix.
/// - Otherwise the entry must equal the hostname exactly.
///
/// Matching is case-insensitive and whitespace-trimmed on both sides.
pub fn entry_matches(entry: &str, url: &Url) -> bool {
    let entry = entry.trim().to_ascii_lowercase();
    if entry.is_empty() {
        return false;
    }
    let host = match url.host_str() {
        Some(h) => h.to_ascii_lowercase(),
        None => return false,
    };

    if entry.contains("://") {
        let Ok(entry_url) = Url::parse(&entry) else {
            return false;
        };
        let (Some(a), Some(b)) = (origin_of(&entry_url), origin_of(url)) else {
            return false;
        };
        return a.eq_ignore_ascii_case(&b);
    }

    if let Some(suffix) = entry.strip_prefix("*.") {
        return host == suffix || host.ends_with(&format!(".{suffix}"));
    }

    host == entry
}

pub fn allowlist_matches<'a>(allowlist: impl IntoIterator<Item = &'a String>, url: &Url) -> bool {
    allowlist.into_iter().any(|entry| entry_matches(entry, url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_entry_matches_scheme_host_port() {
        let url = Url::parse("http://127.0.0.1:8080/path").unwrap();
        assert!(entry_matches("http://127.0.0.1:8080", &url));
        assert!(!entry_matches("http://127.0.0.1:8081", &url));
    }

    #[test]
    fn wildcard_suffix_matches_subdomain() {
        let url = Url::parse("https://api.example.com/v1").unwrap();
        assert!(entry_matches("*.example.com", &url));
        assert!(entry_matches("*.example.com", &Url::parse("https://example.com").unwrap()));
        assert!(!entry_matches("*.example.com", &Url::parse("https://evilexample.com").unwrap()));
    }

    #[test]
    fn bare_hostname_requires_exact_match() {
        let url = Url::parse("https://example.com/a").unwrap();
        assert!(entry_matches("example.com", &url));
        assert!(!entry_matches("example.com", &Url::parse("https://sub.example.com").unwrap()));
    }

    #[test]
    fn default_ports_are_applied() {
        let with_default = Url::parse("https://example.com/a").unwrap();
        assert!(entry_matches("https://example.com:443", &with_default));
    }

    #[test]
    fn case_and_whitespace_insensitive() {
        let url = Url::parse("https://Example.COM").unwrap();
        assert!(entry_matches("  EXAMPLE.com  ", &url));
    }
}
