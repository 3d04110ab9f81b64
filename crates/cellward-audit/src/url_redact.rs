use url::Url;

const SENSITIVE_PARAMS: &[&str] = &[
    "key",
    "api_key",
    "apikey",
    "token",
    "access_token",
    "auth",
    "authorization",
    "signature",
    "sig",
    "password",
    "secret",
    "client_secret",
];

/// URL redaction used both for external-fetch provenance and for
/// audited tool parameters (spec §4.2). Strips embedded userinfo and
/// the fragment, and replaces the value of every sensitive query
/// parameter with `REDACTED`, preserving repetition count and the
/// order/identity of non-sensitive parameters. Returns the input
/// unchanged if it doesn't parse as a URL.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_fragment(None);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let redacted = if SENSITIVE_PARAMS.iter().any(|s| s.eq_ignore_ascii_case(&k)) {
                "REDACTED".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), redacted)
        })
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_sensitive_params_preserves_others() {
        let raw = "https://api.example.com/data?api_key=S1&ACCESS_TOKEN=S2&client_secret=S3&city=berlin#frag";
        let redacted = redact_url(raw);
        let url = Url::parse(&redacted).unwrap();
        assert_eq!(url.fragment(), None);
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("api_key").unwrap(), "REDACTED");
        assert_eq!(pairs.get("ACCESS_TOKEN").unwrap(), "REDACTED");
        assert_eq!(pairs.get("client_secret").unwrap(), "REDACTED");
        assert_eq!(pairs.get("city").unwrap(), "berlin");
    }

    #[test]
    fn strips_userinfo() {
        let redacted = redact_url("https://user:pw@example.com/a");
        assert!(!redacted.contains("user"));
        assert!(!redacted.contains("pw@"));
    }

    #[test]
    fn preserves_repetition_count() {
        let redacted = redact_url("https://example.com/a?token=a&token=b&token=c");
        let url = Url::parse(&redacted).unwrap();
        let count = url.query_pairs().filter(|(k, _)| k == "token").count();
        assert_eq!(count, 3);
    }

    #[test]
    fn invalid_url_returned_unchanged() {
        let raw = "not a url at all";
        assert_eq!(redact_url(raw), raw);
    }

    #[test]
    fn idempotent() {
        let raw = "https://example.com/a?token=secretvalue&city=berlin";
        let once = redact_url(raw);
        let twice = redact_url(&once);
        assert_eq!(once, twice);
    }
}
