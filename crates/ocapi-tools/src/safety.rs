//! Redaction helpers for outbound HTTP errors.

use url::Url;

/// `url` without userinfo, query or fragment.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

/// Render a `reqwest` error with its URL redacted.
///
/// Tokens are sent as headers or form bodies, never in URLs, but query strings may still carry
/// caller-supplied filter values.
#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_credentials_and_query() {
        let url = Url::parse("https://user:pw@example.com/s/-/dw/data/v24_5/catalogs?select=(**)#x")
            .expect("url");
        assert_eq!(
            redact_url(&url),
            "https://example.com/s/-/dw/data/v24_5/catalogs"
        );
    }

    #[tokio::test]
    async fn transport_errors_are_redacted() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let err = reqwest::Client::new()
            .get(format!("http://127.0.0.1:{port}/catalogs?client_secret=hunter2"))
            .send()
            .await
            .unwrap_err();
        let msg = sanitize_reqwest_error(&err);
        assert!(!msg.contains("hunter2"), "{msg}");
    }
}
