use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT,
};

/// Desktop Firefox on Linux, as seen by a regular visitor
pub const PROBE_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:97.0) Gecko/20100101 Firefox/97.0";

/// Build the browser-like header set sent with every probe
///
/// Blocking middleboxes and bot filters treat bare HTTP clients differently
/// from browsers, so probes look like a top-level navigation from a
/// Russian-speaking desktop browser.
///
/// # Examples
///
/// ```
/// use blockwatch::probe::headers::build_probe_headers;
///
/// let headers = build_probe_headers();
/// assert!(headers.contains_key("sec-fetch-mode"));
/// ```
pub fn build_probe_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(USER_AGENT, HeaderValue::from_static(PROBE_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3"),
    );

    // Fetch metadata of a top-level navigation
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("cross-site"),
    );

    headers
}
