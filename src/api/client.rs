use std::time::Duration;

/// Sent with every request; the synthesis service rejects empty agents
pub const USER_AGENT: &str = concat!("tts-speaker/", env!("CARGO_PKG_VERSION"));

/// Blocking agent with one overall deadline per request.
///
/// Non-2xx statuses come back as responses so callers can read error bodies.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Header value as text, if present and valid ASCII
pub fn header_str<'a, B>(response: &'a ureq::http::Response<B>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|h| h.to_str().ok())
}

pub fn content_length<B>(response: &ureq::http::Response<B>) -> Option<u64> {
    header_str(response, "content-length").and_then(|s| s.trim().parse::<u64>().ok())
}
