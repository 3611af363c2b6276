/// Endpoint name recorded when the caller does not supply one.
pub const UNKNOWN_ENDPOINT: &str = "unknown";

pub fn normalize_endpoint(endpoint: Option<String>) -> String {
    match endpoint {
        Some(endpoint) if !endpoint.is_empty() => endpoint,
        _ => UNKNOWN_ENDPOINT.to_string(),
    }
}

/// Empty fingerprints count as absent.
pub fn normalize_fingerprint(fingerprint: Option<String>) -> Option<String> {
    fingerprint.filter(|fp| !fp.is_empty())
}
