use crate::constants::DEFAULT_STORE_PORT;

/// Appends the default store port to every endpoint that lacks one.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port`, bare IPv6 literals and
/// any of those behind a `scheme://` prefix.
pub fn fill_addresses_port(endpoints: &[String]) -> Vec<String> {
    endpoints
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .map(fill_port)
        .collect()
}

fn fill_port(endpoint: &str) -> String {
    let (scheme, host) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, endpoint),
    };

    let filled = if has_port(host) {
        host.to_string()
    } else if host.starts_with('[') {
        format!("{host}:{DEFAULT_STORE_PORT}")
    } else if host.contains(':') {
        // bare IPv6 literal
        format!("[{host}]:{DEFAULT_STORE_PORT}")
    } else {
        format!("{host}:{DEFAULT_STORE_PORT}")
    };

    match scheme {
        Some(scheme) => format!("{scheme}://{filled}"),
        None => filled,
    }
}

fn has_port(host: &str) -> bool {
    let port = if host.starts_with('[') {
        match host.split_once("]:") {
            Some((_, port)) => port,
            None => return false,
        }
    } else {
        match host.split_once(':') {
            Some((_, port)) if !port.contains(':') => port,
            _ => return false,
        }
    };
    port.parse::<u16>().is_ok()
}
