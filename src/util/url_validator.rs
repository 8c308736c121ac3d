use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur while validating the admin API base URL.
///
/// The admin key is attached to every request, so the base URL is checked
/// before the client is built rather than on first use.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("Base URL has no host")]
    MissingHost,
    /// Query strings and fragments cannot be combined with API paths.
    #[error("Base URL must not contain a query string or fragment")]
    UnexpectedSuffix,
    /// Plain HTTP towards a host outside the local network would expose the key.
    #[error("Insecure base URL: HTTPS required for non-local host {0}")]
    InsecureRemote(String),
}

/// Validates the base URL of the proxy admin service.
///
/// Accepts `https://` for any host. Plain `http://` is accepted only for
/// `localhost`, loopback, and private-network addresses, which is where the
/// proxy normally runs next to the operator.
///
/// # Examples
///
/// ```
/// use proxydash::util::validate_base_url;
///
/// assert!(validate_base_url("https://proxy.example.com").is_ok());
/// assert!(validate_base_url("http://192.168.1.20:3000").is_ok());
///
/// // Remote host over plain HTTP is rejected
/// assert!(validate_base_url("http://proxy.example.com").is_err());
///
/// // Non-HTTP schemes are rejected
/// assert!(validate_base_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_base_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    };

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;

    if url.query().is_some() || url.fragment().is_some() {
        return Err(UrlValidationError::UnexpectedSuffix);
    }

    if !secure && !is_local_host(host) {
        return Err(UrlValidationError::InsecureRemote(host.to_owned()));
    }

    Ok(url)
}

fn is_local_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    match host_for_parse.parse::<IpAddr>() {
        Ok(IpAddr::V4(ipv4)) => ipv4.is_loopback() || ipv4.is_private() || ipv4.is_link_local(),
        Ok(IpAddr::V6(ipv6)) => {
            let segments = ipv6.segments();
            // fc00::/7 unique local, fe80::/10 link local
            ipv6.is_loopback()
                || (segments[0] & 0xfe00) == 0xfc00
                || (segments[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_any_host_accepted() {
        assert!(validate_base_url("https://proxy.example.com").is_ok());
        assert!(validate_base_url("https://proxy.example.com:8443/").is_ok());
    }

    #[test]
    fn test_http_local_hosts_accepted() {
        assert!(validate_base_url("http://localhost:3000").is_ok());
        assert!(validate_base_url("http://127.0.0.1:3000").is_ok());
        assert!(validate_base_url("http://10.0.0.5").is_ok());
        assert!(validate_base_url("http://[::1]:3000").is_ok());
        assert!(validate_base_url("http://[fd00::1]").is_ok());
    }

    #[test]
    fn test_http_remote_host_rejected() {
        let err = validate_base_url("http://proxy.example.com").unwrap_err();
        assert!(matches!(err, UrlValidationError::InsecureRemote(_)));

        let err = validate_base_url("http://8.8.8.8:3000").unwrap_err();
        assert!(matches!(err, UrlValidationError::InsecureRemote(_)));
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_base_url("ftp://localhost").unwrap_err(),
            UrlValidationError::UnsupportedScheme(_)
        ));
        assert!(validate_base_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn test_query_and_fragment_rejected() {
        assert!(matches!(
            validate_base_url("http://localhost:3000/?x=1").unwrap_err(),
            UrlValidationError::UnexpectedSuffix
        ));
        assert!(validate_base_url("http://localhost:3000/#top").is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_base_url("not a url").unwrap_err(),
            UrlValidationError::InvalidUrl(_)
        ));
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        let url = validate_base_url("  http://localhost:3000  ").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
    }
}
