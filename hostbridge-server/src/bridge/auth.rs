//! Bearer token check for bridge endpoints

use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;

use crate::broker::BrokerError;

/// Require `Authorization: Bearer <expected>`
pub fn authorize(headers: &HeaderMap, expected: &str) -> Result<(), BrokerError> {
    match bearer_token(headers) {
        Some(token) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(BrokerError::Auth),
    }
}

/// Extract the token from a well-formed bearer header
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let mut parts = raw.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if !scheme.eq_ignore_ascii_case("bearer") || parts.next().is_some() {
        return None;
    }
    Some(token)
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(left: &str, right: &str) -> bool {
    let left = left.as_bytes();
    let right = right.as_bytes();
    let max_len = left.len().max(right.len());

    let mut diff = left.len() ^ right.len();
    for index in 0..max_len {
        let l = left.get(index).copied().unwrap_or(0);
        let r = right.get(index).copied().unwrap_or(0);
        diff |= (l ^ r) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret-token", "secret-token"));
        assert!(!constant_time_eq("secret-token", "secret-tok3n"));
        assert!(!constant_time_eq("secret-token", "secret-token-extra"));
        assert!(!constant_time_eq("", "x"));
    }

    #[test]
    fn test_authorize_accepts_bearer() {
        assert!(authorize(&headers("Bearer s3cret"), "s3cret").is_ok());
        assert!(authorize(&headers("bearer s3cret"), "s3cret").is_ok());
    }

    #[test]
    fn test_authorize_rejects() {
        assert_eq!(authorize(&HeaderMap::new(), "s3cret"), Err(BrokerError::Auth));
        assert_eq!(authorize(&headers("Bearer wrong"), "s3cret"), Err(BrokerError::Auth));
        assert_eq!(authorize(&headers("Basic s3cret"), "s3cret"), Err(BrokerError::Auth));
        assert_eq!(authorize(&headers("Bearer s3cret x"), "s3cret"), Err(BrokerError::Auth));
        assert_eq!(authorize(&headers("Bearer"), "s3cret"), Err(BrokerError::Auth));
    }
}
