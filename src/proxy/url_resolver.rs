//! Target URL resolution and path handling for proxied requests

use crate::proxy::headers::paths;
use crate::proxy::types::*;
use hyper::Uri;

/// Combines an upstream base with the inbound request path
pub struct UrlResolver;

impl UrlResolver {
    /// Resolve the final URI for the outgoing request
    ///
    /// - If the base carries a path, it is kept and the inbound path is
    ///   appended to it (`https://host/openai` + `/v1/chat`)
    /// - Query strings of the inbound request are preserved
    pub fn resolve_target_uri(base: &TargetUrl, path_and_query: &str) -> ProxyResult<Uri> {
        let path_and_query = if path_and_query.is_empty() {
            paths::DEFAULT
        } else {
            path_and_query
        };

        let final_uri_str = format!("{}{}", base.as_ref().trim_end_matches('/'), path_and_query);

        final_uri_str
            .parse()
            .map_err(|_| ProxyError::InvalidTargetUrl(final_uri_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> TargetUrl {
        TargetUrl::try_new(url.to_string()).unwrap()
    }

    #[test]
    fn test_resolve_target_uri_base_url_with_path() {
        let resolved = UrlResolver::resolve_target_uri(
            &base("https://api.example.com"),
            "/users/123?param=value",
        )
        .unwrap();
        assert_eq!(
            resolved.to_string(),
            "https://api.example.com/users/123?param=value"
        );
    }

    #[test]
    fn test_resolve_target_uri_keeps_base_path() {
        let resolved = UrlResolver::resolve_target_uri(
            &base("https://gateway.example.com/openai"),
            "/v1/chat/completions",
        )
        .unwrap();
        assert_eq!(
            resolved.to_string(),
            "https://gateway.example.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_resolve_target_uri_with_trailing_slash() {
        let resolved =
            UrlResolver::resolve_target_uri(&base("https://api.example.com/"), "/users/123")
                .unwrap();
        assert_eq!(resolved.to_string(), "https://api.example.com/users/123");
    }

    #[test]
    fn test_resolve_target_uri_root_path() {
        let resolved =
            UrlResolver::resolve_target_uri(&base("https://api.example.com"), "").unwrap();
        assert_eq!(resolved.to_string(), "https://api.example.com/");
    }

    #[test]
    fn test_resolve_target_uri_rejects_garbage() {
        let result =
            UrlResolver::resolve_target_uri(&base("https://api.example.com"), "/a b");
        assert!(matches!(result, Err(ProxyError::InvalidTargetUrl(_))));
    }
}
