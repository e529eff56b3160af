//! Cache key and storage path derivation.

use sha2::{Digest, Sha256};
use url::Url;

use crate::domain::RequestIdentity;

/// Tag appended to every hash so entries of this cache can be told apart in a shared store.
pub const HASH_SUFFIX: &str = ".cachify";

/// Hash a request identity into a flat-namespace key ending in [`HASH_SUFFIX`].
pub fn hash_identity(request: &RequestIdentity) -> String {
    let prefix = if request.https { "https-" } else { "" };
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b"//");
    hasher.update(request.host.as_bytes());
    hasher.update(request_path(&request.uri).as_bytes());

    let hash = hasher.finalize();
    format!("{}{}", hex::encode(&hash[..16]), HASH_SUFFIX)
}

/// Path component of an absolute URL or a request URI, without query or fragment.
pub fn request_path(uri: &str) -> String {
    let parsed = Url::parse("http://cachify.invalid/").and_then(|base| base.join(uri));
    match parsed {
        Ok(url) => url.path().to_string(),
        Err(_) => {
            let end = uri.find(['?', '#']).unwrap_or(uri.len());
            let path = &uri[..end];
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{}", path)
            }
        }
    }
}

/// Hierarchical storage path `host + path + "/"` for path-addressed backends.
///
/// `path` overrides the request URI, e.g. a permalink whose entry is being deleted
/// from outside its own request.
pub fn derive_path(request: &RequestIdentity, path: Option<&str>) -> String {
    let path = request_path(path.unwrap_or(&request.uri));
    trailing_slash(&format!("{}{}", request.host, path))
}

fn trailing_slash(value: &str) -> String {
    format!("{}/", value.trim_end_matches(['/', '\\']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_path_strips_query_and_fragment() {
        assert_eq!(request_path("/blog/post?page=2#top"), "/blog/post");
        assert_eq!(request_path("/"), "/");
        assert_eq!(request_path(""), "/");
    }

    #[test]
    fn test_request_path_from_absolute_url() {
        assert_eq!(request_path("https://example.com/shop/item/"), "/shop/item/");
        assert_eq!(request_path("http://example.com"), "/");
    }

    #[test]
    fn test_request_path_resolves_dot_segments() {
        assert_eq!(request_path("/a/../../etc/passwd"), "/etc/passwd");
    }

    #[test]
    fn test_derive_path_adds_single_trailing_slash() {
        let request = RequestIdentity::new("example.com", "/blog/post");
        assert_eq!(derive_path(&request, None), "example.com/blog/post/");

        let request = RequestIdentity::new("example.com", "/blog/post/");
        assert_eq!(derive_path(&request, None), "example.com/blog/post/");

        let request = RequestIdentity::new("example.com", "/");
        assert_eq!(derive_path(&request, None), "example.com/");
    }

    #[test]
    fn test_derive_path_override_keeps_request_host() {
        let request = RequestIdentity::new("example.com", "/wp-admin/post.php");
        assert_eq!(
            derive_path(&request, Some("https://example.com/hello-world/?preview=1")),
            "example.com/hello-world/"
        );
    }

    #[test]
    fn test_hash_ignores_query_and_separates_schemes() {
        let plain = RequestIdentity::new("example.com", "/post/");
        let query = RequestIdentity::new("example.com", "/post/?utm=x");
        let secure = RequestIdentity::new("example.com", "/post/").with_https(true);

        assert_eq!(hash_identity(&plain), hash_identity(&query));
        assert_ne!(hash_identity(&plain), hash_identity(&secure));
        assert_eq!(hash_identity(&plain).len(), 32 + HASH_SUFFIX.len());
    }
}
