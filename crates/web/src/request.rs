//! The per-request snapshot handed to handlers.
//!
//! A [`Request`] is an owned, read-only view of one incoming request as
//! exposed by the host engine: method, path, headers, the collected
//! body bytes, and any [`PathParams`] extracted by the multiplexer from
//! `{name}` pattern segments. Handlers receive it by value and never
//! observe it change; the only rewrites (prefix stripping, parameter
//! injection) happen inside the routing layer before the handler runs.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// A read-only snapshot of one incoming HTTP request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    path: String,
    headers: HeaderMap,
    body: Bytes,
    params: PathParams,
}

impl Request {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let path = uri.path().to_string();
        Self { method, uri, path, headers, body, params: PathParams::empty() }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The path the routing layer matches against. Starts out as the
    /// request-target path and shrinks when a linked router strips its
    /// mount prefix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full original URI, query string included. Unlike
    /// [`Request::path`], this is never rewritten.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Parameters captured from `{name}` segments of the matched
    /// pattern.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
    }

    pub(crate) fn set_params(&mut self, params: PathParams) {
        self.params = params;
    }
}

/// Parameters extracted from the URL path of a request.
///
/// For a pattern `/users/{id}/`, a request for `/users/42/` yields a
/// single parameter `id` = `42`.
#[derive(Debug, Clone, Default)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    /// An instance with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a parameter by name, or `None` if the matched
    /// pattern did not capture it.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl From<matchit::Params<'_, '_>> for PathParams {
    fn from(params: matchit::Params<'_, '_>) -> Self {
        Self { params: params.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect() }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::str::FromStr;

    /// Builds a bare request for routing tests, mirroring what the
    /// engine glue constructs from a real connection.
    pub(crate) fn request(method: Method, path: &str) -> Request {
        let uri = Uri::from_str(path).expect("test path should be a valid uri");
        Request::new(method, uri, HeaderMap::new(), Bytes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::request;
    use super::*;

    #[test]
    fn request_exposes_the_engine_view() {
        let req = request(Method::GET, "/users/42/?verbose=1");
        assert_eq!(req.method(), &Method::GET);
        assert_eq!(req.path(), "/users/42/");
        assert_eq!(req.uri().query(), Some("verbose=1"));
        assert!(req.params().is_empty());
    }

    #[test]
    fn path_rewrite_keeps_the_original_uri() {
        let mut req = request(Method::GET, "/api/users/");
        req.set_path("/users/".to_string());
        assert_eq!(req.path(), "/users/");
        assert_eq!(req.uri().path(), "/api/users/");
    }

    #[test]
    fn params_lookup_by_name() {
        let mut router = matchit::Router::new();
        router.insert("/users/{id}/", ()).expect("pattern should insert");
        let matched = router.at("/users/42/").expect("path should match");
        let params = PathParams::from(matched.params);

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("name"), None);
    }
}
