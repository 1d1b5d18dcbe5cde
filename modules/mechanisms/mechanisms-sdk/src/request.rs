//! Read-only view of the inbound request.

use bytes::Bytes;
use http::header::{COOKIE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde_json::{Map, Value, json};
use url::Url;

/// Where authentication data may be read from.
///
/// Header lookup is case-insensitive. Cookies are parsed from the `Cookie`
/// header(s).
pub trait AuthDataSource {
    fn header(&self, name: &str) -> Option<&str>;
    fn cookie(&self, name: &str) -> Option<&str>;
    fn query_parameter(&self, name: &str) -> Option<String>;
    fn body(&self) -> &[u8];
}

/// Inbound request as seen by mechanisms.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl Request {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Appends a header, following `http::request::Builder::header`.
    ///
    /// # Errors
    /// Returns an error if the name or value is not a valid header token.
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Result<Self, http::Error>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(Into::into)?;
        let value = HeaderValue::try_from(value).map_err(Into::into)?;
        self.headers.append(name, value);
        Ok(self)
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request shape exposed to templates and expressions.
    ///
    /// Header names are lowercase; repeated headers are joined with `,`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut headers = Map::new();
        for name in self.headers.keys() {
            let joined = self
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect::<Vec<_>>()
                .join(",");
            headers.insert(name.as_str().to_owned(), Value::String(joined));
        }

        let mut query = Map::new();
        for (name, value) in self.url.query_pairs() {
            query
                .entry(name.into_owned())
                .or_insert_with(|| Value::String(value.into_owned()));
        }

        json!({
            "Method": self.method.as_str(),
            "URL": {
                "String": self.url.as_str(),
                "Scheme": self.url.scheme(),
                "Host": self.url.host_str().unwrap_or_default(),
                "Path": self.url.path(),
                "Query": query,
            },
            "Headers": headers,
        })
    }
}

impl AuthDataSource for Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find_map(|(k, v)| (k.trim() == name).then_some(v.trim()))
    }

    fn query_parameter(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find_map(|(k, v)| (k == name).then(|| v.into_owned()))
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new(
            Method::GET,
            Url::parse("https://api.example.com/orders?access_token=abc&page=2").unwrap(),
        )
        .with_header("Authorization", "Bearer xyz")
        .unwrap()
        .with_header("Cookie", "theme=dark; session=s3cr3t")
        .unwrap()
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request();
        assert_eq!(req.header("authorization"), Some("Bearer xyz"));
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer xyz"));
        assert_eq!(req.header("x-missing"), None);
    }

    #[test]
    fn cookie_is_parsed_from_cookie_header() {
        let req = request();
        assert_eq!(req.cookie("session"), Some("s3cr3t"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    fn query_parameter_is_decoded() {
        let req = request();
        assert_eq!(req.query_parameter("access_token").as_deref(), Some("abc"));
        assert_eq!(req.query_parameter("nope"), None);
    }

    #[test]
    fn template_view_exposes_method_url_and_headers() {
        let view = request().to_value();
        assert_eq!(view["Method"], "GET");
        assert_eq!(view["URL"]["Host"], "api.example.com");
        assert_eq!(view["URL"]["Path"], "/orders");
        assert_eq!(view["URL"]["Query"]["page"], "2");
        assert_eq!(view["Headers"]["authorization"], "Bearer xyz");
    }

    #[test]
    fn invalid_header_is_rejected() {
        let result = Request::new(Method::GET, Url::parse("http://localhost/").unwrap())
            .with_header("bad header", "v");
        assert!(result.is_err());
    }
}
