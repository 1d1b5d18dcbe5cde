use mechanisms_sdk::{AuthDataSource, MechanismError};

use super::AuthDataExtractStrategy;

/// Reads a header, stripping an optional prefix such as `Bearer `.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValueExtractStrategy {
    name: String,
    prefix: String,
}

impl HeaderValueExtractStrategy {
    #[must_use]
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: prefix.into(),
        }
    }
}

impl AuthDataExtractStrategy for HeaderValueExtractStrategy {
    fn get_auth_data(&self, source: &dyn AuthDataSource) -> Result<String, MechanismError> {
        match source.header(&self.name) {
            Some(value) if !value.is_empty() => {
                let value = value.strip_prefix(self.prefix.as_str()).unwrap_or(value);
                Ok(value.trim().to_owned())
            }
            _ => Err(MechanismError::NoAuthDataPresent),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use http::Method;
    use mechanisms_sdk::{ErrorKind, Request};
    use url::Url;

    use super::*;

    fn request_with(name: &str, value: &str) -> Request {
        Request::new(Method::GET, Url::parse("http://localhost/").unwrap())
            .with_header(name, value)
            .unwrap()
    }

    #[test]
    fn strips_prefix_and_whitespace() {
        let strategy = HeaderValueExtractStrategy::new("Authorization", "Bearer");
        let request = request_with("authorization", "Bearer   abc.def.ghi ");
        assert_eq!(strategy.get_auth_data(&request).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn value_without_prefix_is_returned_trimmed() {
        let strategy = HeaderValueExtractStrategy::new("X-Token", "Bearer ");
        let request = request_with("x-token", " raw ");
        assert_eq!(strategy.get_auth_data(&request).unwrap(), "raw");
    }

    #[test]
    fn absent_or_empty_header_is_no_auth_data() {
        let strategy = HeaderValueExtractStrategy::new("Authorization", "Bearer ");

        let request = Request::new(Method::GET, Url::parse("http://localhost/").unwrap());
        let err = strategy.get_auth_data(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAuthDataPresent);

        let request = request_with("authorization", "");
        let err = strategy.get_auth_data(&request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoAuthDataPresent);
    }
}
