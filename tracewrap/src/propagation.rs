use crate::error::InjectError;
use opentelemetry::propagation::{Extractor, Injector};

/// Injects propagation fields into an `http::HeaderMap`.
///
/// Unlike a plain header-map injector this one remembers the first field the
/// map could not encode, so callers can treat a lossy injection as an error
/// instead of silently sending an uncorrelatable request.
pub struct HeaderInjector<'a> {
    headers: &'a mut http::HeaderMap,
    failed: Option<String>,
}

impl<'a> HeaderInjector<'a> {
    pub fn new(headers: &'a mut http::HeaderMap) -> Self {
        HeaderInjector {
            headers,
            failed: None,
        }
    }

    /// Consume the injector, reporting the first field that failed to encode.
    pub fn into_result(self) -> Result<(), InjectError> {
        match self.failed {
            Some(field) => Err(InjectError { field }),
            None => Ok(()),
        }
    }
}

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let name = http::header::HeaderName::from_bytes(key.as_bytes());
        let value = http::header::HeaderValue::from_str(&value);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                if self.failed.is_none() {
                    self.failed = Some(key.to_string());
                }
            }
        }
    }
}

/// Extracts propagation fields from an `http::HeaderMap`.
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Get a value for a key from the HeaderMap. If the value is not valid
    /// ASCII, returns None.
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    /// Collect all the keys from the HeaderMap.
    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .map(|value| value.as_str())
            .collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_headers_get() {
        let mut carrier = http::HeaderMap::new();
        let mut injector = HeaderInjector::new(&mut carrier);
        injector.set("headerName", "value".to_string());
        assert!(injector.into_result().is_ok());

        assert_eq!(
            HeaderExtractor(&carrier).get("HEADERNAME"),
            Some("value"),
            "case insensitive extraction"
        )
    }

    #[test]
    fn http_headers_keys() {
        let mut carrier = http::HeaderMap::new();
        let mut injector = HeaderInjector::new(&mut carrier);
        injector.set("headerName1", "value1".to_string());
        injector.set("headerName2", "value2".to_string());
        assert!(injector.into_result().is_ok());

        let extractor = HeaderExtractor(&carrier);
        let got = extractor.keys();
        assert_eq!(got.len(), 2);
        assert!(got.contains(&"headername1"));
        assert!(got.contains(&"headername2"));
    }

    #[test]
    fn invalid_header_value_is_reported() {
        let mut carrier = http::HeaderMap::new();
        let mut injector = HeaderInjector::new(&mut carrier);
        injector.set("traceparent", "bad\nvalue".to_string());

        let err = injector.into_result().unwrap_err();
        assert_eq!(err.field, "traceparent");
        assert!(carrier.is_empty());
    }

    #[test]
    fn invalid_header_name_is_reported() {
        let mut carrier = http::HeaderMap::new();
        let mut injector = HeaderInjector::new(&mut carrier);
        injector.set("bad header", "value".to_string());

        let err = injector.into_result().unwrap_err();
        assert_eq!(err.field, "bad header");
    }

    #[test]
    fn first_failure_wins() {
        let mut carrier = http::HeaderMap::new();
        let mut injector = HeaderInjector::new(&mut carrier);
        injector.set("first", "bad\nvalue".to_string());
        injector.set("second", "also\nbad".to_string());

        let err = injector.into_result().unwrap_err();
        assert_eq!(err.field, "first");
    }
}
