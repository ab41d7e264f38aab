use bytes::Bytes;

/// The maximum content length for which we'll capture a request body as
/// trace metadata. Anything larger is still traced but the body is not
/// captured.
pub const MAX_CONTENT_LENGTH: usize = 1 << 16;

/// Return the body as text if it is eligible for capture.
///
/// A body qualifies only when it is non-empty, strictly under
/// [`MAX_CONTENT_LENGTH`], and valid UTF-8.
pub fn capture_body(body: &Bytes) -> Option<&str> {
    if body.is_empty() || body.len() >= MAX_CONTENT_LENGTH {
        return None;
    }
    std::str::from_utf8(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_body_is_captured() {
        let body = Bytes::from_static(b"{\"query\":\"all\"}");
        assert_eq!(capture_body(&body), Some("{\"query\":\"all\"}"));
    }

    #[test]
    fn body_at_ceiling_is_not_captured() {
        let body = Bytes::from(vec![b'a'; MAX_CONTENT_LENGTH]);
        assert_eq!(capture_body(&body), None);
    }

    #[test]
    fn body_just_under_ceiling_is_captured() {
        let body = Bytes::from(vec![b'a'; MAX_CONTENT_LENGTH - 1]);
        assert_eq!(capture_body(&body).map(str::len), Some(MAX_CONTENT_LENGTH - 1));
    }

    #[test]
    fn binary_body_is_not_captured() {
        let body = Bytes::from_static(&[0xff, 0xfe, 0x00]);
        assert_eq!(capture_body(&body), None);
    }

    #[test]
    fn empty_body_is_not_captured() {
        assert_eq!(capture_body(&Bytes::new()), None);
    }
}
