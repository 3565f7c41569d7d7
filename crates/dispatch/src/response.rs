use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};

/// Response under construction for one request.
///
/// Static-file serving writes into it directly; the dispatcher's body buffer is appended
/// when the response is finished.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl Default for Response {
    fn default() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: BytesMut::new() }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write<B: AsRef<[u8]>>(&mut self, chunk: B) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    /// Turns the accumulated state into the response handed to the transport.
    ///
    /// Statuses that carry no entity lose body, `Content-Type` and `Content-Length`; every
    /// other response gets a `Content-Length` and defaults to `text/html`.
    pub(crate) fn finish(mut self, bodyless: &BodylessStatuses) -> http::Response<Bytes> {
        if bodyless.contains(self.status) {
            self.body.clear();
            self.headers.remove(CONTENT_TYPE);
            self.headers.remove(CONTENT_LENGTH);
        } else {
            if !self.headers.contains_key(CONTENT_TYPE)
                && let Ok(content_type) = HeaderValue::from_str(mime::TEXT_HTML_UTF_8.as_ref())
            {
                self.headers.insert(CONTENT_TYPE, content_type);
            }
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }

        let mut response = http::Response::new(self.body.freeze());
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Statuses whose responses must not carry an entity body.
///
/// Informational statuses, `204 No Content` and `304 Not Modified` always belong to the set.
#[derive(Debug, Clone, Default)]
pub struct BodylessStatuses {
    extra: Vec<StatusCode>,
}

impl BodylessStatuses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, status: StatusCode) -> Self {
        if !self.contains(status) {
            self.extra.push(status);
        }
        self
    }

    pub fn contains(&self, status: StatusCode) -> bool {
        status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || self.extra.contains(&status)
    }
}

#[cfg(test)]
mod tests {
    use super::{BodylessStatuses, Response};
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use http::{HeaderValue, StatusCode};

    #[test]
    fn test_bodyless_statuses() {
        let statuses = BodylessStatuses::new();
        assert!(statuses.contains(StatusCode::CONTINUE));
        assert!(statuses.contains(StatusCode::NO_CONTENT));
        assert!(statuses.contains(StatusCode::NOT_MODIFIED));
        assert!(!statuses.contains(StatusCode::NOT_FOUND));
        assert!(statuses.with(StatusCode::NOT_FOUND).contains(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_finish_with_body() {
        let mut response = Response::new();
        response.write("<h1>");
        response.write(b"hi</h1>");
        let response = response.finish(&BodylessStatuses::new());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(response.headers()[CONTENT_LENGTH], "11");
        assert_eq!(response.body().as_ref(), b"<h1>hi</h1>");
    }

    #[test]
    fn test_finish_keeps_content_type() {
        let mut response = Response::new();
        response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = response.finish(&BodylessStatuses::new());
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(response.headers()[CONTENT_LENGTH], "0");
    }

    #[test]
    fn test_finish_without_entity() {
        let mut response = Response::new();
        response.set_status(StatusCode::NO_CONTENT);
        response.write("ignored");
        let response = response.finish(&BodylessStatuses::new());

        assert!(response.body().is_empty());
        assert!(!response.headers().contains_key(CONTENT_TYPE));
        assert!(!response.headers().contains_key(CONTENT_LENGTH));
    }
}
