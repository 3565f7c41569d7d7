//! The parsed request a dispatcher works on.
//!
//! The transport hands over method, URI and headers; query and form parameters, cookies
//! and path parts are derived once here and never changed afterwards.

use crate::route::path_parts;
use http::header::{CONTENT_TYPE, COOKIE, HOST};
use http::{HeaderMap, Method, Uri};
use std::collections::HashMap;
use tracing::warn;

/// Request parameters merged from query string, form body and bound path arguments.
pub type Params = HashMap<String, String>;

/// Session values supplied by the transport for the duration of one request.
pub type Session = HashMap<String, String>;

#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_parts: Vec<String>,
    params: Params,
    cookies: HashMap<String, String>,
    session: Session,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        let path_parts = path_parts(uri.path());
        let params = uri.query().map(parse_query).unwrap_or_default();
        Self { method, uri, headers: HeaderMap::new(), path_parts, params, cookies: HashMap::new(), session: Session::new() }
    }

    /// Reads method, URI, headers, cookies and parameters from an `http` request. An
    /// `application/x-www-form-urlencoded` body adds to the query parameters and wins on
    /// duplicate names.
    pub fn from_http<B: AsRef<[u8]>>(request: http::Request<B>) -> Self {
        let (parts, body) = request.into_parts();
        let mut req = Request::new(parts.method, parts.uri);
        req.cookies = parse_cookies(&parts.headers);

        let is_form = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok())
            .is_some_and(|content_type| content_type.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str());
        if is_form {
            match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body.as_ref()) {
                Ok(pairs) => req.params.extend(pairs),
                Err(e) => warn!(cause = %e, "ignore malformed form body"),
            }
        }

        req.headers = parts.headers;
        req
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        let is_cookie = name == COOKIE;
        self.headers.append(name, value);
        if is_cookie {
            self.cookies = parse_cookies(&self.headers);
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn path_parts(&self) -> &[String] {
        &self.path_parts
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// `scheme://host[:port]` this request was addressed to, when known
    pub fn base_url(&self) -> Option<String> {
        let scheme = self.uri.scheme_str().unwrap_or("http");
        let host = match self.uri.authority() {
            Some(authority) => authority.as_str().to_owned(),
            None => self.headers.get(HOST)?.to_str().ok()?.to_owned(),
        };
        Some(format!("{scheme}://{host}"))
    }

    pub(crate) fn take_session(&mut self) -> Session {
        std::mem::take(&mut self.session)
    }
}

fn parse_query(query: &str) -> Params {
    match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
        Ok(pairs) => pairs.into_iter().collect(),
        Err(e) => {
            warn!(cause = %e, query, "ignore malformed query string");
            Params::new()
        }
    }
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            let value = value.trim();
            (name.trim().to_owned(), urlencoding::decode(value).map_or_else(|_| value.to_owned(), |v| v.into_owned()))
        })
        .collect()
}
