//! Serving files from a directory before routing takes place.

use crate::request::Request;
use crate::response::Response;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};
use mime::Mime;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Answers a request from files under `root`.
///
/// Returns `true` when the request was fully handled and the response is complete, `false`
/// to let dispatching continue.
#[cfg_attr(test, mockall::automock)]
pub trait StaticFiles: Send + Sync {
    fn serve(&self, root: &Path, request: &Request, response: &mut Response) -> bool;
}

/// Plain file system lookup for `GET` and `HEAD` requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileServer;

impl StaticFiles for FileServer {
    fn serve(&self, root: &Path, request: &Request, response: &mut Response) -> bool {
        let method = request.method();
        if method != Method::GET && method != Method::HEAD {
            return false;
        }
        let Some(path) = resolve(root, request.path_parts()) else {
            return false;
        };
        if !path.is_file() {
            return false;
        }

        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(cause = %e, path = %path.display(), "failed to read static file");
                return false;
            }
        };
        trace!(path = %path.display(), "serve static file");

        response.set_status(StatusCode::OK);
        if let Ok(content_type) = HeaderValue::from_str(mime_for(&path).as_ref()) {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        if method == Method::GET {
            response.write(content);
        }
        true
    }
}

/// Joins decoded path parts onto `root`, refusing anything that could leave it.
fn resolve(root: &Path, path_parts: &[String]) -> Option<PathBuf> {
    if path_parts.is_empty() {
        return None;
    }
    let mut path = root.to_path_buf();
    for part in path_parts {
        let part = urlencoding::decode(part).ok()?;
        if part == "." || part == ".." || part.contains(['/', '\\']) {
            return None;
        }
        path.push(&*part);
    }
    Some(path)
}

pub(crate) fn mime_for(path: &Path) -> Mime {
    let extension = path.extension().and_then(|extension| extension.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("svg") => mime::IMAGE_SVG,
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        Some("pdf") => mime::APPLICATION_PDF,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
