use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::request::Request;
use crate::response::BodylessStatuses;
use crate::router::Router;
use crate::sink::{ErrorSink, TracingSink};
use crate::static_files::{FileServer, StaticFiles};
use crate::{BuildError, DispatchError};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

const BUNDLED_PUBLIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/public");

pub struct ApplicationBuilder {
    router: Option<Router>,
    config: Option<Config>,
    static_files: Box<dyn StaticFiles>,
    error_sink: Box<dyn ErrorSink>,
    fallback_static_root: Option<PathBuf>,
    bodyless: BodylessStatuses,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self {
            router: None,
            config: None,
            static_files: Box::new(FileServer),
            error_sink: Box::new(TracingSink),
            fallback_static_root: Some(PathBuf::from(BUNDLED_PUBLIC_DIR)),
            bodyless: BodylessStatuses::new(),
        }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn static_files(mut self, static_files: impl StaticFiles + 'static) -> Self {
        self.static_files = Box::new(static_files);
        self
    }

    pub fn error_sink(mut self, error_sink: impl ErrorSink + 'static) -> Self {
        self.error_sink = Box::new(error_sink);
        self
    }

    /// Directory searched for static files after `public_dir`; `None` disables it.
    pub fn fallback_static_root(mut self, root: Option<PathBuf>) -> Self {
        self.fallback_static_root = root;
        self
    }

    pub fn bodyless_statuses(mut self, bodyless: BodylessStatuses) -> Self {
        self.bodyless = bodyless;
        self
    }

    pub fn build(self) -> Result<Application, BuildError> {
        let router = self.router.ok_or(BuildError::MissingRouter)?;
        let config = self.config.unwrap_or_default();
        debug!(routes = router.routes().len(), environment = config.environment(), "application built");
        Ok(Application {
            router,
            config,
            static_files: self.static_files,
            error_sink: self.error_sink,
            fallback_static_root: self.fallback_static_root,
            bodyless: self.bodyless,
        })
    }
}

/// Everything shared by the requests of one application. Read-only once built.
pub struct Application {
    router: Router,
    config: Config,
    static_files: Box<dyn StaticFiles>,
    error_sink: Box<dyn ErrorSink>,
    fallback_static_root: Option<PathBuf>,
    bodyless: BodylessStatuses,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Dispatches one request.
    pub fn call(&self, request: Request) -> Result<http::Response<Bytes>, DispatchError> {
        Dispatcher::new(self, request).run()
    }

    pub fn handle<B: AsRef<[u8]>>(&self, request: http::Request<B>) -> Result<http::Response<Bytes>, DispatchError> {
        self.call(Request::from_http(request))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn static_files(&self) -> &dyn StaticFiles {
        self.static_files.as_ref()
    }

    pub fn error_sink(&self) -> &dyn ErrorSink {
        self.error_sink.as_ref()
    }

    pub fn fallback_static_root(&self) -> Option<&Path> {
        self.fallback_static_root.as_deref()
    }

    pub fn bodyless_statuses(&self) -> &BodylessStatuses {
        &self.bodyless
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("router", &self.router)
            .field("config", &self.config)
            .field("fallback_static_root", &self.fallback_static_root)
            .field("bodyless", &self.bodyless)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("router", &self.router)
            .field("fallback_static_root", &self.fallback_static_root)
            .finish_non_exhaustive()
    }
}
