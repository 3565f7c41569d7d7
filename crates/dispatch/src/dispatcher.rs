//! Request dispatch: static files first, then the routing table, then a 404.
//!
//! One [`Dispatcher`] serves exactly one request. Actions reach the request and the
//! response under construction through it, and end the request early with
//! [`Dispatcher::halt`].

use crate::application::Application;
use crate::config::Config;
use crate::controller::ControllerInstance;
use crate::cookies::Cookies;
use crate::interrupt::{ActionError, ActionResult, Halt, Interrupt};
use crate::request::{Params, Request, Session};
use crate::response::Response;
use crate::route::{Arguments, Route};
use crate::static_files::mime_for;
use crate::{Controller, DispatchError};
use bytes::Bytes;
use chrono::Local;
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::backtrace::BacktraceStatus;
use std::path::Path;
use tracing::trace;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Init,
    Matching,
    Executing,
    Halted,
    Completed,
    Finalized,
}

pub struct Dispatcher<'app> {
    app: &'app Application,
    request: Request,
    response: Response,
    body: String,
    params: Option<Params>,
    session: Session,
    cookies: Cookies,
    state: DispatchState,
}

impl<'app> Dispatcher<'app> {
    pub fn new(app: &'app Application, mut request: Request) -> Self {
        let session = request.take_session();
        let cookies = Cookies::new(request.cookies().clone());
        Self {
            app,
            request,
            response: Response::new(),
            body: String::new(),
            params: None,
            session,
            cookies,
            state: DispatchState::Init,
        }
    }

    /// Handles the request and returns the finished response.
    ///
    /// Fails only when an action's error could not be recovered from, or when an action asked
    /// for a path to a route that doesn't exist.
    pub fn run(mut self) -> Result<http::Response<Bytes>, DispatchError> {
        self.transition(DispatchState::Matching);
        match self.dispatch() {
            Ok(()) => self.transition(DispatchState::Completed),
            Err(Interrupt::Halt) => {}
            Err(Interrupt::Failure(error)) => return Err(DispatchError::Unrecovered(error)),
            Err(Interrupt::Fatal(error)) => return Err(error.into()),
        }
        Ok(self.finish())
    }

    fn dispatch(&mut self) -> ActionResult<()> {
        if self.try_static_files() {
            return Ok(());
        }

        let app = self.app;
        match app.router().find_route(self.request.method(), self.request.path_parts()) {
            Some((route, arguments)) => self.execute_route(route, arguments),
            None => self.halt(StatusCode::NOT_FOUND),
        }
    }

    fn try_static_files(&mut self) -> bool {
        let app = self.app;
        let public_dir = app.config().get_path("public_dir");
        let roots = public_dir.as_deref().into_iter().chain(app.fallback_static_root());
        for root in roots {
            if app.static_files().serve(root, &self.request, &mut self.response) {
                trace!(root = %root.display(), path = self.request.path(), "served static file");
                return true;
            }
        }
        false
    }

    fn execute_route(&mut self, route: &'app Route, arguments: Arguments) -> ActionResult<()> {
        self.transition(DispatchState::Executing);
        trace!(route = %route, "execute route");
        self.set_status(StatusCode::OK);
        self.params_mut().extend(arguments);

        let args = self.select_args(route);
        let mut controller = route.target().instantiate(self);
        match controller.invoke(self, route.action(), &args) {
            Ok(Some(body)) => {
                self.body = body;
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(Interrupt::Failure(error)) => self.recover(&mut *controller, &error),
            Err(interrupt) => Err(interrupt),
        }
    }

    fn recover(&mut self, controller: &mut dyn ControllerInstance, error: &ActionError) -> ActionResult<()> {
        self.dump_error(error);
        self.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        controller.server_error(self, error)
    }

    /// Required parameters in declared order, then the optional ones that are present.
    fn select_args(&mut self, route: &Route) -> Vec<String> {
        let signature = route.signature();
        let params = self.params();
        let required = signature.required().iter().map(|name| params.get(*name).cloned().unwrap_or_default());
        let optional = signature.optional().iter().filter_map(|name| params.get(*name).cloned());
        required.chain(optional).collect()
    }

    /// Ends the request with the changes in `halt` applied to the response.
    ///
    /// Returns `Err(Interrupt::Halt)` for the caller to propagate with `?`. When neither the
    /// halt nor earlier code supplied a body, the default body of the nearest route is used.
    pub fn halt<T>(&mut self, halt: impl Into<Halt>) -> ActionResult<T> {
        let Halt { status, body, headers } = halt.into();
        if let Some(status) = status {
            self.set_status(status);
        }
        match body {
            Some(body) => self.body = body,
            None if self.body.is_empty() => self.body = self.default_body_of_nearest_route()?,
            None => {}
        }
        self.response.headers_mut().extend(headers);
        self.transition(DispatchState::Halted);
        Err(Interrupt::Halt)
    }

    fn default_body_of_nearest_route(&mut self) -> ActionResult<String> {
        if self.app.bodyless_statuses().contains(self.status()) {
            return Ok(String::new());
        }

        let app = self.app;
        let Some(route) = app.router().find_nearest_route(self.request.path_parts()) else {
            return Ok(self.default_body());
        };
        trace!(route = %route, "default body from nearest route");
        let mut controller = route.target().instantiate(self);
        let body = controller.default_body(self)?;
        Ok(body.unwrap_or_else(|| self.default_body()))
    }

    /// Generic body naming the current status.
    pub fn default_body(&self) -> String {
        format!("<h1>{}</h1>", self.status().canonical_reason().unwrap_or_default())
    }

    /// Reports a failed action with a timestamp, its classification and backtrace.
    pub fn dump_error(&self, error: &ActionError) {
        let mut message =
            format!("{} - {} - {}:", Local::now().format("%Y-%m-%d %H:%M:%S"), error.kind(), error.source());
        if error.backtrace().status() == BacktraceStatus::Captured {
            for frame in error.backtrace().to_string().lines() {
                message.push_str("\n\t");
                message.push_str(frame.trim());
            }
        }
        self.app.error_sink().report(&message);
    }

    fn finish(mut self) -> http::Response<Bytes> {
        self.response.write(std::mem::take(&mut self.body));
        self.cookies.write_to(self.response.headers_mut());
        let mut response = self.response.finish(self.app.bodyless_statuses());
        response.extensions_mut().insert(self.session);

        trace!(from = ?self.state, to = ?DispatchState::Finalized, status = %response.status(), "dispatcher state");
        response
    }

    fn transition(&mut self, state: DispatchState) {
        trace!(from = ?self.state, to = ?state, "dispatcher state");
        self.state = state;
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// A `404` also marks the response with `X-Cascade: pass` for an outer handler to pick up.
    pub fn set_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
        if status == StatusCode::NOT_FOUND {
            self.response.headers_mut().insert(HeaderName::from_static("x-cascade"), HeaderValue::from_static("pass"));
        }
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn set_body<S: Into<String>>(&mut self, body: S) {
        self.body = body.into();
    }

    /// Request parameters merged with the arguments bound by the matched route.
    pub fn params(&mut self) -> &Params {
        self.params_mut()
    }

    pub fn params_mut(&mut self) -> &mut Params {
        let request = &self.request;
        self.params.get_or_insert_with(|| request.params().clone())
    }

    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    pub fn cookies_mut(&mut self) -> &mut Cookies {
        &mut self.cookies
    }

    pub fn config(&self) -> &'app Config {
        self.app.config()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    /// Path to `action` of controller `C`; a missing route aborts the request.
    pub fn path_to<C: Controller>(&self, action: &str, args: &[(&str, &str)]) -> ActionResult<String> {
        self.app.router().path_to::<C>(action, args).map_err(Interrupt::Fatal)
    }

    /// Like [`path_to`](Self::path_to), prefixed with the scheme and host of the request when known.
    pub fn url_to<C: Controller>(&self, action: &str, args: &[(&str, &str)]) -> ActionResult<String> {
        let path = self.path_to::<C>(action, args)?;
        Ok(match self.request.base_url() {
            Some(base) => format!("{base}{path}"),
            None => path,
        })
    }

    pub fn redirect(&mut self, location: &str) -> ActionResult<()> {
        let location = HeaderValue::from_str(location)?;
        self.set_status(StatusCode::FOUND);
        self.response.headers_mut().insert(LOCATION, location);
        Ok(())
    }

    pub fn redirect_to<C: Controller>(&mut self, action: &str, args: &[(&str, &str)]) -> ActionResult<()> {
        let path = self.path_to::<C>(action, args)?;
        self.redirect(&path)
    }

    /// Marks the response as a download named `filename`, typed after its extension if known.
    pub fn attachment(&mut self, filename: &str) -> ActionResult<()> {
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))?;
        self.response.headers_mut().insert(CONTENT_DISPOSITION, disposition);

        let path = Path::new(filename);
        if path.extension().is_some() {
            let content_type = HeaderValue::from_str(mime_for(path).as_ref())?;
            self.response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("state", &self.state)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::DispatchState;
    use crate::response::BodylessStatuses;
    use crate::router::Mount;
    use crate::sink::MockErrorSink;
    use crate::static_files::MockStaticFiles;
    use crate::{
        Action, ActionError, ActionReply, ActionResult, Application, Config, Controller, DispatchError, Dispatcher, Halt,
        Request, Router,
    };
    use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION, SET_COOKIE};
    use http::{HeaderName, HeaderValue, Method, StatusCode, Uri};
    use std::collections::HashMap;
    use std::io;

    struct ArticlesController;

    impl ArticlesController {
        fn index(&mut self, _dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
            match args {
                [page] => Ok(Some(format!("articles, page {page}"))),
                _ => Ok(Some("articles".into())),
            }
        }

        fn show(&mut self, dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
            if args[0] == "0" {
                return dispatcher.halt(StatusCode::NOT_FOUND);
            }
            let sort = dispatcher.params().get("sort").cloned().unwrap_or_default();
            Ok(Some(format!("article {} {sort} {:?}", args[0], dispatcher.state())))
        }

        fn create(&mut self, _dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only storage").into())
        }

        fn secret(&mut self, dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            require_admin(dispatcher)?;
            Ok(Some("secret".into()))
        }

        fn moved(&mut self, dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            dispatcher.redirect_to::<ArticlesController>("show", &[("id", "7")])?;
            Ok(None)
        }

        fn broken_link(&mut self, dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            let path = dispatcher.path_to::<ArticlesController>("archive", &[])?;
            Ok(Some(path))
        }

        fn export(&mut self, dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            dispatcher.attachment("articles.json")?;
            dispatcher.cookies_mut().set("exported", "yes");
            let url = dispatcher.url_to::<ArticlesController>("index", &[("page", "2"), ("sort", "asc")])?;
            Ok(Some(url))
        }
    }

    fn require_admin(dispatcher: &mut Dispatcher<'_>) -> ActionResult<()> {
        if dispatcher.session().get("role").map(String::as_str) != Some("admin") {
            let realm = HeaderValue::from_static("admin");
            return dispatcher.halt(
                Halt::new().status(StatusCode::FORBIDDEN).header(HeaderName::from_static("x-realm"), realm),
            );
        }
        Ok(())
    }

    impl Controller for ArticlesController {
        fn name() -> &'static str {
            "ArticlesController"
        }

        fn new(_dispatcher: &Dispatcher<'_>) -> Self {
            ArticlesController
        }

        fn actions() -> Vec<Action<Self>> {
            vec![
                Action::new("index", Self::index).optional(&["page"]),
                Action::new("show", Self::show).required(&["id"]),
                Action::new("create", Self::create),
                Action::new("secret", Self::secret),
                Action::new("moved", Self::moved),
                Action::new("broken_link", Self::broken_link),
                Action::new("export", Self::export),
            ]
        }

        fn server_error(&mut self, dispatcher: &mut Dispatcher<'_>, error: &ActionError) -> ActionResult<()> {
            dispatcher.set_body(format!("sorry: {}", error.source()));
            Ok(())
        }

        fn default_body(&mut self, _dispatcher: &mut Dispatcher<'_>) -> ActionReply {
            Ok(Some("<p>no such article</p>".into()))
        }
    }

    struct FragileController;

    impl Controller for FragileController {
        fn name() -> &'static str {
            "FragileController"
        }

        fn new(_dispatcher: &Dispatcher<'_>) -> Self {
            FragileController
        }

        fn actions() -> Vec<Action<Self>> {
            vec![Action::new("index", |_: &mut Self, _: &mut Dispatcher<'_>, _: &[String]| -> ActionReply {
                Err(ActionError::msg("first failure").into())
            })]
        }

        fn server_error(&mut self, _dispatcher: &mut Dispatcher<'_>, _error: &ActionError) -> ActionResult<()> {
            Err(ActionError::msg("second failure").into())
        }
    }

    fn router() -> Router {
        Router::builder()
            .mount(Mount::<ArticlesController>::new().get("/", "index").post("/", "create"))
            .mount(Mount::<FragileController>::at("/fragile"))
            .build()
            .unwrap()
    }

    fn no_static_files() -> MockStaticFiles {
        let mut static_files = MockStaticFiles::new();
        static_files.expect_serve().returning(|_, _, _| false);
        static_files
    }

    fn silent_sink() -> MockErrorSink {
        let mut sink = MockErrorSink::new();
        sink.expect_report().never();
        sink
    }

    fn application(static_files: MockStaticFiles, sink: MockErrorSink, bodyless: BodylessStatuses) -> Application {
        Application::builder()
            .router(router())
            .config(Config::with_root("/srv/blog"))
            .static_files(static_files)
            .error_sink(sink)
            .bodyless_statuses(bodyless)
            .build()
            .unwrap()
    }

    fn default_application() -> Application {
        application(no_static_files(), silent_sink(), BodylessStatuses::new())
    }

    fn get(app: &Application, uri: &'static str) -> http::Response<bytes::Bytes> {
        app.call(Request::new(Method::GET, Uri::from_static(uri))).unwrap()
    }

    fn body(response: &http::Response<bytes::Bytes>) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    #[test]
    fn test_matched_route() {
        let app = default_application();
        let response = get(&app, "/articles/show/42?sort=desc");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "article 42 desc Executing");
        assert!(!response.headers().contains_key("x-cascade"));
    }

    #[test]
    fn test_optional_arguments_are_skipped_when_absent() {
        let app = default_application();
        assert_eq!(body(&get(&app, "/articles")), "articles");
        assert_eq!(body(&get(&app, "/articles?page=3")), "articles, page 3");
    }

    #[test]
    fn test_no_route_uses_nearest_default_body() {
        let app = default_application();

        let response = get(&app, "/articles/show/42/comments");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-cascade"], "pass");
        assert_eq!(body(&response), "<p>no such article</p>");

        let response = app.call(Request::new(Method::DELETE, Uri::from_static("/articles/show/1"))).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), "<p>no such article</p>");
    }

    #[test]
    fn test_no_route_nowhere_near() {
        let router = Router::builder().mount(Mount::<FragileController>::at("/fragile")).build().unwrap();
        let app = Application::builder()
            .router(router)
            .static_files(no_static_files())
            .error_sink(silent_sink())
            .build()
            .unwrap();

        let response = get(&app, "/nothing/here");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), "<h1>Not Found</h1>");
    }

    #[test]
    fn test_bodyless_not_found() {
        let app = application(no_static_files(), silent_sink(), BodylessStatuses::new().with(StatusCode::NOT_FOUND));

        let response = get(&app, "/articles/show/0");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());
        assert_eq!(response.headers()["x-cascade"], "pass");
    }

    #[test]
    fn test_halt_from_action() {
        let app = default_application();
        let response = get(&app, "/articles/show/0");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), "<p>no such article</p>");
    }

    #[test]
    fn test_halt_from_nested_helper() {
        let app = default_application();

        let response = get(&app, "/articles/secret");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-realm"], "admin");
        assert_eq!(body(&response), "<p>no such article</p>");

        let session = HashMap::from([("role".to_owned(), "admin".to_owned())]);
        let response = app.call(Request::new(Method::GET, Uri::from_static("/articles/secret")).with_session(session)).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "secret");
    }

    #[test]
    fn test_failure_is_recovered_and_logged_once() {
        let mut sink = MockErrorSink::new();
        sink.expect_report()
            .times(1)
            .withf(|message| message.contains(" - ") && message.contains("read-only storage"))
            .return_const(());
        let app = application(no_static_files(), sink, BodylessStatuses::new());

        let response = app.call(Request::new(Method::POST, Uri::from_static("/articles"))).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&response), "sorry: read-only storage");
    }

    #[test]
    fn test_failure_in_recovery_is_not_masked() {
        let mut sink = MockErrorSink::new();
        sink.expect_report().times(1).withf(|message| message.contains("first failure")).return_const(());
        let app = application(no_static_files(), sink, BodylessStatuses::new());

        let result = app.call(Request::new(Method::GET, Uri::from_static("/fragile")));
        match result {
            Err(DispatchError::Unrecovered(error)) => assert_eq!(error.source().to_string(), "second failure"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_missing_route_in_path_to_is_fatal() {
        let app = default_application();
        let result = app.call(Request::new(Method::GET, Uri::from_static("/articles/broken_link")));
        assert!(matches!(result, Err(DispatchError::Router { .. })));
    }

    #[test]
    fn test_static_files_come_first() {
        let mut static_files = MockStaticFiles::new();
        static_files
            .expect_serve()
            .times(1)
            .withf(|root, _, _| root.ends_with("public"))
            .returning(|_, _, response| {
                response.write("static");
                true
            });
        let app = application(static_files, silent_sink(), BodylessStatuses::new());

        let response = get(&app, "/articles/show/42");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "static");
    }

    #[test]
    fn test_redirect() {
        let app = default_application();
        let response = get(&app, "/articles/moved");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/articles/show/7");
    }

    #[test]
    fn test_attachment_cookies_and_urls() {
        let app = default_application();
        let request = Request::new(Method::GET, Uri::from_static("/articles/export"))
            .with_header(http::header::HOST, HeaderValue::from_static("blog.example"));

        let response = app.call(request).unwrap();
        assert_eq!(body(&response), "http://blog.example/articles?page=2&sort=asc");
        assert_eq!(response.headers()[CONTENT_DISPOSITION], "attachment; filename=\"articles.json\"");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[SET_COOKIE], "exported=yes; path=/");
    }

    #[test]
    fn test_session_is_handed_back() {
        let app = default_application();
        let session = HashMap::from([("user".to_owned(), "7".to_owned())]);
        let response =
            app.call(Request::new(Method::GET, Uri::from_static("/articles")).with_session(session.clone())).unwrap();
        assert_eq!(response.extensions().get::<HashMap<String, String>>(), Some(&session));
    }

    struct GuardedController;

    impl Controller for GuardedController {
        fn name() -> &'static str {
            "GuardedController"
        }

        fn new(_dispatcher: &Dispatcher<'_>) -> Self {
            GuardedController
        }

        fn actions() -> Vec<Action<Self>> {
            vec![
                Action::new("index", |_: &mut Self, dispatcher: &mut Dispatcher<'_>, _: &[String]| -> ActionReply {
                    dispatcher.halt(StatusCode::NOT_FOUND)
                }),
                Action::new("crash", |_: &mut Self, _: &mut Dispatcher<'_>, _: &[String]| -> ActionReply {
                    panic!("crashed in action")
                }),
            ]
        }

        fn default_body(&mut self, _dispatcher: &mut Dispatcher<'_>) -> ActionReply {
            Err(ActionError::msg("no default body").into())
        }
    }

    fn guarded_application(sink: MockErrorSink) -> Application {
        let router = Router::builder().mount(Mount::<GuardedController>::at("/guarded")).build().unwrap();
        Application::builder().router(router).static_files(no_static_files()).error_sink(sink).build().unwrap()
    }

    #[test]
    fn test_default_body_failure_inside_action_is_recovered() {
        let mut sink = MockErrorSink::new();
        sink.expect_report().times(1).withf(|message| message.contains("no default body")).return_const(());
        let app = guarded_application(sink);

        let response = get(&app, "/guarded");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body(&response), "<h1>Internal Server Error</h1>");
    }

    #[test]
    #[should_panic(expected = "crashed in action")]
    fn test_panic_is_not_recovered() {
        let app = guarded_application(silent_sink());
        let _ = get(&app, "/guarded/crash");
    }

    #[test]
    fn test_initial_state() {
        let app = default_application();
        let dispatcher = Dispatcher::new(&app, Request::new(Method::GET, Uri::from_static("/")));
        assert_eq!(dispatcher.state(), DispatchState::Init);
        assert_eq!(dispatcher.status(), StatusCode::OK);
        assert_eq!(dispatcher.default_body(), "<h1>OK</h1>");
    }
}
