use crate::controller::{ActionSignature, Controller};
use crate::route::RouteMethod;
use http::Method;
use std::marker::PhantomData;

/// How one controller is attached to the routing table.
///
/// Without refinements every declared action gets a default `GET` route under the mount
/// path: `index` at the mount path itself, any other action at `<path>/<action>`, each
/// followed by `:param` for its required and `:?param` for its optional parameters.
/// Refinements replace the default route of the actions they name; paths given to them are
/// relative to the mount path.
///
/// ```
/// use micro_dispatch::router::Mount;
/// # use micro_dispatch::{Action, Controller, Dispatcher};
/// # struct HomeController;
/// # impl Controller for HomeController {
/// #     fn new(_: &Dispatcher<'_>) -> Self { HomeController }
/// #     fn actions() -> Vec<Action<Self>> { vec![] }
/// # }
///
/// let mount = Mount::<HomeController>::at("/welcome").get("/bye", "goodbye").post("/greetings", "new");
/// ```
pub struct Mount<C> {
    path: Option<String>,
    refinements: Vec<Refinement>,
    defaults: bool,
    rest: bool,
    _controller: PhantomData<fn() -> C>,
}

#[derive(Debug, Clone)]
pub(crate) struct Refinement {
    pub(crate) method: RouteMethod,
    pub(crate) path: String,
    pub(crate) action: String,
}

macro_rules! refine_method {
    ($method:ident, $upper_case_method:ident) => {
        pub fn $method(self, path: impl Into<String>, action: impl Into<String>) -> Self {
            self.route(RouteMethod::Exact(Method::$upper_case_method), path, action)
        }
    };
}

impl<C: Controller> Mount<C> {
    /// Mounts at the controller's default path.
    pub fn new() -> Self {
        Self { path: None, refinements: vec![], defaults: true, rest: false, _controller: PhantomData }
    }

    pub fn at(path: impl Into<String>) -> Self {
        Self { path: Some(path.into()), ..Self::new() }
    }

    pub fn route(mut self, method: RouteMethod, path: impl Into<String>, action: impl Into<String>) -> Self {
        self.refinements.push(Refinement { method, path: path.into(), action: action.into() });
        self
    }

    refine_method!(get, GET);
    refine_method!(post, POST);
    refine_method!(put, PUT);
    refine_method!(patch, PATCH);
    refine_method!(delete, DELETE);
    refine_method!(head, HEAD);
    refine_method!(options, OPTIONS);

    /// a route answering to every method
    pub fn any(self, path: impl Into<String>, action: impl Into<String>) -> Self {
        self.route(RouteMethod::Any, path, action)
    }

    /// Maps the conventional resource actions the controller declares: `index` and `create`
    /// on the mount path, `show`, `update` and `delete` on `/:id`.
    pub fn rest(mut self) -> Self {
        self.rest = true;
        self
    }

    /// Leaves actions without a refinement unrouted.
    pub fn no_defaults(mut self) -> Self {
        self.defaults = false;
        self
    }

    pub(crate) fn base_path(&self) -> String {
        self.path.clone().unwrap_or_else(C::default_path)
    }

    pub(crate) fn has_defaults(&self) -> bool {
        self.defaults
    }

    /// explicit refinements, followed by the resource routes when requested
    pub(crate) fn refinements(&self, signatures: &[ActionSignature]) -> Vec<Refinement> {
        let mut refinements = self.refinements.clone();
        if !self.rest {
            return refinements;
        }

        let rest_actions = [
            (Method::GET, "/", "index"),
            (Method::POST, "/", "create"),
            (Method::GET, "/:id", "show"),
            (Method::PUT, "/:id", "update"),
            (Method::DELETE, "/:id", "delete"),
        ];
        for (method, path, action) in rest_actions {
            let declared = signatures.iter().any(|signature| signature.name() == action);
            let refined = refinements.iter().any(|refinement| refinement.action == action);
            if declared && !refined {
                refinements.push(Refinement { method: RouteMethod::Exact(method), path: path.to_owned(), action: action.to_owned() });
            }
        }
        refinements
    }
}

impl<C: Controller> Default for Mount<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for Mount<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("path", &self.path)
            .field("refinements", &self.refinements)
            .field("defaults", &self.defaults)
            .field("rest", &self.rest)
            .finish()
    }
}

/// Default path of an action under `base`.
pub(crate) fn default_action_path(base: &str, signature: &ActionSignature) -> String {
    let mut path = base.trim_end_matches('/').to_owned();
    if signature.name() != "index" {
        path.push('/');
        path.push_str(signature.name());
    }
    for required in signature.required() {
        path.push_str("/:");
        path.push_str(required);
    }
    for optional in signature.optional() {
        path.push_str("/:?");
        path.push_str(optional);
    }
    if path.is_empty() {
        path.push('/');
    }
    path
}

/// Joins a mount path and a path relative to it.
pub(crate) fn join_path(base: &str, path: &str) -> String {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    match joined.trim_end_matches('/') {
        "" => "/".to_owned(),
        trimmed => trimmed.to_owned(),
    }
}
