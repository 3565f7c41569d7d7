//! The routing table of an application.
//!
//! Routes are kept in registration order and the first route whose method and path shape
//! match wins, so a route registered earlier shadows later routes with overlapping patterns.
//! The table is validated while controllers are mounted: every declared action must be
//! routed, every routed action must be declared, and path captures must agree with the
//! parameters of the action they lead to.

mod mount;

pub use mount::Mount;

use crate::controller::{ActionSignature, Controller, ControllerHandle, Handle, HandlerId};
use crate::route::{Arguments, PathPattern, Route, RouteMethod, Segment};
use crate::RouterError;
use http::Method;
use mount::{default_action_path, join_path};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, trace};

/// Ordered routing table, read-only once built.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
    reverse: HashMap<(HandlerId, &'static str), usize>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Computes, validates and appends the routes of one controller.
    ///
    /// Mounting a controller again replaces the routes it had before. Nothing is changed
    /// when validation fails.
    pub fn register<C: Controller>(&mut self, mount: Mount<C>) -> Result<(), RouterError> {
        let handle: Arc<dyn ControllerHandle> = Arc::new(Handle::<C>::new());
        let routes = build_routes(&handle, &mount)?;

        let id = handle.id();
        if self.routes.iter().any(|route| route.handler() == id) {
            debug!(controller = %id, "controller mounted again, replacing its routes");
            self.routes.retain(|route| route.handler() != id);
        }
        for route in &routes {
            debug!(route = %route, "register route");
        }
        self.routes.extend(routes);
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.reverse.clear();
        for (index, route) in self.routes.iter().enumerate() {
            self.reverse.entry((route.handler(), route.action())).or_insert(index);
        }
    }

    /// First route, in registration order, answering `method` whose pattern matches `path_parts`.
    pub fn find_route<S: AsRef<str>>(&self, method: &Method, path_parts: &[S]) -> Option<(&Route, Arguments)> {
        let found = self
            .routes
            .iter()
            .filter(|route| route.method().matches(method))
            .find_map(|route| route.extract_arguments(path_parts).map(|arguments| (route, arguments)));

        match &found {
            Some((route, arguments)) => trace!(route = %route, ?arguments, "route matched"),
            None => trace!(%method, parts = path_parts.len(), "no route matched"),
        }
        found
    }

    /// Reverse lookup used for path generation.
    pub fn find_route_for(&self, handler: HandlerId, action: &str) -> Option<&Route> {
        self.reverse.get(&(handler, action)).map(|&index| &self.routes[index])
    }

    /// Best-effort match on path shape alone, ignoring the method.
    ///
    /// Tries the whole path first, then keeps dropping the last part until some route matches.
    pub fn find_nearest_route<S: AsRef<str>>(&self, path_parts: &[S]) -> Option<&Route> {
        (0..=path_parts.len())
            .rev()
            .find_map(|len| self.routes.iter().find(|route| route.extract_arguments(&path_parts[..len]).is_some()))
    }

    /// Builds the path leading to `action` of controller `C`.
    ///
    /// Arguments the route's pattern does not consume are appended as a query string.
    pub fn path_to<C: Controller>(&self, action: &str, args: &[(&str, &str)]) -> Result<String, RouterError> {
        self.path_to_handler(HandlerId::of::<C>(), action, args)
    }

    pub fn path_to_handler(&self, handler: HandlerId, action: &str, args: &[(&str, &str)]) -> Result<String, RouterError> {
        let route =
            self.find_route_for(handler, action).ok_or_else(|| RouterError::route_not_found(handler.name(), action))?;

        let arguments = args.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect::<Arguments>();
        let (mut path, used) = route.pattern().fill(&arguments)?;

        let query = args.iter().filter(|(name, _)| !used.contains(name)).collect::<Vec<_>>();
        if !query.is_empty() {
            // serializing string pairs never fails
            if let Ok(query) = serde_urlencoded::to_string(&query) {
                path.push('?');
                path.push_str(&query);
            }
        }
        Ok(path)
    }
}

fn build_routes<C: Controller>(handle: &Arc<dyn ControllerHandle>, mount: &Mount<C>) -> Result<Vec<Route>, RouterError> {
    let controller = C::name();
    let signatures = handle.signatures();
    let base = mount.base_path();

    let mut planned = Vec::new();
    for refinement in mount.refinements(&signatures) {
        planned.push((refinement.method, join_path(&base, &refinement.path), refinement.action));
    }
    if mount.has_defaults() {
        for signature in &signatures {
            if !planned.iter().any(|(_, _, action)| action == signature.name()) {
                planned.push((RouteMethod::Exact(Method::GET), default_action_path(&base, signature), signature.name().to_owned()));
            }
        }
    }

    compare_actions(controller, &signatures, planned.iter().map(|(_, _, action)| action.as_str()))?;

    planned
        .into_iter()
        .map(|(method, path, action)| {
            let signature = signatures
                .iter()
                .find(|signature| signature.name() == action)
                .ok_or_else(|| RouterError::ExtraRoutesActions { controller, actions: vec![action.clone()] })?;
            let pattern = PathPattern::parse(&path)?;
            compare_arguments(controller, signature, &pattern, &path)?;
            Ok(Route::new(method, pattern, signature.clone(), Arc::clone(handle)))
        })
        .collect()
}

/// The routed actions of a controller must be exactly the actions it declares.
fn compare_actions<'a>(
    controller: &'static str,
    signatures: &[ActionSignature],
    routed: impl Iterator<Item = &'a str>,
) -> Result<(), RouterError> {
    let routed = routed.collect::<BTreeSet<_>>();
    let declared = signatures.iter().map(ActionSignature::name).collect::<BTreeSet<_>>();

    let extra_routes = routed.difference(&declared).map(|action| (*action).to_owned()).collect::<Vec<_>>();
    if !extra_routes.is_empty() {
        return Err(RouterError::ExtraRoutesActions { controller, actions: extra_routes });
    }

    let unrouted = declared.difference(&routed).map(|action| (*action).to_owned()).collect::<Vec<_>>();
    if !unrouted.is_empty() {
        return Err(RouterError::ExtraControllerActions { controller, actions: unrouted });
    }
    Ok(())
}

/// Path captures must be parameters of the action, required parameters must be captured.
fn compare_arguments(
    controller: &'static str,
    signature: &ActionSignature,
    pattern: &PathPattern,
    path: &str,
) -> Result<(), RouterError> {
    let captures = pattern.capture_names().collect::<BTreeSet<_>>();

    let unknown = captures.iter().filter(|name| !signature.accepts(name)).map(|name| (*name).to_owned()).collect::<Vec<_>>();
    if !unknown.is_empty() {
        return Err(RouterError::ExtraPathArguments {
            controller,
            action: signature.name().to_owned(),
            path: path.to_owned(),
            arguments: unknown,
        });
    }

    // an optional capture may be absent from the request, so it can't carry a required parameter
    let bound = pattern
        .segments()
        .iter()
        .filter(|segment| !matches!(segment, Segment::Optional(_)))
        .filter_map(Segment::name)
        .collect::<BTreeSet<_>>();
    let missing =
        signature.required().iter().filter(|name| !bound.contains(**name)).map(|name| (*name).to_owned()).collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(RouterError::ExtraActionArguments {
            controller,
            action: signature.name().to_owned(),
            path: path.to_owned(),
            arguments: missing,
        });
    }
    Ok(())
}

trait Registration {
    fn register(self: Box<Self>, router: &mut Router) -> Result<(), RouterError>;
}

impl<C: Controller> Registration for Mount<C> {
    fn register(self: Box<Self>, router: &mut Router) -> Result<(), RouterError> {
        router.register(*self)
    }
}

/// Collects mounts and registers them in order on [`RouterBuilder::build`].
pub struct RouterBuilder {
    mounts: Vec<Box<dyn Registration>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { mounts: vec![] }
    }

    pub fn mount<C: Controller>(mut self, mount: Mount<C>) -> Self {
        self.mounts.push(Box::new(mount));
        self
    }

    /// Fails on the first controller whose routes don't validate.
    pub fn build(self) -> Result<Router, RouterError> {
        let mut router = Router::new();
        for mount in self.mounts {
            mount.register(&mut router)?;
        }
        Ok(router)
    }
}

impl std::fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterBuilder").field("mounts", &self.mounts.len()).finish()
    }
}
