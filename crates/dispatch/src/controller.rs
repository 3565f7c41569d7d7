//! The controller contract: a unit of user code exposing named actions.
//!
//! Actions are declared statically, with the names of their required and optional
//! parameters, so the router can check them against path patterns at registration time
//! and the dispatcher can pick positional arguments out of the request parameters.
//!
//! # Example
//! ```
//! use micro_dispatch::{Action, ActionReply, Controller, Dispatcher};
//!
//! struct ArticlesController;
//!
//! impl ArticlesController {
//!     fn index(&mut self, _dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
//!         Ok(Some("all articles".into()))
//!     }
//!
//!     fn show(&mut self, _dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
//!         Ok(Some(format!("article {}", args[0])))
//!     }
//! }
//!
//! impl Controller for ArticlesController {
//!     fn name() -> &'static str {
//!         "ArticlesController"
//!     }
//!
//!     fn new(_dispatcher: &Dispatcher<'_>) -> Self {
//!         ArticlesController
//!     }
//!
//!     fn actions() -> Vec<Action<Self>> {
//!         vec![Action::new("index", Self::index), Action::new("show", Self::show).required(&["id"])]
//!     }
//! }
//!
//! assert_eq!(ArticlesController::default_path(), "/articles");
//! ```

use crate::dispatcher::Dispatcher;
use crate::interrupt::{ActionError, ActionReply, ActionResult};
use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

const IGNORED_NAME_PARTS: [&str; 3] = ["index", "controller", "ctrl"];

pub trait Controller: Sized + 'static {
    /// Display name used for identity in errors and for the default path.
    fn name() -> &'static str {
        type_name::<Self>()
    }

    /// Creates the instance serving one request.
    fn new(dispatcher: &Dispatcher<'_>) -> Self;

    /// The public actions, each with its declared parameters.
    fn actions() -> Vec<Action<Self>>;

    /// Root path the controller is mounted at unless told otherwise.
    fn default_path() -> String {
        default_path_of(Self::name())
    }

    /// Invoked on the same instance when an action returns an error, including an error raised
    /// by [`Controller::default_body`] while the action halts. The response status is already
    /// 500. Panics are not recovered here.
    fn server_error(&mut self, dispatcher: &mut Dispatcher<'_>, _error: &ActionError) -> ActionResult<()> {
        let body = dispatcher.default_body();
        dispatcher.set_body(body);
        Ok(())
    }

    /// Body used when a request is halted without one and this controller owns the nearest route.
    fn default_body(&mut self, dispatcher: &mut Dispatcher<'_>) -> ActionReply {
        Ok(Some(dispatcher.default_body()))
    }
}

/// Stable identity of a controller type.
#[derive(Clone, Copy)]
pub struct HandlerId {
    type_id: TypeId,
    name: &'static str,
}

impl HandlerId {
    pub fn of<C: Controller>() -> Self {
        Self { type_id: TypeId::of::<C>(), name: C::name() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for HandlerId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for HandlerId {}

impl Hash for HandlerId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Name and declared parameters of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSignature {
    name: &'static str,
    required: Vec<&'static str>,
    optional: Vec<&'static str>,
}

impl ActionSignature {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn required(&self) -> &[&'static str] {
        &self.required
    }

    pub fn optional(&self) -> &[&'static str] {
        &self.optional
    }

    pub fn accepts(&self, parameter: &str) -> bool {
        self.required.contains(&parameter) || self.optional.contains(&parameter)
    }
}

type ActionFn<C> = dyn Fn(&mut C, &mut Dispatcher<'_>, &[String]) -> ActionReply + Send + Sync;

/// A declared action of controller `C`.
///
/// The callable receives the positional arguments picked from the request parameters:
/// every required parameter in declared order, then the optional ones that are present.
///
/// Only an `Err` return reaches the controller's [`Controller::server_error`]. A panic is not
/// caught by the dispatcher and unwinds to whoever called [`Dispatcher::run`].
pub struct Action<C> {
    signature: ActionSignature,
    call: Arc<ActionFn<C>>,
}

impl<C: 'static> Action<C> {
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: Fn(&mut C, &mut Dispatcher<'_>, &[String]) -> ActionReply + Send + Sync + 'static,
    {
        Self { signature: ActionSignature { name, required: vec![], optional: vec![] }, call: Arc::new(f) }
    }

    pub fn required(mut self, names: &[&'static str]) -> Self {
        self.signature.required.extend_from_slice(names);
        self
    }

    pub fn optional(mut self, names: &[&'static str]) -> Self {
        self.signature.optional.extend_from_slice(names);
        self
    }

    pub fn name(&self) -> &'static str {
        self.signature.name
    }

    pub fn signature(&self) -> &ActionSignature {
        &self.signature
    }

    /// Re-exposes this action on a controller that embeds `C`.
    pub fn lift<D>(self) -> Action<D>
    where
        D: AsMut<C> + 'static,
    {
        let call = self.call;
        let mut lifted = Action::new(self.signature.name, move |controller: &mut D, dispatcher, args| {
            call(AsMut::<C>::as_mut(controller), dispatcher, args)
        });
        lifted.signature = self.signature;
        lifted
    }

    fn invoke(&self, controller: &mut C, dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
        (self.call)(controller, dispatcher, args)
    }
}

impl<C> Clone for Action<C> {
    fn clone(&self) -> Self {
        Self { signature: self.signature.clone(), call: Arc::clone(&self.call) }
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Takes the actions named in `names` from parent `P` into child `C`; an empty list takes all.
///
/// Names the parent doesn't declare are skipped, so a route referring to them is reported
/// when the child is mounted.
pub fn inherit_actions<P, C>(names: &[&str]) -> Vec<Action<C>>
where
    P: Controller,
    C: AsMut<P> + 'static,
{
    P::actions().into_iter().filter(|action| names.is_empty() || names.contains(&action.name())).map(Action::lift).collect()
}

/// Derives a mount path from a controller name such as `app::admin::UsersController`.
///
/// The last name segment is snake-cased and stripped of the words `index`, `controller`
/// and `ctrl`; when nothing is left the enclosing module is used, unless that module is
/// the crate root.
pub fn default_path_of(name: &str) -> String {
    let name = name.split('<').next().unwrap_or(name);
    let modules = name.split("::").collect::<Vec<_>>();
    let last = snake_case(modules.last().copied().unwrap_or_default());
    let parts = last.split('_').filter(|part| !part.is_empty() && !IGNORED_NAME_PARTS.contains(part)).collect::<Vec<_>>();

    if !parts.is_empty() {
        return format!("/{}", parts.join("_"));
    }
    match modules.len() {
        len if len > 2 => format!("/{}", modules[len - 2]),
        _ => "/".to_owned(),
    }
}

fn snake_case(name: &str) -> String {
    let mut result = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if previous_lower {
                result.push('_');
            }
            result.extend(c.to_lowercase());
            previous_lower = false;
        } else {
            result.push(c);
            previous_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    result
}

/// Type-erased view of a mounted controller, shared by its routes.
pub(crate) trait ControllerHandle: Send + Sync {
    fn id(&self) -> HandlerId;

    fn default_path(&self) -> String;

    fn signatures(&self) -> Vec<ActionSignature>;

    fn instantiate<'h>(&'h self, dispatcher: &Dispatcher<'_>) -> Box<dyn ControllerInstance + 'h>;
}

/// A controller instance bound to one request.
pub(crate) trait ControllerInstance {
    fn invoke(&mut self, dispatcher: &mut Dispatcher<'_>, action: &str, args: &[String]) -> ActionReply;

    fn server_error(&mut self, dispatcher: &mut Dispatcher<'_>, error: &ActionError) -> ActionResult<()>;

    fn default_body(&mut self, dispatcher: &mut Dispatcher<'_>) -> ActionReply;
}

pub(crate) struct Handle<C> {
    actions: Vec<Action<C>>,
}

impl<C: Controller> Handle<C> {
    pub(crate) fn new() -> Self {
        Self { actions: C::actions() }
    }
}

impl<C: Controller> ControllerHandle for Handle<C> {
    fn id(&self) -> HandlerId {
        HandlerId::of::<C>()
    }

    fn default_path(&self) -> String {
        C::default_path()
    }

    fn signatures(&self) -> Vec<ActionSignature> {
        self.actions.iter().map(|action| action.signature.clone()).collect()
    }

    fn instantiate<'h>(&'h self, dispatcher: &Dispatcher<'_>) -> Box<dyn ControllerInstance + 'h> {
        Box::new(Instance { controller: C::new(dispatcher), actions: &self.actions })
    }
}

struct Instance<'h, C> {
    controller: C,
    actions: &'h [Action<C>],
}

impl<C: Controller> ControllerInstance for Instance<'_, C> {
    fn invoke(&mut self, dispatcher: &mut Dispatcher<'_>, action: &str, args: &[String]) -> ActionReply {
        match self.actions.iter().find(|declared| declared.name() == action) {
            Some(declared) => declared.invoke(&mut self.controller, dispatcher, args),
            None => Err(ActionError::msg(format!("'{}' has no action '{action}'", C::name())).into()),
        }
    }

    fn server_error(&mut self, dispatcher: &mut Dispatcher<'_>, error: &ActionError) -> ActionResult<()> {
        self.controller.server_error(dispatcher, error)
    }

    fn default_body(&mut self, dispatcher: &mut Dispatcher<'_>) -> ActionReply {
        self.controller.default_body(dispatcher)
    }
}

#[cfg(test)]
mod tests {
    use super::{default_path_of, inherit_actions, Action, Controller, ControllerHandle, Handle, HandlerId};
    use crate::{ActionReply, Dispatcher};

    #[derive(Default)]
    struct BaseController {
        greeting: &'static str,
    }

    impl BaseController {
        fn hello(&mut self, _dispatcher: &mut Dispatcher<'_>, args: &[String]) -> ActionReply {
            Ok(Some(format!("{} {}", self.greeting, args[0])))
        }

        fn bye(&mut self, _dispatcher: &mut Dispatcher<'_>, _args: &[String]) -> ActionReply {
            Ok(None)
        }
    }

    impl Controller for BaseController {
        fn new(_dispatcher: &Dispatcher<'_>) -> Self {
            Self { greeting: "hello" }
        }

        fn actions() -> Vec<Action<Self>> {
            vec![Action::new("hello", Self::hello).required(&["name"]), Action::new("bye", Self::bye)]
        }
    }

    struct ChildController {
        base: BaseController,
    }

    impl AsMut<BaseController> for ChildController {
        fn as_mut(&mut self) -> &mut BaseController {
            &mut self.base
        }
    }

    impl Controller for ChildController {
        fn name() -> &'static str {
            "ChildController"
        }

        fn new(_dispatcher: &Dispatcher<'_>) -> Self {
            Self { base: BaseController { greeting: "hi" } }
        }

        fn actions() -> Vec<Action<Self>> {
            inherit_actions::<BaseController, Self>(&["hello"])
        }
    }

    #[test]
    fn test_default_path_of() {
        assert_eq!(default_path_of("ArticlesController"), "/articles");
        assert_eq!(default_path_of("app::BlogPostsCtrl"), "/blog_posts");
        assert_eq!(default_path_of("app::admin::IndexController"), "/admin");
        assert_eq!(default_path_of("app::IndexController"), "/");
        assert_eq!(default_path_of("Users"), "/users");
        assert_eq!(default_path_of("app::Wrapper<app::Inner>"), "/wrapper");
    }

    #[test]
    fn test_default_name_is_type_name() {
        assert!(BaseController::name().ends_with("BaseController"));
        assert_eq!(BaseController::default_path(), "/base");
    }

    #[test]
    fn test_handler_identity() {
        assert_eq!(HandlerId::of::<BaseController>(), HandlerId::of::<BaseController>());
        assert_ne!(HandlerId::of::<BaseController>(), HandlerId::of::<ChildController>());
        assert_eq!(HandlerId::of::<ChildController>().to_string(), "ChildController");
    }

    #[test]
    fn test_inherited_actions() {
        let actions = ChildController::actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name(), "hello");
        assert_eq!(actions[0].signature().required(), &["name"]);

        assert_eq!(inherit_actions::<BaseController, ChildController>(&[]).len(), 2);
    }

    #[test]
    fn test_handle_signatures() {
        let handle = Handle::<BaseController>::new();
        let signatures = handle.signatures();
        assert_eq!(signatures.iter().map(|s| s.name()).collect::<Vec<_>>(), vec!["hello", "bye"]);
        assert!(signatures[0].accepts("name"));
        assert!(!signatures[1].accepts("name"));
        assert_eq!(handle.default_path(), "/base");
    }
}
