//! Errors raised while building the routing table and while dispatching.
//!
//! Registration errors ([`RouterError`]) are reported before any request is served.
//! [`DispatchError`] is what a request hands back to the transport when it could not
//! be turned into a response at all.

use crate::interrupt::ActionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Controller '{controller}' has no methods '{}' from routes", .actions.join(", "))]
    ExtraRoutesActions { controller: &'static str, actions: Vec<String> },

    #[error("Routes for '{controller}' has no methods '{}'", .actions.join(", "))]
    ExtraControllerActions { controller: &'static str, actions: Vec<String> },

    #[error(
        "Method '{action}' from controller '{controller}' does not know arguments '{}' from path '{path}'",
        .arguments.join(", ")
    )]
    ExtraPathArguments { controller: &'static str, action: String, path: String, arguments: Vec<String> },

    #[error(
        "Path '{path}' does not contain required arguments '{}' of method '{action}' from controller '{controller}'",
        .arguments.join(", ")
    )]
    ExtraActionArguments { controller: &'static str, action: String, path: String, arguments: Vec<String> },

    #[error("invalid path pattern '{path}': {reason}")]
    InvalidPattern { path: String, reason: String },

    #[error("Route with controller '{controller}' and action '{action}' not found in application routes")]
    RouteNotFound { controller: &'static str, action: String },

    #[error("argument '{argument}' is required to build path '{path}'")]
    MissingArgument { path: String, argument: String },
}

impl RouterError {
    pub fn invalid_pattern<P: ToString, S: ToString>(path: P, reason: S) -> Self {
        Self::InvalidPattern { path: path.to_string(), reason: reason.to_string() }
    }

    pub fn route_not_found<S: ToString>(controller: &'static str, action: S) -> Self {
        Self::RouteNotFound { controller, action: action.to_string() }
    }

    pub fn missing_argument<P: ToString, S: ToString>(path: P, argument: S) -> Self {
        Self::MissingArgument { path: path.to_string(), argument: argument.to_string() }
    }
}

/// A request that could not be finalized.
///
/// The only recoverable failure inside a request is an error raised by an action; anything
/// escaping the recovery path ends up here and is left to the transport.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("unrecovered error: {0}")]
    Unrecovered(ActionError),

    #[error("routing error: {source}")]
    Router {
        #[from]
        source: RouterError,
    },
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("router must be set")]
    MissingRouter,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config key '{key}' is not set")]
    Missing { key: String },

    #[error("config key '{key}' has unexpected value: {source}")]
    Invalid { key: String, source: serde_json::Error },
}
