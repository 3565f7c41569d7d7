//! Routing table and request dispatcher.
//!
//! Controllers declare their actions together with the names of the parameters each action
//! takes. Mounting a controller on a [`Router`] derives its routes and checks them against
//! those declarations, so a route leading nowhere or an action nobody can reach is reported
//! before the first request is served. An [`Application`] then runs one [`Dispatcher`] per
//! request: static files first, then the first matching route, and a 404 otherwise.

mod application;
mod config;
mod controller;
mod cookies;
mod dispatcher;
mod error;
mod interrupt;
mod request;
mod response;
mod route;
mod sink;
mod static_files;

pub mod router;

pub use application::Application;
pub use application::ApplicationBuilder;
pub use config::Config;
pub use controller::default_path_of;
pub use controller::inherit_actions;
pub use controller::Action;
pub use controller::ActionSignature;
pub use controller::Controller;
pub use controller::HandlerId;
pub use cookies::Cookies;
pub use dispatcher::DispatchState;
pub use dispatcher::Dispatcher;
pub use error::BuildError;
pub use error::ConfigError;
pub use error::DispatchError;
pub use error::RouterError;
pub use interrupt::ActionError;
pub use interrupt::ActionReply;
pub use interrupt::ActionResult;
pub use interrupt::Halt;
pub use interrupt::Interrupt;
pub use request::Params;
pub use request::Request;
pub use request::Session;
pub use response::BodylessStatuses;
pub use response::Response;
pub use route::path_parts;
pub use route::Arguments;
pub use route::PathPattern;
pub use route::Route;
pub use route::RouteMethod;
pub use route::Segment;
pub use router::Router;
pub use sink::ErrorSink;
pub use sink::TracingSink;
pub use static_files::FileServer;
pub use static_files::StaticFiles;
