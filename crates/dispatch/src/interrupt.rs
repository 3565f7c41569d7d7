//! Non-local control flow for a single request.
//!
//! Actions and the helpers they call return [`ActionResult`]. The `Err` side is an
//! [`Interrupt`], which is either a halt (the response is already prepared, skip the rest),
//! an action failure (caught by the dispatcher's error boundary), or a fatal routing error.
//! Only [`Dispatcher::run`](crate::Dispatcher::run) consumes a halt, so `?` carries it
//! through any number of frames.
//!
//! # Example
//! ```
//! use http::StatusCode;
//! use micro_dispatch::{ActionResult, Dispatcher, Halt};
//!
//! fn require_admin(dispatcher: &mut Dispatcher<'_>) -> ActionResult<()> {
//!     if dispatcher.session().get("role").map(String::as_str) != Some("admin") {
//!         return dispatcher.halt(Halt::new().status(StatusCode::FORBIDDEN).body("admins only"));
//!     }
//!     Ok(())
//! }
//! ```

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::any::type_name;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

pub type ActionResult<T> = Result<T, Interrupt>;

/// What an action produces: `Some(body)` replaces the response body, `None` keeps it.
pub type ActionReply = ActionResult<Option<String>>;

#[derive(Debug)]
pub enum Interrupt {
    /// the response has been prepared by [`Dispatcher::halt`](crate::Dispatcher::halt),
    /// request handling stops here
    Halt,
    /// an action failed, the dispatcher will switch to the controller's error recovery
    Failure(ActionError),
    /// a programming error that no request-time boundary may catch
    Fatal(crate::RouterError),
}

impl Interrupt {
    #[inline]
    pub fn is_halt(&self) -> bool {
        matches!(self, Interrupt::Halt)
    }
}

impl<E> From<E> for Interrupt
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Interrupt::Failure(ActionError::new(type_name::<E>(), error))
    }
}

impl From<ActionError> for Interrupt {
    fn from(error: ActionError) -> Self {
        Interrupt::Failure(error)
    }
}

/// An error raised by an action, with its classification and the backtrace at the point
/// it entered the dispatcher's error channel.
pub struct ActionError {
    kind: &'static str,
    source: Box<dyn Error + Send + Sync>,
    backtrace: Backtrace,
}

impl ActionError {
    pub fn new<E>(kind: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self { kind, source: source.into(), backtrace: Backtrace::capture() }
    }

    /// an ad-hoc error carrying only a message
    pub fn msg<S: Into<String>>(message: S) -> Self {
        Self::new("ActionError", message.into())
    }

    /// name of the error type this failure originates from
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn source(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.source.as_ref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.kind, self.source)
    }
}

impl fmt::Debug for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionError").field("kind", &self.kind).field("source", &self.source).finish_non_exhaustive()
    }
}

/// The optional changes a halt applies to the response before finishing it.
///
/// A bare `StatusCode` converts into a halt that only changes the status.
#[derive(Debug, Default)]
pub struct Halt {
    pub(crate) status: Option<StatusCode>,
    pub(crate) body: Option<String>,
    pub(crate) headers: HeaderMap,
}

impl Halt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn body<S: Into<String>>(mut self, body: S) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

impl From<StatusCode> for Halt {
    fn from(status: StatusCode) -> Self {
        Halt::new().status(status)
    }
}
