//! Cyre: an in-process reactive channel runtime.
//!
//! Application code registers named *channels* with [`action`](runtime::Runtime::action),
//! attaches a [`Handler`] with [`on`](runtime::Runtime::on), and invokes them
//! by id with [`call`](runtime::Runtime::call). Between the caller and the
//! handler sits a compiled protection/transformation pipeline (validation,
//! change detection, throttle, debounce, schedule, transform); [`branch`]
//! nests channels into path-scoped namespaces with cascading lifetime, and
//! [`group`] fans one call out across a pattern-matched set of channels.

pub mod breathing;
pub mod branch;
pub mod channel;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod handler;
pub mod observability;
pub mod payload;
pub mod runtime;
pub mod store;
pub mod timekeeper;

pub use branch::Branch;
pub use channel::{ChannelConfig, Priority, Repeat, Required};
pub use dispatch::CallOutcome;
pub use error::CyreError;
pub use group::{CollectResults, ErrorStrategy, Group, Strategy};
pub use handler::{FnHandler, Handler, HandlerReturn, ValueFnHandler};
pub use payload::Payload;
pub use runtime::{Runtime, RuntimeOptions, RuntimeOptionsBuilder};
