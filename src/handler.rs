//! The handler contract and its tagged return value.

use async_trait::async_trait;

use crate::payload::Payload;

/// What a handler produces. The source this runtime is modelled on
/// distinguishes "plain payload return" from "chain link" by duck-typing a
/// `{id, payload}` shape at runtime; here it is a statically checked tagged
/// sum instead, so the dispatch engine's branch on it is exhaustive and
/// compiler-checked rather than a runtime shape probe.
#[derive(Debug, Clone)]
pub enum HandlerReturn {
    /// The handler produced a value; no follow-up call happens.
    Value(Payload),
    /// The handler wants channel `id` called next, with `payload`. Chains
    /// are a tail call: a handler may return only one link, never a tree of
    /// them.
    Chain { id: String, payload: Payload },
}

impl HandlerReturn {
    pub fn value(payload: Payload) -> Self {
        HandlerReturn::Value(payload)
    }

    pub fn chain(id: impl Into<String>, payload: Payload) -> Self {
        HandlerReturn::Chain { id: id.into(), payload }
    }
}

/// A channel's registered handler. `call` is async so handlers may await
/// their own I/O; the dispatch engine always awaits the returned future to
/// completion before deciding what to do with its [`HandlerReturn`].
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, payload: Payload) -> Result<HandlerReturn, String>;
}

/// Adapts a plain closure into a [`Handler`], for the common case where the
/// handler does no awaiting of its own.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Payload) -> Result<HandlerReturn, String> + Send + Sync,
{
    async fn call(&self, payload: Payload) -> Result<HandlerReturn, String> {
        (self.0)(payload)
    }
}

/// Adapts a closure returning a plain value (no chain, infallible) into a
/// [`Handler`] — the common case exercised by most tests and examples.
pub struct ValueFnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for ValueFnHandler<F>
where
    F: Fn(Payload) -> Payload + Send + Sync,
{
    async fn call(&self, payload: Payload) -> Result<HandlerReturn, String> {
        Ok(HandlerReturn::Value((self.0)(payload)))
    }
}
