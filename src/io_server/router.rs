//! Dispatcher / router (C6).
//!
//! Grounded on `original_source/.../router.py`. Unlike the Python original,
//! which writes validation failures through a module-level global
//! `PluginOutputStream`, every handler here receives the `Session`
//! (carrying its own bound writer) as an explicit argument -- no global
//! writer, per `SPEC_FULL.md` §9.

use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;

use crate::io_server::model::SessionMessage;
use crate::io_server::session::Session;

/// A handler coerces the raw `data` value into its declared input type,
/// then runs to completion, using `session` to stream results.
#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    type Input: DeserializeOwned + Send;

    async fn handle(&self, session: &Session, input: Self::Input);
}

type Predicate = Arc<dyn Fn(&serde_json::Value) -> bool + Send + Sync>;
type BoxedRoute = Box<dyn Fn(&Session, serde_json::Value) -> RouteFuture + Send + Sync>;
type RouteFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

struct Route {
    predicate: Predicate,
    call: BoxedRoute,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Ordered list of `(predicate, handler)` pairs. First match wins; no
/// fallback (`SPEC_FULL.md` §4.6).
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register a route. `predicate` inspects the envelope's decoded
    /// `data` (typically matching on `type`+`action`); `handler.handle` is
    /// invoked once `data` has been coerced into `H::Input`.
    pub fn register<H>(&mut self, predicate: impl Fn(&serde_json::Value) -> bool + Send + Sync + 'static, handler: H)
    where
        H: Handler + 'static,
        H::Input: 'static,
    {
        let handler = Arc::new(handler);
        let call: BoxedRoute = Box::new(move |session, data| {
            let handler = Arc::clone(&handler);
            let session = session.clone();
            Box::pin(async move {
                match serde_json::from_value::<H::Input>(data) {
                    Ok(input) => {
                        // The handler may panic (user code); that must
                        // become an error+end event, never a crashed task
                        // (spec.md §4.10's "catch all exceptions" rule).
                        let outcome = std::panic::AssertUnwindSafe(handler.handle(&session, input))
                            .catch_unwind()
                            .await;
                        if let Err(panic) = outcome {
                            let message = panic_message(&panic);
                            let _ = session
                                .writer()
                                .session_message(
                                    session.session_id().to_string(),
                                    SessionMessage::Error {
                                        data: serde_json::json!({
                                            "error_type": "HandlerPanic",
                                            "message": message,
                                        }),
                                    },
                                )
                                .await;
                            let _ = session
                                .writer()
                                .session_message(session.session_id().to_string(), SessionMessage::End)
                                .await;
                        }
                    }
                    Err(e) => {
                        let _ = session
                            .writer()
                            .session_message(
                                session.session_id().to_string(),
                                SessionMessage::Error {
                                    data: serde_json::json!({
                                        "error_type": "TypeError",
                                        "message": e.to_string(),
                                    }),
                                },
                            )
                            .await;
                        let _ = session
                            .writer()
                            .session_message(session.session_id().to_string(), SessionMessage::End)
                            .await;
                    }
                }
            })
        });
        self.routes.push(Route {
            predicate: Arc::new(predicate),
            call,
        });
    }

    /// Dispatch one envelope's `data` to the first matching route. Returns
    /// `false` if no route matched (an unroutable/dispatch error -- the
    /// caller is expected to emit the dispatch-error event, since only it
    /// knows the envelope's session id).
    pub async fn dispatch(&self, session: &Session, data: serde_json::Value) -> bool {
        for route in &self.routes {
            if (route.predicate)(&data) {
                (route.call)(session, data).await;
                return true;
            }
        }
        false
    }
}
