//! Web application: routes plus a per-request controller factory.

use std::sync::Arc;

use axum::routing::MethodRouter;
use axum::Router;

/// Shared router state carrying the controller factory.
pub struct WebContext<C> {
    factory: Arc<dyn Fn() -> C + Send + Sync>,
}

impl<C> WebContext<C> {
    pub fn new(factory: impl Fn() -> C + Send + Sync + 'static) -> Self {
        Self {
            factory: Arc::new(factory),
        }
    }

    /// Build the controller for one request.
    pub fn make_controller(&self) -> C {
        (self.factory)()
    }
}

impl<C> Clone for WebContext<C> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
        }
    }
}

/// Routes whose handlers receive `WebRequest<C>`.
///
/// ```
/// use asyncweb::web::{make_response, WebApplication, WebRequest};
/// use axum::{http::StatusCode, response::Response, routing::get};
///
/// struct Controller { init_code: u32 }
///
/// async fn health(request: WebRequest<Controller>) -> Response {
///     let code = request.controller().init_code;
///     make_response(format!("OK {code}"), StatusCode::OK, None)
/// }
///
/// let router = WebApplication::new(|| Controller { init_code: 10 })
///     .route("/health", get(health))
///     .into_router();
/// # let _: axum::Router = router;
/// ```
pub struct WebApplication<C> {
    router: Router<WebContext<C>>,
    context: WebContext<C>,
}

impl<C> WebApplication<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(controller_factory: impl Fn() -> C + Send + Sync + 'static) -> Self {
        Self {
            router: Router::new(),
            context: WebContext::new(controller_factory),
        }
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter<WebContext<C>>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    /// Add a whole route table.
    pub fn routes(mut self, routes: Router<WebContext<C>>) -> Self {
        self.router = self.router.merge(routes);
        self
    }

    /// Mount another route table under `prefix`, sharing this controller factory.
    pub fn nest(mut self, prefix: &str, routes: Router<WebContext<C>>) -> Self {
        self.router = self.router.nest(prefix, routes);
        self
    }

    /// Attach the controller factory and produce a servable router.
    pub fn into_router(self) -> Router {
        self.router.with_state(self.context)
    }
}
