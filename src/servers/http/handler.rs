use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{service::Service, Method, Request, Response, StatusCode};
use log::{debug, info};
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Instant;

use super::error::{HttpError, Result};
use super::request::HttpRequest;
use super::response::HttpResponse;
use crate::constants::{ENDPOINTS, HEALTHY, SERVICE_NAME, UNHEALTHY};
use crate::models::Outcome;
use crate::servers::State;

#[derive(Clone)]
pub(super) struct RequestHandler {
    pub state: State,
    pub addr: SocketAddr,
}

impl Service<Request<Incoming>> for RequestHandler {
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let handler = self.clone();
        // every route is driven by the method and the query string alone
        let (parts, _body) = req.into_parts();
        let req = Request::from_parts(parts, ());

        Box::pin(async move {
            let started = Instant::now();
            let response = handler.handle_request(&req).await.unwrap_or_else(|e| {
                debug!("request failed: {}", e);
                e.into()
            });

            if handler.state.config.http_log_request() {
                info!(
                    "{} {} {} {} {:?}",
                    handler.addr,
                    req.method(),
                    req.uri(),
                    response.status.as_u16(),
                    started.elapsed()
                );
            }

            Ok(response.into())
        })
    }
}

impl RequestHandler {
    pub(super) async fn handle_request<B>(&self, req: &Request<B>) -> Result<HttpResponse> {
        match (req.method(), req.uri().path()) {
            (&Method::GET, "/") => Ok(self.index()),
            (&Method::GET, "/health") => Ok(self.health().await),
            (&Method::GET, "/stats") => self.stats().await,
            (&Method::GET, "/workers") => self.workers().await,
            (&Method::GET, "/search") => self.search(req).await,
            (&Method::POST, "/cache/clear") => self.clear_cache().await,
            (_, "/" | "/health" | "/stats" | "/workers" | "/search" | "/cache/clear") => {
                Err(HttpError::MethodNotAllowed)
            }
            _ => Err(HttpError::NotFound),
        }
    }

    fn index(&self) -> HttpResponse {
        HttpResponse::json(
            StatusCode::OK,
            &json!({
                "service": SERVICE_NAME,
                "version": env!("CARGO_PKG_VERSION"),
                "storage": self.state.config.storage.name,
                "endpoints": ENDPOINTS,
            }),
        )
    }

    async fn health(&self) -> HttpResponse {
        match self.state.gateway.ping().await {
            Ok(()) => HttpResponse::json(
                StatusCode::OK,
                &json!({ "status": HEALTHY, "storage": self.state.config.storage.name }),
            ),
            Err(err) => HttpResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "status": UNHEALTHY, "error": err.to_string() }),
            ),
        }
    }

    async fn stats(&self) -> Result<HttpResponse> {
        let snapshot = self.state.stats.snapshot().await?;
        Ok(HttpResponse::json(StatusCode::OK, &snapshot))
    }

    async fn workers(&self) -> Result<HttpResponse> {
        let leases = self.state.gateway.monitor().executors().await?;

        let workers: Vec<_> = leases
            .iter()
            .map(|lease| {
                json!({
                    "id": lease.record.id,
                    "node": lease.record.node,
                    "busy": lease.record.busy,
                    "last_seen": lease.record.last_heartbeat,
                    "ttl_ms": lease.remaining.as_millis() as u64,
                    "active": !lease.remaining.is_zero(),
                    "tasks_total": lease.record.total,
                    "tasks_succeeded": lease.record.succeeded,
                    "tasks_failed": lease.record.failed,
                    "failed_attempts": lease.record.failed_attempts,
                })
            })
            .collect();

        Ok(HttpResponse::json(
            StatusCode::OK,
            &json!({ "count": workers.len(), "workers": workers }),
        ))
    }

    async fn search<B>(&self, req: &Request<B>) -> Result<HttpResponse> {
        let reply = self.state.gateway.dispatch(req.dispatch_request()).await?;

        let status = match reply.outcome() {
            Outcome::Success { .. } => StatusCode::OK,
            Outcome::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Outcome::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };

        Ok(HttpResponse::json(status, &reply))
    }

    async fn clear_cache(&self) -> Result<HttpResponse> {
        let cleared = self.state.gateway.cache().clear().await?;
        info!("cleared {} cached results", cleared);

        Ok(HttpResponse::json(StatusCode::OK, &json!({ "cleared": cleared })))
    }
}
