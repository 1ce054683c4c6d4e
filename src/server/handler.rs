// src/server/handler.rs
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::http::request::Parts;
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower::Service;

use crate::balancer::LoadBalancer;
use crate::metrics::MetricsRegistry;
use crate::registry::ProxyRegistry;

/// Read-only status surface over the registry, the front door and metrics.
#[derive(Clone)]
pub struct StatusHandler {
    registry: Arc<ProxyRegistry>,
    balancer: Option<Arc<LoadBalancer>>,
    metrics: Option<Arc<MetricsRegistry>>,
    metrics_path: Arc<str>,
    auth_token: Arc<str>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

// Every API error is a JSON `{"error": "..."}` payload.
impl From<ApiError> for Response<Body> {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        json_response(
            status,
            &ErrorBody {
                error: err.to_string(),
            },
        )
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(r#"{{"error":"{}"}}"#, e).into_bytes(),
        ),
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

impl StatusHandler {
    pub fn new(registry: Arc<ProxyRegistry>, auth_token: &str) -> Self {
        Self {
            registry,
            balancer: None,
            metrics: None,
            metrics_path: Arc::from("/metrics"),
            auth_token: Arc::from(auth_token),
        }
    }

    pub fn with_balancer(mut self, balancer: Arc<LoadBalancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>, path: &str) -> Self {
        self.metrics = Some(metrics);
        self.metrics_path = Arc::from(path);
        self
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let (parts, _body) = req.into_parts();
        match self.route(&parts).await {
            Ok(response) => response,
            Err(err) => {
                if let ApiError::Internal(msg) = &err {
                    tracing::error!(path = parts.uri.path(), %msg, "status request failed");
                }
                err.into()
            }
        }
    }

    async fn route(&self, req: &Parts) -> Result<Response<Body>, ApiError> {
        let path = req.uri.path();
        if req.method != Method::GET {
            return Err(ApiError::MethodNotAllowed);
        }

        match path {
            "/api/health" => Ok(json_response(StatusCode::OK, &serde_json::json!({ "status": "ok" }))),
            "/api/proxies" => {
                self.authorize(req)?;
                Ok(json_response(StatusCode::OK, &self.registry.list_all().await))
            }
            "/api/proxies/healthy" => {
                self.authorize(req)?;
                Ok(json_response(StatusCode::OK, &self.registry.list_healthy().await))
            }
            "/api/stats" => {
                self.authorize(req)?;
                let balancer = self
                    .balancer
                    .as_ref()
                    .ok_or_else(|| ApiError::Internal("load balancer not attached".into()))?;
                Ok(json_response(StatusCode::OK, &balancer.stats().await))
            }
            p if p == &*self.metrics_path && self.metrics.is_some() => self.metrics_text(),
            _ => Err(ApiError::NotFound),
        }
    }

    fn authorize(&self, req: &Parts) -> Result<(), ApiError> {
        let expected = format!("Bearer {}", self.auth_token);
        match req.headers.get(AUTHORIZATION) {
            Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }

    fn metrics_text(&self) -> Result<Response<Body>, ApiError> {
        let registry = self
            .metrics
            .as_ref()
            .ok_or(ApiError::NotFound)?;
        let body = registry
            .gather()
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        let mut response = Response::new(Body::from(body));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        );
        Ok(response)
    }
}

impl Service<Request<Body>> for StatusHandler {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = futures::future::BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}
