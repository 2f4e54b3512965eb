//! HTTP server setup.
//!
//! The guard proxy: every request runs through the security pipeline and,
//! if admitted, is forwarded unchanged to the storefront upstream.
//!
//! Layer order, outermost first: request id, trace, request id propagation,
//! security headers, security pipeline, proxy handler. The request timeout
//! is enforced inside the pipeline so an overrun is audited.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        uri::{Authority, InvalidUri, PathAndQuery, Scheme},
        HeaderValue, Request, Uri, Version,
    },
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ShieldConfig;
use crate::http::middleware::security_middleware;
use crate::http::request::X_FORWARDED_FOR;
use crate::http::response::{bad_gateway, strip_hop_by_hop};
use crate::pipeline::SecurityPipeline;
use crate::security::headers::security_headers_middleware;

/// State injected into the proxy handler.
#[derive(Clone)]
pub struct ProxyState {
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
}

/// HTTP server for the guard proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server in front of the configured upstream.
    pub fn new(config: &ShieldConfig, pipeline: Arc<SecurityPipeline>) -> Result<Self, InvalidUri> {
        let upstream: Authority = config.upstream.address.parse()?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = ProxyState { client, upstream };
        let router = Self::build_router(config, pipeline, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ShieldConfig, pipeline: Arc<SecurityPipeline>, state: ProxyState) -> Router {
        let router = Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(middleware::from_fn_with_state(pipeline, security_middleware));

        let router = if config.security.enable_headers {
            router.layer(middleware::from_fn(security_headers_middleware))
        } else {
            router
        };

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The assembled router, for embedding or tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Shield listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Forward an admitted request to the upstream.
async fn proxy_handler(
    State(state): State<ProxyState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(state.upstream.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = match Uri::from_parts(uri_parts) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build upstream URI");
            return bad_gateway();
        }
    };

    strip_hop_by_hop(&mut parts.headers);
    let forwarded = match parts.headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(chain) => format!("{chain}, {}", peer.ip()),
        None => peer.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        parts.headers.insert(X_FORWARDED_FOR, value);
    }
    parts.uri = uri;
    parts.version = Version::HTTP_11;

    let upstream_request = Request::from_parts(parts, body);
    match state.client.request(upstream_request).await {
        Ok(response) => {
            let (mut parts, body) = response.into_parts();
            strip_hop_by_hop(&mut parts.headers);
            Response::from_parts(parts, Body::new(body)).into_response()
        }
        Err(e) => {
            tracing::error!(upstream = %state.upstream, error = %e, "Upstream error");
            bad_gateway()
        }
    }
}
