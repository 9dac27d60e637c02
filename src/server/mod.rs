//! HTTP Listener
//!
//! Serves the simulated endpoints and the scrape endpoint over hyper HTTP/1,
//! one task per connection.
//!
//! | Route      | Behavior                               |
//! |------------|----------------------------------------|
//! | `/metrics` | text exposition of the registry        |
//! | `/contact` | contact endpoint                       |
//! | any other  | home endpoint (`/` is a catch-all)     |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::{Error, Result};
use crate::handlers::{Instrumented, Reply};
use crate::registry::InstrumentRegistry;

/// Path of the scrape endpoint
pub const METRICS_PATH: &str = "/metrics";

/// Path of the contact endpoint
pub const CONTACT_PATH: &str = "/contact";

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";

// =============================================================================
// Routing
// =============================================================================

/// Endpoint selected for a request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Metrics,
    Contact,
    Home,
}

impl Route {
    pub fn resolve(path: &str) -> Self {
        match path {
            METRICS_PATH => Route::Metrics,
            CONTACT_PATH => Route::Contact,
            _ => Route::Home,
        }
    }
}

/// Route targets
#[derive(Debug, Clone)]
pub struct Routes {
    pub home: Instrumented,
    pub contact: Instrumented,
    pub registry: Arc<InstrumentRegistry>,
}

impl Routes {
    /// Dispatch on path only; method and body are ignored
    pub async fn dispatch<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let route = Route::resolve(req.uri().path());
        drop(req);

        match route {
            Route::Metrics => self.scrape(),
            Route::Contact => reply(self.contact.call().await),
            Route::Home => reply(self.home.call().await),
        }
    }

    fn scrape(&self) -> Response<Full<Bytes>> {
        match self.registry.render() {
            Ok(text) => {
                let mut response = Response::new(Full::new(Bytes::from(text)));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static(self.registry.content_type()),
                );
                response
            }
            Err(e) => {
                error!("Failed to export metrics: {}", e);
                let mut response = plain(Bytes::from(e.to_string()));
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                response
            }
        }
    }
}

fn reply(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = plain(reply.body);
    *response.status_mut() = reply.status;
    response
}

fn plain(body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(PLAIN_TEXT));
    response
}

// =============================================================================
// Server
// =============================================================================

/// Bound listener serving [`Routes`]
pub struct MetricsServer {
    listener: TcpListener,
    routes: Arc<Routes>,
}

impl MetricsServer {
    /// Bind the listener
    pub async fn bind(addr: &str, routes: Routes) -> Result<Self> {
        let addr: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
            Error::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;

        let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind {
            addr: addr.to_string(),
            source,
        })?;

        Ok(Self {
            listener,
            routes: Arc::new(routes),
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until cancelled
    ///
    /// An accept error ends the server. In-flight connections are not drained.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        info!("Metrics server listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Metrics server shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(Error::Accept)?;
                    let routes = Arc::clone(&self.routes);
                    tokio::spawn(serve_connection(stream, peer, routes));
                }
            }
        }
    }
}

#[instrument(skip(stream, routes))]
async fn serve_connection(stream: tokio::net::TcpStream, peer: SocketAddr, routes: Arc<Routes>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let routes = Arc::clone(&routes);
        async move { Ok::<_, Infallible>(routes.dispatch(req).await) }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
        debug!("Connection error: {}", e);
    }
}

impl std::fmt::Debug for MetricsServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsServer")
            .field("local_addr", &self.listener.local_addr().ok())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{App, ServerConfig};
    use crate::handlers::DelayPolicy;
    use assert_matches::assert_matches;
    use http_body_util::BodyExt;

    fn app() -> App {
        App::new(ServerConfig {
            home_delay: DelayPolicy::none(),
            contact_delay: DelayPolicy::none(),
            ..Default::default()
        })
        .unwrap()
    }

    fn get(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    async fn body(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_route_resolution() {
        assert_eq!(Route::resolve("/metrics"), Route::Metrics);
        assert_eq!(Route::resolve("/contact"), Route::Contact);
        assert_eq!(Route::resolve("/"), Route::Home);
        assert_eq!(Route::resolve("/metrics/"), Route::Home);
    }

    #[tokio::test]
    async fn test_dispatch_contact() {
        let app = app();
        let routes = app.routes();

        let response = routes.dispatch(get("/contact")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "Contact");
        assert_eq!(app.instruments().request_count("contact"), 1);
    }

    #[tokio::test]
    async fn test_unknown_path_is_home() {
        let app = app();
        let routes = app.routes();

        for path in ["/", "/anything", "/contact/extra"] {
            let response = routes.dispatch(get(path)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body(response).await, "Hello Full Cycle");
        }
        assert_eq!(app.instruments().request_count("home"), 3);
        assert_eq!(app.instruments().request_count("contact"), 0);
    }

    #[tokio::test]
    async fn test_scrape_reports_requests() {
        let app = app();
        let routes = app.routes();
        routes.dispatch(get("/")).await;

        let response = routes.dispatch(get("/metrics")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );

        let text = body(response).await;
        assert!(text.contains("goapp_http_requests_total{handler=\"home\"} 1"));
        assert!(text.contains("goapp_http_request_duration_count{handler=\"home\"} 1"));
        // Scrapes are not counted as requests
        assert_eq!(app.instruments().request_count("home"), 1);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let err = MetricsServer::bind("not-an-address", app().routes())
            .await
            .unwrap_err();
        assert_matches!(err, Error::InvalidAddress { .. });
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = MetricsServer::bind("127.0.0.1:0", app().routes())
            .await
            .unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let err = MetricsServer::bind(&addr, app().routes()).await.unwrap_err();
        assert_matches!(err, Error::Bind { .. });
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let server = MetricsServer::bind("127.0.0.1:0", app().routes())
            .await
            .unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.serve(cancel.clone()));

        cancel.cancel();
        assert!(task.await.unwrap().is_ok());
    }
}
