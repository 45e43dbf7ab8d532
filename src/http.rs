//! HTTP API for connection and follow relationships
//!
//! The upstream gateway authenticates callers and passes the person in the
//! `X-Person-Id` header. Bodies and responses are camelCase JSON. Each call
//! runs its store work on the blocking pool under a deadline; clients may
//! shorten it with `X-Request-Timeout-Ms`.
//!
//! ## Person connections
//! - `POST   /connections/requests` - send `{addresseePersonId, note?}`
//! - `POST   /connections/requests/{id}/respond` - `{decision}`
//! - `DELETE /connections/requests/{id}` - cancel
//! - `GET    /connections/requests/incoming` / `outgoing`
//! - `GET    /connections/status/{otherPersonId}`
//! - `DELETE /connections/{otherPersonId}` - remove
//! - `GET    /connections`
//!
//! ## Company connections
//! - `POST   /companies/{actingCompanyId}/connections/requests` - `{targetCompanyId, note?}`
//! - `POST   /companies/connections/requests/{id}/respond`
//! - `DELETE /companies/connections/requests/{id}`
//! - `GET    /companies/{companyId}/connections/requests/incoming` / `outgoing`
//! - `GET    /companies/{actingCompanyId}/connections/status/{otherCompanyId}`
//! - `DELETE /companies/{actingCompanyId}/connections/{otherCompanyId}`
//! - `GET    /companies/{companyId}/connections`
//!
//! ## Follows and admin checks
//! - `POST` / `DELETE` / `GET /companies/{companyId}/follow`
//! - `GET    /companies/{companyId}/followers/count`
//! - `GET    /companies/followed` (organizations the caller follows)
//! - `GET    /companies/{companyId}/admins/{personId}`
//!
//! ## Example Usage
//!
//! ```bash
//! curl -X POST -H "X-Person-Id: u1" -H "Content-Type: application/json" \
//!      -d '{"addresseePersonId":"u2","note":"Great talk!"}' \
//!      http://localhost:8095/connections/requests
//!
//! curl -H "X-Person-Id: u2" http://localhost:8095/connections/requests/incoming?limit=20
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::db::connection_requests::PageQuery;
use crate::db::{Actor, ActorKind};
use crate::error::EngineError;
use crate::services::{self, HandlerResult, Services};
use crate::views::{
    validate_schema_version, AdminCheckView, ConnectionRequestView, ConnectionView, CountView,
    EnrichedRequestView, FollowEdgeView, FollowStatusView, FollowedOrganizationView, HealthView, RespondInputView,
    SendCompanyConnectionInputView, SendConnectionInputView, StatusView,
};

/// Header carrying the authenticated person
pub const PERSON_HEADER: &str = "x-person-id";

/// Header a client may use to lower the per-call deadline
pub const TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Largest accepted request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    request_timeout: Duration,
}

/// Per-call context extracted from the request head
struct Call {
    person: String,
    timeout: Duration,
    page: PageQuery,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, bind_addr: SocketAddr) -> Self {
        Self {
            services,
            bind_addr,
            request_timeout: Duration::from_millis(10_000),
        }
    }

    /// Set the upper bound on a single call
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), EngineError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Route requests to handlers
    pub async fn handle_request<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();
        let method = parts.method.clone();

        debug!(method = %method, path = %path, "Incoming request");

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        if method == Method::GET && segments.as_slice() == ["health"] {
            return Ok(services::from_result(self.handle_health().await));
        }

        let Some(person) = person_id(&parts.headers) else {
            return Ok(services::unauthenticated());
        };

        let call = match self.call_context(person, &parts.headers, parts.uri.query()) {
            Ok(call) => call,
            Err(e) => return Ok(services::error_response(e)),
        };

        let result = match (method, segments.as_slice()) {
            // Person connections
            (Method::POST, ["connections", "requests"]) => self.send_person(call, body).await,
            (Method::POST, ["connections", "requests", id, "respond"]) => {
                self.respond(call, ActorKind::Person, id, body).await
            }
            (Method::DELETE, ["connections", "requests", id]) => {
                self.cancel(call, ActorKind::Person, id).await
            }
            (Method::GET, ["connections", "requests", "incoming"]) => {
                let actor = Actor::person(&call.person);
                self.incoming(call, actor).await
            }
            (Method::GET, ["connections", "requests", "outgoing"]) => {
                let actor = Actor::person(&call.person);
                self.outgoing(call, actor).await
            }
            (Method::GET, ["connections", "status", other]) => {
                let actor = Actor::person(&call.person);
                self.status(call, actor, other).await
            }
            (Method::DELETE, ["connections", other]) => {
                let (a, b) = (Actor::person(&call.person), Actor::person(*other));
                self.remove(call, a, b).await
            }
            (Method::GET, ["connections"]) => {
                let actor = Actor::person(&call.person);
                self.connections(call, actor).await
            }

            // Company connections
            (Method::POST, ["companies", "connections", "requests", id, "respond"]) => {
                self.respond(call, ActorKind::Organization, id, body).await
            }
            (Method::DELETE, ["companies", "connections", "requests", id]) => {
                self.cancel(call, ActorKind::Organization, id).await
            }
            (Method::POST, ["companies", acting, "connections", "requests"]) => {
                self.send_company(call, acting, body).await
            }
            (Method::GET, ["companies", company, "connections", "requests", "incoming"]) => {
                self.incoming(call, Actor::organization(*company)).await
            }
            (Method::GET, ["companies", company, "connections", "requests", "outgoing"]) => {
                self.outgoing(call, Actor::organization(*company)).await
            }
            (Method::GET, ["companies", acting, "connections", "status", other]) => {
                self.status(call, Actor::organization(*acting), other).await
            }
            (Method::DELETE, ["companies", acting, "connections", other]) => {
                let (a, b) = (Actor::organization(*acting), Actor::organization(*other));
                self.remove(call, a, b).await
            }
            (Method::GET, ["companies", company, "connections"]) => {
                self.connections(call, Actor::organization(*company)).await
            }

            // Follows
            (Method::GET, ["companies", "followed"]) => self.followed(call).await,
            (Method::POST, ["companies", company, "follow"]) => self.follow(call, company).await,
            (Method::DELETE, ["companies", company, "follow"]) => self.unfollow(call, company).await,
            (Method::GET, ["companies", company, "follow"]) => self.follow_status(call, company).await,
            (Method::GET, ["companies", company, "followers", "count"]) => {
                self.follower_count(call, company).await
            }

            // Admin check
            (Method::GET, ["companies", company, "admins", person]) => {
                self.admin_check(call, company, person).await
            }

            _ => Ok(services::not_found(&format!("No route for {}", path))),
        };

        Ok(result.unwrap_or_else(services::error_response))
    }

    fn call_context(&self, person: String, headers: &HeaderMap, query: Option<&str>) -> Result<Call, EngineError> {
        let timeout = match headers.get(TIMEOUT_HEADER).and_then(|v| v.to_str().ok()) {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| {
                    EngineError::InvalidInput(format!("Invalid {} header: {}", TIMEOUT_HEADER, raw))
                })?;
                Duration::from_millis(ms).min(self.request_timeout)
            }
            None => self.request_timeout,
        };

        let page = match query {
            Some(q) if !q.is_empty() => serde_urlencoded::from_str::<PageQuery>(q)
                .map_err(|e| EngineError::InvalidInput(format!("Invalid query string: {}", e)))?,
            _ => PageQuery::default(),
        };

        Ok(Call { person, timeout, page })
    }

    /// Run store work on the blocking pool under the call's deadline.
    ///
    /// A timed-out call keeps running to completion in the background; its
    /// transaction either commits fully or rolls back.
    async fn blocking<T, F>(&self, timeout: Duration, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Services) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let services = self.services.clone();
        let task = tokio::task::spawn_blocking(move || f(&services));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(EngineError::Internal(format!("Worker task failed: {}", join_err))),
            Err(_) => Err(EngineError::Timeout(format!(
                "call did not finish within {} ms",
                timeout.as_millis()
            ))),
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    /// Health check endpoint
    async fn handle_health(&self) -> Result<HealthView, EngineError> {
        let stats = self.blocking(self.request_timeout, |s| s.db.stats()).await?;
        Ok(HealthView {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            stats,
        })
    }

    async fn send_person<B>(&self, call: Call, body: B) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let input: SendConnectionInputView = read_json(body).await?;
        validate_schema_version(input.schema_version)?;

        let person = call.person;
        let request = self
            .blocking(call.timeout, move |s| {
                s.connections.send(
                    &person,
                    &Actor::person(&person),
                    &Actor::person(input.addressee_person_id),
                    input.note.as_deref(),
                )
            })
            .await?;

        Ok(services::created(&ConnectionRequestView::try_from(request)?))
    }

    async fn send_company<B>(&self, call: Call, acting: &str, body: B) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let input: SendCompanyConnectionInputView = read_json(body).await?;
        validate_schema_version(input.schema_version)?;

        let person = call.person;
        let requester = Actor::organization(acting);
        let request = self
            .blocking(call.timeout, move |s| {
                s.connections.send(
                    &person,
                    &requester,
                    &Actor::organization(input.target_company_id),
                    input.note.as_deref(),
                )
            })
            .await?;

        Ok(services::created(&ConnectionRequestView::try_from(request)?))
    }

    async fn respond<B>(&self, call: Call, kind: ActorKind, id: &str, body: B) -> HandlerResult
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let input: RespondInputView = read_json(body).await?;
        let decision = input.decision()?;

        let (person, id) = (call.person, id.to_string());
        let request = self
            .blocking(call.timeout, move |s| s.connections.respond(&person, kind, &id, decision))
            .await?;

        Ok(services::ok(&ConnectionRequestView::try_from(request)?))
    }

    async fn cancel(&self, call: Call, kind: ActorKind, id: &str) -> HandlerResult {
        let (person, id) = (call.person, id.to_string());
        self.blocking(call.timeout, move |s| s.connections.cancel(&person, kind, &id))
            .await?;
        Ok(services::no_content())
    }

    async fn remove(&self, call: Call, a: Actor, b: Actor) -> HandlerResult {
        let person = call.person;
        self.blocking(call.timeout, move |s| s.connections.remove(&person, &a, &b))
            .await?;
        Ok(services::no_content())
    }

    async fn status(&self, call: Call, actor: Actor, other: &str) -> HandlerResult {
        let (person, other) = (call.person, other.to_string());
        let status = self
            .blocking(call.timeout, move |s| {
                s.queries.ensure_can_view(&person, &actor)?;
                s.queries.status_between(&actor.id, &other)
            })
            .await?;
        Ok(services::ok(&StatusView { status }))
    }

    async fn incoming(&self, call: Call, actor: Actor) -> HandlerResult {
        let (person, page) = (call.person, call.page);
        let rows = self
            .blocking(call.timeout, move |s| {
                s.queries.ensure_can_view(&person, &actor)?;
                s.queries.pending_incoming_enriched(&actor.id, page)
            })
            .await?;

        let views = rows
            .into_iter()
            .map(EnrichedRequestView::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(services::ok(&views))
    }

    async fn outgoing(&self, call: Call, actor: Actor) -> HandlerResult {
        let (person, page) = (call.person, call.page);
        let rows = self
            .blocking(call.timeout, move |s| {
                s.queries.ensure_can_view(&person, &actor)?;
                s.queries.pending_outgoing_enriched(&actor.id, page)
            })
            .await?;

        let views = rows
            .into_iter()
            .map(EnrichedRequestView::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(services::ok(&views))
    }

    async fn connections(&self, call: Call, actor: Actor) -> HandlerResult {
        let (person, page) = (call.person, call.page);
        let entries = self
            .blocking(call.timeout, move |s| {
                s.queries.ensure_can_view(&person, &actor)?;
                s.queries.connections_enriched(&actor.id, page)
            })
            .await?;

        let views: Vec<ConnectionView> = entries.into_iter().map(ConnectionView::from).collect();
        Ok(services::ok(&views))
    }

    async fn follow(&self, call: Call, company: &str) -> HandlerResult {
        let (person, company) = (call.person, company.to_string());
        let edge = self
            .blocking(call.timeout, move |s| s.follows.follow(&person, &company))
            .await?;
        Ok(services::ok(&FollowEdgeView::from(edge)))
    }

    async fn unfollow(&self, call: Call, company: &str) -> HandlerResult {
        let (person, company) = (call.person, company.to_string());
        self.blocking(call.timeout, move |s| s.follows.unfollow(&person, &company))
            .await?;
        Ok(services::no_content())
    }

    async fn follow_status(&self, call: Call, company: &str) -> HandlerResult {
        let (person, company) = (call.person, company.to_string());
        let following = self
            .blocking(call.timeout, move |s| s.follows.is_following(&person, &company))
            .await?;
        Ok(services::ok(&FollowStatusView { following }))
    }

    async fn follower_count(&self, call: Call, company: &str) -> HandlerResult {
        let company = company.to_string();
        let count = self
            .blocking(call.timeout, move |s| s.follows.follower_count(&company))
            .await?;
        Ok(services::ok(&CountView { count }))
    }

    async fn followed(&self, call: Call) -> HandlerResult {
        let (person, page) = (call.person, call.page);
        let followed = self
            .blocking(call.timeout, move |s| s.follows.followed_organizations(&person, page))
            .await?;

        let views: Vec<FollowedOrganizationView> =
            followed.into_iter().map(FollowedOrganizationView::from).collect();
        Ok(services::ok(&views))
    }

    async fn admin_check(&self, call: Call, company: &str, person: &str) -> HandlerResult {
        let (company, person) = (company.to_string(), person.to_string());
        let is_admin = self
            .blocking(call.timeout, move |s| s.gate.can_act_for(&person, &company))
            .await?;
        Ok(services::ok(&AdminCheckView { is_admin }))
    }
}

fn person_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(PERSON_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

async fn read_json<T, B>(body: B) -> Result<T, EngineError>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| EngineError::InvalidInput(format!("Failed to read body: {}", e)))?
        .to_bytes();

    serde_json::from_slice(&bytes)
        .map_err(|e| EngineError::InvalidInput(format!("Invalid JSON body: {}", e)))
}
