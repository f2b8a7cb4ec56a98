//! In-memory model of the deployed edge: firewall, distribution, edge cache,
//! private store and API front door.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use http::{Method, StatusCode};
use stack_api::{
    CorsConfig, Handler, HandlerResponse, HttpMethod, InvocationContext, InvocationEvent,
    RouteTable,
};
use stack_security::{FilterAction, PolicyEvaluator, RequestSample};

use crate::assets::{Asset, AssetSet};
use crate::behavior::{glob_match, OriginKind, ProtocolPolicy};
use crate::cache::CacheStatus;
use crate::distribution::Distribution;
use crate::error::{DeliveryError, DeliveryResult};
use crate::publish::AssetPublication;
use crate::unit::{DeliveryUnit, ERROR_RESPONSE_CODES};

/// Header carrying the cache status on every response.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Domain the simulated distribution answers on.
pub const SIMULATED_DOMAIN: &str = "d111111abcdef8.cloudfront.net";

/// Request arriving at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRequest {
    pub method: Method,
    pub path: String,
    pub secure: bool,
    pub source_ip: IpAddr,
    /// Request headers, lowercase names.
    pub headers: BTreeMap<String, String>,
}

impl EdgeRequest {
    /// HTTPS GET from a documentation address.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            secure: true,
            source_ip: IpAddr::V4(Ipv4Addr::new(203, 0, 113, 10)),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn from_ip(mut self, ip: IpAddr) -> Self {
        self.source_ip = ip;
        self
    }

    /// Send over plain HTTP.
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }
}

/// Response leaving the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeResponse {
    pub status: StatusCode,
    /// Response headers, lowercase names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub cache: CacheStatus,
}

impl EdgeResponse {
    fn new(status: StatusCode, body: impl Into<Vec<u8>>, cache: CacheStatus) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(CACHE_STATUS_HEADER.to_string(), cache.to_string());
        Self {
            status,
            headers,
            body: body.into(),
            cache,
        }
    }

    fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    fn with_cache(mut self, cache: CacheStatus) -> Self {
        self.headers
            .insert(CACHE_STATUS_HEADER.to_string(), cache.to_string());
        self.cache = cache;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[derive(Debug, Clone)]
struct CachedResponse {
    response: EdgeResponse,
    expires_at: Duration,
}

/// Simulated edge for one delivery unit.
///
/// The clock only moves through [`EdgeSimulator::advance`], so TTL expiry and
/// rate windows are deterministic.
pub struct EdgeSimulator {
    distribution: Distribution,
    error_document: Option<String>,
    routes: RouteTable,
    cors: CorsConfig,
    firewall: PolicyEvaluator,
    handlers: HashMap<String, Box<dyn Handler>>,
    objects: BTreeMap<String, Asset>,
    cache: HashMap<String, CachedResponse>,
    now: Duration,
    next_request: u64,
    origin_fetches: usize,
}

impl EdgeSimulator {
    /// Simulator for a declared unit, with an empty store and no handlers.
    pub fn new(unit: &DeliveryUnit) -> Self {
        Self {
            distribution: unit.distribution().clone(),
            error_document: unit.store().error_document.clone(),
            routes: unit.api_handle().routes().clone(),
            cors: unit.api_handle().cors().clone(),
            firewall: PolicyEvaluator::new(unit.policy_handle().policy().clone()),
            handlers: HashMap::new(),
            objects: BTreeMap::new(),
            cache: HashMap::new(),
            now: Duration::ZERO,
            next_request: 0,
            origin_fetches: 0,
        }
    }

    /// Attach a handler under its endpoint id.
    pub fn register(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.handlers
            .insert(handler.endpoint_id().to_string(), Box::new(handler));
        self
    }

    /// Move the clock forward.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Requests that reached an origin so far.
    pub fn origin_fetches(&self) -> usize {
        self.origin_fetches
    }

    /// Number of objects in the store.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Upload every asset; with `prune`, delete objects not in the set.
    /// Returns the number of objects written.
    pub fn upload(&mut self, assets: &AssetSet, prune: bool) -> usize {
        if prune {
            self.objects.retain(|key, _| assets.contains(key));
        }
        let mut written = 0;
        for asset in assets.iter() {
            let unchanged = self
                .objects
                .get(&asset.key)
                .is_some_and(|existing| existing.sha256 == asset.sha256);
            if !unchanged {
                self.objects.insert(asset.key.clone(), asset.clone());
                written += 1;
            }
        }
        written
    }

    /// Drop cached responses whose path matches any of `paths`.
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, paths: &[String]) -> usize {
        let before = self.cache.len();
        self.cache.retain(|cached_path, _| {
            !paths
                .iter()
                .any(|p| glob_match(p.as_bytes(), cached_path.as_bytes()))
        });
        before - self.cache.len()
    }

    /// Run a publication: upload, then invalidate its paths.
    pub fn apply(
        &mut self,
        publication: &AssetPublication,
        assets: &AssetSet,
    ) -> DeliveryResult<usize> {
        if !publication.matches(assets) {
            return Err(DeliveryError::PublicationMismatch {
                expected: publication.content_hash.clone(),
                actual: assets.content_hash(),
            });
        }
        let written = self.upload(assets, publication.prune);
        let invalidated = self.invalidate(&publication.invalidation_paths);
        tracing::debug!(written, invalidated, "applied publication");
        Ok(invalidated)
    }

    /// Serve one request.
    pub fn request(&mut self, request: &EdgeRequest) -> EdgeResponse {
        let behavior = self.distribution.behavior_for(&request.path).clone();

        if !request.secure {
            return match behavior.protocol {
                ProtocolPolicy::RedirectToHttps => {
                    EdgeResponse::new(StatusCode::MOVED_PERMANENTLY, "", CacheStatus::Edge)
                        .with_header(
                            "location",
                            format!("https://{}{}", SIMULATED_DOMAIN, request.path),
                        )
                }
                ProtocolPolicy::HttpsOnly => {
                    EdgeResponse::new(StatusCode::FORBIDDEN, "", CacheStatus::Edge)
                }
            };
        }

        let sample = RequestSample::new(request.source_ip, request.path.clone());
        let verdict = self.firewall.evaluate(&sample, self.now.as_secs());
        if verdict.action == FilterAction::Block {
            return EdgeResponse::new(StatusCode::FORBIDDEN, "Request blocked", CacheStatus::Edge);
        }

        if !behavior.allows_method(request.method.as_str()) {
            return EdgeResponse::new(StatusCode::FORBIDDEN, "Method not allowed", CacheStatus::Edge);
        }

        let cacheable = behavior.cache.allows_caching()
            && matches!(request.method, Method::GET | Method::HEAD);

        if cacheable {
            if let Some(cached) = self.cache.get(&request.path) {
                if cached.expires_at > self.now {
                    return cached.response.clone().with_cache(CacheStatus::Hit);
                }
            }
        }

        self.origin_fetches += 1;
        let response = match behavior.origin {
            OriginKind::ObjectStore => self.fetch_object(&request.path),
            OriginKind::ApiEndpoint => self.invoke_api(request),
        };
        let response = self.custom_error_response(response);

        if !cacheable {
            return response.with_cache(CacheStatus::Bypass);
        }

        let response = response.with_cache(CacheStatus::Miss);
        if response.status == StatusCode::OK {
            if let Some(ttl) = behavior.cache.default_ttl() {
                self.cache.insert(
                    request.path.clone(),
                    CachedResponse {
                        response: response.clone(),
                        expires_at: self.now + ttl,
                    },
                );
            }
        }
        response
    }

    fn fetch_object(&self, path: &str) -> EdgeResponse {
        let key = self.distribution.object_key(path);
        if let Some(asset) = self.objects.get(&key) {
            return EdgeResponse::new(StatusCode::OK, asset.body.clone(), CacheStatus::Miss)
                .with_header("content-type", asset.content_type)
                .with_header("etag", format!("\"{}\"", &asset.sha256[..32]));
        }

        // Without list permission the store reports missing keys as denied.
        EdgeResponse::new(
            StatusCode::FORBIDDEN,
            "<Error><Code>AccessDenied</Code></Error>",
            CacheStatus::Miss,
        )
        .with_header("content-type", "application/xml")
    }

    /// Replace an origin error with the error document, whichever origin answered.
    fn custom_error_response(&self, response: EdgeResponse) -> EdgeResponse {
        if !ERROR_RESPONSE_CODES.contains(&response.status.as_u16()) {
            return response;
        }
        let Some(page) = self
            .error_document
            .as_ref()
            .and_then(|doc| self.objects.get(doc.trim_start_matches('/')))
        else {
            return response;
        };

        EdgeResponse::new(StatusCode::NOT_FOUND, page.body.clone(), response.cache)
            .with_header("content-type", page.content_type)
    }

    fn invoke_api(&mut self, request: &EdgeRequest) -> EdgeResponse {
        let method = match HttpMethod::try_from(&request.method) {
            Ok(method) => method,
            Err(_) => return api_error(StatusCode::NOT_FOUND, "Not Found"),
        };

        if method == HttpMethod::Options {
            let origin = request.headers.get("origin").map(String::as_str).unwrap_or("");
            let requested = request
                .headers
                .get("access-control-request-method")
                .map(String::as_str)
                .unwrap_or("GET");
            if let Some(headers) = self.cors.preflight(origin, requested) {
                let mut response =
                    EdgeResponse::new(StatusCode::NO_CONTENT, "", CacheStatus::Miss);
                response.headers.extend(headers);
                return response;
            }
        }

        let Some(target) = self.routes.resolve(method, &request.path) else {
            return api_error(StatusCode::NOT_FOUND, "Not Found");
        };
        let Some(handler) = self.handlers.get(target) else {
            tracing::warn!(endpoint = target, "no handler registered for routed endpoint");
            return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        };

        self.next_request += 1;
        let ctx = InvocationContext::new(target, format!("sim-{:08x}", self.next_request));
        let mut event = InvocationEvent::new(method.as_str(), request.path.clone());
        event.headers = request.headers.clone();

        match handler.handle(&event, &ctx) {
            Ok(response) => from_handler(response),
            Err(e) => {
                tracing::warn!(endpoint = target, error = %e, "handler failed");
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }
}

fn from_handler(response: HandlerResponse) -> EdgeResponse {
    let status = StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut edge = EdgeResponse::new(status, response.body, CacheStatus::Miss);
    for (name, value) in response.headers {
        edge = edge.with_header(&name, value);
    }
    edge
}

fn api_error(status: StatusCode, message: &str) -> EdgeResponse {
    EdgeResponse::new(
        status,
        serde_json::json!({ "message": message }).to_string(),
        CacheStatus::Miss,
    )
    .with_header("content-type", "application/json")
}

#[cfg(test)]
mod tests {
    use stack_api::{ApiComputeUnit, ApiConfig, GreetingBody, HandlerError};
    use stack_core::StackEnv;
    use stack_security::{EdgeSecurityUnit, RuleConfig, SecurityConfig};

    use super::*;
    use crate::unit::DeliveryConfig;

    struct Echo(&'static str);

    impl Handler for Echo {
        fn endpoint_id(&self) -> &str {
            self.0
        }

        fn handle(
            &self,
            _event: &InvocationEvent,
            ctx: &InvocationContext,
        ) -> Result<HandlerResponse, HandlerError> {
            let body = GreetingBody::new(
                format!("Hello from {}!", self.0),
                chrono::Utc::now(),
                ctx,
            );
            HandlerResponse::json(200, &body)
        }
    }

    fn site(version: &str) -> AssetSet {
        AssetSet::from_files([
            ("index.html", format!("<h1>{version}</h1>")),
            ("app.js", "console.log(1)".to_string()),
        ])
    }

    fn simulator_with(
        security: &SecurityConfig,
        config: &DeliveryConfig,
    ) -> (DeliveryUnit, EdgeSimulator) {
        let waf = EdgeSecurityUnit::new("WafStack", security).unwrap();
        let api =
            ApiComputeUnit::new("ApiStack", StackEnv::global_edge(), &ApiConfig::default()).unwrap();
        let unit = DeliveryUnit::new(
            "FrontendStack",
            StackEnv::global_edge(),
            config,
            &waf.policy_handle(),
            &api.api_handle(),
            &site("v1"),
        )
        .unwrap();

        let mut sim = EdgeSimulator::new(&unit);
        sim.register(Echo("sample-lambda-1"));
        sim.apply(unit.publication(), &site("v1")).unwrap();
        (unit, sim)
    }

    fn simulator() -> (DeliveryUnit, EdgeSimulator) {
        simulator_with(&SecurityConfig::default(), &DeliveryConfig::default())
    }

    #[test]
    fn test_root_served_then_cached() {
        let (_, mut sim) = simulator();

        let first = sim.request(&EdgeRequest::get("/"));
        assert_eq!(first.status, StatusCode::OK);
        assert_eq!(first.text(), "<h1>v1</h1>");
        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(first.header("content-type"), Some("text/html; charset=utf-8"));

        let second = sim.request(&EdgeRequest::get("/"));
        assert_eq!(second.cache, CacheStatus::Hit);
        assert_eq!(second.header(CACHE_STATUS_HEADER), Some("Hit from edge"));
        assert_eq!(sim.origin_fetches(), 1);
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let (_, mut sim) = simulator();
        sim.request(&EdgeRequest::get("/app.js"));
        sim.advance(Duration::from_secs(86_401));
        assert_eq!(sim.request(&EdgeRequest::get("/app.js")).cache, CacheStatus::Miss);
    }

    #[test]
    fn test_api_never_cached() {
        let (_, mut sim) = simulator();
        for _ in 0..3 {
            let response = sim.request(&EdgeRequest::get("/api/lambda-1"));
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.cache, CacheStatus::Bypass);
        }
        assert_eq!(sim.origin_fetches(), 3);
    }

    #[test]
    fn test_api_request_ids_are_distinct() {
        let (_, mut sim) = simulator();
        let a = sim.request(&EdgeRequest::get("/api/lambda-1")).json().unwrap();
        let b = sim.request(&EdgeRequest::get("/api/lambda-1")).json().unwrap();
        assert_eq!(a["message"], "Hello from sample-lambda-1!");
        assert_ne!(a["requestId"], b["requestId"]);
    }

    #[test]
    fn test_unrouted_api_path_is_not_found() {
        let (_, mut sim) = simulator();
        let response = sim.request(&EdgeRequest::get("/api/lambda-3"));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json().unwrap()["message"], "Not Found");

        let wrong_method = sim.request(&EdgeRequest::get("/api/lambda-1").with_method(Method::POST));
        assert_eq!(wrong_method.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_routed_without_handler_is_server_error() {
        let (_, mut sim) = simulator();
        let response = sim.request(&EdgeRequest::get("/api/lambda-2"));
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_preflight_answered_by_front_door() {
        let (_, mut sim) = simulator();
        let response = sim.request(
            &EdgeRequest::get("/api/lambda-1")
                .with_method(Method::OPTIONS)
                .with_header("Origin", "https://example.com")
                .with_header("Access-Control-Request-Method", "GET"),
        );
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_http_redirects_to_https() {
        let (_, mut sim) = simulator();
        let response = sim.request(&EdgeRequest::get("/").insecure());
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.header("location"),
            Some("https://d111111abcdef8.cloudfront.net/")
        );
        assert_eq!(sim.origin_fetches(), 0);
    }

    #[test]
    fn test_only_get_head_reach_store() {
        let (_, mut sim) = simulator();
        let response = sim.request(&EdgeRequest::get("/").with_method(Method::POST));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_missing_object_denied() {
        let (_, mut sim) = simulator();
        let response = sim.request(&EdgeRequest::get("/missing.html"));
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert!(response.text().contains("AccessDenied"));
        // Errors are not cached.
        assert_eq!(sim.request(&EdgeRequest::get("/missing.html")).cache, CacheStatus::Miss);
    }

    #[test]
    fn test_error_document_served_for_missing_object() {
        let config = DeliveryConfig {
            error_document: Some("index.html".into()),
            ..Default::default()
        };
        let (_, mut sim) = simulator_with(&SecurityConfig::default(), &config);
        let response = sim.request(&EdgeRequest::get("/missing.html"));
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.text(), "<h1>v1</h1>");
    }

    #[test]
    fn test_error_document_replaces_api_errors() {
        let config = DeliveryConfig {
            error_document: Some("index.html".into()),
            ..Default::default()
        };
        let (_, mut sim) = simulator_with(&SecurityConfig::default(), &config);

        let unrouted = sim.request(&EdgeRequest::get("/api/lambda-3"));
        assert_eq!(unrouted.status, StatusCode::NOT_FOUND);
        assert_eq!(unrouted.text(), "<h1>v1</h1>");
        assert_eq!(unrouted.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(unrouted.cache, CacheStatus::Bypass);

        // Other statuses pass through untouched.
        let served = sim.request(&EdgeRequest::get("/api/lambda-1"));
        assert_eq!(served.status, StatusCode::OK);
        assert!(served.json().is_ok());
        let failed = sim.request(&EdgeRequest::get("/api/lambda-2"));
        assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_publish_and_invalidate_shows_new_content() {
        let (unit, mut sim) = simulator();
        assert_eq!(sim.request(&EdgeRequest::get("/")).text(), "<h1>v1</h1>");

        // Upload without invalidation leaves the stale copy at the edge.
        sim.upload(&site("v2"), true);
        assert_eq!(sim.request(&EdgeRequest::get("/")).text(), "<h1>v1</h1>");

        let mut publication = unit.publication().clone();
        publication.content_hash = site("v2").content_hash();
        let invalidated = sim.apply(&publication, &site("v2")).unwrap();
        assert_eq!(invalidated, 1);

        let fresh = sim.request(&EdgeRequest::get("/"));
        assert_eq!(fresh.cache, CacheStatus::Miss);
        assert_eq!(fresh.text(), "<h1>v2</h1>");
    }

    #[test]
    fn test_apply_rejects_other_asset_set() {
        let (unit, mut sim) = simulator();
        let err = sim.apply(unit.publication(), &site("v3")).unwrap_err();
        assert!(matches!(err, DeliveryError::PublicationMismatch { .. }));
    }

    #[test]
    fn test_prune_removes_stale_objects() {
        let (_, mut sim) = simulator();
        assert_eq!(sim.object_count(), 2);
        assert_eq!(sim.upload(&AssetSet::from_files([("index.html", "<h1>v1</h1>")]), true), 0);
        assert_eq!(sim.object_count(), 1);
    }

    #[test]
    fn test_firewall_blocks_above_rate() {
        let security = SecurityConfig {
            rules: vec![RuleConfig::rate_limit("RateLimitRule", 1, 100)],
            ..Default::default()
        };
        let (_, mut sim) = simulator_with(&security, &DeliveryConfig::default());

        for _ in 0..100 {
            assert_eq!(sim.request(&EdgeRequest::get("/")).status, StatusCode::OK);
        }
        let blocked = sim.request(&EdgeRequest::get("/"));
        assert_eq!(blocked.status, StatusCode::FORBIDDEN);
        assert_eq!(blocked.cache, CacheStatus::Edge);

        let other = EdgeRequest::get("/").from_ip(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 7)));
        assert_eq!(sim.request(&other).status, StatusCode::OK);

        sim.advance(Duration::from_secs(300));
        assert_eq!(sim.request(&EdgeRequest::get("/")).status, StatusCode::OK);
    }
}
