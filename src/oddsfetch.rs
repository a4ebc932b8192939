//! Bookmaker odds fetch engine.
//!
//! Wires the proxy pool, circuit breakers, rate limiter, retry orchestrator
//! and browser context cache into [`OddsFetcher`], which walks the
//! API → static HTML → browser chain until a tier yields records.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use http::header::ACCEPT;
use http::{HeaderMap, HeaderValue};
use rand::{Rng, thread_rng};
use scraper::Html;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

use crate::browser::{BrowserContextCache, BrowserPage, BrowserRuntime};
use crate::config::{ConfigError, FetchConfig};
use crate::external_deps::captcha::{
	CaptchaChallenge, CaptchaDetector, CaptchaSolver, MarkerCaptchaDetector, NoopCaptchaSolver,
};
use crate::hooks::{NoPagination, OddsParser, PageSource, Paginator, Tier};
use crate::modules::circuit_breaker::CircuitBreakerRegistry;
use crate::modules::events::{EventDispatcher, EventHandler, FetchEvent, LoggingHandler, MetricsHandler};
use crate::modules::metrics::{FetchMetrics, MetricsSnapshot};
use crate::modules::proxy::ProxyPool;
use crate::modules::rate_limit::{RateLimiter, SharedRateLimiter};
use crate::modules::response_cache::{CachedPayload, ResponseCache};
use crate::modules::retry::{AttemptContext, AttemptError, FetchOutcome, RetryOrchestrator};
use crate::modules::user_agents::UserAgentRotator;
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

const API_ACCEPT: &str = "application/json, text/plain, */*";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Result alias used across the engine surface.
pub type FetchResult<T> = Result<T, FetchError>;

/// Errors that escape the engine. Upstream failures never do: they resolve
/// to an empty record list.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("engine is not open; call open() first")]
	NotOpen,
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("missing component: {0}")]
	MissingComponent(&'static str),
}

/// Fluent builder for [`OddsFetcher`].
pub struct OddsFetcherBuilder<P: OddsParser> {
	config: FetchConfig,
	parser: Option<P>,
	paginator: Arc<dyn Paginator>,
	captcha_detector: Arc<dyn CaptchaDetector>,
	captcha_solver: Arc<dyn CaptchaSolver>,
	shared_limiter: Option<SharedRateLimiter>,
	transport: Option<Arc<dyn HttpTransport>>,
	browser_runtime: Option<Arc<dyn BrowserRuntime>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl<P: OddsParser> OddsFetcherBuilder<P> {
	pub fn new() -> Self {
		Self {
			config: FetchConfig::default(),
			parser: None,
			paginator: Arc::new(NoPagination),
			captcha_detector: Arc::new(MarkerCaptchaDetector::default()),
			captcha_solver: Arc::new(NoopCaptchaSolver),
			shared_limiter: None,
			transport: None,
			browser_runtime: default_browser_runtime(),
			handlers: Vec::new(),
		}
	}

	pub fn with_config(mut self, config: FetchConfig) -> Self {
		self.config = config;
		self
	}

	pub fn with_parser(mut self, parser: P) -> Self {
		self.parser = Some(parser);
		self
	}

	pub fn with_paginator(mut self, paginator: Arc<dyn Paginator>) -> Self {
		self.paginator = paginator;
		self
	}

	pub fn with_captcha_detector(mut self, detector: Arc<dyn CaptchaDetector>) -> Self {
		self.captcha_detector = detector;
		self
	}

	pub fn with_captcha_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
		self.captcha_solver = solver;
		self
	}

	/// Shares one limiter between several engines, typically one per site.
	pub fn with_shared_limiter(mut self, limiter: SharedRateLimiter) -> Self {
		self.shared_limiter = Some(limiter);
		self
	}

	pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_browser_runtime(mut self, runtime: Arc<dyn BrowserRuntime>) -> Self {
		self.browser_runtime = Some(runtime);
		self
	}

	/// Disables the browser tier regardless of build features.
	pub fn without_browser(mut self) -> Self {
		self.browser_runtime = None;
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn build(self) -> FetchResult<OddsFetcher<P>> {
		let config = self.config;
		config.validate()?;
		let parser = self.parser.ok_or(FetchError::MissingComponent("parser"))?;
		let base_url = Url::parse(&config.base_url)?;

		let pool = ProxyPool::with_proxies(config.proxy_config(), config.proxies.iter().cloned());
		let mut user_agents = UserAgentRotator::new(config.user_agents.iter().cloned());
		if pool.is_direct() {
			// Without proxies a rotating UA only makes one client look like many.
			user_agents = user_agents.pin_first();
		}

		let metrics = FetchMetrics::new();
		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler::new(config.bookmaker.clone())));
		events.register_handler(Arc::new(MetricsHandler::new(metrics.clone())));
		for handler in self.handlers {
			events.register_handler(handler);
		}
		let events = Arc::new(events);

		let limiter = match self.shared_limiter {
			Some(shared) => RateLimiter::shared(shared),
			None => RateLimiter::per_instance(config.requests_per_minute),
		};

		let retry = RetryOrchestrator::new(
			config.retry_config(),
			Arc::new(Mutex::new(pool)),
			Arc::new(CircuitBreakerRegistry::new(config.breaker_config())),
			Arc::new(limiter),
			user_agents,
			Arc::clone(&events),
		);

		let transport: Arc<dyn HttpTransport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestTransport::new(config.http2, config.request_timeout())),
		};
		let browser = self
			.browser_runtime
			.filter(|_| config.browser_fallback)
			.map(|runtime| Arc::new(BrowserContextCache::new(runtime, config.context_cache_config())));
		let response_cache = config.response_cache_ttl().map(ResponseCache::new);

		Ok(OddsFetcher {
			config,
			base_url,
			parser,
			paginator: self.paginator,
			captcha_detector: self.captcha_detector,
			captcha_solver: self.captcha_solver,
			transport,
			browser,
			retry,
			events,
			metrics,
			response_cache,
			lifecycle: tokio::sync::Mutex::new(()),
			open: AtomicBool::new(false),
			browser_ready: AtomicBool::new(false),
		})
	}
}

impl<P: OddsParser> Default for OddsFetcherBuilder<P> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(feature = "chromium")]
fn default_browser_runtime() -> Option<Arc<dyn BrowserRuntime>> {
	Some(Arc::new(crate::external_deps::chromium::ChromiumRuntime::default()))
}

#[cfg(not(feature = "chromium"))]
fn default_browser_runtime() -> Option<Arc<dyn BrowserRuntime>> {
	None
}

/// Resilient odds fetcher for one bookmaker.
pub struct OddsFetcher<P: OddsParser> {
	config: FetchConfig,
	base_url: Url,
	parser: P,
	paginator: Arc<dyn Paginator>,
	captcha_detector: Arc<dyn CaptchaDetector>,
	captcha_solver: Arc<dyn CaptchaSolver>,
	transport: Arc<dyn HttpTransport>,
	browser: Option<Arc<BrowserContextCache>>,
	retry: RetryOrchestrator,
	events: Arc<EventDispatcher>,
	metrics: FetchMetrics,
	response_cache: Option<ResponseCache>,
	lifecycle: tokio::sync::Mutex<()>,
	open: AtomicBool,
	browser_ready: AtomicBool,
}

impl<P: OddsParser> OddsFetcher<P> {
	pub fn builder() -> OddsFetcherBuilder<P> {
		OddsFetcherBuilder::new()
	}

	pub fn config(&self) -> &FetchConfig {
		&self.config
	}

	pub fn bookmaker(&self) -> &str {
		&self.config.bookmaker
	}

	pub fn is_open(&self) -> bool {
		self.open.load(Ordering::SeqCst)
	}

	/// Starts the browser runtime (when one is configured) and marks the
	/// engine usable. Calling it on an open engine does nothing.
	///
	/// A browser that fails to launch only disables the browser tier.
	pub async fn open(&self) {
		let _lifecycle = self.lifecycle.lock().await;
		if self.is_open() {
			return;
		}

		if let Some(browser) = &self.browser {
			match browser.runtime().launch().await {
				Ok(()) => self.browser_ready.store(true, Ordering::SeqCst),
				Err(err) => log::warn!(
					"[{}] browser unavailable, continuing without browser tier: {err}",
					self.bookmaker()
				),
			}
		}

		self.open.store(true, Ordering::SeqCst);
		log::info!("[{}] engine opened", self.bookmaker());
	}

	/// Releases cached browser contexts, the browser runtime and pooled
	/// connections. Idempotent.
	pub async fn close(&self) {
		let _lifecycle = self.lifecycle.lock().await;
		if let Some(teardown) = self.begin_close() {
			teardown.run().await;
		}
	}

	/// Opens the engine, runs `f` and closes the engine again.
	///
	/// If `f` panics or the returned future is dropped, the release runs on a
	/// spawned task instead.
	pub async fn session<'a, F, Fut, T>(&'a self, f: F) -> T
	where
		F: FnOnce(&'a Self) -> Fut,
		Fut: Future<Output = T> + 'a,
	{
		self.open().await;
		let guard = SessionGuard(self);
		let output = f(self).await;
		self.close().await;
		drop(guard);
		output
	}

	/// Flips the engine to closed and returns what still has to be released,
	/// or `None` when it was not open.
	fn begin_close(&self) -> Option<Teardown> {
		if !self.open.swap(false, Ordering::SeqCst) {
			return None;
		}
		Some(Teardown {
			bookmaker: self.config.bookmaker.clone(),
			browser: self.browser.clone(),
			shutdown_runtime: self.browser_ready.swap(false, Ordering::SeqCst),
			transport: Arc::clone(&self.transport),
		})
	}

	/// User agent of the most recent attempt.
	pub fn user_agent(&self) -> String {
		self.retry.current_user_agent()
	}

	pub fn breakers(&self) -> &CircuitBreakerRegistry {
		self.retry.breakers()
	}

	pub fn browser_contexts(&self) -> Option<&BrowserContextCache> {
		self.browser.as_deref()
	}

	pub fn metrics_snapshot(&self) -> MetricsSnapshot {
		let proxy_stats = self
			.retry
			.proxies()
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.stats();
		self.metrics.snapshot(self.bookmaker(), proxy_stats)
	}

	/// Fetches records for one listing, trying the API endpoint (if any),
	/// then the static page at `sport_path`, then the rendered page.
	///
	/// Returns an empty list when every tier comes back empty.
	pub async fn get_odds(
		&self,
		api_endpoint: Option<&str>,
		sport_path: &str,
	) -> FetchResult<Vec<P::Record>> {
		if !self.is_open() {
			return Err(FetchError::NotOpen);
		}

		if let Some(endpoint) = api_endpoint {
			let url = join_url(&self.base_url, endpoint)?;
			let key = Tier::Api.endpoint_key(endpoint);
			let records = self.try_api(&key, url).await;
			if !records.is_empty() {
				return Ok(self.finish(&key, records));
			}
		}

		let url = join_url(&self.base_url, sport_path)?;

		let key = Tier::Http.endpoint_key(url.as_str());
		let records = self.try_static_html(&key, url.clone()).await;
		if !records.is_empty() {
			return Ok(self.finish(&key, records));
		}

		let key = Tier::Browser.endpoint_key(url.as_str());
		let records = self.try_browser(&key, url).await;
		if !records.is_empty() {
			return Ok(self.finish(&key, records));
		}

		log::debug!("[{}] no records for {sport_path:?}", self.bookmaker());
		Ok(Vec::new())
	}

	/// Runs [`get_odds`](Self::get_odds) for every API endpoint and every
	/// sport path concurrently and flattens the results. Individual failures
	/// are logged and skipped.
	pub async fn get_multiple_odds(
		&self,
		api_endpoints: &[&str],
		sport_paths: &[&str],
	) -> FetchResult<Vec<P::Record>> {
		if !self.is_open() {
			return Err(FetchError::NotOpen);
		}

		let jobs: Vec<(Option<&str>, &str)> = api_endpoints
			.iter()
			.map(|endpoint| (Some(*endpoint), ""))
			.chain(sport_paths.iter().map(|path| (None, *path)))
			.collect();
		let results = join_all(jobs.iter().map(|(api, path)| self.get_odds(*api, path))).await;

		let mut records = Vec::new();
		for ((api, path), result) in jobs.iter().zip(results) {
			match result {
				Ok(batch) => records.extend(batch),
				Err(err) => log::error!(
					"[{}] fetch failed api={} path={path:?}: {err}",
					self.bookmaker(),
					api.unwrap_or("-")
				),
			}
		}
		Ok(records)
	}

	fn finish(&self, key: &str, records: Vec<P::Record>) -> Vec<P::Record> {
		self.events.dispatch(FetchEvent::Records {
			endpoint: key.to_string(),
			count: records.len(),
		});
		records
	}

	async fn try_api(&self, key: &str, url: Url) -> Vec<P::Record> {
		let cache_key = ResponseCache::api_key(url.as_str());
		let payload = match self.cached(&cache_key) {
			Some(CachedPayload::Json(payload)) => payload,
			_ => {
				let outcome = self
					.retry
					.execute(key, |ctx| self.fetch_json(url.clone(), ctx))
					.await;
				let Some(payload) = outcome.success() else {
					return Vec::new();
				};
				self.store(cache_key, CachedPayload::Json(payload.clone()));
				payload
			}
		};

		match self.parser.parse_api(&payload) {
			Ok(records) => records,
			Err(err) => {
				log::error!("[{}] parse_api failed endpoint={key}: {err}", self.bookmaker());
				Vec::new()
			}
		}
	}

	async fn try_static_html(&self, key: &str, url: Url) -> Vec<P::Record> {
		let cache_key = ResponseCache::html_key(url.as_str());
		let html = match self.cached(&cache_key) {
			Some(CachedPayload::Html(html)) => html,
			_ => {
				let outcome = self
					.retry
					.execute(key, |ctx| self.fetch_html(url.clone(), ctx))
					.await;
				let Some(html) = outcome.success() else {
					return Vec::new();
				};
				self.store(cache_key, CachedPayload::Html(html.clone()));
				html
			}
		};

		self.parse_listing(key, PageSource {
			url: url.to_string(),
			tier: Tier::Http,
			html,
		})
		.await
	}

	async fn try_browser(&self, key: &str, url: Url) -> Vec<P::Record> {
		let Some(browser) = &self.browser else {
			return Vec::new();
		};
		if !self.browser_ready.load(Ordering::SeqCst) {
			log::debug!("[{}] browser tier skipped for {key}: runtime not running", self.bookmaker());
			return Vec::new();
		}

		let outcome = self
			.retry
			.execute(key, |ctx| self.fetch_rendered(browser, url.clone(), ctx))
			.await;
		match outcome {
			FetchOutcome::Success(html) => {
				self.parse_listing(key, PageSource {
					url: url.to_string(),
					tier: Tier::Browser,
					html,
				})
				.await
			}
			_ => Vec::new(),
		}
	}

	async fn fetch_json(&self, url: Url, ctx: AttemptContext) -> Result<Value, AttemptError> {
		let response = self
			.transport
			.get(self.request(url, &ctx, API_ACCEPT))
			.await?;
		if let Some(err) = AttemptError::from_status(response.status, &response.headers) {
			return Err(err);
		}
		if !response.is_json() {
			return Err(AttemptError::EmptyResult);
		}

		let payload: Value = serde_json::from_slice(&response.body)
			.map_err(|err| AttemptError::Transient(format!("malformed JSON body: {err}")))?;
		if is_empty_payload(&payload) {
			return Err(AttemptError::EmptyResult);
		}
		Ok(payload)
	}

	async fn fetch_html(&self, url: Url, ctx: AttemptContext) -> Result<String, AttemptError> {
		let response = self
			.transport
			.get(self.request(url.clone(), &ctx, HTML_ACCEPT))
			.await?;
		if let Some(err) = AttemptError::from_status(response.status, &response.headers) {
			return Err(err);
		}

		let html = response.text();
		if html.trim().is_empty() {
			return Err(AttemptError::EmptyResult);
		}
		if !self.captcha_detector.detect(Tier::Http, url.as_str(), &html) {
			return Ok(html);
		}

		let challenge = CaptchaChallenge {
			tier: Tier::Http,
			url: url.to_string(),
			html,
			proxy: ctx.proxy.clone(),
			user_agent: ctx.user_agent.clone(),
		};
		let unlocked = match self.captcha_solver.solve_http(&challenge).await {
			Ok(unlocked) => unlocked.filter(|html| !html.trim().is_empty()),
			Err(err) => {
				log::warn!("[{}] captcha solver failed endpoint={}: {err}", self.bookmaker(), ctx.endpoint);
				None
			}
		};
		self.events.dispatch(FetchEvent::Captcha {
			endpoint: ctx.endpoint.clone(),
			solved: unlocked.is_some(),
		});
		unlocked.ok_or(AttemptError::Captcha)
	}

	async fn fetch_rendered(
		&self,
		browser: &BrowserContextCache,
		url: Url,
		ctx: AttemptContext,
	) -> Result<String, AttemptError> {
		let session = browser
			.acquire(ctx.proxy.as_deref(), &ctx.user_agent)
			.await?;
		let page = PageGuard::new(session.new_page().await?);

		let rendered = self.render(page.page(), &url, &ctx).await;
		page.close().await;
		let html = rendered?;

		match session.cookies().await {
			Ok(cookies) if !cookies.is_empty() => self.transport.add_cookies(&url, &cookies),
			Ok(_) => {}
			Err(err) => log::debug!("[{}] could not read browser cookies: {err}", self.bookmaker()),
		}
		Ok(html)
	}

	async fn render(
		&self,
		page: &dyn BrowserPage,
		url: &Url,
		ctx: &AttemptContext,
	) -> Result<String, AttemptError> {
		page.goto(url.as_str(), self.config.request_timeout()).await?;
		sleep(self.settle_delay()).await;

		let html = page.content().await?;
		if self.captcha_detector.detect(Tier::Browser, url.as_str(), &html) {
			let challenge = CaptchaChallenge {
				tier: Tier::Browser,
				url: url.to_string(),
				html,
				proxy: ctx.proxy.clone(),
				user_agent: ctx.user_agent.clone(),
			};
			let solved = match self.captcha_solver.solve_browser(&challenge, page).await {
				Ok(solved) => solved,
				Err(err) => {
					log::warn!("[{}] captcha solver failed endpoint={}: {err}", self.bookmaker(), ctx.endpoint);
					false
				}
			};
			self.events.dispatch(FetchEvent::Captcha {
				endpoint: ctx.endpoint.clone(),
				solved,
			});
			if !solved {
				return Err(AttemptError::Captcha);
			}
			sleep(self.config.captcha_reread_delay()).await;
			let html = page.content().await?;
			return non_empty(html);
		}
		non_empty(html)
	}

	async fn parse_listing(&self, key: &str, first: PageSource) -> Vec<P::Record> {
		let pages = self.paginator.paginate(first).await;
		let mut records = Vec::new();
		for html in &pages {
			// `Html` is not `Send`; it must not live across an await.
			let document = Html::parse_document(html);
			match self.parser.parse_html(&document) {
				Ok(batch) => records.extend(batch),
				Err(err) => {
					log::error!("[{}] parse_html failed endpoint={key}: {err}", self.bookmaker());
				}
			}
		}
		records
	}

	fn request(&self, url: Url, ctx: &AttemptContext, accept: &'static str) -> HttpRequest {
		let mut headers = HeaderMap::new();
		headers.insert(ACCEPT, HeaderValue::from_static(accept));
		HttpRequest {
			url,
			proxy: ctx.proxy.clone(),
			user_agent: ctx.user_agent.clone(),
			headers,
			timeout: self.config.request_timeout(),
		}
	}

	fn settle_delay(&self) -> Duration {
		let (min, max) = self.config.browser_settle_range();
		if max <= min {
			return min;
		}
		Duration::from_secs_f64(thread_rng().gen_range(min.as_secs_f64()..=max.as_secs_f64()))
	}

	fn cached(&self, key: &str) -> Option<CachedPayload> {
		self.response_cache.as_ref().and_then(|cache| cache.get(key))
	}

	fn store(&self, key: String, payload: CachedPayload) {
		if let Some(cache) = &self.response_cache {
			cache.insert(key, payload);
		}
	}
}

impl<P: OddsParser> std::fmt::Debug for OddsFetcher<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OddsFetcher")
			.field("bookmaker", &self.config.bookmaker)
			.field("base_url", &self.base_url.as_str())
			.field("open", &self.is_open())
			.finish_non_exhaustive()
	}
}

impl<P: OddsParser> Drop for OddsFetcher<P> {
	fn drop(&mut self) {
		if let Some(teardown) = self.begin_close() {
			log::warn!("[{}] engine dropped while open", self.bookmaker());
			teardown.spawn();
		}
	}
}

/// Everything `close` releases, detached from the engine so it can also run
/// on a spawned task.
struct Teardown {
	bookmaker: String,
	browser: Option<Arc<BrowserContextCache>>,
	shutdown_runtime: bool,
	transport: Arc<dyn HttpTransport>,
}

impl Teardown {
	async fn run(self) {
		if let Some(browser) = &self.browser {
			browser.close_all().await;
			if self.shutdown_runtime
				&& let Err(err) = browser.runtime().shutdown().await
			{
				log::warn!("[{}] browser shutdown failed: {err}", self.bookmaker);
			}
		}
		self.transport.shutdown().await;
		log::info!("[{}] engine closed", self.bookmaker);
	}

	fn spawn(self) {
		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				runtime.spawn(self.run());
			}
			Err(_) => log::warn!(
				"[{}] no runtime to release the browser on; contexts leaked",
				self.bookmaker
			),
		}
	}
}

/// Releases the engine when a `session` body panics or is cancelled.
struct SessionGuard<'a, P: OddsParser>(&'a OddsFetcher<P>);

impl<P: OddsParser> Drop for SessionGuard<'_, P> {
	fn drop(&mut self) {
		if let Some(teardown) = self.0.begin_close() {
			log::warn!("[{}] session ended early, releasing engine", self.0.bookmaker());
			teardown.spawn();
		}
	}
}

/// Closes the page when the attempt is dropped mid-flight (timeouts cancel
/// the attempt future).
struct PageGuard {
	page: Arc<dyn BrowserPage>,
	closed: bool,
}

impl PageGuard {
	fn new(page: Box<dyn BrowserPage>) -> Self {
		Self {
			page: Arc::from(page),
			closed: false,
		}
	}

	fn page(&self) -> &dyn BrowserPage {
		self.page.as_ref()
	}

	async fn close(mut self) {
		self.closed = true;
		if let Err(err) = self.page.close().await {
			log::debug!("failed to close browser page: {err}");
		}
	}
}

impl Drop for PageGuard {
	fn drop(&mut self) {
		if self.closed {
			return;
		}
		let page = Arc::clone(&self.page);
		if let Ok(runtime) = tokio::runtime::Handle::try_current() {
			runtime.spawn(async move {
				if let Err(err) = page.close().await {
					log::debug!("failed to close abandoned browser page: {err}");
				}
			});
		}
	}
}

/// Resolves `path` against `base`; absolute URLs pass through unchanged.
fn join_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
	if let Ok(url) = Url::parse(path) {
		return Ok(url);
	}
	let base = base.as_str().trim_end_matches('/');
	if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
		Url::parse(&format!("{base}{path}"))
	} else {
		Url::parse(&format!("{base}/{path}"))
	}
}

fn is_empty_payload(payload: &Value) -> bool {
	match payload {
		Value::Null => true,
		Value::Array(items) => items.is_empty(),
		Value::Object(fields) => fields.is_empty(),
		Value::String(text) => text.trim().is_empty(),
		_ => false,
	}
}

fn non_empty(html: String) -> Result<String, AttemptError> {
	if html.trim().is_empty() {
		Err(AttemptError::EmptyResult)
	} else {
		Ok(html)
	}
}
