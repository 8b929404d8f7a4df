//! The provider failover engine.
//!
//! Requests run against one provider at a time, picked uniformly at random
//! from a working set. Transient failures rotate to the next candidate;
//! the rotation is a bounded loop that stops once every provider has had
//! its chance. Successful requests also rotate, so consecutive calls spread
//! across operators.

use crate::config::HttpConfig;
use crate::error::RequestError;
use crate::fetch::HttpFetch;
use crate::provider::Provider;
use burrow_transport::TransportType;
use parking_lot::Mutex;
use rand::Rng;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mutable selection state, shared by concurrent requests.
struct SelectionState {
    /// Providers not yet tried in the current cycle.
    candidates: Vec<Provider>,
    /// Providers that failed since the last cycle reset.
    failed: HashSet<Provider>,
    /// Provider the next attempt will use.
    selected: Option<Provider>,
}

/// Executes requests against interchangeable external providers with
/// transparent failover.
///
/// Both provider pools are filtered at construction to providers whose
/// transport is locally supported. When nothing survives the filter the
/// engine is permanently disabled and every request fails fast.
pub struct RequestService {
    providers_from_config: Vec<Provider>,
    fallback_providers: Vec<Provider>,
    /// Ceiling for rotation: every provider gets at most one attempt per
    /// request.
    num_total_candidates: usize,
    state: Mutex<SelectionState>,
    fetch: Arc<dyn HttpFetch>,
    shutdown_started: AtomicBool,
}

impl RequestService {
    /// Build an engine over explicit provider pools.
    pub fn new(
        configured: Vec<Provider>,
        fallback: Vec<Provider>,
        supported_transports: &[TransportType],
        fetch: Arc<dyn HttpFetch>,
    ) -> Self {
        let providers_from_config: Vec<Provider> = configured
            .into_iter()
            .filter(|provider| supported_transports.contains(&provider.transport_type()))
            .collect();
        let fallback_providers: Vec<Provider> = fallback
            .into_iter()
            .filter(|provider| supported_transports.contains(&provider.transport_type()))
            .collect();
        let num_total_candidates = providers_from_config.len() + fallback_providers.len();
        if num_total_candidates == 0 {
            warn!("no http provider matches the supported transports; requests are disabled");
        }

        // Configured providers are preferred; fallbacks only seed the
        // working set when nothing was configured.
        let initial = if providers_from_config.is_empty() {
            fallback_providers.clone()
        } else {
            providers_from_config.clone()
        };
        let service = Self {
            providers_from_config,
            fallback_providers,
            num_total_candidates,
            state: Mutex::new(SelectionState {
                candidates: initial,
                failed: HashSet::new(),
                selected: None,
            }),
            fetch,
            shutdown_started: AtomicBool::new(false),
        };
        service.select_next_provider();
        service
    }

    /// Build an engine from configuration, deriving each provider's
    /// transport from its URL.
    pub fn from_config(
        config: &HttpConfig,
        supported_transports: &[TransportType],
        fetch: Arc<dyn HttpFetch>,
    ) -> Result<Self, RequestError> {
        let configured = config
            .providers
            .iter()
            .map(|entry| Provider::from_parts(&entry.url, &entry.operator))
            .collect::<Result<Vec<_>, _>>()?;
        let fallback = config
            .fallback_providers
            .iter()
            .map(|entry| Provider::from_parts(&entry.url, &entry.operator))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(configured, fallback, supported_transports, fetch))
    }

    /// Whether no provider survived the transport filter.
    pub fn is_disabled(&self) -> bool {
        self.num_total_candidates == 0
    }

    /// Upper bound on attempts within one request.
    pub fn num_total_candidates(&self) -> usize {
        self.num_total_candidates
    }

    /// Fail all new requests fast; in-flight attempts finish on their own.
    pub fn shutdown(&self) {
        self.shutdown_started.store(true, Ordering::Release);
    }

    /// GET `path` from the current provider, rotating on transient failure
    /// until a provider answers or every candidate has been tried.
    pub async fn request(&self, path: &str) -> Result<String, RequestError> {
        if self.num_total_candidates == 0 {
            return Err(RequestError::Disabled);
        }
        let mut attempts = 0usize;
        loop {
            if self.shutdown_started.load(Ordering::Acquire) {
                return Err(RequestError::ShuttingDown);
            }
            let provider = self.current_provider().ok_or(RequestError::Disabled)?;
            match self.attempt(&provider, path).await {
                Ok(body) => {
                    // Spread load: the next call goes to another operator.
                    self.select_next_provider();
                    return Ok(body);
                }
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => {
                    attempts += 1;
                    let failed_count = self.mark_failed(provider);
                    warn!(%error, attempts, "provider attempt failed");
                    if attempts < self.num_total_candidates
                        && failed_count < self.num_total_candidates
                    {
                        self.select_next_provider();
                        continue;
                    }
                    return Err(RequestError::Exhausted { attempts, last: Box::new(error) });
                }
            }
        }
    }

    /// GET `path` and decode the body as JSON.
    pub async fn request_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let body = self.request(path).await?;
        serde_json::from_str(&body).map_err(|err| RequestError::Body(err.to_string()))
    }

    async fn attempt(&self, provider: &Provider, path: &str) -> Result<String, RequestError> {
        let response = self.fetch.fetch(provider, path).await?;
        if response.is_success() {
            debug!(provider = %provider, status = response.status, "http request served");
            Ok(response.body)
        } else {
            Err(RequestError::Status {
                status: response.status,
                operator: provider.operator().to_string(),
            })
        }
    }

    fn current_provider(&self) -> Option<Provider> {
        self.state.lock().selected.clone()
    }

    fn mark_failed(&self, provider: Provider) -> usize {
        let mut state = self.state.lock();
        state.failed.insert(provider);
        state.failed.len()
    }

    /// Pick the next provider at random from the working set, refilling the
    /// set when it runs dry.
    fn select_next_provider(&self) {
        let mut state = self.state.lock();
        if state.candidates.is_empty() {
            self.refill(&mut state);
        }
        if state.candidates.is_empty() {
            state.selected = None;
            return;
        }
        let index = rand::thread_rng().gen_range(0..state.candidates.len());
        let provider = state.candidates.swap_remove(index);
        debug!(provider = %provider, "next http provider selected");
        state.selected = Some(provider);
    }

    /// Refill priority: unfailed configured providers, then unfailed
    /// fallbacks, then (with everything failed) reset the failed set and
    /// start a fresh cycle. The reset happens at most once per refill, so
    /// the working set never loops while filling.
    fn refill(&self, state: &mut SelectionState) {
        let mut next: Vec<Provider> = self
            .providers_from_config
            .iter()
            .filter(|provider| !state.failed.contains(*provider))
            .cloned()
            .collect();
        if next.is_empty() {
            next = self
                .fallback_providers
                .iter()
                .filter(|provider| !state.failed.contains(*provider))
                .cloned()
                .collect();
        }
        if next.is_empty() {
            state.failed.clear();
            next = self.providers_from_config.clone();
            if next.is_empty() {
                next = self.fallback_providers.clone();
            }
        }
        state.candidates = next;
    }
}
