//! Scriptable [`Host`] and [`Fetcher`] implementations.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use shimload_core::{FetchedResource, Fetcher, Host, RegistrationChannel, ShimError, ShimResult};

/// Prefix of every callback identifier minted by the orchestrator.
pub const CALLBACK_PREFIX: &str = "shimload_cb_";

/// Stand-in for the callback identifier when keying indirect resources.
pub const CALLBACK_SLOT: &str = "{callback}";

/// Something observable that happened inside a [`MockHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// A URL was injected. Callback identifiers are replaced with
    /// [`CALLBACK_SLOT`].
    Inject(String),
    /// A capability signalled readiness.
    Ready(String),
    /// The channel rejected a readiness signal.
    Rejected(String),
    /// A capability's activation ran.
    Activate(String),
    /// Source text was evaluated.
    Evaluate(String),
    /// A named global procedure was invoked.
    Invoke(String),
}

#[derive(Debug, Clone)]
enum Resource {
    Capability {
        registers_as: String,
        provides: Vec<String>,
        delay: Option<Duration>,
    },
    Jsonp {
        text: String,
        delay: Option<Duration>,
    },
    Broken(String),
    Silent,
}

#[derive(Debug, Default)]
struct HostState {
    globals: HashSet<String>,
    procedures: HashSet<String>,
    failing_sources: HashSet<String>,
    resources: HashMap<String, Resource>,
    events: Vec<HostEvent>,
}

/// A [`Host`] whose resources behave as scripted.
///
/// Resources are keyed by the URL the orchestrator injects. Injecting an
/// unscripted URL is recorded and otherwise does nothing, which is what a
/// payload attached as a resource needs.
///
/// Uses `std::sync::Mutex` internally so builders work without a runtime.
/// Delayed resources need a Tokio runtime; without one they signal at once.
#[derive(Debug, Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<HostState>>,
}

impl MockHost {
    /// A host with no globals, resources, or procedures.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a global path as natively present.
    #[must_use]
    pub fn with_global(self, path: impl Into<String>) -> Self {
        self.lock().globals.insert(path.into());
        self
    }

    /// Declare several global paths.
    #[must_use]
    pub fn with_globals<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().globals.extend(paths.into_iter().map(Into::into));
        self
    }

    /// A capability implementation at `url` that registers as `name`.
    /// Its activation defines `provides`, if given.
    #[must_use]
    pub fn with_capability(self, url: impl Into<String>, name: impl Into<String>) -> Self {
        self.insert(url.into(), Resource::Capability {
            registers_as: name.into(),
            provides: Vec::new(),
            delay: None,
        })
    }

    /// Like [`MockHost::with_capability`], but signalling readiness after
    /// `delay`.
    #[must_use]
    pub fn with_delayed_capability(
        self,
        url: impl Into<String>,
        name: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.insert(url.into(), Resource::Capability {
            registers_as: name.into(),
            provides: Vec::new(),
            delay: Some(delay),
        })
    }

    /// A capability whose activation makes `global` present.
    #[must_use]
    pub fn with_patching_capability(
        self,
        url: impl Into<String>,
        name: impl Into<String>,
        global: impl Into<String>,
    ) -> Self {
        self.insert(url.into(), Resource::Capability {
            registers_as: name.into(),
            provides: vec![global.into()],
            delay: None,
        })
    }

    /// An indirect payload. `url_template` is the URL with the callback
    /// identifier replaced by [`CALLBACK_SLOT`].
    #[must_use]
    pub fn with_indirect(self, url_template: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(url_template.into(), Resource::Jsonp {
            text: text.into(),
            delay: None,
        })
    }

    /// An indirect payload delivered after `delay`.
    #[must_use]
    pub fn with_delayed_indirect(
        self,
        url_template: impl Into<String>,
        text: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.insert(url_template.into(), Resource::Jsonp {
            text: text.into(),
            delay: Some(delay),
        })
    }

    /// A resource whose injection is refused.
    #[must_use]
    pub fn with_broken(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.insert(url.into(), Resource::Broken(message.into()))
    }

    /// A resource that loads but never signals anything.
    #[must_use]
    pub fn with_silent(self, url: impl Into<String>) -> Self {
        self.insert(url.into(), Resource::Silent)
    }

    /// A global procedure usable as a completion callback.
    #[must_use]
    pub fn with_procedure(self, name: impl Into<String>) -> Self {
        self.lock().procedures.insert(name.into());
        self
    }

    /// Evaluating exactly `source` fails.
    #[must_use]
    pub fn with_failing_source(self, source: impl Into<String>) -> Self {
        self.lock().failing_sources.insert(source.into());
        self
    }

    fn insert(self, key: String, resource: Resource) -> Self {
        self.lock().resources.insert(key, resource);
        self
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().events.clone()
    }

    /// Recorded injections, in order.
    #[must_use]
    pub fn injected(&self) -> Vec<String> {
        self.filter(|e| match e {
            HostEvent::Inject(url) => Some(url.clone()),
            _ => None,
        })
    }

    /// Capabilities activated, in order.
    #[must_use]
    pub fn activated(&self) -> Vec<String> {
        self.filter(|e| match e {
            HostEvent::Activate(name) => Some(name.clone()),
            _ => None,
        })
    }

    /// Sources evaluated, in order.
    #[must_use]
    pub fn evaluated(&self) -> Vec<String> {
        self.filter(|e| match e {
            HostEvent::Evaluate(source) => Some(source.clone()),
            _ => None,
        })
    }

    /// Procedures invoked, in order.
    #[must_use]
    pub fn invoked(&self) -> Vec<String> {
        self.filter(|e| match e {
            HostEvent::Invoke(name) => Some(name.clone()),
            _ => None,
        })
    }

    /// How many times `url` was injected.
    #[must_use]
    pub fn inject_count(&self, url: &str) -> usize {
        self.injected().iter().filter(|u| *u == url).count()
    }

    /// Position of the first event equal to `event`.
    #[must_use]
    pub fn position(&self, event: &HostEvent) -> Option<usize> {
        self.lock().events.iter().position(|e| e == event)
    }

    fn filter(&self, pick: impl Fn(&HostEvent) -> Option<String>) -> Vec<String> {
        self.lock().events.iter().filter_map(pick).collect()
    }

    fn record(&self, event: HostEvent) {
        self.lock().events.push(event);
    }

    fn signal_ready(&self, channel: &RegistrationChannel, name: &str, provides: Vec<String>) {
        let host = self.clone();
        let activated = name.to_string();
        let result = channel.capability_ready(name, move || {
            let mut state = host.lock();
            state.globals.extend(provides);
            state.events.push(HostEvent::Activate(activated));
        });
        match result {
            Ok(_) => self.record(HostEvent::Ready(name.to_string())),
            Err(_) => self.record(HostEvent::Rejected(name.to_string())),
        }
    }

    /// Run `f` after `delay` on the current runtime, or immediately.
    fn later(delay: Option<Duration>, f: impl FnOnce() + Send + 'static) {
        match (delay, tokio::runtime::Handle::try_current()) {
            (Some(delay), Ok(handle)) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    f();
                });
            },
            _ => f(),
        }
    }
}

/// Split a callback identifier out of `url`, returning the templated URL
/// and the identifier.
#[must_use]
pub fn split_callback(url: &str) -> Option<(String, String)> {
    let start = url.find(CALLBACK_PREFIX)?;
    let rest = &url[start..];
    let len = rest
        .char_indices()
        .skip(CALLBACK_PREFIX.len())
        .find(|(_, c)| !c.is_ascii_hexdigit())
        .map_or(rest.len(), |(i, _)| i);
    let id = &rest[..len];
    Some((url.replacen(id, CALLBACK_SLOT, 1), id.to_string()))
}

impl Host for MockHost {
    fn has_global(&self, path: &str) -> bool {
        self.lock().globals.contains(path)
    }

    fn inject(&self, url: &str, channel: &RegistrationChannel) -> ShimResult<()> {
        let (key, callback_id) = match split_callback(url) {
            Some((template, id)) => (template, Some(id)),
            None => (url.to_string(), None),
        };
        self.record(HostEvent::Inject(key.clone()));

        let resource = self.lock().resources.get(&key).cloned();
        match resource {
            None | Some(Resource::Silent) => Ok(()),
            Some(Resource::Broken(message)) => Err(ShimError::Host(message)),
            Some(Resource::Capability {
                registers_as,
                provides,
                delay,
            }) => {
                let host = self.clone();
                let channel = channel.clone();
                Self::later(delay, move || host.signal_ready(&channel, &registers_as, provides));
                Ok(())
            },
            Some(Resource::Jsonp { text, delay }) => {
                let Some(callback_id) = callback_id else {
                    return Err(ShimError::Host(format!("{url} carries no callback identifier")));
                };
                let channel = channel.clone();
                Self::later(delay, move || {
                    channel.deliver(&callback_id, text);
                });
                Ok(())
            },
        }
    }

    fn evaluate(&self, source: &str) -> ShimResult<()> {
        self.record(HostEvent::Evaluate(source.to_string()));
        if self.lock().failing_sources.contains(source) {
            return Err(ShimError::Host(format!("evaluation failed: {source}")));
        }
        Ok(())
    }

    fn invoke_global(&self, name: &str) -> ShimResult<()> {
        if !self.lock().procedures.contains(name) {
            return Err(ShimError::UnresolvedCallback(name.to_string()));
        }
        self.record(HostEvent::Invoke(name.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Response {
    Resource(FetchedResource),
    Refused(String),
}

#[derive(Debug, Default)]
struct FetcherState {
    responses: HashMap<String, (Response, Option<Duration>)>,
    requests: Vec<String>,
}

/// A [`Fetcher`] answering from a table. Unknown URLs get a `404`.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl MockFetcher {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FetcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve `body` as JavaScript.
    #[must_use]
    pub fn with_script(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_response(url, FetchedResource::script(body))
    }

    /// Serve `body` as JavaScript after `delay`.
    #[must_use]
    pub fn with_delayed_script(
        self,
        url: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> Self {
        self.lock().responses.insert(
            url.into(),
            (Response::Resource(FetchedResource::script(body)), Some(delay)),
        );
        self
    }

    /// Serve an arbitrary resource.
    #[must_use]
    pub fn with_response(self, url: impl Into<String>, resource: FetchedResource) -> Self {
        self.lock()
            .responses
            .insert(url.into(), (Response::Resource(resource), None));
        self
    }

    /// Fail the transport for `url`.
    #[must_use]
    pub fn with_refused(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.lock()
            .responses
            .insert(url.into(), (Response::Refused(message.into()), None));
        self
    }

    /// Every requested URL, in request order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// How many times `url` was requested.
    #[must_use]
    pub fn fetch_count(&self, url: &str) -> usize {
        self.lock().requests.iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn get(&self, url: &str) -> ShimResult<FetchedResource> {
        let entry = {
            let mut state = self.lock();
            state.requests.push(url.to_string());
            state.responses.get(url).cloned()
        };
        let Some((response, delay)) = entry else {
            return Ok(FetchedResource::status(404));
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match response {
            Response::Resource(resource) => Ok(resource),
            Response::Refused(message) => Err(ShimError::Acquisition {
                locator: url.to_string(),
                message,
            }),
        }
    }
}
