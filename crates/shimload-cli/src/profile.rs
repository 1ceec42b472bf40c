//! Offline host profile and payload fetching for planning.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use shimload_core::{
    FetchedResource, Fetcher, Host, HttpFetcher, HttpFetcherConfig, RegistrationChannel,
    ShimError, ShimResult,
};

/// A host described only by the globals it provides.
///
/// It answers environment probes and refuses everything that would need a
/// real execution context.
#[derive(Debug, Default)]
pub(crate) struct ProfileHost {
    globals: HashSet<String>,
}

impl ProfileHost {
    pub(crate) fn new<I, S>(globals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            globals: globals.into_iter().map(Into::into).collect(),
        }
    }
}

impl Host for ProfileHost {
    fn has_global(&self, path: &str) -> bool {
        self.globals.contains(path)
    }

    fn inject(&self, url: &str, _channel: &RegistrationChannel) -> ShimResult<()> {
        Err(ShimError::Host(format!(
            "a host profile cannot load {url}; indirect payloads need a live host"
        )))
    }

    fn evaluate(&self, _source: &str) -> ShimResult<()> {
        Err(ShimError::Host("a host profile cannot evaluate code".to_string()))
    }

    fn invoke_global(&self, name: &str) -> ShimResult<()> {
        Err(ShimError::UnresolvedCallback(name.to_string()))
    }
}

/// Fetches `http(s)` locators over the network and anything else from disk.
///
/// Local files are typed by extension: `.js`, `.mjs`, and `.cjs` are served
/// as JavaScript, everything else without a content type.
pub(crate) struct LocalFetcher {
    http: HttpFetcher,
}

impl LocalFetcher {
    pub(crate) fn new(config: &HttpFetcherConfig) -> ShimResult<Self> {
        Ok(Self {
            http: HttpFetcher::with_config(config)?,
        })
    }
}

fn is_remote(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

fn content_type_for(path: &Path) -> Option<String> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("js" | "mjs" | "cjs") => Some("application/javascript".to_string()),
        _ => None,
    }
}

#[async_trait]
impl Fetcher for LocalFetcher {
    async fn get(&self, url: &str) -> ShimResult<FetchedResource> {
        if is_remote(url) {
            return self.http.get(url).await;
        }

        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match tokio::fs::read_to_string(path).await {
            Ok(body) => Ok(FetchedResource {
                status: 200,
                content_type: content_type_for(path),
                body,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchedResource::status(404)),
            Err(e) => Err(ShimError::Acquisition {
                locator: url.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
