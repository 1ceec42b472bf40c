//! Fetching remote resources.
//!
//! The orchestrator only depends on [`Fetcher`]; [`HttpFetcher`] is the
//! default implementation over `reqwest`, available with the `http` feature.

use async_trait::async_trait;

use crate::error::ShimResult;

/// A fetched resource, before any validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResource {
    /// HTTP status code.
    pub status: u16,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Response body as text.
    pub body: String,
}

impl FetchedResource {
    /// A `200 OK` JavaScript resource.
    #[must_use]
    pub fn script(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: Some("text/javascript".to_string()),
            body: body.into(),
        }
    }

    /// A resource with the given status and no body.
    #[must_use]
    pub fn status(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            body: String::new(),
        }
    }

    /// Override the declared content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Retrieves a resource by URL.
///
/// Implementations report transport failures as errors and leave status and
/// content-type checks to the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// GET `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ShimError::Acquisition`](crate::ShimError::Acquisition) if no
    /// response could be obtained.
    async fn get(&self, url: &str) -> ShimResult<FetchedResource>;
}

#[cfg(feature = "http")]
pub use http::{HttpFetcher, HttpFetcherConfig};

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use reqwest::header::CONTENT_TYPE;
    use tracing::debug;

    use super::{FetchedResource, Fetcher};
    use crate::error::{ShimError, ShimResult};

    /// Settings for [`HttpFetcher`].
    #[derive(Debug, Clone)]
    pub struct HttpFetcherConfig {
        /// `User-Agent` header sent with every request.
        pub user_agent: String,
        /// Maximum redirects followed per request. Zero disables redirects.
        pub max_redirects: usize,
    }

    impl Default for HttpFetcherConfig {
        fn default() -> Self {
            Self {
                user_agent: concat!("shimload/", env!("CARGO_PKG_VERSION")).to_string(),
                max_redirects: 10,
            }
        }
    }

    /// [`Fetcher`] over a shared `reqwest` client.
    #[derive(Debug, Clone)]
    pub struct HttpFetcher {
        client: reqwest::Client,
    }

    impl HttpFetcher {
        /// Create a fetcher with default settings.
        ///
        /// # Errors
        ///
        /// Returns [`ShimError::Acquisition`] if the HTTP client cannot be
        /// built (e.g. TLS backend unavailable).
        pub fn new() -> ShimResult<Self> {
            Self::with_config(&HttpFetcherConfig::default())
        }

        /// Create a fetcher with explicit settings.
        ///
        /// # Errors
        ///
        /// See [`HttpFetcher::new`].
        pub fn with_config(config: &HttpFetcherConfig) -> ShimResult<Self> {
            let redirect = if config.max_redirects == 0 {
                reqwest::redirect::Policy::none()
            } else {
                reqwest::redirect::Policy::limited(config.max_redirects)
            };
            let client = reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .redirect(redirect)
                .build()
                .map_err(|e| ShimError::Acquisition {
                    locator: "<client>".to_string(),
                    message: format!("failed to build HTTP client: {e}"),
                })?;
            Ok(Self { client })
        }
    }

    #[async_trait]
    impl Fetcher for HttpFetcher {
        async fn get(&self, url: &str) -> ShimResult<FetchedResource> {
            debug!(url, "Fetching resource");
            let transport = |e: reqwest::Error| ShimError::Acquisition {
                locator: url.to_string(),
                message: e.to_string(),
            };

            let response = self.client.get(url).send().await.map_err(transport)?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.map_err(transport)?;

            debug!(url, status, content_type = ?content_type, bytes = body.len(), "Fetched resource");
            Ok(FetchedResource {
                status,
                content_type,
                body,
            })
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_default_config() {
            let config = HttpFetcherConfig::default();
            assert!(config.user_agent.starts_with("shimload/"));
            assert_eq!(config.max_redirects, 10);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_constructor() {
        let r = FetchedResource::script("var a = 1;");
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("text/javascript"));
    }

    #[test]
    fn test_status_constructor() {
        let r = FetchedResource::status(404).with_content_type("text/html");
        assert_eq!(r.status, 404);
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
        assert!(r.body.is_empty());
    }
}
