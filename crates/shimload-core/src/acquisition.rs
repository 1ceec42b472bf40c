//! Resource acquisition: payload text and capability implementations.

use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::capability::{CapabilityDescriptor, Locator};
use crate::channel::RegistrationChannel;
use crate::error::{ShimError, ShimResult};
use crate::fetch::{FetchedResource, Fetcher};
use crate::host::Host;
use crate::run_config::{PayloadDescriptor, Retrieval};

/// Content-type fragments accepted as script.
const SCRIPT_CONTENT_TYPES: &[&str] = &["javascript", "ecmascript"];

/// Check a directly fetched resource and return its text.
///
/// # Errors
///
/// Returns [`ShimError::HttpStatus`] for a non-2xx status and
/// [`ShimError::NotScript`] if the content type is missing or does not name
/// JavaScript/ECMAScript.
pub fn validate_script(locator: &str, resource: FetchedResource) -> ShimResult<String> {
    if !(200..300).contains(&resource.status) {
        return Err(ShimError::HttpStatus {
            locator: locator.to_string(),
            status: resource.status,
        });
    }

    let is_script = resource.content_type.as_deref().is_some_and(|ct| {
        let ct = ct.to_ascii_lowercase();
        SCRIPT_CONTENT_TYPES.iter().any(|fragment| ct.contains(fragment))
    });
    if !is_script {
        return Err(ShimError::NotScript {
            locator: locator.to_string(),
            content_type: resource.content_type.unwrap_or_else(|| "<none>".to_string()),
        });
    }

    Ok(resource.body)
}

/// Mint a callback identifier that cannot collide within a run.
#[must_use]
pub fn mint_callback_id() -> String {
    format!("shimload_cb_{}", Uuid::new_v4().simple())
}

/// Acquires resources for one run.
pub struct Acquirer<'a> {
    fetcher: &'a dyn Fetcher,
    host: &'a dyn Host,
    channel: &'a RegistrationChannel,
    base_url: Option<&'a Url>,
}

impl<'a> Acquirer<'a> {
    /// Create an acquirer bound to one run's channel.
    #[must_use]
    pub fn new(
        fetcher: &'a dyn Fetcher,
        host: &'a dyn Host,
        channel: &'a RegistrationChannel,
        base_url: Option<&'a Url>,
    ) -> Self {
        Self {
            fetcher,
            host,
            channel,
            base_url,
        }
    }

    /// Retrieve the text of one payload.
    ///
    /// # Errors
    ///
    /// Direct payloads fail with the errors of [`validate_script`] or the
    /// fetcher; indirect payloads fail if injection fails or the host reports
    /// a load failure before delivery.
    pub async fn acquire_payload(&self, payload: &PayloadDescriptor) -> ShimResult<String> {
        match payload.retrieval() {
            Retrieval::Direct => {
                let url = payload.locator().resolve(self.base_url)?;
                let resource = self.fetcher.get(&url).await?;
                let text = validate_script(&url, resource)?;
                debug!(url = %url, bytes = text.len(), "Acquired payload");
                Ok(text)
            },
            Retrieval::Indirect(pattern) => {
                let callback_id = mint_callback_id();
                let substituted = pattern.substitute(payload.locator().as_str(), &callback_id);
                let url = Locator::new(substituted).resolve(self.base_url)?;

                // Registered before injecting so a synchronous delivery is not lost.
                let delivery = self.channel.expect_delivery(callback_id.as_str());
                if let Err(e) = self.host.inject(&url, self.channel) {
                    self.channel.cancel_delivery(&callback_id);
                    return Err(e);
                }
                let text = delivery.wait().await?;
                debug!(url = %url, callback_id = %callback_id, bytes = text.len(), "Payload delivered");
                Ok(text)
            },
        }
    }

    /// Start loading a capability implementation.
    ///
    /// Returns once the host has started the load; readiness arrives later
    /// through the registration channel.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the injection cannot be started.
    pub fn load_capability(&self, descriptor: &CapabilityDescriptor) -> ShimResult<()> {
        let url = descriptor.locator().resolve(self.base_url)?;
        info!(capability = %descriptor.name(), url = %url, "Loading capability");
        self.host.inject(&url, self.channel)
    }

    /// Inject a direct payload as a resource instead of evaluating its text.
    ///
    /// # Errors
    ///
    /// Returns the host's error if the injection fails.
    pub fn attach_payload(&self, payload: &PayloadDescriptor) -> ShimResult<()> {
        let url = payload.locator().resolve(self.base_url)?;
        debug!(url = %url, "Attaching payload");
        self.host.inject(&url, self.channel)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::options::{Invocation, PayloadSpec, RunOptions};
    use crate::registry::CapabilityRegistry;
    use crate::run_config::RunConfig;

    struct Responses(HashMap<String, FetchedResource>);

    #[async_trait]
    impl Fetcher for Responses {
        async fn get(&self, url: &str) -> ShimResult<FetchedResource> {
            self.0.get(url).cloned().ok_or_else(|| ShimError::Acquisition {
                locator: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    /// Delivers `payload(id)` synchronously for any injected URL carrying `cb=`.
    #[derive(Default)]
    struct Jsonp {
        injected: Mutex<Vec<String>>,
    }

    impl Host for Jsonp {
        fn has_global(&self, _path: &str) -> bool {
            false
        }
        fn inject(&self, url: &str, channel: &RegistrationChannel) -> ShimResult<()> {
            self.injected.lock().unwrap().push(url.to_string());
            if let Some((_, id)) = url.split_once("cb=") {
                channel.deliver(id, format!("payload_from({id})"));
            }
            Ok(())
        }
        fn evaluate(&self, _source: &str) -> ShimResult<()> {
            Ok(())
        }
        fn invoke_global(&self, _name: &str) -> ShimResult<()> {
            Ok(())
        }
    }

    fn payload(spec: PayloadSpec) -> PayloadDescriptor {
        let registry = CapabilityRegistry::builder().build().unwrap();
        let config = RunConfig::from_invocation(
            Invocation::Options(RunOptions::new().execute(spec)),
            &registry,
        )
        .unwrap();
        config.execute_payloads()[0].clone()
    }

    #[test]
    fn test_validate_accepts_script_types() {
        for ct in [
            "text/javascript",
            "application/javascript; charset=utf-8",
            "application/ECMAScript",
            "application/x-javascript",
        ] {
            let r = FetchedResource::script("x").with_content_type(ct);
            assert_eq!(validate_script("a.js", r).unwrap(), "x");
        }
    }

    #[test]
    fn test_validate_rejects() {
        let err = validate_script("a.js", FetchedResource::status(404)).unwrap_err();
        assert!(matches!(err, ShimError::HttpStatus { status: 404, .. }));

        let html = FetchedResource::script("<html>").with_content_type("text/html");
        assert!(matches!(
            validate_script("a.js", html).unwrap_err(),
            ShimError::NotScript { content_type, .. } if content_type == "text/html"
        ));

        let untyped = FetchedResource {
            status: 200,
            content_type: None,
            body: "x".into(),
        };
        assert!(matches!(
            validate_script("a.js", untyped).unwrap_err(),
            ShimError::NotScript { content_type, .. } if content_type == "<none>"
        ));
    }

    #[test]
    fn test_callback_ids_are_unique() {
        let a = mint_callback_id();
        let b = mint_callback_id();
        assert_ne!(a, b);
        assert!(a.starts_with("shimload_cb_"));
    }

    #[tokio::test]
    async fn test_direct_payload_resolves_against_base() {
        let base = Url::parse("https://site.example/js/").unwrap();
        let fetcher = Responses(HashMap::from([(
            "https://site.example/js/app.js".to_string(),
            FetchedResource::script("app()"),
        )]));
        let host = Jsonp::default();
        let channel = RegistrationChannel::new();
        let acquirer = Acquirer::new(&fetcher, &host, &channel, Some(&base));

        let text = acquirer.acquire_payload(&payload("app.js".into())).await.unwrap();
        assert_eq!(text, "app()");
    }

    #[tokio::test]
    async fn test_indirect_payload_is_delivered() {
        let fetcher = Responses(HashMap::new());
        let host = Jsonp::default();
        let channel = RegistrationChannel::new();
        let acquirer = Acquirer::new(&fetcher, &host, &channel, None);

        let text = acquirer
            .acquire_payload(&payload(PayloadSpec::indirect("https://api.example/code?cb=CB", "CB")))
            .await
            .unwrap();

        let injected = host.injected.lock().unwrap().clone();
        assert_eq!(injected.len(), 1);
        let id = injected[0].split_once("cb=").unwrap().1;
        assert!(id.starts_with("shimload_cb_"));
        assert_eq!(text, format!("payload_from({id})"));
        assert_eq!(channel.pending_deliveries(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let fetcher = Responses(HashMap::new());
        let host = Jsonp::default();
        let channel = RegistrationChannel::new();
        let acquirer = Acquirer::new(&fetcher, &host, &channel, None);

        let err = acquirer.acquire_payload(&payload("gone.js".into())).await.unwrap_err();
        assert!(matches!(err, ShimError::Acquisition { .. }));
    }
}
