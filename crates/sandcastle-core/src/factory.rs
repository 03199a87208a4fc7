//! Provider selection and construction.

use crate::config::SandboxProviderConfig;
use crate::error::{CoreError, Result};
use crate::provider::SandboxProvider;
use crate::providers;
use crate::types::ProviderTag;
use sandcastle_remote::RemoteApi;
use std::sync::Arc;

/// Backend used when neither the caller nor the configuration names one.
pub const DEFAULT_PROVIDER: ProviderTag = ProviderTag::E2b;

/// Builds the transport for a backend.
pub type ApiBuilder =
    Arc<dyn Fn(ProviderTag, &SandboxProviderConfig) -> Result<Arc<dyn RemoteApi>> + Send + Sync>;

/// Chooses, validates and constructs providers.
#[derive(Clone)]
pub struct SandboxFactory {
    config: SandboxProviderConfig,
    api_builder: ApiBuilder,
}

impl std::fmt::Debug for SandboxFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SandboxFactory {
    /// Create a factory that talks to the real backends over HTTP.
    pub fn new(config: SandboxProviderConfig) -> Self {
        Self::with_api_builder(config, providers::http_api)
    }

    /// Create a factory with a custom transport builder.
    pub fn with_api_builder<F>(config: SandboxProviderConfig, builder: F) -> Self
    where
        F: Fn(ProviderTag, &SandboxProviderConfig) -> Result<Arc<dyn RemoteApi>> + Send + Sync + 'static,
    {
        Self {
            config,
            api_builder: Arc::new(builder),
        }
    }

    /// Get the process-wide configuration.
    pub fn config(&self) -> &SandboxProviderConfig {
        &self.config
    }

    /// Every backend this build knows about.
    pub fn supported_providers() -> &'static [ProviderTag] {
        &ProviderTag::ALL
    }

    /// Backend chosen when `create` gets no name.
    pub fn default_provider(&self) -> Result<ProviderTag> {
        match &self.config.provider {
            Some(name) => parse_name(name),
            None => Ok(DEFAULT_PROVIDER),
        }
    }

    /// Construct a provider.
    ///
    /// The name comes from `name`, else the configuration, else
    /// [`DEFAULT_PROVIDER`]. `config` replaces the factory's configuration
    /// for this provider only. No session is created.
    pub fn create(
        &self,
        name: Option<&str>,
        config: Option<SandboxProviderConfig>,
    ) -> Result<Arc<dyn SandboxProvider>> {
        let config = config.unwrap_or_else(|| self.config.clone());
        let tag = match name.or(config.provider.as_deref()) {
            Some(name) => parse_name(name)?,
            None => DEFAULT_PROVIDER,
        };

        let config = config.for_backend(tag);
        config.validate()?;
        config.credentials.require(tag)?;

        let api = (self.api_builder)(tag, &config)?;
        tracing::info!(provider = %tag, api = api.backend(), "Provider constructed");
        Ok(Arc::new(providers::build(tag, api, config)))
    }

    /// Whether the credentials `name` needs are configured.
    ///
    /// Unknown names are never available. Nothing is constructed.
    pub fn is_provider_available(&self, name: &str) -> bool {
        parse_name(name).is_ok_and(|tag| self.config.credentials.has(tag))
    }

    /// Backends whose credentials are configured.
    pub fn available_providers(&self) -> Vec<ProviderTag> {
        ProviderTag::ALL
            .into_iter()
            .filter(|tag| self.config.credentials.has(*tag))
            .collect()
    }
}

fn parse_name(name: &str) -> Result<ProviderTag> {
    name.parse().map_err(|_| CoreError::UnknownProvider {
        name: name.to_string(),
        supported: ProviderTag::supported_names(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use crate::mock::MockRemote;

    fn mock_factory(credentials: Credentials) -> SandboxFactory {
        let config = SandboxProviderConfig {
            credentials,
            ..Default::default()
        };
        SandboxFactory::with_api_builder(config, |tag, _| {
            Ok(Arc::new(MockRemote::new(tag.as_str())) as Arc<dyn RemoteApi>)
        })
    }

    #[test]
    fn test_unknown_provider_lists_supported_set() {
        let factory = mock_factory(Credentials::default());
        match factory.create(Some("bogus-provider"), None) {
            Err(CoreError::UnknownProvider { name, supported }) => {
                assert_eq!(name, "bogus-provider");
                assert_eq!(supported.len(), 5);
                assert!(supported.contains(&"daytona".to_string()));
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("bogus provider should not construct"),
        }
    }

    #[test]
    fn test_missing_credential_is_config_error() {
        let factory = mock_factory(Credentials::default());
        let err = factory.create(Some("vercel"), None).err().unwrap();
        assert!(matches!(err, CoreError::ProviderConfig(ref m) if m.contains("VERCEL_TOKEN")));
    }

    #[test]
    fn test_availability_follows_credentials() {
        let factory = mock_factory(Credentials::default());
        assert!(!factory.is_provider_available("e2b"));
        assert!(factory.available_providers().is_empty());

        let factory = mock_factory(Credentials {
            e2b_api_key: Some("e2b_key".into()),
            ..Default::default()
        });
        assert!(factory.is_provider_available("e2b"));
        assert!(factory.is_provider_available("E2B"));
        assert!(!factory.is_provider_available("bogus-provider"));
        assert_eq!(factory.available_providers(), vec![ProviderTag::E2b]);
    }

    #[test]
    fn test_name_resolution_order() {
        let creds = Credentials {
            e2b_api_key: Some("k".into()),
            modal_token_id: Some("id".into()),
            modal_token_secret: Some("secret".into()),
            ..Default::default()
        };
        let factory = mock_factory(creds.clone());
        assert_eq!(factory.create(None, None).unwrap().tag(), ProviderTag::E2b);
        assert_eq!(factory.create(Some("modal"), None).unwrap().tag(), ProviderTag::Modal);

        let per_call = SandboxProviderConfig {
            provider: Some("modal".into()),
            credentials: creds,
            ..Default::default()
        };
        assert_eq!(
            factory.create(None, Some(per_call)).unwrap().tag(),
            ProviderTag::Modal
        );
    }
}
