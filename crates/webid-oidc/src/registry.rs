//! Relying-party client registry.
//!
//! Loads a previously persisted client for a provider, or registers a new
//! one via the injected [`RelyingParty`] capability and persists it. The
//! in-memory cache in front of the store holds exactly one client and is
//! provider-scoped: a hit requires exact provider-URI equality, so a
//! client is never reused across providers.

use std::sync::Arc;

use url::Url;

use crate::rp::{RegisterOptions, RelyingParty, RpClient};
use crate::storage::AuthStore;
use crate::AuthResult;

/// Capacity-1 client cache keyed by provider URI.
///
/// Makes the invalidation rule explicit: holding a client for a different
/// provider is always a miss, and requesting a client for a different
/// provider evicts the occupant.
#[derive(Default)]
pub(crate) struct ClientCache {
    slot: Option<(Url, Arc<dyn RpClient>)>,
}

impl ClientCache {
    /// Returns the cached client iff it is registered with exactly
    /// `provider`.
    pub(crate) fn get(&self, provider: &Url) -> Option<Arc<dyn RpClient>> {
        match &self.slot {
            Some((cached, client)) if cached == provider => Some(Arc::clone(client)),
            _ => None,
        }
    }

    /// Caches `client` as the current client for `provider`.
    pub(crate) fn put(&mut self, provider: Url, client: Arc<dyn RpClient>) {
        self.slot = Some((provider, client));
    }

    /// Evicts the occupant unless it belongs to `provider`.
    pub(crate) fn invalidate_unless(&mut self, provider: &Url) {
        if matches!(&self.slot, Some((cached, _)) if cached != provider) {
            tracing::debug!("Evicting cached client for a different provider");
            self.slot = None;
        }
    }

    /// Returns the occupant regardless of provider.
    pub(crate) fn current(&self) -> Option<Arc<dyn RpClient>> {
        self.slot.as_ref().map(|(_, client)| Arc::clone(client))
    }
}

/// Two-level client lookup: in-memory cache, persisted registration,
/// fresh registration.
pub struct ClientRegistry {
    rp: Arc<dyn RelyingParty>,
    store: AuthStore,
    cache: ClientCache,
}

impl ClientRegistry {
    /// Creates a registry over the injected RP capability and store.
    #[must_use]
    pub fn new(rp: Arc<dyn RelyingParty>, store: AuthStore) -> Self {
        Self {
            rp,
            store,
            cache: ClientCache::default(),
        }
    }

    /// Returns a client for `provider`, registering one only if neither
    /// the cache nor the store has a usable registration.
    ///
    /// A cached client for a different provider is evicted first. A
    /// persisted registration that fails to reconstitute is discarded and
    /// replaced by a fresh registration.
    ///
    /// # Errors
    ///
    /// Registration errors from the RP capability propagate unmodified.
    pub async fn load_or_register(
        &mut self,
        provider: &Url,
        options: RegisterOptions,
    ) -> AuthResult<Arc<dyn RpClient>> {
        self.cache.invalidate_unless(provider);

        if let Some(client) = self.cache.get(provider) {
            tracing::debug!("Using in-memory client for provider {provider}");
            return Ok(client);
        }

        if let Some(serialized) = self.store.load_client_registration(provider) {
            match self.rp.reconstitute(&serialized) {
                Ok(client) => {
                    tracing::debug!("Reconstituted persisted client for provider {provider}");
                    self.cache.put(provider.clone(), Arc::clone(&client));
                    return Ok(client);
                }
                Err(err) => {
                    tracing::warn!(
                        "Discarding unusable persisted registration for {provider}: {err}"
                    );
                }
            }
        }

        let client = self.rp.register(provider, &options).await?;
        tracing::info!("Registered new client with provider {provider}");
        self.save(Arc::clone(&client), provider)?;
        Ok(client)
    }

    /// Persists `client` under the provider key and caches it in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be serialized.
    pub fn save(&mut self, client: Arc<dyn RpClient>, provider: &Url) -> AuthResult<()> {
        let serialized = client.serialize()?;
        self.store.save_client_registration(provider, &serialized);
        self.cache.put(provider.clone(), client);
        Ok(())
    }

    /// The current in-memory client, regardless of provider.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn RpClient>> {
        self.cache.current()
    }
}
