//! Session registry.
//!
//! [`SandboxManager`] maps sandbox ids to the providers that own them and
//! tracks which one is active. The registry sits behind a single async
//! mutex; remote teardown always happens after the lock is released.

use crate::error::{CoreError, Result};
use crate::factory::SandboxFactory;
use crate::provider::SandboxProvider;
use crate::types::ProviderTag;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

struct RegistryEntry {
    provider: Arc<dyn SandboxProvider>,
    created_at: DateTime<Utc>,
    last_accessed: Instant,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, RegistryEntry>,
    active: Option<String>,
}

impl Registry {
    /// Look up `id` and mark it as accessed.
    fn touch(&mut self, id: &str) -> Option<Arc<dyn SandboxProvider>> {
        let entry = self.entries.get_mut(id)?;
        entry.last_accessed = Instant::now();
        Some(Arc::clone(&entry.provider))
    }

    /// Remove `id`, clearing the active pointer if it pointed there.
    fn remove(&mut self, id: &str) -> Option<RegistryEntry> {
        let entry = self.entries.remove(id)?;
        if self.active.as_deref() == Some(id) {
            self.active = None;
        }
        Some(entry)
    }
}

/// Snapshot of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxEntry {
    /// Registered id.
    pub sandbox_id: String,
    /// Backend hosting the session.
    pub provider: ProviderTag,
    /// When the entry was registered.
    pub created_at: DateTime<Utc>,
    /// Time since the entry was last looked up.
    pub idle: Duration,
    /// Whether this is the active session.
    pub active: bool,
}

/// Registry of live sandbox sessions.
///
/// # Example
///
/// ```no_run
/// use sandcastle_core::{SandboxFactory, SandboxManager, SandboxProviderConfig};
///
/// # async fn example() -> sandcastle_core::Result<()> {
/// let factory = SandboxFactory::new(SandboxProviderConfig::from_env());
/// let manager = SandboxManager::new(factory.clone());
///
/// let provider = factory.create(None, None)?;
/// let info = provider.create_sandbox().await?;
/// manager.register_sandbox(&info.sandbox_id, provider).await?;
///
/// if let Some(active) = manager.get_active_provider().await {
///     println!("{:?}", active.sandbox_url());
/// }
/// manager.terminate_all().await;
/// # Ok(())
/// # }
/// ```
pub struct SandboxManager {
    factory: SandboxFactory,
    registry: Mutex<Registry>,
}

impl SandboxManager {
    /// Create an empty manager.
    pub fn new(factory: SandboxFactory) -> Self {
        tracing::info!("Creating sandbox manager");
        Self {
            factory,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Get the factory used by [`get_or_create_provider`](Self::get_or_create_provider).
    pub fn factory(&self) -> &SandboxFactory {
        &self.factory
    }

    /// Register `provider` under `id` and make it active.
    ///
    /// Re-registering an id with a different provider terminates the one it
    /// replaces. A provider already registered under another id is rejected
    /// with [`CoreError::ProviderShared`].
    pub async fn register_sandbox(&self, id: &str, provider: Arc<dyn SandboxProvider>) -> Result<()> {
        let replaced = {
            let mut registry = self.registry.lock().await;
            if let Some((other, _)) = registry
                .entries
                .iter()
                .find(|(key, e)| key.as_str() != id && Arc::ptr_eq(&e.provider, &provider))
            {
                return Err(CoreError::ProviderShared(other.clone()));
            }

            let entry = RegistryEntry {
                provider: Arc::clone(&provider),
                created_at: Utc::now(),
                last_accessed: Instant::now(),
            };
            let previous = registry.entries.insert(id.to_string(), entry);
            registry.active = Some(id.to_string());
            tracing::info!(sandbox_id = %id, total = registry.entries.len(), "Sandbox registered");
            previous.filter(|p| !Arc::ptr_eq(&p.provider, &provider))
        };

        if let Some(old) = replaced {
            tracing::warn!(sandbox_id = %id, "Replacing registered provider, terminating the old one");
            old.provider.terminate().await;
        }
        Ok(())
    }

    /// Provider of the active session.
    pub async fn get_active_provider(&self) -> Option<Arc<dyn SandboxProvider>> {
        let mut registry = self.registry.lock().await;
        let id = registry.active.clone()?;
        let provider = registry.touch(&id);
        if provider.is_none() {
            tracing::debug!(sandbox_id = %id, "Active id is stale");
        }
        provider
    }

    /// Provider registered under `id`.
    pub async fn get_provider(&self, id: &str) -> Option<Arc<dyn SandboxProvider>> {
        self.registry.lock().await.touch(id)
    }

    /// Make `id` active. Fails (returns false) when `id` is not registered.
    pub async fn set_active_sandbox(&self, id: &str) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.touch(id).is_none() {
            tracing::debug!(sandbox_id = %id, "Cannot activate unregistered sandbox");
            return false;
        }
        registry.active = Some(id.to_string());
        tracing::debug!(sandbox_id = %id, "Active sandbox changed");
        true
    }

    /// Id of the active session.
    pub async fn active_sandbox_id(&self) -> Option<String> {
        self.registry.lock().await.active.clone()
    }

    /// Registered provider for `id`, or a fresh one.
    ///
    /// A fresh provider reconnects to `id` when its backend supports it and
    /// is then registered and activated. Otherwise it is returned
    /// unregistered and without a session, and the caller decides whether
    /// to create one.
    pub async fn get_or_create_provider(&self, id: &str) -> Result<Arc<dyn SandboxProvider>> {
        if let Some(provider) = self.get_provider(id).await {
            return Ok(provider);
        }

        let provider = self.factory.create(None, None)?;
        let reconnected = match provider.as_reconnectable() {
            Some(reconnectable) => match reconnectable.reconnect(id).await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!(sandbox_id = %id, error = %e, "Reconnect failed");
                    None
                }
            },
            None => {
                tracing::debug!(sandbox_id = %id, provider = %provider.tag(), "Provider cannot reconnect");
                None
            }
        };

        if let Some(info) = reconnected {
            // A concurrent caller may have registered `id` meanwhile.
            let existing = {
                let mut registry = self.registry.lock().await;
                match registry.touch(id) {
                    Some(existing) => Some(existing),
                    None => {
                        registry.entries.insert(
                            id.to_string(),
                            RegistryEntry {
                                provider: Arc::clone(&provider),
                                created_at: info.created_at,
                                last_accessed: Instant::now(),
                            },
                        );
                        registry.active = Some(id.to_string());
                        None
                    }
                }
            };
            if let Some(existing) = existing {
                return Ok(existing);
            }
            tracing::info!(sandbox_id = %id, "Reconnected sandbox registered");
        }
        Ok(provider)
    }

    /// Terminate and unregister `id`. Teardown failures are logged only.
    ///
    /// Returns whether `id` was registered.
    pub async fn terminate_sandbox(&self, id: &str) -> bool {
        let removed = self.registry.lock().await.remove(id);
        match removed {
            Some(entry) => {
                entry.provider.terminate().await;
                tracing::info!(sandbox_id = %id, "Sandbox unregistered");
                true
            }
            None => {
                tracing::debug!(sandbox_id = %id, "Terminate for unknown sandbox");
                false
            }
        }
    }

    /// Terminate every session concurrently and clear the registry.
    pub async fn terminate_all(&self) {
        let drained: Vec<(String, RegistryEntry)> = {
            let mut registry = self.registry.lock().await;
            registry.active = None;
            registry.entries.drain().collect()
        };
        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        tracing::info!(count, "Terminating all sandboxes");
        join_all(drained.iter().map(|(id, entry)| async move {
            entry.provider.terminate().await;
            tracing::debug!(sandbox_id = %id, "Sandbox terminated");
        }))
        .await;
        tracing::info!(count, "All sandboxes terminated");
    }

    /// Terminate every session idle for longer than `max_age`.
    ///
    /// Returns the number of sessions evicted.
    pub async fn cleanup(&self, max_age: Duration) -> usize {
        let expired: Vec<(String, RegistryEntry)> = {
            let mut registry = self.registry.lock().await;
            let now = Instant::now();
            let ids: Vec<String> = registry
                .entries
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_accessed) > max_age)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| registry.remove(&id).map(|e| (id, e)))
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        tracing::info!(count = expired.len(), max_age_ms = max_age.as_millis() as u64, "Evicting idle sandboxes");
        join_all(expired.iter().map(|(_, entry)| entry.provider.terminate())).await;
        expired.len()
    }

    /// Registered ids, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().await.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered sessions.
    pub async fn count(&self) -> usize {
        self.registry.lock().await.entries.len()
    }

    /// Whether `id` is registered. Does not count as an access.
    pub async fn contains(&self, id: &str) -> bool {
        self.registry.lock().await.entries.contains_key(id)
    }

    /// Snapshot of every entry, sorted by id. Does not count as an access.
    pub async fn entries(&self) -> Vec<SandboxEntry> {
        let registry = self.registry.lock().await;
        let now = Instant::now();
        let mut entries: Vec<SandboxEntry> = registry
            .entries
            .iter()
            .map(|(id, e)| SandboxEntry {
                sandbox_id: id.clone(),
                provider: e.provider.tag(),
                created_at: e.created_at,
                idle: now.duration_since(e.last_accessed),
                active: registry.active.as_deref() == Some(id.as_str()),
            })
            .collect();
        entries.sort_by(|a, b| a.sandbox_id.cmp(&b.sandbox_id));
        entries
    }

    /// Run [`cleanup`](Self::cleanup) every `interval` in the background.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration, max_age: Duration) -> ReaperHandle {
        let manager = Arc::clone(self);
        let shutdown = Arc::new(Notify::new());
        let signal = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "Reaper started");
            loop {
                tokio::select! {
                    biased;

                    _ = signal.notified() => {
                        tracing::info!("Reaper received shutdown signal");
                        break;
                    }

                    _ = tokio::time::sleep(interval) => {
                        let evicted = manager.cleanup(max_age).await;
                        if evicted > 0 {
                            tracing::info!(evicted, "Reaper evicted idle sandboxes");
                        }
                    }
                }
            }
        });

        ReaperHandle {
            shutdown,
            handle: Some(handle),
        }
    }
}

/// Handle to a background reaper started by [`SandboxManager::spawn_reaper`].
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stop the reaper and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.shutdown.notify_one();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Reaper task panicked");
            }
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
