//! External signing providers (HSM, token, remote key service).
//!
//! A provider registers itself by name in a process-wide registry. A signing
//! run acquires a [`ProviderSession`] for the named provider, which
//! initializes it; the session tears the provider down again once the
//! session and every handle it produced are dropped. Provider state is
//! process-wide, so at most one session is active at a time; a second
//! `acquire` fails until the first run has finished.
//!
//! Key material never leaves the provider: handles returned by `open_key`
//! only reference it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::SignerHandle;
use crate::domain::crypto::DigestAlgorithm;
use crate::infra::error::{SigningError, SigningResult};

/// An external cryptographic provider.
///
/// `initialize` and `shutdown` are coarse-grained and process-wide;
/// `open_key` interprets an implementation-defined locator (a token URI, a
/// vault identifier, ...) and returns a signing capability.
pub trait ExternalProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn initialize(&self) -> SigningResult<()>;

    fn open_key(&self, locator: &str) -> SigningResult<Box<dyn SignerHandle>>;

    fn shutdown(&self);
}

fn registry() -> &'static Mutex<HashMap<String, Arc<dyn ExternalProvider>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<dyn ExternalProvider>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_registry() -> std::sync::MutexGuard<'static, HashMap<String, Arc<dyn ExternalProvider>>> {
    registry().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Make a provider available under its name. Registering a second provider
/// with the same name replaces the first.
pub fn register_provider(provider: Arc<dyn ExternalProvider>) {
    let name = provider.name().to_string();
    log::debug!("registering external provider '{name}'");
    lock_registry().insert(name, provider);
}

/// Whether any provider session is currently active.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
struct SessionInner {
    provider: Arc<dyn ExternalProvider>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        log::debug!("shutting down external provider '{}'", self.provider.name());
        self.provider.shutdown();
        SESSION_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// An initialized session with one external provider.
pub struct ProviderSession {
    inner: Arc<SessionInner>,
}

impl ProviderSession {
    /// Look up and initialize the named provider. Fails when the provider is
    /// unknown, when another session is still active, or when the provider's
    /// own initialization fails.
    pub fn acquire(name: &str) -> SigningResult<Self> {
        let provider = lock_registry().get(name).cloned().ok_or_else(|| {
            SigningError::KeyLoad(format!("unknown external provider '{name}'"))
        })?;
        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SigningError::KeyLoad(format!(
                "another external provider session is active; cannot initialize '{name}'"
            )));
        }
        if let Err(error) = provider.initialize() {
            SESSION_ACTIVE.store(false, Ordering::SeqCst);
            return Err(error);
        }
        log::info!("initialized external provider '{name}'");
        Ok(Self {
            inner: Arc::new(SessionInner { provider }),
        })
    }

    /// Open a key through the session's provider. The returned handle keeps
    /// the session alive, so teardown happens only after the last handle is
    /// gone.
    pub fn open_key(&self, locator: &str) -> SigningResult<Box<dyn SignerHandle>> {
        let key = self.inner.provider.open_key(locator)?;
        Ok(Box::new(SessionKey {
            key,
            _session: Arc::clone(&self.inner),
        }))
    }
}

#[derive(Debug)]
struct SessionKey {
    key: Box<dyn SignerHandle>,
    _session: Arc<SessionInner>,
}

impl SignerHandle for SessionKey {
    fn sign(&self, algorithm: DigestAlgorithm, message: &[u8]) -> SigningResult<Vec<u8>> {
        self.key.sign(algorithm, message)
    }
}
