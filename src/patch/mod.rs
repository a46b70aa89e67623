//! Timeout patching for third-party API clients.
//!
//! The layer has to change the effective timeout behavior of a client type
//! it does not own, without modifying that client's source and without
//! breaking callers holding instances of it. Rather than rebinding the
//! collaborator's constructor symbol at runtime, the patch is a wrapper
//! factory: [`ClientPatcher::install`] wraps the collaborator's official
//! construction entry point once, and every construction issued through
//! the returned [`PatchedConstructor`] (or looked up via
//! [`ClientPatcher::installed`]) gets the timeout policy injected.
//!
//! The patch is additive only on the timeout dimension:
//! - a construction-time timeout is injected only when the caller supplied
//!   none;
//! - after construction, the client's internal session adapter (if it
//!   exposes one, and if its shape matches [`HostAdapter`]) gets its
//!   per-host timeout overwritten. A shape mismatch degrades to
//!   injection-only with a warning; it never fails the construction.
//!
//! Installation is tracked per client type by a [`PatchRecord`] with the
//! lifecycle `Absent -> Installing -> Installed`; a failure mid-install
//! (collaborator library absent) restores `Absent` and leaves the original
//! construction behavior untouched.

use crate::policy::TimeoutPolicy;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lifecycle of the patch for one client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchPhase {
    Absent,
    Installing,
    Installed,
}

/// Bookkeeping for one client type's patch.
struct PatchRecord {
    phase: PatchPhase,
    /// Type-erased `PatchedConstructor<C>` once installed.
    constructor: Option<Arc<dyn Any + Send + Sync>>,
}

impl PatchRecord {
    fn absent() -> Self {
        Self {
            phase: PatchPhase::Absent,
            constructor: None,
        }
    }
}

/// Process-wide registry, keyed by the client constructor type. The lock
/// is held across the whole install so the patch is applied at most once
/// even under concurrent first use.
static REGISTRY: Lazy<Mutex<HashMap<TypeId, PatchRecord>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn registry() -> std::sync::MutexGuard<'static, HashMap<TypeId, PatchRecord>> {
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keyword-style construction options that carry an optional timeout.
///
/// The patch reads and writes only this dimension; every other option
/// passes through to the collaborator untouched.
pub trait TimeoutOptions {
    fn timeout(&self) -> Option<Duration>;
    fn set_timeout(&mut self, timeout: Duration);
}

/// The collaborator's official construction entry point.
///
/// `locate` probes for the collaborator library and fails with
/// [`Error::DependencyMissing`] when it is absent. `session_adapter` is
/// the one deliberately narrow, version-fragile accessor into the
/// constructed client's internals: it returns the client's network-session
/// adapter type-erased, or `None` when the client exposes none.
pub trait ClientConstructor: Sized + Send + Sync + 'static {
    type Options: TimeoutOptions;
    type Client;

    /// Collaborator name used in diagnostics.
    const LIBRARY: &'static str;

    fn locate() -> Result<Self>;

    fn construct(&self, options: Self::Options) -> Result<Self::Client>;

    fn session_adapter(client: &mut Self::Client) -> Option<&mut (dyn Any + Send)> {
        let _ = client;
        None
    }
}

/// The per-host transport adapter shape this crate knows how to rewrite.
///
/// Collaborators whose internal session matches expose it through
/// [`ClientConstructor::session_adapter`]; anything else is treated as a
/// shape mismatch and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAdapter {
    /// Per-host request timeout applied by the collaborator's session.
    pub timeout: Duration,
}

/// Wrapper around the collaborator's constructor that injects the timeout
/// policy. The wrapped constructor's behavior (side effects, return value,
/// errors on invalid arguments) is preserved for every argument the patch
/// does not touch.
#[derive(Debug)]
pub struct PatchedConstructor<C: ClientConstructor> {
    inner: Arc<C>,
    timeouts: TimeoutPolicy,
}

impl<C: ClientConstructor> Clone for PatchedConstructor<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timeouts: self.timeouts.clone(),
        }
    }
}

impl<C: ClientConstructor> PatchedConstructor<C> {
    /// Construct a client, injecting the total timeout when the caller did
    /// not supply one, then best-effort overriding the session adapter.
    pub fn construct(&self, mut options: C::Options) -> Result<C::Client> {
        if options.timeout().is_none() {
            options.set_timeout(self.timeouts.total());
        }
        let mut client = self.inner.construct(options)?;
        if let Err(e) = self.override_adapter(&mut client) {
            tracing::warn!(
                library = C::LIBRARY,
                error = %e,
                "adapter-level timeout override skipped, construction-argument injection still applies"
            );
        }
        Ok(client)
    }

    /// The timeout policy the patch injects.
    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    fn override_adapter(&self, client: &mut C::Client) -> Result<()> {
        let Some(raw) = C::session_adapter(client) else {
            return Ok(());
        };
        match raw.downcast_mut::<HostAdapter>() {
            Some(adapter) => {
                adapter.timeout = self.timeouts.total();
                Ok(())
            }
            None => Err(Error::AdapterShapeMismatch {
                details: format!(
                    "{} session adapter does not match the expected per-host adapter shape",
                    C::LIBRARY
                ),
            }),
        }
    }
}

/// Result of a successful [`ClientPatcher::install`]: the wrapped
/// constructor, plus whether this call actually performed the
/// installation or found one already in place.
#[derive(Debug)]
pub struct PatchInstall<C: ClientConstructor> {
    constructor: PatchedConstructor<C>,
    fresh: bool,
}

impl<C: ClientConstructor> PatchInstall<C> {
    pub fn constructor(&self) -> &PatchedConstructor<C> {
        &self.constructor
    }

    pub fn into_constructor(self) -> PatchedConstructor<C> {
        self.constructor
    }

    /// False when the patch was already installed and this call was a
    /// no-op. Decided under the registry lock, so under concurrent first
    /// use exactly one caller sees `true`.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }
}

/// One-time installer for client-type patches.
pub struct ClientPatcher;

impl ClientPatcher {
    /// Install the timeout patch for client type `C`.
    ///
    /// Idempotent: if the patch is already installed for `C` in this
    /// process, the call warns and returns the installed constructor
    /// unchanged, marked as not fresh. When the collaborator cannot be
    /// located the record returns to `Absent`, the original construction
    /// behavior is left fully intact, and the recoverable
    /// [`Error::DependencyMissing`] is surfaced for the caller to absorb.
    pub fn install<C: ClientConstructor>(timeouts: &TimeoutPolicy) -> Result<PatchInstall<C>> {
        let mut reg = registry();
        let record = reg
            .entry(TypeId::of::<C>())
            .or_insert_with(PatchRecord::absent);

        if record.phase == PatchPhase::Installed {
            tracing::warn!(
                library = C::LIBRARY,
                "patch already installed for this client type; request ignored"
            );
            if let Some(installed) = record
                .constructor
                .as_ref()
                .and_then(|c| c.downcast_ref::<PatchedConstructor<C>>())
            {
                return Ok(PatchInstall {
                    constructor: installed.clone(),
                    fresh: false,
                });
            }
        }

        record.phase = PatchPhase::Installing;
        let located = match C::locate() {
            Ok(located) => located,
            Err(e) => {
                record.phase = PatchPhase::Absent;
                record.constructor = None;
                return Err(e);
            }
        };

        let patched = PatchedConstructor {
            inner: Arc::new(located),
            timeouts: timeouts.clone(),
        };
        record.constructor = Some(Arc::new(patched.clone()));
        record.phase = PatchPhase::Installed;
        tracing::debug!(
            library = C::LIBRARY,
            total_timeout_ms = timeouts.total().as_millis() as u64,
            "client timeout patch installed"
        );
        Ok(PatchInstall {
            constructor: patched,
            fresh: true,
        })
    }

    /// Current patch phase for client type `C`.
    pub fn phase<C: ClientConstructor>() -> PatchPhase {
        registry()
            .get(&TypeId::of::<C>())
            .map(|r| r.phase)
            .unwrap_or(PatchPhase::Absent)
    }

    /// The installed constructor for `C`, if the patch is in place.
    ///
    /// This is what makes subsequent constructions pick up the policy
    /// automatically: construction sites resolve the constructor through
    /// here instead of calling the collaborator directly.
    pub fn installed<C: ClientConstructor>() -> Option<PatchedConstructor<C>> {
        registry()
            .get(&TypeId::of::<C>())
            .filter(|r| r.phase == PatchPhase::Installed)
            .and_then(|r| r.constructor.as_ref())
            .and_then(|c| c.downcast_ref::<PatchedConstructor<C>>())
            .cloned()
    }
}
