//! Reference-counted ownership of hardware-backed drivers.
//!
//! Every driver that owns physical pins is constructed through a
//! [`HardwareRegistry`] under a [`ResourceKey`]. The first request builds the
//! instance; later requests share it and bump a count. Each [`Lease`] gives
//! its count back when dropped, and the cleanup registered with the first
//! request runs exactly once, when the last lease is gone.
//!
//! Each constructed instance gets a fresh generation. A lease only counts
//! against the generation it was issued for, so a lease that outlived its
//! instance can never take a count from a newer one under the same key.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error};

use crate::GpioError;

static GLOBAL: LazyLock<HardwareRegistry> = LazyLock::new(HardwareRegistry::new);

/// Identity under which a hardware-owning instance is counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Driver class, e.g. `"MotorDriver"`.
    pub class: &'static str,
    /// Physical pins backing the instance, in a fixed order.
    pub pins: Vec<String>,
}

impl ResourceKey {
    /// Builds a key from a class name and its pins.
    pub fn new<I, S>(class: &'static str, pins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class,
            pins: pins.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.class, self.pins.join(","))
    }
}

/// Outcome of giving back one count on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other owners remain; carries the remaining count.
    Remaining(usize),
    /// This was the last owner; the cleanup has run.
    CleanedUp,
    /// The lease's instance was no longer live. Nothing was done.
    Underflow,
}

type Cleanup = Box<dyn FnOnce() + Send>;

struct Entry {
    instance: Arc<dyn Any + Send + Sync>,
    count: usize,
    generation: u64,
    cleanup: Option<Cleanup>,
}

#[derive(Default)]
struct Entries {
    live: HashMap<ResourceKey, Entry>,
    next_generation: u64,
}

/// Registry of live hardware instances keyed by [`ResourceKey`].
///
/// Cloning the registry yields another handle to the same map.
#[derive(Clone, Default)]
pub struct HardwareRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl fmt::Debug for HardwareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        f.debug_map()
            .entries(entries.live.iter().map(|(k, e)| (k.to_string(), e.count)))
            .finish()
    }
}

impl HardwareRegistry {
    /// Creates an empty, isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static HardwareRegistry {
        &GLOBAL
    }

    /// Returns a lease on the instance registered under `key`, building it
    /// with `construct` if none is live.
    ///
    /// `cleanup` is only kept from the request that constructs the instance.
    /// If `construct` fails no entry is created and the error is returned.
    /// `construct` must not call back into this registry.
    pub fn acquire<T, E, C, F>(
        &self,
        key: ResourceKey,
        construct: C,
        cleanup: F,
    ) -> Result<Lease<T>, E>
    where
        T: Send + 'static,
        E: From<GpioError>,
        C: FnOnce() -> Result<T, E>,
        F: FnOnce() + Send + 'static,
    {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.live.get_mut(&key) {
            let instance = Arc::clone(&entry.instance)
                .downcast::<Mutex<T>>()
                .map_err(|_| GpioError::ResourceConflict(key.to_string()))?;
            entry.count += 1;
            debug!(resource = %key, count = entry.count, "Sharing live hardware instance");
            return Ok(Lease {
                key,
                generation: entry.generation,
                instance,
                registry: self.clone(),
                active: true,
            });
        }

        let instance = Arc::new(Mutex::new(construct()?));
        let generation = entries.next_generation;
        entries.next_generation += 1;
        entries.live.insert(
            key.clone(),
            Entry {
                instance: Arc::clone(&instance) as Arc<dyn Any + Send + Sync>,
                count: 1,
                generation,
                cleanup: Some(Box::new(cleanup)),
            },
        );
        debug!(resource = %key, generation, "Constructed hardware instance");

        Ok(Lease {
            key,
            generation,
            instance,
            registry: self.clone(),
            active: true,
        })
    }

    /// Gives back one count on the `generation` instance of `key`.
    ///
    /// Releasing an instance that is no longer live is a programming error:
    /// it is logged and reported as [`Release::Underflow`], no count is
    /// taken from any other instance and no cleanup runs.
    fn release(&self, key: &ResourceKey, generation: u64) -> Release {
        let cleanup = {
            let mut entries = self.entries.lock();
            let entry = match entries.live.get_mut(key) {
                Some(entry) if entry.generation == generation => entry,
                _ => {
                    error!(
                        resource = %key,
                        generation,
                        "Hardware released more times than it was acquired"
                    );
                    return Release::Underflow;
                }
            };

            entry.count -= 1;
            if entry.count > 0 {
                debug!(resource = %key, count = entry.count, "Hardware lease released");
                return Release::Remaining(entry.count);
            }
            entries.live.remove(key).and_then(|entry| entry.cleanup)
        };

        // Run outside the lock so cleanup may touch other registry entries.
        debug!(resource = %key, "Last lease released, running hardware cleanup");
        if let Some(cleanup) = cleanup {
            cleanup();
        }
        Release::CleanedUp
    }

    /// Live count for `key`; zero when no instance exists.
    pub fn count(&self, key: &ResourceKey) -> usize {
        self.entries.lock().live.get(key).map_or(0, |e| e.count)
    }

    fn retain(&self, key: &ResourceKey, generation: u64) -> bool {
        match self.entries.lock().live.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.count += 1;
                true
            }
            _ => {
                error!(resource = %key, generation, "Cloned a lease on released hardware");
                false
            }
        }
    }
}

/// Shared, counted handle to a hardware instance.
///
/// Dropping the lease gives its count back to the registry. Writes through
/// different leases of the same instance are serialized by the inner mutex
/// but not ordered; callers sequence motion commands themselves.
pub struct Lease<T> {
    key: ResourceKey,
    generation: u64,
    instance: Arc<Mutex<T>>,
    registry: HardwareRegistry,
    active: bool,
}

impl<T> Lease<T> {
    /// Key this lease counts against.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Locks the shared instance.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.instance.lock()
    }

    /// Whether two leases refer to the same instance.
    pub fn same_instance(&self, other: &Lease<T>) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }

    /// Releases now and reports what happened.
    pub fn release(mut self) -> Release {
        self.active = false;
        self.registry.release(&self.key, self.generation)
    }
}

impl<T> Clone for Lease<T> {
    fn clone(&self) -> Self {
        // A clone of a stale lease holds no count and gives none back.
        let active = self.active && self.registry.retain(&self.key, self.generation);
        Self {
            key: self.key.clone(),
            generation: self.generation,
            instance: Arc::clone(&self.instance),
            registry: self.registry.clone(),
            active,
        }
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if self.active {
            self.registry.release(&self.key, self.generation);
        }
    }
}

impl<T> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease").field("key", &self.key).finish_non_exhaustive()
    }
}
