//! Handle Registry
//!
//! Maps opaque, address-sized tokens to arbitrary values so that a callback
//! interface carrying only a `usize` of context can reach a rich per-call
//! value (a log handler, a counter sink).
//!
//! ## Concurrency
//! - One `RwLock` over the map: lookups run concurrently, register/release
//!   are exclusive
//! - Token minting is a lock-free atomic counter
//!
//! ## Lifetime
//! A token is valid from `register` until `release`. Looking up a token
//! that is not registered is a lifetime bug in the caller and panics.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

/// Opaque handle standing in for a registered value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

impl Token {
    /// Raw address-sized value, as passed through a callback's context slot
    pub fn as_usize(self) -> usize {
        self.0
    }

    /// Rebuild a token from its raw value
    pub fn from_usize(raw: usize) -> Self {
        Token(raw)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Thread-safe token → value map
pub struct HandleRegistry {
    handles: RwLock<HashMap<Token, Entry>>,

    /// Next token value; never reused within a registry
    next: AtomicUsize,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            next: AtomicUsize::new(1),
        }
    }

    /// Store `value` under a freshly minted token
    pub fn register<T: Any + Send + Sync>(&self, value: T) -> Token {
        self.register_arc(Arc::new(value))
    }

    /// Store an already shared value under a freshly minted token
    pub fn register_arc<T: Any + Send + Sync>(&self, value: Arc<T>) -> Token {
        let token = Token(self.next.fetch_add(1, Ordering::Relaxed));
        self.handles.write().insert(token, value);
        tracing::trace!(%token, "registered handle");
        token
    }

    /// Register `value` and release it when the returned guard drops
    pub fn track<T: Any + Send + Sync>(&self, value: T) -> Registration<'_> {
        Registration {
            registry: self,
            token: self.register(value),
        }
    }

    /// Remove the entry for `token`; releasing twice is a no-op
    pub fn release(&self, token: Token) {
        if self.handles.write().remove(&token).is_some() {
            tracing::trace!(%token, "released handle");
        }
    }

    /// Fetch the value stored under `token`
    ///
    /// # Panics
    /// If `token` is not registered, or was registered with another type.
    pub fn lookup<T: Any + Send + Sync>(&self, token: Token) -> Arc<T> {
        let entry = self.handles.read().get(&token).cloned();
        match entry {
            Some(entry) => match entry.downcast::<T>() {
                Ok(value) => value,
                Err(_) => panic!("handle {} holds a different type", token),
            },
            None => panic!("invalid handle {}", token),
        }
    }

    /// Whether `token` is currently registered
    pub fn contains(&self, token: Token) -> bool {
        self.handles.read().contains_key(&token)
    }

    /// Number of live registrations
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleRegistry")
            .field("live", &self.len())
            .finish_non_exhaustive()
    }
}

/// Process-wide registry shared by every connection
pub fn handles() -> &'static HandleRegistry {
    static HANDLES: OnceLock<HandleRegistry> = OnceLock::new();
    HANDLES.get_or_init(HandleRegistry::new)
}

/// Registration released on drop
///
/// Keep the guard alive for as long as any callback may fire with its
/// token.
#[must_use = "dropping the registration releases the token immediately"]
pub struct Registration<'a> {
    registry: &'a HandleRegistry,
    token: Token,
}

impl Registration<'_> {
    pub fn token(&self) -> Token {
        self.token
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.release(self.token);
    }
}
