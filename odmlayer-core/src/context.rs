//! Field-level access contexts gating which paths may be read or written.
//!
//! A context is a named policy mapping to a set of allowed path prefixes,
//! declared independently for reads and writes. Registries are built once at
//! entity-type registration time and consulted by the persistence
//! orchestrator before any diff reaches storage — a deliberate replacement
//! for scattering string checks through the save path.
//!
//! The reserved [`ALL_CONTEXT`] sentinel means "no restriction", as does the
//! complete absence of declarations for an entity type (the backward
//! compatible default-open policy). An unknown requested name degrades to the
//! [`DEFAULT_CONTEXT`] with a warning rather than failing.

use std::collections::{BTreeMap, BTreeSet};

use crate::path::any_covers;

/// Reserved context name meaning "no restriction".
pub const ALL_CONTEXT: &str = "_all";

/// Context targeted when a declaration or request names no context.
pub const DEFAULT_CONTEXT: &str = "default";

/// Which registry a resolution or check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Readable,
    Writable,
}

/// Per-entity-type access registry: context name to allowed path prefixes,
/// kept separately for reads and writes.
///
/// Declarations are cumulative and deduplicating; a registry is normally
/// assembled once with the chainable `declare_*` methods and stored in a
/// `static` the model trait hands out.
///
/// # Example
///
/// ```ignore
/// static CONTEXTS: LazyLock<AccessContexts> = LazyLock::new(|| {
///     AccessContexts::new()
///         .declare_accessible(None, ["name", "bio"])
///         .declare_writable(Some("owner"), ["name", "bio", "email"])
/// });
/// ```
#[derive(Debug, Clone, Default)]
pub struct AccessContexts {
    readable: BTreeMap<String, BTreeSet<String>>,
    writable: BTreeMap<String, BTreeSet<String>>,
}

static UNRESTRICTED: AccessContexts = AccessContexts {
    readable: BTreeMap::new(),
    writable: BTreeMap::new(),
};

static EMPTY_SET: BTreeSet<String> = BTreeSet::new();

impl AccessContexts {
    /// Creates an empty registry (default-open until declarations are added).
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared empty registry; the default for models that declare nothing.
    pub fn unrestricted() -> &'static AccessContexts {
        &UNRESTRICTED
    }

    /// Declares readable path prefixes for a context (the default context
    /// when `context` is `None`).
    ///
    /// The primary identifier path is guaranteed present in every readable
    /// set — identifiers are never hideable.
    pub fn declare_readable<I, S>(mut self, context: Option<&str>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self
            .readable
            .entry(context.unwrap_or(DEFAULT_CONTEXT).to_string())
            .or_default();
        set.extend(paths.into_iter().map(Into::into));

        for set in self.readable.values_mut() {
            set.insert("_id".to_string());
        }

        self
    }

    /// Declares writable path prefixes for a context (the default context
    /// when `context` is `None`).
    pub fn declare_writable<I, S>(mut self, context: Option<&str>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.writable
            .entry(context.unwrap_or(DEFAULT_CONTEXT).to_string())
            .or_default()
            .extend(paths.into_iter().map(Into::into));

        self
    }

    /// Declares the same paths readable and writable at once.
    pub fn declare_accessible<I, S>(self, context: Option<&str>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String> + Clone,
    {
        let paths = paths.into_iter().collect::<Vec<_>>();
        self.declare_readable(context, paths.clone())
            .declare_writable(context, paths)
    }

    fn registry(&self, kind: AccessKind) -> &BTreeMap<String, BTreeSet<String>> {
        match kind {
            AccessKind::Readable => &self.readable,
            AccessKind::Writable => &self.writable,
        }
    }

    /// Resolves a requested context name against one registry.
    ///
    /// Yields [`ALL_CONTEXT`] when the sentinel is requested or the registry
    /// holds no declarations at all; an unknown name degrades to
    /// [`DEFAULT_CONTEXT`] with a warning. Never fails.
    pub fn resolve(&self, requested: Option<&str>, kind: AccessKind) -> &str {
        let registry = self.registry(kind);

        if requested == Some(ALL_CONTEXT) || registry.is_empty() {
            return ALL_CONTEXT;
        }

        let name = requested.unwrap_or(DEFAULT_CONTEXT);
        match registry.get_key_value(name) {
            Some((key, _)) => key,
            None => {
                if name != DEFAULT_CONTEXT {
                    tracing::warn!(context = name, "unknown access context, using default");
                }
                DEFAULT_CONTEXT
            }
        }
    }

    /// The allowed path-prefix set for a resolved context, or `None` when the
    /// resolution is unrestricted.
    pub fn allowed(&self, requested: Option<&str>, kind: AccessKind) -> Option<&BTreeSet<String>> {
        match self.resolve(requested, kind) {
            ALL_CONTEXT => None,
            resolved => Some(self.registry(kind).get(resolved).unwrap_or(&EMPTY_SET)),
        }
    }

    /// True when `path` may be written under the given context: either the
    /// resolution is unrestricted, or some writable prefix covers the path.
    pub fn can_write(&self, path: &str, context: Option<&str>) -> bool {
        match self.allowed(context, AccessKind::Writable) {
            None => true,
            Some(set) => any_covers(set, path),
        }
    }

    /// True when `path` may be read under the given context.
    pub fn can_read(&self, path: &str, context: Option<&str>) -> bool {
        match self.allowed(context, AccessKind::Readable) {
            None => true,
            Some(set) => any_covers(set, path),
        }
    }
}
