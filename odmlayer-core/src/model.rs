//! The static surface an entity type exposes to the mapping layer.
//!
//! A model is a marker type implementing [`Model`]: it names its collection
//! and optionally contributes access contexts, a validation step, named async
//! capabilities, and save hooks. All of it is declared once at type
//! registration time; nothing is discovered by runtime reflection.

use std::collections::HashMap;

use futures::future::BoxFuture;

use crate::{
    context::AccessContexts,
    error::{OdmError, OdmResult},
    record::Record,
};

/// The boxed future every capability and hook returns.
pub type HookFuture<'a> = BoxFuture<'a, OdmResult<()>>;

/// A named zero-argument async capability invoked against a hydrated record.
pub type CapabilityFn<M> = for<'a> fn(&'a mut Record<M>) -> HookFuture<'a>;

/// Core trait every mapped entity type implements.
///
/// Only `collection_name` is mandatory; the remaining methods have
/// default-open / no-op defaults so a minimal model is one line of impl.
///
/// # Example
///
/// ```ignore
/// struct User;
///
/// impl Model for User {
///     fn collection_name() -> &'static str {
///         "users"
///     }
///
///     fn contexts() -> &'static AccessContexts {
///         static CONTEXTS: LazyLock<AccessContexts> = LazyLock::new(|| {
///             AccessContexts::new().declare_writable(None, ["name", "bio"])
///         });
///         &CONTEXTS
///     }
/// }
/// ```
pub trait Model: Send + Sync + Sized + 'static {
    /// The name of the collection documents of this type live in.
    fn collection_name() -> &'static str;

    /// The access-context registry for this type. Defaults to unrestricted.
    fn contexts() -> &'static AccessContexts {
        AccessContexts::unrestricted()
    }

    /// Validates a record before it is saved, returning the list of failing
    /// field paths. An empty list means the record is valid.
    fn validate(_record: &Record<Self>) -> Vec<String> {
        Vec::new()
    }

    /// Named capabilities available for cursor preloading. Defaults to none.
    fn capabilities() -> Option<&'static CapabilityRegistry<Self>> {
        None
    }

    /// Hooks composed around every save, in declaration order. The explicit
    /// replacement for overriding save behavior on a shared prototype.
    fn save_hooks() -> &'static [&'static dyn SaveHook<Self>] {
        &[]
    }
}

/// Registry of named async capabilities for one model type.
///
/// The query result adapter resolves preload requests against this registry
/// by name; an unregistered name is an argument error at hydration time.
pub struct CapabilityRegistry<M: Model> {
    capabilities: HashMap<&'static str, CapabilityFn<M>>,
}

impl<M: Model> CapabilityRegistry<M> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { capabilities: HashMap::new() }
    }

    /// Registers a capability under a name, replacing any previous entry.
    pub fn register(mut self, name: &'static str, capability: CapabilityFn<M>) -> Self {
        self.capabilities.insert(name, capability);
        self
    }

    /// Looks up a capability by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityFn<M>> {
        self.capabilities.get(name)
    }

    /// Invokes the named capabilities against a record, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Argument`] for an unregistered name; a failing
    /// capability aborts the remainder and propagates its error.
    pub async fn invoke(&self, record: &mut Record<M>, names: &[String]) -> OdmResult<()> {
        for name in names {
            let capability = self.get(name).ok_or_else(|| {
                OdmError::Argument(format!(
                    "unknown capability '{}' for model '{}'",
                    name,
                    M::collection_name()
                ))
            })?;

            capability(record).await?;
        }

        Ok(())
    }
}

impl<M: Model> Default for CapabilityRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// A decorator around the save operation, composed at entity-type setup.
///
/// `before_save` runs after validation but before the diff is computed;
/// `after_save` runs once storage and reload have succeeded. Either side may
/// fail and abort the save with its error.
pub trait SaveHook<M: Model>: Send + Sync {
    fn before_save<'a>(&'a self, _record: &'a mut Record<M>) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }

    fn after_save<'a>(&'a self, _record: &'a mut Record<M>) -> HookFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
