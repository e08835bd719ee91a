//! Collection configuration.

use crate::collection::{Collection, IdGeneration, IdGenerator};
use crate::common::Value;
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Settings of one collection.
///
/// Every setting can be given once, before the collection is built. Unset
/// settings fall back to their defaults: an empty name and
/// [IdGeneration::Random].
#[derive(Clone)]
pub struct CollectionConfig {
    inner: Arc<CollectionConfigInner>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionConfig {
    pub fn new() -> Self {
        CollectionConfig {
            inner: Arc::new(CollectionConfigInner::new()),
        }
    }

    pub(crate) fn named(name: &str) -> Self {
        CollectionConfig {
            inner: Arc::new(CollectionConfigInner {
                name: OnceLock::from(name.to_string()),
                ..CollectionConfigInner::new()
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name.get().map_or("", String::as_str)
    }

    /// Sets the collection name.
    ///
    /// # Errors
    ///
    /// Returns error if the name was already set or the collection is built.
    pub fn set_name(&self, name: &str) -> LodestoneResult<()> {
        self.inner.assert_not_frozen("name")?;
        self.inner
            .name
            .set(name.to_string())
            .map_err(|_| already_set("name"))
    }

    pub fn id_generation(&self) -> IdGeneration {
        self.inner.id_generation.get().copied().unwrap_or_default()
    }

    /// Sets the built in strategy minting missing `_id`s.
    ///
    /// # Errors
    ///
    /// Returns error if the strategy was already set or the collection is
    /// built.
    pub fn set_id_generation(&self, id_generation: IdGeneration) -> LodestoneResult<()> {
        self.inner.assert_not_frozen("id generation")?;
        self.inner
            .id_generation
            .set(id_generation)
            .map_err(|_| already_set("id generation"))
    }

    /// Sets a custom id generator, which takes precedence over the id
    /// generation strategy.
    ///
    /// # Errors
    ///
    /// Returns error if a generator was already set or the collection is
    /// built.
    pub fn set_id_generator<G: IdGenerator + 'static>(&self, generator: G) -> LodestoneResult<()> {
        self.inner.assert_not_frozen("id generator")?;
        self.inner
            .id_generator
            .set(Arc::new(generator))
            .map_err(|_| already_set("id generator"))
    }

    pub fn has_custom_id_generator(&self) -> bool {
        self.inner.id_generator.get().is_some()
    }

    /// A fresh `_id` for a document inserted without one.
    pub fn next_id(&self) -> Value {
        match self.inner.id_generator.get() {
            Some(generator) => generator.next_id(),
            None => self.id_generation().next_id(),
        }
    }

    pub(crate) fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }
}

struct CollectionConfigInner {
    name: OnceLock<String>,
    id_generation: OnceLock<IdGeneration>,
    id_generator: OnceLock<Arc<dyn IdGenerator>>,
    frozen: AtomicBool,
}

impl CollectionConfigInner {
    fn new() -> Self {
        CollectionConfigInner {
            name: OnceLock::new(),
            id_generation: OnceLock::new(),
            id_generator: OnceLock::new(),
            frozen: AtomicBool::new(false),
        }
    }

    fn assert_not_frozen(&self, setting: &str) -> LodestoneResult<()> {
        if self.frozen.load(Ordering::Acquire) {
            log::error!("Cannot change the {} of a collection in use", setting);
            return Err(LodestoneError::new(
                &format!("Cannot change the {} of a collection in use", setting),
                ErrorKind::UsageError,
            ));
        }
        Ok(())
    }
}

fn already_set(setting: &str) -> LodestoneError {
    log::error!("The collection {} is already set", setting);
    LodestoneError::new(
        &format!("The collection {} is already set", setting),
        ErrorKind::UsageError,
    )
}

/// Builder of a [Collection].
///
/// Errors of the setters are captured and returned by [CollectionBuilder::build].
///
/// ```rust,ignore
/// use lodestone::collection::{Collection, IdGeneration};
///
/// let people = Collection::builder()
///     .name("people")
///     .id_generation(IdGeneration::ObjectId)
///     .build()?;
/// ```
pub struct CollectionBuilder {
    config: CollectionConfig,
    error: Option<LodestoneError>,
}

impl Default for CollectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionBuilder {
    pub fn new() -> Self {
        CollectionBuilder {
            config: CollectionConfig::new(),
            error: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_name(name) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn id_generation(mut self, id_generation: IdGeneration) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_id_generation(id_generation) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.config.set_id_generator(generator) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Creates the collection, or returns the first error a setter captured.
    pub fn build(self) -> LodestoneResult<Collection> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(Collection::with_config(self.config))
    }
}
