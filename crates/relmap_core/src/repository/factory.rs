//! Repository factory: the entry point wiring store, registry and repositories.

use super::{CrudRepository, RepositoryCore, RepositoryDeclaration, DELETE_BY_ID};
use crate::audit::{NoAuditContext, PersistenceContext};
use crate::config::PersistenceConfig;
use crate::constraint::CascadeDelete;
use crate::conversion::ConversionService;
use crate::error::{PersistenceError, PersistenceResult};
use crate::model::{Entity, EntityRef};
use crate::registry::EntityRegistry;
use crate::repository::Arg;
use crate::store::DataStore;
use crate::transaction::TransactionCoordinator;
use crate::value::Value;
use log::info;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// State shared by every repository of one factory.
pub(crate) struct FactoryShared {
    pub(crate) store: Arc<dyn DataStore>,
    pub(crate) conversion: ConversionService,
    pub(crate) registry: EntityRegistry,
    pub(crate) transactions: Arc<TransactionCoordinator>,
    context: RwLock<Arc<dyn PersistenceContext>>,
    config: PersistenceConfig,
    repositories: Mutex<HashMap<String, Arc<RepositoryCore>>>,
    defaults: Mutex<HashMap<TypeId, Arc<RepositoryCore>>>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> PersistenceResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| PersistenceError::InvalidConfiguration(format!("{what} lock poisoned")))
}

impl FactoryShared {
    pub(crate) fn persistence_context(&self) -> Arc<dyn PersistenceContext> {
        match self.context.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Default CRUD repository of `entity`, created on first use.
    fn default_core(&self, entity: EntityRef) -> PersistenceResult<Arc<RepositoryCore>> {
        if let Some(core) = lock(&self.defaults, "repository")?.get(&entity.type_id()) {
            return Ok(Arc::clone(core));
        }

        let descriptor = self.registry.descriptor_of(entity)?;
        let declaration = RepositoryDeclaration::new(format!("{}Repository", entity.simple_name()));
        let core = Arc::new(RepositoryCore::build(descriptor, &declaration)?);
        let mut defaults = lock(&self.defaults, "repository")?;
        Ok(Arc::clone(defaults.entry(entity.type_id()).or_insert(core)))
    }
}

impl CascadeDelete for FactoryShared {
    fn delete_child(&self, child: EntityRef, id: Value) -> PersistenceResult<()> {
        let core = self.default_core(child)?;
        core.call(self, DELETE_BY_ID, &mut [Arg::Value(id)])?;
        Ok(())
    }
}

/// Creates and caches repositories over one data store.
///
/// Cloning is cheap; clones share every cache.
#[derive(Clone)]
pub struct RepositoryFactory {
    shared: Arc<FactoryShared>,
}

impl RepositoryFactory {
    pub fn builder(store: Arc<dyn DataStore>) -> RepositoryFactoryBuilder {
        RepositoryFactoryBuilder {
            store,
            config: PersistenceConfig::default(),
            conversion: None,
            context: None,
        }
    }

    /// Returns the repository declared by `declaration`, building it on first use.
    ///
    /// # Errors
    /// - `InvalidRepository` when the declaration is malformed or its name is
    ///   already bound to another entity type.
    /// - Any registration error of `E`.
    pub fn repository<E: Entity>(
        &self,
        declaration: RepositoryDeclaration,
    ) -> PersistenceResult<CrudRepository<E>> {
        let entity = EntityRef::of::<E>();
        let cached = lock(&self.shared.repositories, "repository")?
            .get(declaration.name())
            .cloned();
        let core = match cached {
            Some(core) => core,
            None => {
                let descriptor = self.shared.registry.descriptor::<E>()?;
                let core = Arc::new(RepositoryCore::build(descriptor, &declaration)?);
                let mut repositories = lock(&self.shared.repositories, "repository")?;
                Arc::clone(
                    repositories
                        .entry(declaration.name().to_string())
                        .or_insert(core),
                )
            }
        };

        if core.entity() != entity {
            return Err(PersistenceError::repository(
                declaration.name(),
                format!(
                    "already registered for entity `{}`",
                    core.entity().simple_name()
                ),
            ));
        }
        Ok(CrudRepository::new(self.clone(), core))
    }

    /// Repository with only the implicit CRUD methods of `E`.
    pub fn crud_repository<E: Entity>(&self) -> PersistenceResult<CrudRepository<E>> {
        let core = self.shared.default_core(EntityRef::of::<E>())?;
        Ok(CrudRepository::new(self.clone(), core))
    }

    /// Drops the table of `E` and forgets its descriptor and repositories.
    ///
    /// The next access registers `E` again, recreating its table when allowed.
    pub fn drop_repository<E: Entity>(&self) -> PersistenceResult<()> {
        let entity = EntityRef::of::<E>();
        let descriptor = self.shared.registry.descriptor::<E>()?;
        self.shared.store.drop_table(descriptor.table_name())?;
        self.shared.registry.remove(entity);
        lock(&self.shared.defaults, "repository")?.remove(&entity.type_id());
        lock(&self.shared.repositories, "repository")?.retain(|_, core| core.entity() != entity);
        info!(
            "event=repository_drop module=repository status=ok entity={} table={}",
            entity.simple_name(),
            descriptor.table_name()
        );
        Ok(())
    }

    pub fn set_persistence_context(&self, context: Arc<dyn PersistenceContext>) {
        let mut guard = match self.shared.context.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = context;
    }

    pub fn persistence_context(&self) -> Arc<dyn PersistenceContext> {
        self.shared.persistence_context()
    }

    pub fn entity_registry(&self) -> &EntityRegistry {
        &self.shared.registry
    }

    pub fn transactions(&self) -> &Arc<TransactionCoordinator> {
        &self.shared.transactions
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.shared.config
    }

    pub fn data_store(&self) -> &Arc<dyn DataStore> {
        &self.shared.store
    }

    pub(crate) fn shared(&self) -> &FactoryShared {
        &self.shared
    }
}

pub struct RepositoryFactoryBuilder {
    store: Arc<dyn DataStore>,
    config: PersistenceConfig,
    conversion: Option<ConversionService>,
    context: Option<Arc<dyn PersistenceContext>>,
}

impl RepositoryFactoryBuilder {
    pub fn config(mut self, config: PersistenceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn conversion_service(mut self, conversion: ConversionService) -> Self {
        self.conversion = Some(conversion);
        self
    }

    pub fn persistence_context(mut self, context: Arc<dyn PersistenceContext>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn build(self) -> RepositoryFactory {
        info!(
            "event=factory_build module=repository status=ok store={} create_tables={}",
            self.store.name(),
            self.config.create_tables
        );
        let shared = FactoryShared {
            registry: EntityRegistry::new(Arc::clone(&self.store), self.config.create_tables),
            transactions: Arc::new(TransactionCoordinator::new(Arc::clone(&self.store))),
            conversion: self.conversion.unwrap_or_default(),
            context: RwLock::new(self.context.unwrap_or_else(|| Arc::new(NoAuditContext))),
            store: self.store,
            config: self.config,
            repositories: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
        };
        RepositoryFactory {
            shared: Arc::new(shared),
        }
    }
}
