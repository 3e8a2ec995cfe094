//! Entity descriptor registry.
//!
//! # Responsibility
//! - Build, validate and cache one descriptor per entity type.
//! - Issue table, sequence, index and audit-table DDL for new entities.
//! - Attach child constraints to the targets of foreign constraints.
//!
//! # Invariants
//! - Registration is exclusive; published descriptors are read without the
//!   registration lock.
//! - Registration runs inside the calling thread's store transaction, opening
//!   one when none is open, and only then takes the registration lock.
//! - An entity reachable through foreign constraints is registered together
//!   with the entity that references it, so cycles never recurse.
//! - Partially built descriptors are never observable.
//!
//! # See also
//! - docs/architecture/registry.md

mod naming;
mod schema;

use crate::error::{PersistenceError, PersistenceResult};
use crate::model::{
    AuditDescriptor, ChildConstraint, EntityDeclaration, EntityDescriptor, EntityParts, EntityRef,
    FieldDescriptor, FieldMapping, ForeignConstraint, IdGeneration, IndexDescriptor,
    StaticCondition, UniqueConstraint,
};
use crate::store::DataStore;
use crate::value::{DataType, Value};
use log::{error, info};
use std::any::TypeId;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

pub(crate) use naming::flatten;

/// Field layout of an entity under registration.
pub(crate) struct Stub {
    entity: EntityRef,
    declaration: EntityDeclaration,
    table: String,
    table_exists: bool,
    fields: Vec<FieldDescriptor>,
    id_index: usize,
    audit: Option<AuditDescriptor>,
}

impl Stub {
    fn name(&self) -> &'static str {
        self.entity.simple_name()
    }

    fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    fn invalid(&self, message: impl Into<String>) -> PersistenceError {
        PersistenceError::mapping(self.name(), message)
    }
}

/// Constraints of a stub, resolved against its own and its targets' layouts.
#[derive(Default)]
pub(crate) struct Resolved {
    unique_constraints: Vec<UniqueConstraint>,
    foreign_constraints: Vec<ForeignConstraint>,
    indexes: Vec<IndexDescriptor>,
}

/// Table and field layout of a foreign-constraint target.
enum Target<'a> {
    Stub(&'a Stub),
    Published(Arc<EntityDescriptor>),
}

impl Target<'_> {
    fn table(&self) -> &str {
        match self {
            Self::Stub(stub) => &stub.table,
            Self::Published(descriptor) => descriptor.table_name(),
        }
    }

    fn column(&self, field: &str) -> Option<String> {
        match self {
            Self::Stub(stub) => stub.field(field).map(|found| found.column.clone()),
            Self::Published(descriptor) => descriptor
                .field(field)
                .map(|found| found.column().to_string()),
        }
    }
}

/// Process-lifetime cache of entity descriptors bound to one data store.
pub struct EntityRegistry {
    store: Arc<dyn DataStore>,
    create_tables: bool,
    registration: Mutex<()>,
    descriptors: RwLock<HashMap<TypeId, Arc<EntityDescriptor>>>,
}

impl EntityRegistry {
    pub fn new(store: Arc<dyn DataStore>, create_tables: bool) -> Self {
        Self {
            store,
            create_tables,
            registration: Mutex::new(()),
            descriptors: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the descriptor of `E`, registering it on first access.
    pub fn descriptor<E: crate::model::Entity>(&self) -> PersistenceResult<Arc<EntityDescriptor>> {
        self.descriptor_of(EntityRef::of::<E>())
    }

    /// Returns the descriptor of `entity`, registering it on first access.
    ///
    /// # Errors
    /// - `InvalidMapping` for inconsistent declarations.
    /// - `InvalidConfiguration` when a table is missing and creation is disabled.
    /// - `Persistence` for store failures while reading or creating schema.
    pub fn descriptor_of(&self, entity: EntityRef) -> PersistenceResult<Arc<EntityDescriptor>> {
        if let Some(descriptor) = self.get(entity) {
            return Ok(descriptor);
        }

        // Store access comes before the registration lock: the holder of the
        // registration lock never waits on another thread's transaction.
        let owns_transaction = self.store.owns_transaction();
        if !owns_transaction {
            self.store.begin()?;
        }
        let result = self.register_exclusive(entity);
        if !owns_transaction {
            let finished = match &result {
                Ok(_) => self.store.commit(),
                Err(_) => self.store.rollback(),
            };
            if let Err(err) = finished {
                error!(
                    "event=entity_register module=registry status=error entity={} error={err}",
                    entity.simple_name()
                );
                return result.and(Err(err));
            }
        }
        result
    }

    fn register_exclusive(&self, entity: EntityRef) -> PersistenceResult<Arc<EntityDescriptor>> {
        let _guard = self.registration.lock().map_err(|_| {
            PersistenceError::InvalidConfiguration("entity registration lock poisoned".to_string())
        })?;
        if let Some(descriptor) = self.get(entity) {
            return Ok(descriptor);
        }

        let started_at = Instant::now();
        match self.register(entity) {
            Ok(descriptor) => {
                info!(
                    "event=entity_register module=registry status=ok entity={} table={} duration_ms={}",
                    entity.simple_name(),
                    descriptor.table_name(),
                    started_at.elapsed().as_millis()
                );
                Ok(descriptor)
            }
            Err(err) => {
                error!(
                    "event=entity_register module=registry status=error entity={} duration_ms={} error={err}",
                    entity.simple_name(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Published descriptor of `entity`, without registering it.
    pub fn get(&self, entity: EntityRef) -> Option<Arc<EntityDescriptor>> {
        let descriptors = match self.descriptors.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        descriptors.get(&entity.type_id()).cloned()
    }

    pub fn is_registered(&self, entity: EntityRef) -> bool {
        self.get(entity).is_some()
    }

    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Forgets the descriptor of `entity`; the next access registers it anew.
    pub(crate) fn remove(&self, entity: EntityRef) -> Option<Arc<EntityDescriptor>> {
        let mut descriptors = match self.descriptors.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        descriptors.remove(&entity.type_id())
    }

    fn register(&self, root: EntityRef) -> PersistenceResult<Arc<EntityDescriptor>> {
        let mut stubs = self.collect_stubs(root)?;

        let mut resolved = stubs
            .iter()
            .map(|stub| self.resolve(stub, &stubs))
            .collect::<PersistenceResult<Vec<_>>>()?;

        let mut columns_reset = false;
        for position in 0..stubs.len() {
            if !stubs[position].table_exists {
                columns_reset |= schema::create_table(
                    self.store.as_ref(),
                    &mut stubs[position],
                    &resolved[position],
                )?;
            }
        }
        if columns_reset {
            resolved = stubs
                .iter()
                .map(|stub| self.resolve(stub, &stubs))
                .collect::<PersistenceResult<Vec<_>>>()?;
        }
        for (stub, constraints) in stubs.iter().zip(&resolved) {
            if stub.table_exists {
                schema::check_audit_table(self.store.as_ref(), stub, self.create_tables)?;
            } else {
                schema::create_dependents(self.store.as_ref(), stub, constraints)?;
            }
        }

        self.publish(stubs, resolved)?;
        self.get(root).ok_or_else(|| {
            PersistenceError::mapping(root.simple_name(), "descriptor was not published")
        })
    }

    /// Pass 1: field layouts of `root` and every unregistered entity reachable
    /// from it through foreign constraints.
    fn collect_stubs(&self, root: EntityRef) -> PersistenceResult<Vec<Stub>> {
        let mut stubs = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = VecDeque::from([root]);
        while let Some(entity) = pending.pop_front() {
            if !seen.insert(entity.type_id()) || self.is_registered(entity) {
                continue;
            }
            let stub = self.build_stub(entity)?;
            pending.extend(
                stub.declaration
                    .foreign_constraints
                    .iter()
                    .map(|constraint| constraint.target),
            );
            stubs.push(stub);
        }
        Ok(stubs)
    }

    fn build_stub(&self, entity: EntityRef) -> PersistenceResult<Stub> {
        let declaration = entity.declaration();
        let name = entity.simple_name();
        let table = declaration
            .table
            .clone()
            .filter(|table| !table.trim().is_empty())
            .ok_or_else(|| PersistenceError::mapping(name, "no table name is declared"))?;

        let existing = self.store.column_names(&table)?;
        if existing.is_none() && !self.create_tables {
            return Err(PersistenceError::InvalidConfiguration(format!(
                "table `{table}` of entity `{name}` does not exist and table creation is disabled"
            )));
        }
        let existing = existing.map(|columns| {
            columns
                .into_iter()
                .map(|column| (flatten(&column), column))
                .collect::<HashMap<_, _>>()
        });

        let mut fields: Vec<FieldDescriptor> = Vec::with_capacity(declaration.fields.len());
        let mut id_index = None;
        for field in &declaration.fields {
            if fields.iter().any(|existing| existing.name == field.name) {
                return Err(PersistenceError::mapping(
                    name,
                    format!("field `{}` is declared more than once", field.name),
                ));
            }

            let column = match &existing {
                Some(columns) => {
                    let key = flatten(field.column.as_deref().unwrap_or(&field.name));
                    columns.get(&key).cloned().ok_or_else(|| {
                        PersistenceError::mapping(
                            name,
                            format!(
                                "failed to find a column of table `{table}` for field `{}`",
                                field.name
                            ),
                        )
                    })?
                }
                None => field
                    .column
                    .clone()
                    .unwrap_or_else(|| naming::upper_snake(&field.name)),
            };
            if let Some(clash) = fields
                .iter()
                .find(|existing| existing.column.eq_ignore_ascii_case(&column))
            {
                return Err(PersistenceError::mapping(
                    name,
                    format!(
                        "fields `{}` and `{}` both map to column `{column}`",
                        clash.name, field.name
                    ),
                ));
            }

            if field.data_type == DataType::Json && field.converter.is_none() {
                return Err(PersistenceError::mapping(
                    name,
                    format!("json field `{}` requires a custom converter", field.name),
                ));
            }

            let mut sequence = None;
            if field.identifier {
                if let Some(previous) = id_index {
                    let previous: &FieldDescriptor = &fields[previous];
                    return Err(PersistenceError::mapping(
                        name,
                        format!(
                            "multiple id fields declared: `{}` and `{}`",
                            previous.name, field.name
                        ),
                    ));
                }
                if field.generation == IdGeneration::Auto && !field.data_type.is_integral() {
                    return Err(PersistenceError::mapping(
                        name,
                        format!(
                            "auto-increment id field `{}` must be an integer type",
                            field.name
                        ),
                    ));
                }
                if field.generation == IdGeneration::Sequence {
                    sequence = Some(
                        field
                            .sequence
                            .clone()
                            .filter(|sequence| !sequence.trim().is_empty())
                            .unwrap_or_else(|| naming::sequence_name(name, &field.name)),
                    );
                }
                id_index = Some(fields.len());
            }

            fields.push(FieldDescriptor {
                name: field.name.clone(),
                column,
                data_type: field.data_type,
                identifier: field.identifier,
                generation: if field.identifier {
                    field.generation
                } else {
                    IdGeneration::None
                },
                sequence,
                read_only: field.read_only,
                auto_fetch: field.auto_fetch,
                nullable: field.nullable && !field.identifier,
                length: field.length,
                enum_values: field.enum_values.clone(),
                converter: field.converter.clone(),
                foreign_constraint: None,
                override_name: None,
            });
        }

        let id_index = id_index
            .ok_or_else(|| PersistenceError::mapping(name, "no id field is declared"))?;

        let audit = match &declaration.audit {
            Some(audit) => {
                for (field, column) in &audit.remaps {
                    let target = fields
                        .iter_mut()
                        .find(|candidate| &candidate.name == field)
                        .ok_or_else(|| {
                            PersistenceError::mapping(
                                name,
                                format!("audit remap names unknown field `{field}`"),
                            )
                        })?;
                    target.override_name = Some(column.clone());
                }
                Some(AuditDescriptor {
                    table: audit
                        .table
                        .clone()
                        .unwrap_or_else(|| naming::audit_table_name(&table)),
                    id_column: audit.id_column.clone(),
                    type_column: audit.type_column.clone(),
                    time_column: audit.time_column.clone(),
                    changed_by_column: audit.changed_by_column.clone(),
                })
            }
            None => None,
        };

        Ok(Stub {
            entity,
            declaration,
            table,
            table_exists: existing.is_some(),
            fields,
            id_index,
            audit,
        })
    }

    fn target<'a>(&self, entity: EntityRef, stubs: &'a [Stub]) -> Option<Target<'a>> {
        stubs
            .iter()
            .find(|stub| stub.entity == entity)
            .map(Target::Stub)
            .or_else(|| self.get(entity).map(Target::Published))
    }

    /// Pass 2: unique, foreign and index constraints of one stub.
    fn resolve(&self, stub: &Stub, stubs: &[Stub]) -> PersistenceResult<Resolved> {
        let mut resolved = Resolved::default();
        self.resolve_unique(stub, &mut resolved)?;
        self.resolve_foreign(stub, stubs, &mut resolved)?;
        self.resolve_indexes(stub, &mut resolved)?;
        Ok(resolved)
    }

    fn resolve_unique(&self, stub: &Stub, resolved: &mut Resolved) -> PersistenceResult<()> {
        let declaration = &stub.declaration;
        let class_level = declaration.unique_constraints.iter().map(|constraint| {
            (
                constraint.name.clone(),
                constraint.fields.clone(),
                constraint.message.clone(),
                constraint.validate,
            )
        });
        let field_level = declaration.fields.iter().filter_map(|field| {
            field.unique.as_ref().map(|(constraint, message)| {
                (constraint.clone(), vec![field.name.clone()], message.clone(), true)
            })
        });

        let mut field_sets = HashSet::new();
        for (name, fields, message, validate) in class_level.chain(field_level) {
            if fields.is_empty() {
                return Err(stub.invalid(format!("unique constraint `{name}` declares no fields")));
            }
            if resolved
                .unique_constraints
                .iter()
                .any(|existing| existing.name == name)
            {
                return Err(stub.invalid(format!("duplicate unique constraint name `{name}`")));
            }
            let columns = fields
                .iter()
                .map(|field| {
                    stub.field(field).map(|found| found.column.clone()).ok_or_else(|| {
                        stub.invalid(format!(
                            "invalid field `{field}` in unique constraint `{name}`"
                        ))
                    })
                })
                .collect::<PersistenceResult<Vec<_>>>()?;
            if !field_sets.insert(fields.iter().cloned().collect::<BTreeSet<_>>()) {
                return Err(stub.invalid(format!(
                    "unique constraint `{name}` repeats the field set of another unique constraint"
                )));
            }
            resolved.unique_constraints.push(UniqueConstraint {
                name,
                fields,
                columns,
                message,
                validate,
            });
        }
        Ok(())
    }

    fn resolve_foreign(
        &self,
        stub: &Stub,
        stubs: &[Stub],
        resolved: &mut Resolved,
    ) -> PersistenceResult<()> {
        for declaration in &stub.declaration.foreign_constraints {
            let name = &declaration.name;
            if resolved
                .foreign_constraints
                .iter()
                .any(|existing| &existing.name == name)
            {
                return Err(stub.invalid(format!("duplicate foreign constraint name `{name}`")));
            }
            if declaration.mappings.is_empty() {
                return Err(stub.invalid(format!("foreign constraint `{name}` maps no fields")));
            }
            let target = self.target(declaration.target, stubs).ok_or_else(|| {
                stub.invalid(format!(
                    "target entity `{}` of foreign constraint `{name}` is not available",
                    declaration.target.simple_name()
                ))
            })?;

            let mappings = declaration
                .mappings
                .iter()
                .map(|(owner_field, target_field)| {
                    let owner_column = stub
                        .field(owner_field)
                        .map(|field| field.column.clone())
                        .ok_or_else(|| {
                            stub.invalid(format!(
                                "invalid field `{owner_field}` in foreign constraint `{name}`"
                            ))
                        })?;
                    let target_column = target.column(target_field).ok_or_else(|| {
                        stub.invalid(format!(
                            "invalid parent field `{target_field}` in foreign constraint `{name}`"
                        ))
                    })?;
                    Ok(FieldMapping {
                        owner_field: owner_field.clone(),
                        owner_column,
                        target_field: target_field.clone(),
                        target_column,
                    })
                })
                .collect::<PersistenceResult<Vec<_>>>()?;

            let owner_conditions = declaration
                .owner_conditions
                .iter()
                .map(|(field, value)| {
                    let column = stub.field(field).map(|found| found.column.clone());
                    static_condition(field, column, value).ok_or_else(|| {
                        stub.invalid(format!(
                            "invalid condition field `{field}` in foreign constraint `{name}`"
                        ))
                    })
                })
                .collect::<PersistenceResult<Vec<_>>>()?;
            let target_conditions = declaration
                .target_conditions
                .iter()
                .map(|(field, value)| {
                    static_condition(field, target.column(field), value).ok_or_else(|| {
                        stub.invalid(format!(
                            "invalid parent condition field `{field}` in foreign constraint `{name}`"
                        ))
                    })
                })
                .collect::<PersistenceResult<Vec<_>>>()?;

            resolved.foreign_constraints.push(ForeignConstraint {
                name: name.clone(),
                target: declaration.target,
                target_table: target.table().to_string(),
                mappings,
                owner_conditions,
                target_conditions,
                cascade: declaration.cascade,
                message: declaration.message.clone(),
                validate: declaration.validate,
                mapped_by: declaration.mapped_by,
            });
        }
        Ok(())
    }

    fn resolve_indexes(&self, stub: &Stub, resolved: &mut Resolved) -> PersistenceResult<()> {
        let field_level = stub
            .declaration
            .fields
            .iter()
            .filter(|field| field.indexed)
            .map(|field| (None, vec![field.name.clone()]));
        let class_level = stub
            .declaration
            .indexes
            .iter()
            .map(|index| (index.name.clone(), index.fields.clone()));

        let mut field_sets = HashSet::new();
        for (name, fields) in field_level.chain(class_level) {
            if fields.is_empty() {
                return Err(PersistenceError::InvalidConfiguration(format!(
                    "index on entity `{}` specifies no fields",
                    stub.name()
                )));
            }
            let columns = fields
                .iter()
                .map(|field| {
                    stub.field(field).map(|found| found.column.clone()).ok_or_else(|| {
                        stub.invalid(format!("invalid field `{field}` encountered for indexing"))
                    })
                })
                .collect::<PersistenceResult<Vec<_>>>()?;
            let name = name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| naming::index_name(stub.name(), &fields));
            if resolved.indexes.iter().any(|existing| existing.name == name) {
                return Err(stub.invalid(format!("duplicate index name `{name}`")));
            }
            if !field_sets.insert(fields.clone()) {
                return Err(stub.invalid(format!(
                    "index `{name}` repeats the field list of another index"
                )));
            }
            resolved.indexes.push(IndexDescriptor {
                name,
                fields,
                columns,
            });
        }
        Ok(())
    }

    /// Pass 4: publish every stub, then attach child constraints.
    fn publish(&self, stubs: Vec<Stub>, resolved: Vec<Resolved>) -> PersistenceResult<()> {
        let mut published = Vec::with_capacity(stubs.len());
        {
            let mut descriptors = self.descriptors.write().map_err(|_| {
                PersistenceError::InvalidConfiguration("entity registry lock poisoned".to_string())
            })?;
            for (stub, constraints) in stubs.into_iter().zip(resolved) {
                let mut fields = stub.fields;
                for constraint in constraints
                    .foreign_constraints
                    .iter()
                    .filter(|constraint| !constraint.mapped_by)
                {
                    for mapping in &constraint.mappings {
                        if let Some(field) = fields
                            .iter_mut()
                            .find(|field| field.name == mapping.owner_field)
                        {
                            field.foreign_constraint = Some(constraint.name.clone());
                        }
                    }
                }
                let descriptor = Arc::new(EntityDescriptor::from_parts(EntityParts {
                    entity: stub.entity,
                    table: stub.table,
                    fields,
                    id_index: stub.id_index,
                    unique_constraints: constraints.unique_constraints,
                    foreign_constraints: constraints.foreign_constraints,
                    indexes: constraints.indexes,
                    audit: stub.audit,
                }));
                descriptors.insert(stub.entity.type_id(), Arc::clone(&descriptor));
                published.push(descriptor);
            }
        }

        for descriptor in &published {
            for constraint in descriptor.owned_foreign_constraints() {
                if let Some(target) = self.get(constraint.target) {
                    target.add_child_constraint(child_constraint(descriptor, constraint));
                }
            }
        }

        // Entities registered earlier may reference a target published anew,
        // e.g. after its repository was dropped.
        let fresh = published
            .iter()
            .map(|descriptor| descriptor.entity().type_id())
            .collect::<HashSet<_>>();
        let earlier = {
            let descriptors = match self.descriptors.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            descriptors
                .values()
                .filter(|descriptor| !fresh.contains(&descriptor.entity().type_id()))
                .cloned()
                .collect::<Vec<_>>()
        };
        for descriptor in &earlier {
            for constraint in descriptor.owned_foreign_constraints() {
                if !fresh.contains(&constraint.target.type_id()) {
                    continue;
                }
                if let Some(target) = self.get(constraint.target) {
                    target.add_child_constraint(child_constraint(descriptor, constraint));
                }
            }
        }
        Ok(())
    }
}

fn child_constraint(child: &EntityDescriptor, constraint: &ForeignConstraint) -> ChildConstraint {
    ChildConstraint {
        name: constraint.name.clone(),
        child: child.entity(),
        child_table: child.table_name().to_string(),
        child_id_column: child.id_field().column().to_string(),
        mappings: constraint.mappings.clone(),
        child_conditions: constraint.owner_conditions.clone(),
        cascade: constraint.cascade,
    }
}

fn static_condition(field: &str, column: Option<String>, value: &Value) -> Option<StaticCondition> {
    column.map(|column| StaticCondition {
        field: field.to_string(),
        column,
        value: value.clone(),
    })
}
