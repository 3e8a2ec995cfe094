mod common;

use common::{
    factory, factory_with, Account, Address, Document, Employee, NodeA, NodeB, Project, Story,
};
use relmap_core::{
    Arg, CascadePolicy, DataType, Entity, EntityDeclaration, EntityRef, ErrorKind,
    FieldDeclaration, IdGeneration, MethodShape, ParamRole, PasswordHashConverter,
    PersistenceConfig, PersistenceResult, Record, RepositoryDeclaration, ResultKind, ReturnShape,
    SqliteDataStore, UniqueDeclaration,
};
use serde_json::json;
use std::sync::Arc;

#[test]
fn registering_a_child_registers_its_parent() {
    let factory = factory();
    factory.crud_repository::<Address>().unwrap();

    let registry = factory.entity_registry();
    assert!(registry.is_registered(EntityRef::of::<Address>()));
    let employee = registry.get(EntityRef::of::<Employee>()).unwrap();

    let children = employee.child_constraints();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), "employee");
    assert_eq!(children[0].child(), EntityRef::of::<Address>());
    assert_eq!(children[0].child_table(), "ADDRESS");
    assert_eq!(children[0].cascade(), CascadePolicy::DeleteWithParent);
    assert_eq!(children[0].child_conditions().len(), 1);
}

#[test]
fn mutual_references_register_together() {
    let factory = factory();
    factory.crud_repository::<NodeA>().unwrap();

    let registry = factory.entity_registry();
    let a = registry.get(EntityRef::of::<NodeA>()).unwrap();
    let b = registry.get(EntityRef::of::<NodeB>()).unwrap();
    assert_eq!(a.foreign_constraints()[0].target(), EntityRef::of::<NodeB>());
    assert_eq!(b.foreign_constraints()[0].target(), EntityRef::of::<NodeA>());
    assert_eq!(a.child_constraints().len(), 1);
    assert_eq!(b.child_constraints().len(), 1);
}

#[test]
fn derived_names_follow_entity_and_field_names() {
    let factory = factory();
    let registry = factory.entity_registry();

    let address = registry.descriptor::<Address>().unwrap();
    assert_eq!(address.id_field().sequence_name(), Some("SEQ_ADDRESS_ID"));
    assert_eq!(address.field("parentId").unwrap().column(), "PARENT_ID");

    let employee = registry.descriptor::<Employee>().unwrap();
    assert!(employee
        .indexes()
        .iter()
        .any(|index| index.name() == "IDX_EMPLOYEE_NAME"));

    let project = registry.descriptor::<Project>().unwrap();
    let index = &project.indexes()[0];
    assert_eq!(index.name(), "IDX_PROJECT_REGION_BUDGET");
    assert_eq!(index.columns(), ["REGION", "BUDGET"]);
    assert_eq!(project.unique_constraints()[0].columns(), ["REGION", "NAME"]);

    let story = registry.descriptor::<Story>().unwrap();
    let audit = story.audit().unwrap();
    assert_eq!(audit.table(), "AUDIT_STORY");
    assert_eq!(
        audit.bookkeeping_columns(),
        [
            "AUDIT_ID",
            "AUDIT_CHANGE_TYPE",
            "AUDIT_CHANGE_TIME",
            "AUDIT_CHANGED_BY"
        ]
    );
}

#[test]
fn json_fields_round_trip_through_their_converter() {
    let factory = factory();
    let documents = factory.crud_repository::<Document>().unwrap();

    let mut document = Document {
        id: None,
        meta: json!({"tags": ["a", "b"], "pinned": true}),
    };
    documents.save(&mut document).unwrap();

    let loaded = documents.find_by_id(document.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.meta, json!({"tags": ["a", "b"], "pinned": true}));
}

#[test]
fn password_fields_keep_a_one_way_digest() {
    let factory = factory();
    let accounts = factory
        .repository::<Account>(
            RepositoryDeclaration::new("AccountRepository").method(
                MethodShape::new("findByLoginAndPassword")
                    .param(ParamRole::Value)
                    .param(ParamRole::Value)
                    .returns(ReturnShape::Single(ResultKind::Entity)),
            ),
        )
        .unwrap();

    let mut account = Account::new("ada", "s3cret");
    accounts.save(&mut account).unwrap();
    let loaded = accounts.find_by_id(account.id.unwrap()).unwrap().unwrap();
    assert_ne!(loaded.password, "s3cret");
    assert!(PasswordHashConverter::matches("s3cret", &loaded.password));

    accounts.update(&loaded).unwrap();
    let reloaded = accounts.find_by_id(account.id.unwrap()).unwrap().unwrap();
    assert_eq!(reloaded.password, loaded.password);

    let found = accounts
        .find_one(
            "findByLoginAndPassword",
            vec![Arg::Value("ada".into()), Arg::Value("s3cret".into())],
        )
        .unwrap();
    assert_eq!(found.unwrap().id, account.id);
}

struct UnconvertedJson;

impl Entity for UnconvertedJson {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("UNCONVERTED_JSON")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("payload", DataType::Json))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

struct TwoIds;

impl Entity for TwoIds {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("TWO_IDS")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("otherId", DataType::Long).id(IdGeneration::None))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

struct TextAutoId;

impl Entity for TextAutoId {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("TEXT_AUTO_ID")
            .field(FieldDeclaration::new("id", DataType::String).id(IdGeneration::Auto))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

struct NoId;

impl Entity for NoId {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("NO_ID")
            .field(FieldDeclaration::new("name", DataType::String))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

struct SharedColumn;

impl Entity for SharedColumn {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("SHARED_COLUMN")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("code", DataType::String))
            .field(FieldDeclaration::new("alias", DataType::String).column("CODE"))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

struct RepeatedUniqueSet;

impl Entity for RepeatedUniqueSet {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("REPEATED_UNIQUE_SET")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("code", DataType::String).unique("code"))
            .unique(UniqueDeclaration::new("codeAgain", ["code"]))
    }

    fn to_record(&self) -> Record {
        Record::new()
    }

    fn from_record(_: &Record) -> PersistenceResult<Self> {
        Ok(Self)
    }
}

#[test]
fn inconsistent_declarations_are_invalid_mappings() {
    let factory = factory();
    let registry = factory.entity_registry();

    for err in [
        registry.descriptor::<UnconvertedJson>().unwrap_err(),
        registry.descriptor::<TwoIds>().unwrap_err(),
        registry.descriptor::<TextAutoId>().unwrap_err(),
        registry.descriptor::<NoId>().unwrap_err(),
        registry.descriptor::<SharedColumn>().unwrap_err(),
        registry.descriptor::<RepeatedUniqueSet>().unwrap_err(),
    ] {
        assert_eq!(err.kind(), ErrorKind::InvalidMapping, "{err}");
    }
    assert!(!registry.is_registered(EntityRef::of::<TwoIds>()));
}

#[test]
fn missing_table_without_creation_is_a_configuration_error() {
    let factory = factory_with(PersistenceConfig {
        create_tables: false,
        ..PersistenceConfig::default()
    });
    let err = factory.crud_repository::<Story>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
}

#[test]
fn existing_tables_are_reused_without_creation() {
    let store = Arc::new(SqliteDataStore::open_in_memory().unwrap());
    let creating = relmap_core::RepositoryFactory::builder(store.clone()).build();
    let mut story = Story::new("Kept");
    creating
        .crud_repository::<Story>()
        .unwrap()
        .save(&mut story)
        .unwrap();

    let reusing = relmap_core::RepositoryFactory::builder(store)
        .config(PersistenceConfig {
            create_tables: false,
            ..PersistenceConfig::default()
        })
        .build();
    let stories = reusing.crud_repository::<Story>().unwrap();
    assert_eq!(stories.find_by_id(story.id.unwrap()).unwrap().unwrap(), story);
}

#[test]
fn dropping_a_repository_drops_its_table() {
    let factory = factory();
    let employees = factory.crud_repository::<Employee>().unwrap();
    let mut alice = Employee::new("E1", "Alice", 30);
    employees.save(&mut alice).unwrap();

    factory.drop_repository::<Employee>().unwrap();
    assert!(!factory
        .entity_registry()
        .is_registered(EntityRef::of::<Employee>()));

    let employees = factory.crud_repository::<Employee>().unwrap();
    assert!(employees.find_by_id(alice.id.unwrap()).unwrap().is_none());
}
