#![allow(dead_code)]

use relmap_core::{
    AuditDeclaration, CascadePolicy, DataType, Entity, EntityDeclaration, FieldDeclaration,
    ForeignDeclaration, IdGeneration, IndexDeclaration, JsonConverter, PasswordHashConverter,
    PersistenceConfig,
    PersistenceResult, Record, RepositoryFactory, SqliteDataStore, StaticPersistenceContext,
    UniqueDeclaration, Value,
};
use std::sync::Arc;

pub fn factory() -> RepositoryFactory {
    factory_with(PersistenceConfig::default())
}

pub fn factory_with(config: PersistenceConfig) -> RepositoryFactory {
    let store = SqliteDataStore::open_in_memory_with(&config.sqlite).unwrap();
    RepositoryFactory::builder(Arc::new(store))
        .config(config)
        .build()
}

pub fn audited_factory(user: &str) -> RepositoryFactory {
    let factory = factory();
    factory.set_persistence_context(Arc::new(StaticPersistenceContext::new(user, true)));
    factory
}

fn int(record: &Record, field: &str) -> i32 {
    match record.value(field) {
        Value::Int(value) => *value,
        _ => 0,
    }
}

fn text(record: &Record, field: &str) -> String {
    record.text(field).unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Employee {
    pub id: Option<i64>,
    pub emp_no: String,
    pub name: String,
    pub email: Option<String>,
    pub age: i32,
    pub status: String,
}

impl Employee {
    pub fn new(emp_no: &str, name: &str, age: i32) -> Self {
        Self {
            id: None,
            emp_no: emp_no.to_string(),
            name: name.to_string(),
            email: Some(format!("{}@corp.test", name.to_ascii_lowercase())),
            age,
            status: "ACTIVE".to_string(),
        }
    }
}

impl Entity for Employee {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("EMPLOYEE")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(
                FieldDeclaration::new("empNo", DataType::String)
                    .not_null()
                    .length(20)
                    .unique_with_message("empNo", "Employee number '${empNo}' is already in use"),
            )
            .field(FieldDeclaration::new("name", DataType::String).indexed())
            .field(FieldDeclaration::new("email", DataType::String))
            .field(FieldDeclaration::new("age", DataType::Int))
            .field(
                FieldDeclaration::new("status", DataType::Enum)
                    .enum_values(["ACTIVE", "INACTIVE"]),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("empNo", self.emp_no.as_str())
            .with("name", self.name.as_str())
            .with("email", self.email.clone())
            .with("age", self.age)
            .with("status", Value::Enum(self.status.clone()))
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            emp_no: text(record, "empNo"),
            name: text(record, "name"),
            email: record.text("email"),
            age: int(record, "age"),
            status: text(record, "status"),
        })
    }
}

/// Owned by an employee only when `parentType` is `EMPLOYEE`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub parent_type: String,
    pub city: String,
}

impl Address {
    pub fn of_employee(employee_id: i64, city: &str) -> Self {
        Self {
            id: None,
            parent_id: Some(employee_id),
            parent_type: "EMPLOYEE".to_string(),
            city: city.to_string(),
        }
    }
}

impl Entity for Address {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("ADDRESS")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Sequence))
            .field(FieldDeclaration::new("parentId", DataType::Long))
            .field(FieldDeclaration::new("parentType", DataType::String))
            .field(FieldDeclaration::new("city", DataType::String))
            .foreign(
                ForeignDeclaration::to::<Employee>("employee")
                    .map("parentId", "id")
                    .owner_condition("parentType", "EMPLOYEE")
                    .cascade(CascadePolicy::DeleteWithParent)
                    .message("No employee exists with id ${parentId}"),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("parentId", self.parent_id)
            .with("parentType", self.parent_type.as_str())
            .with("city", self.city.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            parent_id: record.long("parentId"),
            parent_type: text(record, "parentType"),
            city: text(record, "city"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Story {
    pub id: Option<i64>,
    pub title: String,
}

impl Story {
    pub fn new(title: &str) -> Self {
        Self {
            id: None,
            title: title.to_string(),
        }
    }
}

impl Entity for Story {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("STORY")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("title", DataType::String).unique("title"))
            .audited(AuditDeclaration::new())
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("title", self.title.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            title: text(record, "title"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Task {
    pub id: Option<i64>,
    pub story_id: Option<i64>,
    pub title: String,
}

impl Task {
    pub fn new(story_id: i64, title: &str) -> Self {
        Self {
            id: None,
            story_id: Some(story_id),
            title: title.to_string(),
        }
    }
}

impl Entity for Task {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("TASK")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("storyId", DataType::Long))
            .field(FieldDeclaration::new("title", DataType::String))
            .foreign(
                ForeignDeclaration::to::<Story>("story")
                    .map("storyId", "id")
                    .cascade(CascadePolicy::DeleteWithParent),
            )
            .audited(AuditDeclaration::new().remap("title", "TASK_TITLE"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("storyId", self.story_id)
            .with("title", self.title.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            story_id: record.long("storyId"),
            title: text(record, "title"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubTask {
    pub id: Option<i64>,
    pub task_id: Option<i64>,
    pub title: String,
}

impl SubTask {
    pub fn new(task_id: i64, title: &str) -> Self {
        Self {
            id: None,
            task_id: Some(task_id),
            title: title.to_string(),
        }
    }
}

impl Entity for SubTask {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("SUB_TASK")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("taskId", DataType::Long))
            .field(FieldDeclaration::new("title", DataType::String))
            .foreign(
                ForeignDeclaration::to::<Task>("task")
                    .map("taskId", "id")
                    .cascade(CascadePolicy::DeleteWithParent),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("taskId", self.task_id)
            .with("title", self.title.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            task_id: record.long("taskId"),
            title: text(record, "title"),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Department {
    pub id: Option<i64>,
    pub name: String,
}

impl Entity for Department {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("DEPARTMENT")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("name", DataType::String))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            name: text(record, "name"),
        })
    }
}

/// Blocks deletion of its department.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Member {
    pub id: Option<i64>,
    pub department_id: Option<i64>,
    pub name: String,
}

impl Entity for Member {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("MEMBER")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("departmentId", DataType::Long))
            .field(FieldDeclaration::new("name", DataType::String))
            .foreign(ForeignDeclaration::to::<Department>("department").map("departmentId", "id"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("departmentId", self.department_id)
            .with("name", self.name.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            department_id: record.long("departmentId"),
            name: text(record, "name"),
        })
    }
}

/// `NodeA` and `NodeB` reference each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeA {
    pub id: Option<i64>,
    pub partner_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeB {
    pub id: Option<i64>,
    pub partner_id: Option<i64>,
}

impl Entity for NodeA {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("NODE_A")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("partnerId", DataType::Long))
            .foreign(ForeignDeclaration::to::<NodeB>("partner").map("partnerId", "id"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("partnerId", self.partner_id)
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            partner_id: record.long("partnerId"),
        })
    }
}

impl Entity for NodeB {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("NODE_B")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("partnerId", DataType::Long))
            .foreign(ForeignDeclaration::to::<NodeA>("partner").map("partnerId", "id"))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("partnerId", self.partner_id)
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            partner_id: record.long("partnerId"),
        })
    }
}

/// Caller-assigned identifier and a composite unique key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub code: String,
    pub region: String,
    pub name: String,
    pub budget: f64,
}

impl Entity for Project {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("PROJECT")
            .field(FieldDeclaration::new("code", DataType::String).id(IdGeneration::None))
            .field(FieldDeclaration::new("region", DataType::String))
            .field(FieldDeclaration::new("name", DataType::String))
            .field(FieldDeclaration::new("budget", DataType::Double))
            .unique(
                UniqueDeclaration::new("regionName", ["region", "name"])
                    .message("Project '${name}' already exists in ${region}"),
            )
            .index(IndexDeclaration::new(["region", "budget"]))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("code", self.code.as_str())
            .with("region", self.region.as_str())
            .with("name", self.name.as_str())
            .with("budget", self.budget)
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            code: text(record, "code"),
            region: text(record, "region"),
            name: text(record, "name"),
            budget: match record.value("budget") {
                Value::Double(value) => *value,
                _ => 0.0,
            },
        })
    }
}

/// JSON payload stored as text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: Option<i64>,
    pub meta: serde_json::Value,
}

impl Entity for Document {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("DOCUMENT")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("meta", DataType::Json).converter(Arc::new(JsonConverter)))
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("meta", Value::Json(self.meta.clone()))
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            meta: match record.value("meta") {
                Value::Json(value) => value.clone(),
                _ => serde_json::Value::Null,
            },
        })
    }
}

/// Login whose password is kept as a one-way digest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    pub id: Option<i64>,
    pub login: String,
    pub password: String,
}

impl Account {
    pub fn new(login: &str, password: &str) -> Self {
        Self {
            id: None,
            login: login.to_string(),
            password: password.to_string(),
        }
    }
}

impl Entity for Account {
    fn declare() -> EntityDeclaration {
        EntityDeclaration::of::<Self>()
            .table("ACCOUNT")
            .field(FieldDeclaration::new("id", DataType::Long).id(IdGeneration::Auto))
            .field(FieldDeclaration::new("login", DataType::String).unique("login"))
            .field(
                FieldDeclaration::new("password", DataType::String)
                    .converter(Arc::new(PasswordHashConverter)),
            )
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id)
            .with("login", self.login.as_str())
            .with("password", self.password.as_str())
    }

    fn from_record(record: &Record) -> PersistenceResult<Self> {
        Ok(Self {
            id: record.long("id"),
            login: text(record, "login"),
            password: text(record, "password"),
        })
    }
}
