mod common;

use common::{
    factory, factory_with, Address, Department, Employee, Member, NodeA, NodeB, Project, Story,
    SubTask, Task,
};
use relmap_core::{
    EntityRef, MethodShape, ParamRole, PersistenceConfig, PersistenceError, RepositoryDeclaration,
    ReturnShape, SqliteConfig,
};

#[test]
fn duplicate_unique_field_is_rejected_with_rendered_message() {
    let factory = factory();
    let repo = factory.crud_repository::<Employee>().unwrap();
    repo.save(&mut Employee::new("E1", "Alice", 30)).unwrap();

    let err = repo.save(&mut Employee::new("E1", "Bob", 40)).unwrap_err();
    match err {
        PersistenceError::UniqueConstraintViolation {
            constraint,
            message,
        } => {
            assert_eq!(constraint, "empNo");
            assert_eq!(message, "Employee number 'E1' is already in use");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn update_may_keep_its_own_unique_values() {
    let factory = factory();
    let repo = factory.crud_repository::<Employee>().unwrap();
    let mut alice = Employee::new("E1", "Alice", 30);
    let mut bob = Employee::new("E2", "Bob", 40);
    repo.save(&mut alice).unwrap();
    repo.save(&mut bob).unwrap();

    alice.age = 31;
    assert!(repo.update(&alice).unwrap());

    bob.emp_no = "E1".to_string();
    let err = repo.update(&bob).unwrap_err();
    assert!(matches!(err, PersistenceError::UniqueConstraintViolation { .. }));
}

#[test]
fn composite_unique_key_and_caller_supplied_ids() {
    let factory = factory();
    let repo = factory.crud_repository::<Project>().unwrap();
    let mut apollo = Project {
        code: "P-1".to_string(),
        region: "EU".to_string(),
        name: "Apollo".to_string(),
        budget: 10.5,
    };
    repo.save(&mut apollo).unwrap();
    assert_eq!(repo.find_by_id("P-1").unwrap().unwrap(), apollo);

    let mut other_region = Project {
        code: "P-2".to_string(),
        region: "US".to_string(),
        ..apollo.clone()
    };
    repo.save(&mut other_region).unwrap();

    let mut clash = Project {
        code: "P-3".to_string(),
        ..apollo.clone()
    };
    let err = repo.save(&mut clash).unwrap_err();
    match err {
        PersistenceError::UniqueConstraintViolation { message, .. } => {
            assert_eq!(message, "Project 'Apollo' already exists in EU");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_parent_is_a_foreign_constraint_violation() {
    let factory = factory();
    let addresses = factory.crud_repository::<Address>().unwrap();

    let err = addresses
        .save(&mut Address::of_employee(42, "Berlin"))
        .unwrap_err();
    match err {
        PersistenceError::ForeignConstraintViolation {
            constraint,
            message,
        } => {
            assert_eq!(constraint, "employee");
            assert_eq!(message, "No employee exists with id 42");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn owner_conditions_scope_the_foreign_check() {
    let factory = factory();
    let addresses = factory.crud_repository::<Address>().unwrap();

    let mut vendor_address = Address {
        parent_type: "VENDOR".to_string(),
        ..Address::of_employee(42, "Paris")
    };
    assert!(addresses.save(&mut vendor_address).unwrap());

    let mut orphan = Address {
        parent_id: None,
        ..Address::of_employee(0, "Rome")
    };
    assert!(addresses.save(&mut orphan).unwrap());
}

#[test]
fn sequence_ids_are_assigned_and_written_back() {
    let factory = factory();
    let employees = factory.crud_repository::<Employee>().unwrap();
    let addresses = factory.crud_repository::<Address>().unwrap();
    let mut alice = Employee::new("E1", "Alice", 30);
    employees.save(&mut alice).unwrap();

    let mut first = Address::of_employee(alice.id.unwrap(), "Oslo");
    let mut second = Address::of_employee(alice.id.unwrap(), "Bergen");
    addresses.save(&mut first).unwrap();
    addresses.save(&mut second).unwrap();
    assert_eq!(first.id, Some(1));
    assert_eq!(second.id, Some(2));
}

#[test]
fn deleting_a_parent_cascades_through_conditioned_children() {
    let factory = factory();
    let employees = factory.crud_repository::<Employee>().unwrap();
    let addresses = factory.crud_repository::<Address>().unwrap();
    let mut alice = Employee::new("E1", "Alice", 30);
    employees.save(&mut alice).unwrap();
    let alice_id = alice.id.unwrap();

    let mut home = Address::of_employee(alice_id, "Oslo");
    addresses.save(&mut home).unwrap();
    let mut vendor = Address {
        parent_type: "VENDOR".to_string(),
        ..Address::of_employee(alice_id, "Paris")
    };
    addresses.save(&mut vendor).unwrap();

    assert!(employees.delete_by_id(alice_id).unwrap());
    assert!(addresses.find_by_id(home.id.unwrap()).unwrap().is_none());
    assert!(addresses.find_by_id(vendor.id.unwrap()).unwrap().is_some());
}

#[test]
fn cascade_reaches_grandchildren() {
    let factory = factory();
    let stories = factory.crud_repository::<Story>().unwrap();
    let tasks = factory.crud_repository::<Task>().unwrap();
    let sub_tasks = factory.crud_repository::<SubTask>().unwrap();

    let mut story = Story::new("Checkout");
    stories.save(&mut story).unwrap();
    let mut task = Task::new(story.id.unwrap(), "Design");
    tasks.save(&mut task).unwrap();
    let mut sub_task = SubTask::new(task.id.unwrap(), "Wireframe");
    sub_tasks.save(&mut sub_task).unwrap();

    assert!(stories.delete_by_id(story.id.unwrap()).unwrap());
    assert!(tasks.find_by_id(task.id.unwrap()).unwrap().is_none());
    assert!(sub_tasks.find_by_id(sub_task.id.unwrap()).unwrap().is_none());
}

#[test]
fn existing_children_block_parent_delete() {
    let factory = factory();
    let departments = factory.crud_repository::<Department>().unwrap();
    let members = factory.crud_repository::<Member>().unwrap();

    let mut sales = Department {
        id: None,
        name: "Sales".to_string(),
    };
    departments.save(&mut sales).unwrap();
    let mut member = Member {
        id: None,
        department_id: sales.id,
        name: "Eve".to_string(),
    };
    members.save(&mut member).unwrap();

    let err = departments.delete_by_id(sales.id.unwrap()).unwrap_err();
    match err {
        PersistenceError::ChildConstraintViolation { message, .. } => {
            assert_eq!(message, "Found child items of type 'Member'");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(departments.find_by_id(sales.id.unwrap()).unwrap().is_some());

    members.delete_by_id(member.id.unwrap()).unwrap();
    assert!(departments.delete_by_id(sales.id.unwrap()).unwrap());
}

#[test]
fn conditional_delete_also_processes_children() {
    let factory = factory();
    let departments = factory
        .repository::<Department>(
            RepositoryDeclaration::new("DepartmentRepository").method(
                MethodShape::new("deleteByName")
                    .param(ParamRole::Value)
                    .returns(ReturnShape::Bool),
            ),
        )
        .unwrap();
    let members = factory.crud_repository::<Member>().unwrap();

    let mut sales = Department {
        id: None,
        name: "Sales".to_string(),
    };
    departments.save(&mut sales).unwrap();
    members
        .save(&mut Member {
            id: None,
            department_id: sales.id,
            name: "Eve".to_string(),
        })
        .unwrap();

    let err = departments
        .call("deleteByName", vec!["Sales".into()])
        .unwrap_err();
    assert!(matches!(err, PersistenceError::ChildConstraintViolation { .. }));
}

#[test]
fn mutually_referencing_entities_register_and_validate() {
    let factory = factory();
    let nodes_a = factory.crud_repository::<NodeA>().unwrap();
    let nodes_b = factory.crud_repository::<NodeB>().unwrap();

    let mut a = NodeA::default();
    nodes_a.save(&mut a).unwrap();
    let mut b = NodeB {
        id: None,
        partner_id: a.id,
    };
    nodes_b.save(&mut b).unwrap();

    let mut dangling = NodeA {
        id: None,
        partner_id: Some(999),
    };
    let err = nodes_a.save(&mut dangling).unwrap_err();
    assert!(matches!(err, PersistenceError::ForeignConstraintViolation { .. }));
}

#[test]
fn native_foreign_keys_delegate_unconditioned_relations_to_the_store() {
    let factory = factory_with(PersistenceConfig {
        sqlite: SqliteConfig {
            native_foreign_keys: true,
            ..SqliteConfig::default()
        },
        ..PersistenceConfig::default()
    });
    let stories = factory.crud_repository::<Story>().unwrap();
    let tasks = factory.crud_repository::<Task>().unwrap();

    let mut story = Story::new("Native");
    stories.save(&mut story).unwrap();
    let mut task = Task::new(story.id.unwrap(), "Child");
    tasks.save(&mut task).unwrap();

    let err = tasks.save(&mut Task::new(777, "Orphan")).unwrap_err();
    assert!(matches!(err, PersistenceError::Persistence { .. }));

    assert!(stories.delete_by_id(story.id.unwrap()).unwrap());
    assert!(tasks.find_by_id(task.id.unwrap()).unwrap().is_none());
}

#[test]
fn re_registered_parent_is_still_blocked_by_existing_children() {
    let factory = factory();
    factory.crud_repository::<Member>().unwrap();
    factory.drop_repository::<Department>().unwrap();

    let departments = factory.crud_repository::<Department>().unwrap();
    let members = factory.crud_repository::<Member>().unwrap();
    let department = factory
        .entity_registry()
        .get(EntityRef::of::<Department>())
        .unwrap();
    assert_eq!(department.child_constraints().len(), 1);

    let mut sales = Department {
        id: None,
        name: "Sales".to_string(),
    };
    departments.save(&mut sales).unwrap();
    members
        .save(&mut Member {
            id: None,
            department_id: sales.id,
            name: "Ann".to_string(),
        })
        .unwrap();

    let err = departments.delete_by_id(sales.id.unwrap()).unwrap_err();
    assert!(matches!(err, PersistenceError::ChildConstraintViolation { .. }));
    assert!(departments.find_by_id(sales.id.unwrap()).unwrap().is_some());
}
