mod common;

use chrono::{Duration, Utc};
use common::{audited_factory, factory, Employee, Story, Task};
use relmap_core::{
    AuditSearchQuery, ChangeType, ErrorKind, NoAuditContext, Record, StaticPersistenceContext,
    Value,
};
use std::sync::Arc;

#[test]
fn every_write_appends_an_audit_row() {
    let factory = audited_factory("auditor");
    let stories = factory.crud_repository::<Story>().unwrap();

    let mut story = Story::new("Checkout");
    stories.save(&mut story).unwrap();
    story.title = "Checkout v2".to_string();
    stories.update(&story).unwrap();
    stories.delete_by_id(story.id.unwrap()).unwrap();

    let entries = stories.audit_entries(&AuditSearchQuery::new()).unwrap();
    let changes = entries.iter().map(|entry| entry.change_type).collect::<Vec<_>>();
    assert_eq!(
        changes,
        vec![ChangeType::Insert, ChangeType::Update, ChangeType::Delete]
    );
    assert!(entries
        .iter()
        .all(|entry| entry.changed_by.as_deref() == Some("auditor")));
    assert_eq!(entries[0].record.value("title"), &Value::from("Checkout"));
    // delete rows are snapshots taken before the row disappears
    assert_eq!(entries[2].record.value("title"), &Value::from("Checkout v2"));
    assert_eq!(entries[2].record.long("id"), story.id);
}

#[test]
fn search_filters_by_type_entity_and_time() {
    let factory = audited_factory("auditor");
    let stories = factory.crud_repository::<Story>().unwrap();

    let started = Utc::now() - Duration::seconds(1);
    let mut first = Story::new("First");
    let mut second = Story::new("Second");
    stories.save(&mut first).unwrap();
    stories.save(&mut second).unwrap();
    stories.update(&second).unwrap();

    let updates = stories
        .audit_entries(&AuditSearchQuery::new().change_type(ChangeType::Update))
        .unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].record.long("id"), second.id);

    let of_first = stories
        .audit_entries(&AuditSearchQuery::new().entity_id(first.id.unwrap()))
        .unwrap();
    assert_eq!(of_first.len(), 1);
    assert_eq!(of_first[0].change_type, ChangeType::Insert);

    let in_window = stories
        .audit_entries(
            &AuditSearchQuery::new()
                .from(started)
                .to(Utc::now() + Duration::seconds(1)),
        )
        .unwrap();
    assert_eq!(in_window.len(), 3);

    let future = stories
        .audit_entries(&AuditSearchQuery::new().from(Utc::now() + Duration::hours(1)))
        .unwrap();
    assert!(future.is_empty());
}

#[test]
fn cascaded_children_are_audited_through_their_own_repository() {
    let factory = audited_factory("auditor");
    let stories = factory.crud_repository::<Story>().unwrap();
    let tasks = factory.crud_repository::<Task>().unwrap();

    let mut story = Story::new("Billing");
    stories.save(&mut story).unwrap();
    let mut task = Task::new(story.id.unwrap(), "Invoice");
    tasks.save(&mut task).unwrap();
    stories.delete_by_id(story.id.unwrap()).unwrap();

    let task_entries = tasks.audit_entries(&AuditSearchQuery::new()).unwrap();
    let changes = task_entries
        .iter()
        .map(|entry| entry.change_type)
        .collect::<Vec<_>>();
    assert_eq!(changes, vec![ChangeType::Insert, ChangeType::Delete]);
    // remapped shadow column still surfaces under the field name
    assert_eq!(task_entries[1].record.value("title"), &Value::from("Invoice"));
}

#[test]
fn save_or_update_is_audited_as_insert_or_update() {
    let factory = audited_factory("merger");
    let stories = factory.crud_repository::<Story>().unwrap();

    let mut story = Story::new("Merged");
    stories.save_or_update(&mut story).unwrap();
    assert!(story.id.is_some());

    let entries = stories.audit_entries(&AuditSearchQuery::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].change_type, ChangeType::InsertOrUpdate);
    assert_eq!(entries[0].changed_by.as_deref(), Some("merger"));
}

#[test]
fn disabled_context_records_nothing() {
    let factory = audited_factory("auditor");
    factory.set_persistence_context(Arc::new(NoAuditContext));
    let stories = factory.crud_repository::<Story>().unwrap();
    stories.save(&mut Story::new("Quiet")).unwrap();
    assert!(stories
        .audit_entries(&AuditSearchQuery::new())
        .unwrap()
        .is_empty());

    factory.set_persistence_context(Arc::new(StaticPersistenceContext::anonymous(true)));
    stories.save(&mut Story::new("Loud")).unwrap();
    let entries = stories.audit_entries(&AuditSearchQuery::new()).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].changed_by, None);
}

#[test]
fn clear_audit_removes_rows_up_to_the_given_time() {
    let factory = audited_factory("auditor");
    let stories = factory.crud_repository::<Story>().unwrap();
    stories.save(&mut Story::new("One")).unwrap();
    stories.save(&mut Story::new("Two")).unwrap();

    assert_eq!(
        stories
            .clear_audit(Utc::now() - Duration::hours(1))
            .unwrap(),
        0
    );
    assert_eq!(
        stories
            .clear_audit(Utc::now() + Duration::seconds(1))
            .unwrap(),
        2
    );
    assert!(stories
        .audit_entries(&AuditSearchQuery::new())
        .unwrap()
        .is_empty());
}

#[test]
fn unaudited_entities_have_no_audit_trail() {
    let factory = factory();
    let employees = factory.crud_repository::<Employee>().unwrap();
    let err = employees
        .audit_entries(&AuditSearchQuery::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
}

#[test]
fn audit_records_hold_entity_fields_only() {
    let factory = audited_factory("auditor");
    let stories = factory.crud_repository::<Story>().unwrap();
    let mut story = Story::new("Fields");
    stories.save(&mut story).unwrap();

    let entries = stories.audit_entries(&AuditSearchQuery::new()).unwrap();
    assert_eq!(
        entries[0].record,
        Record::new()
            .with("id", story.id)
            .with("title", "Fields")
    );
}
