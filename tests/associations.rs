//! Association resolution: belongs-to, has-many, has-one, and through
//! associations, in both persisted and in-memory modes.

mod common;

use rowforge::{attrs, AssocOpts, FactoryError, TraitRef, Value};

#[test]
fn belongs_to_persists_the_parent_and_wires_the_key() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane");
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.sequence("title", |n| Value::from(format!("Task {n}")))
                .association("user", AssocOpts::new());
        })
        .unwrap();

    let task = factories.create("task", &[], attrs! {}).unwrap();

    let users = store.rows("users");
    assert_eq!(users.len(), 1);
    let user_id = users[0].get("id").cloned().unwrap();
    assert_eq!(task.get("user_id"), Some(&user_id));

    let nested = task.get("user").and_then(Value::as_record).unwrap();
    assert_eq!(nested.get("first_name").and_then(Value::as_str), Some("Jane"));
    // The parent's inverse has-many is suppressed: exactly one task exists.
    assert_eq!(store.rows("tasks").len(), 1);
}

#[test]
fn belongs_to_reuses_a_caller_supplied_record() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane");
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.set("title", "fix the roof")
                .association("user", AssocOpts::new());
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();
    let task = factories
        .create("task", &[], attrs! { "user" => user.clone() })
        .unwrap();

    assert_eq!(store.rows("users").len(), 1);
    assert_eq!(task.get("user_id"), user.get("id"));
}

#[test]
fn a_null_override_skips_the_association_entirely() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane");
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.set("title", "untended")
                .association("user", AssocOpts::new());
        })
        .unwrap();

    let task = factories
        .create("task", &[], attrs! { "user" => Value::Null })
        .unwrap();

    assert_eq!(store.rows("users").len(), 0);
    assert_eq!(task.get("user_id"), Some(&Value::Null));
}

#[test]
fn has_many_creates_count_children_with_the_parent_key() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("tasks", AssocOpts::new().count(2));
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.sequence("title", |n| Value::from(format!("Task {n}")));
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    let rows = store.rows("tasks");
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.get("user_id"), user.get("id"));
    }

    let children = user.get("tasks").and_then(Value::as_records).unwrap();
    assert_eq!(children.len(), 2);
    let titles: Vec<_> = children
        .iter()
        .filter_map(|c| c.get("title").and_then(Value::as_str))
        .collect();
    assert_eq!(titles, ["Task 1", "Task 2"]);
}

#[test]
fn has_many_from_a_trait_is_resolved_once() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane").trait_def("with_tasks", &[], |t| {
                t.association("tasks", AssocOpts::new());
            });
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.set("title", "traited");
        })
        .unwrap();

    let plain = factories.create("user", &[], attrs! {}).unwrap();
    assert!(plain.get("tasks").is_none());
    assert_eq!(store.rows("tasks").len(), 0);

    let with_tasks = factories
        .create("user", &["with_tasks".into()], attrs! {})
        .unwrap();
    assert_eq!(store.rows("tasks").len(), 1);
    let children = with_tasks.get("tasks").and_then(Value::as_records).unwrap();
    assert_eq!(children.len(), 1);
}

#[test]
fn an_excluded_association_is_not_resolved() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("tasks", AssocOpts::new().count(2));
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.set("title", "never");
        })
        .unwrap();

    factories
        .create("user", &[TraitRef::exclude("tasks")], attrs! {})
        .unwrap();
    assert_eq!(store.rows("tasks").len(), 0);
}

#[test]
fn association_traits_apply_to_every_child() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("tasks", AssocOpts::new().count(2).traits(&["urgent"]));
        })
        .unwrap();
    factories
        .define("task", |f| {
            f.set("title", "routine").trait_def("urgent", &[], |t| {
                t.set("title", "URGENT");
            });
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();
    let children = user.get("tasks").and_then(Value::as_records).unwrap();
    for child in children {
        assert_eq!(child.get("title").and_then(Value::as_str), Some("URGENT"));
    }
}

#[test]
fn has_one_creates_a_single_child() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("address", AssocOpts::new());
        })
        .unwrap();
    factories
        .define_for("address", "addresses", |f| {
            f.set("city", "Warsaw");
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    let rows = store.rows("addresses");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("user_id"), user.get("id"));
    let address = user.get("address").and_then(Value::as_record).unwrap();
    assert_eq!(address.get("city").and_then(Value::as_str), Some("Warsaw"));
}

#[test]
fn has_one_with_count_zero_resolves_to_null_without_work() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("address", AssocOpts::new().count(0));
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    assert_eq!(store.rows("addresses").len(), 0);
    assert_eq!(user.get("address"), Some(&Value::Null));
    // Only the user row itself was written.
    assert_eq!(store.insert_count(), 1);
}

#[test]
fn count_above_one_on_a_to_one_association_is_a_definition_error() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories
        .define("user", |f| {
            f.association("address", AssocOpts::new().count(2));
        })
        .unwrap_err();
    assert!(matches!(
        err,
        FactoryError::InvalidCount { name, count: 2 } if name == "address"
    ));
}

#[test]
fn undeclared_association_names_are_definition_errors() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories
        .define("user", |f| {
            f.association("ghost", AssocOpts::new());
        })
        .unwrap_err();
    assert!(matches!(
        err,
        FactoryError::UnknownAssociation { name, .. } if name == "ghost"
    ));
}

#[test]
fn many_to_many_falls_back_to_the_store_join_persist() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("teams", AssocOpts::new().count(2));
        })
        .unwrap();
    factories
        .define("team", |f| {
            f.sequence("name", |n| Value::from(format!("Team {n}")));
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    let joins = store.rows("memberships");
    assert_eq!(joins.len(), 2);
    for join in &joins {
        assert_eq!(join.get("user_id"), user.get("id"));
        assert!(join.get("team_id").is_some_and(|v| !v.is_null()));
    }
    let teams = user.get("teams").and_then(Value::as_records).unwrap();
    assert_eq!(teams.len(), 2);
}

#[test]
fn many_to_many_delegates_to_a_registered_join_factory() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("teams", AssocOpts::new().count(2));
        })
        .unwrap();
    factories
        .define("team", |f| {
            f.sequence("name", |n| Value::from(format!("Team {n}")));
        })
        .unwrap();
    factories
        .define_for("membership", "memberships", |f| {
            f.association("user", AssocOpts::new())
                .association("team", AssocOpts::new());
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    let joins = store.rows("memberships");
    assert_eq!(joins.len(), 2);
    for join in &joins {
        assert_eq!(join.get("user_id"), user.get("id"));
        assert!(join.get("team_id").is_some_and(|v| !v.is_null()));
    }
    // The join factory reused the two sides instead of constructing more.
    assert_eq!(store.rows("users").len(), 1);
    assert_eq!(store.rows("teams").len(), 2);
}

#[test]
fn has_one_through_resolves_to_a_single_record() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .association("primary_team", AssocOpts::new());
        })
        .unwrap();
    factories
        .define("team", |f| {
            f.set("name", "Core");
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();

    assert_eq!(store.rows("memberships").len(), 1);
    let team = user.get("primary_team").and_then(Value::as_record).unwrap();
    assert_eq!(team.get("name").and_then(Value::as_str), Some("Core"));
}
