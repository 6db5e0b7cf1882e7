//! Factory definition, default resolution, sequences, traits, and
//! inheritance.

mod common;

use rowforge::{attrs, FactoryError, Value};

#[test]
fn creates_records_from_defined_defaults() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .set("last_name", "Doe")
                .sequence("email", |n| Value::from(format!("user{n}@x.org")));
        })
        .unwrap();

    let one = factories.create("user", &[], attrs! {}).unwrap();
    let two = factories.create("user", &[], attrs! {}).unwrap();

    assert_eq!(one.get("first_name").and_then(Value::as_str), Some("Jane"));
    assert_eq!(one.get("email").and_then(Value::as_str), Some("user1@x.org"));
    assert_eq!(two.get("email").and_then(Value::as_str), Some("user2@x.org"));
    assert_eq!(two.get("first_name").and_then(Value::as_str), Some("Jane"));
    assert_eq!(one.get("id").and_then(Value::as_int), Some(1));
    assert_eq!(two.get("id").and_then(Value::as_int), Some(2));
}

#[test]
fn overrides_win_and_are_never_rederived() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane").sequence("email", |n| {
                Value::from(format!("user{n}@x.org"))
            });
        })
        .unwrap();

    let user = factories
        .create("user", &[], attrs! { "email" => "fixed@x.org" })
        .unwrap();
    assert_eq!(user.get("email").and_then(Value::as_str), Some("fixed@x.org"));

    // The skipped sequence draw does not advance the counter.
    let next = factories.create("user", &[], attrs! {}).unwrap();
    assert_eq!(next.get("email").and_then(Value::as_str), Some("user1@x.org"));
}

#[test]
fn computed_attributes_resolve_in_dependency_order() {
    let store = common::store();
    let factories = common::factories(&store);

    // `email` is declared before the attributes it depends on.
    factories
        .define("user", |f| {
            f.computed("email", &["first_name", "last_name"], |deps| {
                let first = deps[0].as_str().unwrap_or_default().to_lowercase();
                let last = deps[1].as_str().unwrap_or_default().to_lowercase();
                Value::from(format!("{first}.{last}@x.org"))
            })
            .set("first_name", "Jane")
            .set("last_name", "Doe");
        })
        .unwrap();

    let user = factories.build_struct("user", &[], attrs! {}).unwrap();
    assert_eq!(
        user.get("email").and_then(Value::as_str),
        Some("jane.doe@x.org")
    );
}

#[test]
fn computed_attributes_see_overridden_dependencies() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .computed("email", &["first_name"], |deps| {
                    let first = deps[0].as_str().unwrap_or_default().to_lowercase();
                    Value::from(format!("{first}@x.org"))
                });
        })
        .unwrap();

    let user = factories
        .build_struct("user", &[], attrs! { "first_name" => "Joe" })
        .unwrap();
    assert_eq!(user.get("first_name").and_then(Value::as_str), Some("Joe"));
    assert_eq!(user.get("email").and_then(Value::as_str), Some("joe@x.org"));
}

#[test]
fn sequence_blocks_can_use_dependencies() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("last_name", "Doe")
                .sequence_with("email", &["last_name"], |n, deps| {
                    let last = deps[0].as_str().unwrap_or_default().to_lowercase();
                    Value::from(format!("{last}{n}@x.org"))
                });
        })
        .unwrap();

    let user = factories.build_struct("user", &[], attrs! {}).unwrap();
    assert_eq!(user.get("email").and_then(Value::as_str), Some("doe1@x.org"));
}

#[test]
fn tuple_resolves_defaults_without_constructing() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane");
        })
        .unwrap();

    let tuple = factories
        .tuple("user", &[], &attrs! { "last_name" => "Smith" })
        .unwrap();
    assert_eq!(tuple.get("first_name").and_then(Value::as_str), Some("Jane"));
    assert_eq!(tuple.get("last_name").and_then(Value::as_str), Some("Smith"));
    assert_eq!(store.insert_count(), 0);
}

#[test]
fn traits_overlay_base_defaults() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .set("admin", false)
                .trait_def("admin", &[], |t| {
                    t.set("admin", true);
                });
        })
        .unwrap();

    let plain = factories.build_struct("user", &[], attrs! {}).unwrap();
    assert_eq!(plain.get("admin").and_then(Value::as_bool), Some(false));

    let admin = factories
        .build_struct("user", &["admin".into()], attrs! {})
        .unwrap();
    assert_eq!(admin.get("admin").and_then(Value::as_bool), Some(true));
    assert_eq!(admin.get("first_name").and_then(Value::as_str), Some("Jane"));
}

#[test]
fn independent_traits_compose_and_conflicts_take_the_later() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "X")
                .trait_def("jane", &[], |t| {
                    t.set("email", "jane@x.org").set("first_name", "Jane");
                })
                .trait_def("doe", &[], |t| {
                    t.set("last_name", "Doe");
                })
                .trait_def("john", &[], |t| {
                    t.set("first_name", "John");
                });
        })
        .unwrap();

    let both = factories
        .build_struct("user", &["jane".into(), "doe".into()], attrs! {})
        .unwrap();
    assert_eq!(both.get("email").and_then(Value::as_str), Some("jane@x.org"));
    assert_eq!(both.get("last_name").and_then(Value::as_str), Some("Doe"));

    let later_wins = factories
        .build_struct("user", &["jane".into(), "john".into()], attrs! {})
        .unwrap();
    assert_eq!(
        later_wins.get("first_name").and_then(Value::as_str),
        Some("John")
    );
}

#[test]
fn trait_parents_seed_the_child_trait() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.trait_def("named", &[], |t| {
                t.set("first_name", "Jane").set("last_name", "Doe");
            })
            .trait_def("jane_doe", &["named"], |t| {
                t.set("email", "jane@doe.org");
            });
        })
        .unwrap();

    let user = factories
        .build_struct("user", &["jane_doe".into()], attrs! {})
        .unwrap();
    assert_eq!(user.get("first_name").and_then(Value::as_str), Some("Jane"));
    assert_eq!(user.get("email").and_then(Value::as_str), Some("jane@doe.org"));
}

#[test]
fn inheritance_extends_the_parent_builder() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane")
                .set("admin", false)
                .sequence("email", |n| Value::from(format!("user{n}@x.org")));
        })
        .unwrap();
    factories
        .define_from("admin", "user", |f| {
            f.set("admin", true);
        })
        .unwrap();

    let user = factories.create("user", &[], attrs! {}).unwrap();
    let admin = factories.create("admin", &[], attrs! {}).unwrap();

    assert_eq!(admin.get("first_name").and_then(Value::as_str), Some("Jane"));
    assert_eq!(admin.get("admin").and_then(Value::as_bool), Some(true));
    assert_eq!(user.get("admin").and_then(Value::as_bool), Some(false));
    // Both builders target the same relation, so they share counters.
    assert_eq!(user.get("email").and_then(Value::as_str), Some("user1@x.org"));
    assert_eq!(admin.get("email").and_then(Value::as_str), Some("user2@x.org"));
}

#[test]
fn timestamps_fill_both_columns() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane").timestamps();
        })
        .unwrap();

    let user = factories.build_struct("user", &[], attrs! {}).unwrap();
    assert!(user.get("created_at").and_then(Value::as_timestamp).is_some());
    assert!(user.get("updated_at").and_then(Value::as_timestamp).is_some());
}

#[cfg(feature = "fake-values")]
#[test]
fn fake_values_resolve_per_build() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.fake("email", "internet", "email")
                .fake("first_name", "name", "first_name");
        })
        .unwrap();

    let user = factories.build_struct("user", &[], attrs! {}).unwrap();
    assert!(user
        .get("email")
        .and_then(Value::as_str)
        .is_some_and(|s| s.contains('@')));
    assert!(user
        .get("first_name")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty()));
}

#[cfg(feature = "fake-values")]
#[test]
fn unsupported_fake_kinds_fail_at_definition() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories
        .define("user", |f| {
            f.fake("email", "weather", "forecast");
        })
        .unwrap_err();
    assert!(matches!(err, FactoryError::UnknownFakeKind { .. }));
}

#[test]
fn reset_restarts_sequences() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.sequence("email", |n| Value::from(format!("user{n}@x.org")));
        })
        .unwrap();

    let first = factories.tuple("user", &[], &attrs! {}).unwrap();
    assert_eq!(first.get("email").and_then(Value::as_str), Some("user1@x.org"));

    factories.reset_sequences();
    let again = factories.tuple("user", &[], &attrs! {}).unwrap();
    assert_eq!(again.get("email").and_then(Value::as_str), Some("user1@x.org"));
}

#[test]
fn duplicate_definitions_are_rejected() {
    let store = common::store();
    let factories = common::factories(&store);

    factories.define("user", |_| {}).unwrap();
    let err = factories.define("user", |_| {}).unwrap_err();
    assert!(matches!(err, FactoryError::AlreadyDefined(name) if name == "user"));
}

#[test]
fn unknown_factory_lookups_fail_fast() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories.create("ghost", &[], attrs! {}).unwrap_err();
    assert!(matches!(err, FactoryError::FactoryNotDefined(name) if name == "ghost"));

    let err = factories
        .structs()
        .create("ghost", &[], attrs! {})
        .unwrap_err();
    assert!(matches!(err, FactoryError::FactoryNotDefined(_)));
}

#[test]
fn unknown_relation_fails_at_definition() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories.define("widget", |_| {}).unwrap_err();
    assert!(matches!(err, FactoryError::RelationNotDefined(name) if name == "widgets"));
}

#[test]
fn dsl_rejects_names_outside_the_schema() {
    let store = common::store();
    let factories = common::factories(&store);

    let err = factories
        .define("user", |f| {
            f.set("middle_name", "Q");
        })
        .unwrap_err();
    assert!(matches!(err, FactoryError::UnknownAttributes(names) if names == ["middle_name"]));
}

#[test]
fn unknown_override_keys_are_named_exactly() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.set("first_name", "Jane");
        })
        .unwrap();

    let err = factories
        .create("user", &[], attrs! { "middle_name" => "Q" })
        .unwrap_err();
    assert!(matches!(err, FactoryError::UnknownAttributes(names) if names == ["middle_name"]));
}

#[test]
fn dependency_cycles_are_fatal() {
    let store = common::store();
    let factories = common::factories(&store);

    factories
        .define("user", |f| {
            f.computed("first_name", &["last_name"], |_| Value::Null)
                .computed("last_name", &["first_name"], |_| Value::Null);
        })
        .unwrap();

    let err = factories.tuple("user", &[], &attrs! {}).unwrap_err();
    assert!(matches!(err, FactoryError::DependencyCycle { .. }));
}
