//! Shared relation schema for the integration suites.

use std::sync::Arc;

use rowforge::{Factories, MemoryStore, ThroughMeta};

pub fn memberships_through() -> ThroughMeta {
    ThroughMeta {
        relation: "memberships".to_string(),
        factory: "membership".to_string(),
        source_attr: "user".to_string(),
        target_attr: "team".to_string(),
        source_foreign_key: "user_id".to_string(),
        target_foreign_key: "team_id".to_string(),
    }
}

pub fn store() -> MemoryStore {
    let store = MemoryStore::new();
    store.relation("users", |r| {
        r.primary_key("id")
            .attributes(&[
                "first_name",
                "last_name",
                "email",
                "age",
                "admin",
                "created_at",
                "updated_at",
            ])
            .has_many("tasks", "tasks", "user_id")
            .has_one("address", "addresses", "user_id")
            .many_to_many("teams", "teams", memberships_through())
            .has_one_through("primary_team", "teams", memberships_through());
    });
    store.relation("tasks", |r| {
        r.primary_key("id")
            .attributes(&["user_id", "title"])
            .belongs_to("user", "users", "user_id");
    });
    store.relation("addresses", |r| {
        r.primary_key("id")
            .attributes(&["user_id", "city"])
            .belongs_to("user", "users", "user_id");
    });
    store.relation("teams", |r| {
        r.primary_key("id").attributes(&["name"]);
    });
    store.relation("memberships", |r| {
        r.primary_key("id")
            .attributes(&["user_id", "team_id"])
            .belongs_to("user", "users", "user_id")
            .belongs_to("team", "teams", "team_id");
    });
    store
}

pub fn factories(store: &MemoryStore) -> Factories {
    Factories::new(Arc::new(store.clone()))
}
