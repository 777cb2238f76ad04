#![allow(dead_code)]

use repokit_core::{BaseEntity, Client, Context, Executor, Hooks, Repository};
use std::sync::Arc;

pub const CATS_SCHEMA: &str = "CREATE TABLE cats (
    id TEXT PRIMARY KEY,
    created_at TIMESTAMP NOT NULL,
    updated_at TIMESTAMP NOT NULL,
    deleted_at TIMESTAMP NULL,
    name TEXT NOT NULL,
    age INTEGER NOT NULL DEFAULT 0,
    owner TEXT NULL
)";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cat {
    pub base: BaseEntity,
    pub name: String,
    pub age: i64,
    pub owner: Option<String>,
}

impl Hooks for Cat {}

repokit_core::entity!(Cat {
    base: base,
    columns: { name => "name", age => "age", owner => "owner" },
});

pub fn cat(name: &str, age: i64) -> Cat {
    Cat {
        name: name.to_string(),
        age,
        ..Cat::default()
    }
}

pub fn setup() -> (Client, Arc<Repository<Cat>>, Context) {
    let client = Client::open_in_memory().unwrap();
    let ctx = Context::background();
    client.execute(&ctx, CATS_SCHEMA, &[]).unwrap();
    let repo = Repository::<Cat>::new(client.clone()).unwrap();
    (client, repo, ctx)
}
