mod common;

use common::{cat, setup, Cat, CATS_SCHEMA};
use repokit_core::{
    BaseEntity, Client, ClientConfig, Context, DbError, EntityStore, Executor, HookResult, Hooks,
    Query, RepoError, Repository,
};
use std::thread::sleep;
use std::time::Duration;

#[test]
fn create_then_find_round_trips_mapped_columns() {
    let (_client, repo, ctx) = setup();
    let mut whiskers = cat("Whiskers", 3);
    whiskers.owner = Some("Ann".to_string());

    repo.create(&ctx, &mut whiskers).unwrap();
    assert_eq!(whiskers.base.id.len(), 36);
    assert_eq!(whiskers.base.created_at, whiskers.base.updated_at);

    let loaded = repo.find_by_id(&ctx, &whiskers.base.id).unwrap();
    assert_eq!(loaded, whiskers);
}

#[test]
fn update_moves_updated_at_forward_and_keeps_created_at() {
    let (_client, repo, ctx) = setup();
    let mut whiskers = cat("Whiskers", 3);
    repo.create(&ctx, &mut whiskers).unwrap();
    let created_at = whiskers.base.created_at;

    sleep(Duration::from_millis(10));
    whiskers.name = "Updated".to_string();
    repo.update(&ctx, &mut whiskers).unwrap();

    assert!(whiskers.base.updated_at > created_at);
    assert_eq!(whiskers.base.created_at, created_at);

    let loaded = repo.find_by_id(&ctx, &whiskers.base.id).unwrap();
    assert_eq!(loaded.name, "Updated");
    assert_eq!(loaded.base.created_at, created_at);
    assert_eq!(loaded.base.updated_at, whiskers.base.updated_at);
}

#[test]
fn create_keeps_a_caller_supplied_id() {
    let (_client, repo, ctx) = setup();
    let mut tom = cat("Tom", 5);
    tom.base.id = "cat-tom".to_string();

    repo.create(&ctx, &mut tom).unwrap();
    assert_eq!(tom.base.id, "cat-tom");
    assert!(repo.exists(&ctx, "cat-tom").unwrap());
}

#[test]
fn duplicate_id_is_reported_and_base_fields_are_restored() {
    let (_client, repo, ctx) = setup();
    let mut first = cat("Tom", 5);
    repo.create(&ctx, &mut first).unwrap();

    let mut second = cat("Jerry", 1);
    second.base.id = first.base.id.clone();
    let before = second.base.clone();

    let err = repo.create(&ctx, &mut second).unwrap_err();
    assert!(matches!(err, RepoError::DuplicateKey { op: "create", .. }));
    assert_eq!(second.base, before);
}

#[test]
fn save_dispatches_on_persisted_state() {
    let (_client, repo, ctx) = setup();
    let mut felix = cat("Felix", 2);

    repo.save(&ctx, &mut felix).unwrap();
    assert!(felix.base.is_persisted());

    felix.age = 4;
    repo.save(&ctx, &mut felix).unwrap();
    assert_eq!(repo.find_by_id(&ctx, &felix.base.id).unwrap().age, 4);
    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 1);
}

#[test]
fn writes_on_new_entities_fail_with_not_persisted() {
    let (_client, repo, ctx) = setup();
    let mut fresh = cat("Nobody", 1);

    assert!(matches!(
        repo.update(&ctx, &mut fresh),
        Err(RepoError::NotPersisted { op: "update" })
    ));
    assert!(matches!(
        repo.delete(&ctx, &mut fresh),
        Err(RepoError::NotPersisted { op: "delete" })
    ));
    assert!(matches!(
        repo.hard_delete(&ctx, &mut fresh),
        Err(RepoError::NotPersisted { .. })
    ));
    assert!(matches!(
        repo.restore(&ctx, &mut fresh),
        Err(RepoError::NotPersisted { .. })
    ));
    assert!(matches!(
        repo.touch(&ctx, &mut fresh),
        Err(RepoError::NotPersisted { op: "touch" })
    ));
    assert!(fresh.base.is_new());
}

#[test]
fn soft_delete_hides_rows_until_hard_delete_removes_them() {
    let (_client, repo, ctx) = setup();
    let mut felix = cat("Felix", 2);
    repo.create(&ctx, &mut felix).unwrap();

    repo.delete(&ctx, &mut felix).unwrap();
    assert!(felix.base.is_deleted());
    assert!(repo.find_by_id(&ctx, &felix.base.id).unwrap_err().is_not_found());
    assert!(!repo.exists(&ctx, &felix.base.id).unwrap());

    let all = repo.find_all(&ctx, Query::new().with_deleted()).unwrap();
    assert_eq!(all.len(), 1);
    let deleted = repo.find_all(&ctx, Query::new().only_deleted()).unwrap();
    assert_eq!(deleted[0].base.id, felix.base.id);

    // A second soft delete finds no live row.
    assert!(repo.delete(&ctx, &mut felix).unwrap_err().is_not_found());
    // Updates are scoped to live rows as well.
    assert!(repo.update(&ctx, &mut felix).unwrap_err().is_not_found());

    repo.hard_delete(&ctx, &mut felix).unwrap();
    assert!(repo
        .find_all(&ctx, Query::new().with_deleted())
        .unwrap()
        .is_empty());
    assert!(repo.hard_delete(&ctx, &mut felix).unwrap_err().is_not_found());
}

#[test]
fn restore_only_applies_to_deleted_rows() {
    let (_client, repo, ctx) = setup();
    let mut felix = cat("Felix", 2);
    repo.create(&ctx, &mut felix).unwrap();

    assert!(repo.restore(&ctx, &mut felix).unwrap_err().is_not_found());

    repo.delete(&ctx, &mut felix).unwrap();
    sleep(Duration::from_millis(5));
    repo.restore(&ctx, &mut felix).unwrap();

    assert!(!felix.base.is_deleted());
    assert!(felix.base.updated_at > felix.base.created_at);
    let loaded = repo.find_by_id(&ctx, &felix.base.id).unwrap();
    assert_eq!(loaded.base.deleted_at, None);
    assert_eq!(loaded.base.updated_at, felix.base.updated_at);
}

#[test]
fn lookups_cover_ids_ordering_paging_and_counts() {
    let (_client, repo, ctx) = setup();
    let mut cats = Vec::new();
    for (idx, name) in ["Ada", "Bob", "Cid", "Dot", "Eve"].into_iter().enumerate() {
        let mut entity = cat(name, idx as i64 + 1);
        repo.create(&ctx, &mut entity).unwrap();
        cats.push(entity);
    }

    let ids = [cats[0].base.id.as_str(), cats[2].base.id.as_str(), "missing"];
    let mut found = repo.find_by_ids(&ctx, &ids).unwrap();
    found.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(
        found.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Ada", "Cid"]
    );
    assert!(repo.find_by_ids(&ctx, &[]).unwrap().is_empty());

    assert_eq!(repo.first(&ctx, Query::new()).unwrap().name, "Ada");
    assert_eq!(repo.last(&ctx, Query::new()).unwrap().name, "Eve");
    assert_eq!(
        repo.find_one(&ctx, Query::new().where_eq("age", 4))
            .unwrap()
            .name,
        "Dot"
    );
    assert!(repo
        .find_one(&ctx, Query::new().where_eq("age", 40))
        .unwrap_err()
        .is_not_found());

    let page = repo
        .find_page(&ctx, Query::new().order_by("age", "asc"), 2, 2)
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    assert_eq!(
        page.items.iter().map(|c| c.age).collect::<Vec<_>>(),
        vec![3, 4]
    );

    let clamped = repo.find_page(&ctx, Query::new(), 0, 0).unwrap();
    assert_eq!((clamped.page, clamped.per_page), (1, 10));
    assert_eq!(clamped.items.len(), 5);

    let far = repo.find_page(&ctx, Query::new(), i64::MAX, i64::MAX).unwrap();
    assert!(far.items.is_empty());
    assert_eq!((far.total, far.total_pages), (5, 1));

    assert_eq!(
        repo.count(&ctx, Query::new().where_between("age", 2, 4))
            .unwrap(),
        3
    );
    assert!(repo
        .exists_where(&ctx, Query::new().where_like("name", "E%"))
        .unwrap());
    assert!(!repo
        .exists_where(&ctx, Query::new().where_null("name"))
        .unwrap());
}

#[test]
fn joins_and_groups_run_against_sqlite() {
    let (client, repo, ctx) = setup();
    client
        .execute(
            &ctx,
            "CREATE TABLE owners (name TEXT PRIMARY KEY, city TEXT NOT NULL)",
            &[],
        )
        .unwrap();
    client
        .execute(
            &ctx,
            "INSERT INTO owners (name, city) VALUES ('Ann', 'Oslo'), ('Ben', 'Rome')",
            &[],
        )
        .unwrap();

    for (name, owner) in [("Ada", "Ann"), ("Bob", "Ann"), ("Cid", "Ben")] {
        let mut entity = cat(name, 1);
        entity.owner = Some(owner.to_string());
        repo.create(&ctx, &mut entity).unwrap();
    }

    let in_oslo = repo
        .find_all(
            &ctx,
            Query::new()
                .join("JOIN owners ON owners.name = cats.owner")
                .where_eq("owners.city", "Oslo")
                .order_by("cats.name", "ASC"),
        )
        .unwrap();
    assert_eq!(
        in_oslo.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Ada", "Bob"]
    );

    let owners = repo
        .count(&ctx, Query::new().group_by(["owner"]))
        .unwrap();
    assert_eq!(owners, 2);
}

#[derive(Debug, Default)]
struct Dog {
    base: BaseEntity,
    name: String,
    trace: Vec<&'static str>,
    fail_on: Option<&'static str>,
}

impl Dog {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    fn step(&mut self, hook: &'static str) -> HookResult {
        self.trace.push(hook);
        if self.fail_on == Some(hook) {
            return Err(format!("{hook} refused").into());
        }
        Ok(())
    }
}

impl Hooks for Dog {
    fn validate(&self, _ctx: &Context) -> HookResult {
        if self.name.is_empty() {
            return Err("name is required".into());
        }
        Ok(())
    }

    fn before_save(&mut self, _ctx: &Context) -> HookResult {
        self.step("before_save")
    }

    fn after_save(&mut self, _ctx: &Context) -> HookResult {
        self.step("after_save")
    }

    fn before_create(&mut self, _ctx: &Context) -> HookResult {
        self.step("before_create")
    }

    fn after_create(&mut self, _ctx: &Context) -> HookResult {
        self.step("after_create")
    }

    fn before_update(&mut self, _ctx: &Context) -> HookResult {
        self.step("before_update")
    }

    fn after_update(&mut self, _ctx: &Context) -> HookResult {
        self.step("after_update")
    }

    fn before_delete(&mut self, _ctx: &Context) -> HookResult {
        self.step("before_delete")
    }

    fn after_delete(&mut self, _ctx: &Context) -> HookResult {
        self.step("after_delete")
    }

    fn after_find(&mut self, _ctx: &Context) -> HookResult {
        self.step("after_find")
    }
}

repokit_core::entity!(Dog {
    table: "dogs",
    base: base,
    columns: { name => "name" },
});

fn dog_repo() -> (std::sync::Arc<Repository<Dog>>, Context) {
    let client = Client::open_in_memory().unwrap();
    let ctx = Context::background();
    client
        .execute(
            &ctx,
            "CREATE TABLE dogs (id TEXT PRIMARY KEY, created_at TIMESTAMP NOT NULL, \
             updated_at TIMESTAMP NOT NULL, deleted_at TIMESTAMP NULL, name TEXT NOT NULL)",
            &[],
        )
        .unwrap();
    (Repository::<Dog>::new(client).unwrap(), ctx)
}

#[test]
fn hooks_run_in_lifecycle_order() {
    let (repo, ctx) = dog_repo();
    let mut rex = Dog::named("Rex");

    repo.create(&ctx, &mut rex).unwrap();
    assert_eq!(
        rex.trace,
        vec!["before_save", "before_create", "after_create", "after_save"]
    );

    rex.trace.clear();
    repo.update(&ctx, &mut rex).unwrap();
    assert_eq!(
        rex.trace,
        vec!["before_save", "before_update", "after_update", "after_save"]
    );

    rex.trace.clear();
    repo.delete(&ctx, &mut rex).unwrap();
    assert_eq!(rex.trace, vec!["before_delete", "after_delete"]);

    repo.restore(&ctx, &mut rex).unwrap();
    let found = repo.find_by_id(&ctx, &rex.base.id).unwrap();
    assert_eq!(found.trace, vec!["after_find"]);
}

#[test]
fn failing_hook_aborts_the_write() {
    let (repo, ctx) = dog_repo();

    let mut nameless = Dog::named("");
    assert!(matches!(
        repo.create(&ctx, &mut nameless),
        Err(RepoError::Hook(_))
    ));
    assert!(nameless.trace.is_empty());

    let mut stubborn = Dog::named("Rex");
    stubborn.fail_on = Some("before_create");
    let err = repo.create(&ctx, &mut stubborn).unwrap_err();
    assert_eq!(err.to_string(), "before_create refused");
    assert!(stubborn.base.is_new());
    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 0);

    // after_* hooks run once the row is written; the row stays.
    let mut late = Dog::named("Late");
    late.fail_on = Some("after_create");
    assert!(repo.create(&ctx, &mut late).is_err());
    assert_eq!(late.trace, vec!["before_save", "before_create", "after_create"]);
    assert!(repo.exists(&ctx, &late.base.id).unwrap());
}

#[test]
fn update_on_missing_row_keeps_previous_timestamp() {
    let (_client, repo, ctx) = setup();
    let mut ghost = cat("Ghost", 9);
    ghost.base.id = "never-stored".to_string();
    let before = ghost.base.updated_at;

    assert!(repo.update(&ctx, &mut ghost).unwrap_err().is_not_found());
    assert_eq!(ghost.base.updated_at, before);
}

#[derive(Debug, Default)]
struct Broken {
    base: BaseEntity,
    stamp: String,
}

impl Hooks for Broken {}

repokit_core::entity!(Broken {
    base: base,
    columns: { stamp => "updated_at" },
});

#[test]
fn mapping_that_shadows_base_columns_is_invalid() {
    let client = Client::open_in_memory().unwrap();
    let err = Repository::<Broken>::new(client).unwrap_err();
    assert!(matches!(err, RepoError::InvalidModel(_)));
}

#[test]
fn unconnected_client_reports_not_initialized() {
    let client = Client::new(ClientConfig::in_memory()).unwrap();
    let repo = Repository::<Cat>::new(client).unwrap();

    let err = repo
        .find_by_id(&Context::background(), "anything")
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db {
            source: DbError::NotInitialized,
            ..
        }
    ));
}

#[test]
fn cancelled_context_stops_operations() {
    let (_client, repo, _ctx) = setup();
    let ctx = Context::background().with_timeout(Duration::from_secs(30));
    ctx.cancel();

    let mut felix = cat("Felix", 2);
    let err = repo.create(&ctx, &mut felix).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Db {
            source: DbError::Cancelled,
            ..
        }
    ));
    assert!(felix.base.is_new());
}

#[test]
fn file_backed_repository_shares_rows_across_pooled_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cats.db");
    let ctx = Context::background();
    let client = Client::open(ClientConfig::sqlite(path.to_string_lossy()), &ctx).unwrap();
    client.execute(&ctx, CATS_SCHEMA, &[]).unwrap();

    let repo = Repository::<Cat>::new(client.clone()).unwrap();
    let mut felix = cat("Felix", 2);
    repo.create(&ctx, &mut felix).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let repo = std::sync::Arc::clone(&repo);
            let id = felix.base.id.clone();
            std::thread::spawn(move || {
                repo.find_by_id(&Context::background(), &id)
                    .unwrap()
                    .name
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "Felix");
    }
    client.close();
}
