mod common;

use common::{cat, setup, Cat};
use repokit_core::{EntityStore, Executor, Query, RepoError, Value};
use std::thread::sleep;
use std::time::Duration;

fn seed(repo: &repokit_core::Repository<Cat>, ctx: &repokit_core::Context) -> Vec<Cat> {
    let mut cats = Vec::new();
    for (name, age) in [("Ada", 1), ("Bob", 2), ("Cid", 2)] {
        let mut entity = cat(name, age);
        repo.create(ctx, &mut entity).unwrap();
        cats.push(entity);
    }
    cats
}

#[test]
fn update_where_skips_soft_deleted_rows_and_bumps_updated_at() {
    let (_client, repo, ctx) = setup();
    let mut cats = seed(&repo, &ctx);
    repo.delete(&ctx, &mut cats[0]).unwrap();
    sleep(Duration::from_millis(5));

    // Widening visibility does not reach deleted rows on bulk writes.
    let affected = repo
        .update_where(
            &ctx,
            &[("owner", Value::Text("Ann".to_string()))],
            Query::new().with_deleted(),
        )
        .unwrap();
    assert_eq!(affected, 2);

    let all = repo
        .find_all(&ctx, Query::new().with_deleted().order_by("name", "ASC"))
        .unwrap();
    assert_eq!(all[0].owner, None);
    assert_eq!(all[0].base.updated_at, cats[0].base.updated_at);
    for (stored, original) in all.iter().zip(&cats).skip(1) {
        assert_eq!(stored.owner.as_deref(), Some("Ann"));
        assert!(stored.base.updated_at > original.base.updated_at);
    }
}

#[test]
fn delete_where_soft_deletes_matching_live_rows() {
    let (_client, repo, ctx) = setup();
    seed(&repo, &ctx);

    let affected = repo
        .delete_where(&ctx, Query::new().where_eq("age", 2))
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        repo.delete_where(&ctx, Query::new().where_eq("age", 2))
            .unwrap(),
        0
    );

    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 1);
    let deleted = repo.find_all(&ctx, Query::new().only_deleted()).unwrap();
    assert_eq!(deleted.len(), 2);
    assert!(deleted.iter().all(|c| c.base.deleted_at.is_some()));
}

#[test]
fn update_where_rejects_empty_and_base_column_updates() {
    let (_client, repo, ctx) = setup();
    seed(&repo, &ctx);

    assert!(matches!(
        repo.update_where(&ctx, &[], Query::new()),
        Err(RepoError::InvalidModel(_))
    ));
    assert!(matches!(
        repo.update_where(&ctx, &[("deleted_at", Value::Null)], Query::new()),
        Err(RepoError::InvalidModel(_))
    ));
    assert!(matches!(
        repo.update_where(&ctx, &[("age = 0; --", Value::Null)], Query::new()),
        Err(RepoError::InvalidModel(_))
    ));
}

#[test]
fn failed_transaction_leaves_nothing_behind() {
    let (_client, repo, ctx) = setup();

    let err = repo
        .transaction(&ctx, |tx| {
            tx.create(&ctx, &mut cat("Ada", 1))?;
            tx.create(&ctx, &mut cat("Bob", 2))?;
            assert_eq!(tx.count(&ctx, Query::new())?, 2);
            Err::<(), _>(RepoError::InvalidModel("stop".to_string()))
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::InvalidModel(ref message) if message == "stop"));
    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 0);
}

#[test]
fn successful_transaction_commits_every_write() {
    let (_client, repo, ctx) = setup();

    let ids = repo
        .transaction(&ctx, |tx| {
            let mut ada = cat("Ada", 1);
            let mut bob = cat("Bob", 2);
            tx.create(&ctx, &mut ada)?;
            tx.create(&ctx, &mut bob)?;
            tx.delete(&ctx, &mut bob)?;
            Ok(vec![ada.base.id, bob.base.id])
        })
        .unwrap();

    assert!(repo.exists(&ctx, &ids[0]).unwrap());
    assert!(!repo.exists(&ctx, &ids[1]).unwrap());
    assert_eq!(
        repo.count(&ctx, Query::new().with_deleted()).unwrap(),
        2
    );
}

#[test]
fn duplicate_inside_transaction_rolls_back_earlier_writes() {
    let (_client, repo, ctx) = setup();

    let err = repo
        .transaction(&ctx, |tx| {
            let mut ada = cat("Ada", 1);
            tx.create(&ctx, &mut ada)?;
            let mut twin = cat("Ada again", 1);
            twin.base.id = ada.base.id.clone();
            tx.create(&ctx, &mut twin)
        })
        .unwrap_err();

    assert!(matches!(err, RepoError::DuplicateKey { .. }));
    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 0);
}

#[test]
fn caller_managed_transaction_via_with_tx() {
    let (client, repo, ctx) = setup();

    let tx = client.begin(&ctx).unwrap();
    {
        let scoped = repo.with_tx(&tx);
        scoped.create(&ctx, &mut cat("Ada", 1)).unwrap();
        scoped
            .tx()
            .execute(
                &ctx,
                "UPDATE cats SET owner = ? WHERE name = ?",
                &[Value::Text("Ann".to_string()), Value::Text("Ada".to_string())],
            )
            .unwrap();
        assert_eq!(
            scoped
                .find_one(&ctx, Query::new())
                .unwrap()
                .owner
                .as_deref(),
            Some("Ann")
        );
    }
    tx.rollback().unwrap();

    assert_eq!(repo.count(&ctx, Query::new()).unwrap(), 0);
}
