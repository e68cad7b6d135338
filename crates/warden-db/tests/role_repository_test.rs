//! Integration tests for the Role repository.

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::role::{CreateRole, UpdateRole};
use warden_core::repository::{Pagination, RoleRepository};
use warden_db::SurrealRoleRepository;

async fn setup() -> SurrealRoleRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    SurrealRoleRepository::new(db)
}

fn role(name: &str) -> CreateRole {
    CreateRole {
        name: name.into(),
        description: format!("{name} role"),
        is_system: false,
    }
}

#[tokio::test]
async fn create_get_and_rename() {
    let repo = setup().await;
    let created = repo.create(role("AUDITOR")).await.unwrap();

    assert!(repo.exists_by_name("AUDITOR").await.unwrap());
    assert_eq!(repo.get_by_name("AUDITOR").await.unwrap().id, created.id);

    let renamed = repo
        .update(
            created.id,
            UpdateRole {
                name: Some("REVIEWER".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "REVIEWER");
    assert_eq!(renamed.description, "AUDITOR role");
    assert!(!repo.exists_by_name("AUDITOR").await.unwrap());
}

#[tokio::test]
async fn update_of_missing_role_is_not_found() {
    let repo = setup().await;
    let result = repo
        .update(
            Uuid::new_v4(),
            UpdateRole {
                name: Some("GHOST".into()),
                description: None,
            },
        )
        .await;
    assert!(matches!(result, Err(WardenError::NotFound { .. })));
}

#[tokio::test]
async fn get_many_skips_unknown_ids() {
    let repo = setup().await;
    let a = repo.create(role("A")).await.unwrap();
    let b = repo.create(role("B")).await.unwrap();

    let found = repo.get_many(&[a.id, Uuid::new_v4(), b.id]).await.unwrap();
    let mut names: Vec<_> = found.into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, ["A", "B"]);
    assert!(repo.get_many(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_many_reports_removed_count() {
    let repo = setup().await;
    let a = repo.create(role("A")).await.unwrap();
    let b = repo.create(role("B")).await.unwrap();
    let keep = repo.create(role("KEEP")).await.unwrap();

    let removed = repo.delete_many(&[a.id, b.id, Uuid::new_v4()]).await.unwrap();
    assert_eq!(removed, 2);

    let page = repo.list(Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, keep.id);
}

#[tokio::test]
async fn delete_missing_role_is_not_found() {
    let repo = setup().await;
    assert!(matches!(
        repo.delete(Uuid::new_v4()).await,
        Err(WardenError::NotFound { .. })
    ));
}
