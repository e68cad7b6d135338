//! Integration tests for the User repository using in-memory SurrealDB.

use chrono::{Duration, Utc};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::user::{CreateUser, UpdateUser, UserFilter, UserStatus};
use warden_core::repository::{LockingRead, Pagination, UserRepository};
use warden_db::SurrealUserRepository;

async fn setup() -> SurrealUserRepository<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_db::run_migrations(&db).await.unwrap();
    SurrealUserRepository::new(db)
}

fn new_user(name: &str, role_id: Uuid) -> CreateUser {
    CreateUser {
        email: format!("{name}@example.com"),
        username: name.into(),
        password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
        full_name: format!("{name} Example"),
        role_id,
        otp_code: "123456".into(),
        verification_token: "digest".into(),
    }
}

#[tokio::test]
async fn create_starts_pending_and_unverified() {
    let repo = setup().await;
    let role_id = Uuid::new_v4();

    let user = repo.create(new_user("alice", role_id)).await.unwrap();

    assert_eq!(user.status, UserStatus::Pending);
    assert!(!user.is_verified);
    assert_eq!(user.role_id, Some(role_id));
    assert_eq!(user.otp_code.as_deref(), Some("123456"));
    assert_eq!(user.otp_attempt_count, 0);
    assert!(user.otp_created_at.is_some());
    assert!(user.verification_token_created_at.is_some());
    assert!(user.deleted_at.is_none());

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.email, "alice@example.com");
}

#[tokio::test]
async fn lookup_by_email_and_username() {
    let repo = setup().await;
    let user = repo.create(new_user("bob", Uuid::new_v4())).await.unwrap();

    assert_eq!(repo.get_by_email("bob@example.com").await.unwrap().id, user.id);
    assert_eq!(repo.get_by_username("bob").await.unwrap().id, user.id);
    assert!(matches!(
        repo.get_by_email("nobody@example.com").await,
        Err(WardenError::NotFound { .. })
    ));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let repo = setup().await;
    repo.create(new_user("carol", Uuid::new_v4())).await.unwrap();

    let mut dup = new_user("carol2", Uuid::new_v4());
    dup.email = "carol@example.com".into();
    let err = repo.create(dup).await.unwrap_err();
    match err {
        WardenError::AlreadyExists { entity } => assert_eq!(entity, "user"),
        other => panic!("expected AlreadyExists, got {other:?}"),
    }
}

#[tokio::test]
async fn update_sets_and_clears_optional_columns() {
    let repo = setup().await;
    let user = repo.create(new_user("dave", Uuid::new_v4())).await.unwrap();
    let expiry = Utc::now() + Duration::hours(1);

    let updated = repo
        .update(
            user.id,
            UpdateUser {
                is_verified: Some(true),
                status: Some(UserStatus::Active),
                otp_code: Some(None),
                access_token: Some(Some("access-digest".into())),
                token_expiry: Some(Some(expiry)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(updated.is_verified);
    assert_eq!(updated.status, UserStatus::Active);
    assert!(updated.otp_code.is_none());
    assert_eq!(updated.access_token.as_deref(), Some("access-digest"));
    assert_eq!(updated.email, "dave@example.com");

    let cleared = repo.update(user.id, UpdateUser::clear_session()).await.unwrap();
    assert!(cleared.access_token.is_none());
    assert!(cleared.token_expiry.is_none());
    assert!(cleared.is_verified);
}

#[tokio::test]
async fn set_role_touches_only_the_role() {
    let repo = setup().await;
    let user = repo.create(new_user("erin", Uuid::new_v4())).await.unwrap();
    let new_role = Uuid::new_v4();

    repo.set_role(user.id, new_role).await.unwrap();

    let fetched = repo.get_by_id(user.id).await.unwrap();
    assert_eq!(fetched.role_id, Some(new_role));
    assert_eq!(fetched.otp_code, user.otp_code);
    assert!(fetched.updated_at > user.updated_at);
    assert!(matches!(
        repo.set_role(Uuid::new_v4(), new_role).await,
        Err(WardenError::NotFound { .. })
    ));
}

#[tokio::test]
async fn soft_deleted_users_are_hidden_but_reserved() {
    let repo = setup().await;
    let user = repo.create(new_user("frank", Uuid::new_v4())).await.unwrap();

    repo.soft_delete(user.id).await.unwrap();

    assert!(matches!(
        repo.get_by_id(user.id).await,
        Err(WardenError::NotFound { .. })
    ));
    assert!(
        repo.exists_by_email_or_username("frank@example.com", "someone-else")
            .await
            .unwrap()
    );
    assert!(matches!(
        repo.soft_delete(user.id).await,
        Err(WardenError::NotFound { .. })
    ));

    repo.hard_delete(user.id).await.unwrap();
    assert!(
        !repo
            .exists_by_email_or_username("frank@example.com", "frank")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let repo = setup().await;
    let admin_role = Uuid::new_v4();
    let user_role = Uuid::new_v4();

    for i in 0..4 {
        repo.create(new_user(&format!("member-{i}"), user_role))
            .await
            .unwrap();
    }
    let admin = repo.create(new_user("boss", admin_role)).await.unwrap();
    repo.update(
        admin.id,
        UpdateUser {
            is_verified: Some(true),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let page = repo
        .list(
            UserFilter {
                role_id: Some(user_role),
                ..Default::default()
            },
            Pagination {
                offset: 0,
                limit: 3,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 3);

    let verified = repo
        .count(UserFilter {
            is_verified: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(verified, 1);

    let everyone = repo.count(UserFilter::default()).await.unwrap();
    assert_eq!(everyone, 5);
}

#[tokio::test]
async fn lock_serializes_same_user() {
    let repo = setup().await;
    let id = Uuid::new_v4();

    let guard = repo.lock(id).await;
    let blocked = tokio::time::timeout(std::time::Duration::from_millis(50), repo.lock(id)).await;
    assert!(blocked.is_err(), "second lock should wait");

    drop(guard);
    let acquired =
        tokio::time::timeout(std::time::Duration::from_millis(50), repo.lock(id)).await;
    assert!(acquired.is_ok());
}
