//! Integration tests where identity changes meet tenant membership.

mod common;

use common::fixture;
use warden_core::error::{MembershipError, TokenError, WardenError};
use warden_core::models::actor::Actor;
use warden_core::models::role::SystemRole;
use warden_core::repository::UserRepository;

#[tokio::test]
async fn deleting_a_member_releases_their_seat() {
    let fx = fixture().await;
    let root = fx.superadmin().await;
    let tenant = fx.tenant(&root, "acme", 1).await;
    let first = fx.verified("una").await;
    let second = fx.verified("vic").await;

    fx.tenants.invite_user(&root, tenant.id, first.id).await.unwrap();
    let err = fx
        .tenants
        .invite_user(&root, tenant.id, second.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WardenError::Membership(MembershipError::MaxUserLimitReached { max_users: 1 })
    ));

    fx.service
        .delete_user(&Actor::new(first.id, SystemRole::User), first.id)
        .await
        .unwrap();
    let members = fx.tenants.memberships();
    assert_eq!(members.count_active_users(tenant.id).await.unwrap(), 0);
    assert!(!members.is_user_in_tenant(first.id, tenant.id).await.unwrap());
    assert_eq!(members.history(first.id).await.unwrap().len(), 1);

    fx.tenants.invite_user(&root, tenant.id, second.id).await.unwrap();
    assert_eq!(members.count_active_users(tenant.id).await.unwrap(), 1);
}

#[tokio::test]
async fn hard_delete_also_releases_the_seat() {
    let fx = fixture().await;
    let root = fx.superadmin().await;
    let tenant = fx.tenant(&root, "globex", 1).await;
    let member = fx.verified("wes").await;

    fx.tenants.invite_user(&root, tenant.id, member.id).await.unwrap();
    fx.service.hard_delete_user(&root, member.id).await.unwrap();

    let members = fx.tenants.memberships();
    assert_eq!(members.count_active_users(tenant.id).await.unwrap(), 0);
    let next = fx.verified("xia").await;
    fx.tenants.invite_user(&root, tenant.id, next.id).await.unwrap();
}

#[tokio::test]
async fn tenant_members_cannot_become_superadmin() {
    let fx = fixture().await;
    let root = fx.superadmin().await;
    let tenant = fx.tenant(&root, "initech", 5).await;
    let member = fx.verified("yan").await;
    let superadmin = fx.roles.system_role(SystemRole::Superadmin).await.unwrap();

    fx.tenants.invite_user(&root, tenant.id, member.id).await.unwrap();
    let err = fx
        .service
        .change_user_role(&root, member.id, superadmin.id)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            WardenError::Membership(MembershipError::SuperadminCannotJoinTenant)
        ),
        "got {err:?}"
    );
    let stored = fx.users.get_by_id(member.id).await.unwrap();
    assert_ne!(stored.role_id, Some(superadmin.id));

    // Once out of the tenant the promotion goes through.
    fx.tenants.remove_user(&root, tenant.id, member.id).await.unwrap();
    let promoted = fx
        .service
        .change_user_role(&root, member.id, superadmin.id)
        .await
        .unwrap();
    assert_eq!(promoted.role_id, Some(superadmin.id));
}

#[tokio::test]
async fn demoted_admin_tokens_are_refused() {
    let fx = fixture().await;
    let root = fx.superadmin().await;
    let tenant = fx.tenant(&root, "umbrella", 5).await;
    let member = fx.verified("zed").await;

    fx.tenants.invite_user(&root, tenant.id, member.id).await.unwrap();
    fx.tenants
        .promote_to_admin(&root, tenant.id, member.id)
        .await
        .unwrap();
    let session = fx.login("zed").await;
    let actor = fx.service.authenticate(&session.access_token).await.unwrap();
    assert_eq!(actor.role, SystemRole::Admin);

    fx.tenants
        .demote_to_user(&root, tenant.id, member.id)
        .await
        .unwrap();
    let err = fx
        .service
        .authenticate(&session.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Token(TokenError::Revoked)), "got {err:?}");

    let fresh = fx.login("zed").await;
    let actor = fx.service.authenticate(&fresh.access_token).await.unwrap();
    assert_eq!(actor.role, SystemRole::User);
}
