//! Integration tests for the tenant membership state machine.

mod common;

use std::sync::Arc;

use common::fixture;
use warden_access::{SubscriptionUpdate, TenantContactUpdate, TenantProfileUpdate};
use warden_core::error::{MembershipError, WardenError};
use warden_core::models::role::SystemRole;
use warden_core::models::tenant::SubscriptionPlan;
use warden_core::outbound::Upload;
use warden_core::repository::Pagination;

fn membership_err(err: WardenError) -> MembershipError {
    match err {
        WardenError::Membership(e) => e,
        other => panic!("expected a membership error, got {other:?}"),
    }
}

#[tokio::test]
async fn single_tenant_and_capacity_invariants() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", Some(1)).await;
    let b = fx.tenant("beta", None).await;
    let u = fx.user("u", SystemRole::User).await;
    let v = fx.user("v", SystemRole::User).await;

    fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap();

    let err = fx.service.invite_user(&fx.root, b.id, u.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserInOtherTenant);

    let err = fx.service.invite_user(&fx.root, a.id, v.id).await.unwrap_err();
    assert_eq!(
        membership_err(err),
        MembershipError::MaxUserLimitReached { max_users: 1 }
    );

    let err = fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserAlreadyInTenant);

    assert_eq!(fx.service.memberships().count_active_users(a.id).await.unwrap(), 1);
    let current = fx.service.memberships().current_tenant(u.id).await.unwrap();
    assert_eq!(current.map(|t| t.id), Some(a.id));
}

#[tokio::test]
async fn superadmins_cannot_be_invited() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let other_root = fx.user("root2", SystemRole::Superadmin).await;

    let err = fx
        .service
        .invite_user(&fx.root, a.id, other_root.id)
        .await
        .unwrap_err();
    assert_eq!(membership_err(err), MembershipError::CannotInviteSuperadmin);
}

#[tokio::test]
async fn inactive_tenant_rejects_invites_until_reactivated() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let u = fx.user("u", SystemRole::User).await;

    let deleted = fx.service.delete_tenant(&fx.root, a.id).await.unwrap();
    assert!(!deleted.is_active);

    let err = fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::TenantInactive);

    fx.service.reactivate_tenant(&fx.root, a.id).await.unwrap();
    fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap();
}

#[tokio::test]
async fn actor_authorization_for_invites() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let b = fx.tenant("beta", None).await;
    let admin = fx.tenant_admin("boss", &a).await;
    let (_, plain) = fx.actor("plain", SystemRole::User).await;
    let target = fx.user("target", SystemRole::User).await;

    let err = fx.service.invite_user(&plain, a.id, target.id).await.unwrap_err();
    assert!(matches!(err, WardenError::AuthorizationDenied { .. }));

    let err = fx.service.invite_user(&admin, b.id, target.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserNotInTenant);

    fx.service.invite_user(&admin, a.id, target.id).await.unwrap();
}

#[tokio::test]
async fn promote_and_demote_members() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let u = fx.user("u", SystemRole::User).await;
    fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap();

    let admin_role = fx.roles.system_role(SystemRole::Admin).await.unwrap();
    let promoted = fx.service.promote_to_admin(&fx.root, a.id, u.id).await.unwrap();
    assert_eq!(promoted.role_id, Some(admin_role.id));

    let user_role = fx.roles.system_role(SystemRole::User).await.unwrap();
    let demoted = fx.service.demote_to_user(&fx.root, a.id, u.id).await.unwrap();
    assert_eq!(demoted.role_id, Some(user_role.id));

    let root2 = fx.user("root2", SystemRole::Superadmin).await;
    let err = fx
        .service
        .demote_to_user(&fx.root, a.id, root2.id)
        .await
        .unwrap_err();
    assert_eq!(membership_err(err), MembershipError::SuperadminCannotJoinTenant);

    let outsider = fx.user("outsider", SystemRole::User).await;
    let err = fx
        .service
        .promote_to_admin(&fx.root, a.id, outsider.id)
        .await
        .unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserNotInTenant);
}

#[tokio::test]
async fn removal_rules() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let admin = fx.tenant_admin("boss", &a).await;
    let u = fx.user("u", SystemRole::User).await;
    fx.service.invite_user(&admin, a.id, u.id).await.unwrap();

    let err = fx.service.remove_user(&admin, a.id, admin.user_id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::CannotRemoveSelf);

    let err = fx
        .service
        .remove_user(&admin, a.id, fx.root.user_id)
        .await
        .unwrap_err();
    assert_eq!(membership_err(err), MembershipError::CannotRemoveSuperadmin);

    fx.service.remove_user(&admin, a.id, u.id).await.unwrap();
    assert!(!fx.service.memberships().is_user_in_tenant(u.id, a.id).await.unwrap());

    let err = fx.service.remove_user(&admin, a.id, u.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserNotInTenant);

    // History survives and the user may join again.
    let history = fx.service.memberships().history(u.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_active);
    fx.service.invite_user(&admin, a.id, u.id).await.unwrap();
    assert_eq!(fx.service.memberships().history(u.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_invites_respect_capacity() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", Some(3)).await;

    let mut handles = Vec::new();
    for i in 0..6 {
        let user = fx.user(&format!("racer-{i}"), SystemRole::User).await;
        let service = Arc::clone(&fx.service);
        let root = fx.root;
        let tenant_id = a.id;
        handles.push(tokio::spawn(async move {
            service.invite_user(&root, tenant_id, user.id).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(
                membership_err(err),
                MembershipError::MaxUserLimitReached { max_users: 3 }
            ),
        }
    }
    assert_eq!(accepted, 3);
    assert_eq!(fx.service.memberships().count_active_users(a.id).await.unwrap(), 3);
}

#[tokio::test]
async fn concurrent_invites_of_one_user_to_two_tenants() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let b = fx.tenant("beta", None).await;
    let u = fx.user("u", SystemRole::User).await;

    let first = {
        let service = Arc::clone(&fx.service);
        let root = fx.root;
        tokio::spawn(async move { service.invite_user(&root, a.id, u.id).await })
    };
    let second = {
        let service = Arc::clone(&fx.service);
        let root = fx.root;
        tokio::spawn(async move { service.invite_user(&root, b.id, u.id).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    let active = fx
        .service
        .memberships()
        .get_active_tenants_for_user(u.id)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn subscription_changes_are_superadmin_only() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    assert_eq!(a.max_users, 15);
    let admin = fx.tenant_admin("boss", &a).await;

    let premium = SubscriptionUpdate {
        plan: SubscriptionPlan::Premium,
        max_users: None,
        start: None,
        end: None,
    };
    let err = fx
        .service
        .update_subscription(&admin, a.id, premium.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AuthorizationDenied { .. }));

    let upgraded = fx.service.update_subscription(&fx.root, a.id, premium).await.unwrap();
    assert_eq!(upgraded.subscription_plan, SubscriptionPlan::Premium);
    assert_eq!(upgraded.max_users, 100);

    let overridden = fx
        .service
        .update_subscription(
            &fx.root,
            a.id,
            SubscriptionUpdate {
                plan: SubscriptionPlan::Enterprise,
                max_users: Some(42),
                start: None,
                end: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(overridden.max_users, 42);
}

#[tokio::test]
async fn tenant_visibility_and_management() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let b = fx.tenant("beta", None).await;
    let admin = fx.tenant_admin("boss", &a).await;

    assert_eq!(fx.service.get_tenant(&admin, a.id).await.unwrap().id, a.id);
    let err = fx.service.get_tenant(&admin, b.id).await.unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserNotInTenant);

    let err = fx
        .service
        .list_tenants(&admin, true, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::AuthorizationDenied { .. }));
    let all = fx
        .service
        .list_tenants(&fx.root, true, Pagination::default())
        .await
        .unwrap();
    assert_eq!(all.total, 2);

    let renamed = fx
        .service
        .update_profile(
            &admin,
            a.id,
            TenantProfileUpdate {
                name: Some("Alpha Corp".into()),
                description: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Alpha Corp");

    let err = fx
        .service
        .update_contact(
            &admin,
            b.id,
            TenantContactUpdate {
                contact_email: Some(Some("ops@beta.example".into())),
                contact_phone: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(membership_err(err), MembershipError::UserNotInTenant);

    let members = fx
        .service
        .list_members(&admin, a.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(members.total, 1);
}

#[tokio::test]
async fn logo_replacement_cleans_up_the_old_file() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let logo = |name: &str| Upload {
        filename: name.into(),
        content_type: "image/png".into(),
        bytes: vec![0x89, b'P', b'N', b'G'],
    };

    let first = fx.service.update_logo(&fx.root, a.id, logo("one.png")).await.unwrap();
    let first_url = first.logo_url.clone().unwrap();
    let second = fx.service.update_logo(&fx.root, a.id, logo("two.png")).await.unwrap();
    assert_ne!(second.logo_url, first.logo_url);
    assert_eq!(fx.files.deleted.lock().unwrap().as_slice(), [first_url]);

    let err = fx
        .service
        .update_logo(
            &fx.root,
            a.id,
            Upload {
                filename: "notes.txt".into(),
                content_type: "text/plain".into(),
                bytes: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));

    let cleared = fx.service.remove_logo(&fx.root, a.id).await.unwrap();
    assert!(cleared.logo_url.is_none());
}

#[tokio::test]
async fn mutations_are_audited_and_invites_emailed() {
    let fx = fixture().await;
    let a = fx.tenant("alpha", None).await;
    let u = fx.user("u", SystemRole::User).await;
    fx.service.invite_user(&fx.root, a.id, u.id).await.unwrap();
    fx.service.promote_to_admin(&fx.root, a.id, u.id).await.unwrap();

    fx.dispatcher.flush().await;

    let actions = fx.recorder.actions();
    for expected in ["create", "invite", "change_role"] {
        assert!(actions.iter().any(|a| a == expected), "missing {expected} in {actions:?}");
    }
    let mails = fx.recorder.mails.lock().unwrap();
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].0, "u@example.com");
}

#[tokio::test]
async fn store_toggles_keep_history_and_admit_is_guarded() {
    let fx = fixture().await;
    let a = fx.tenant("acme", Some(1)).await;
    let b = fx.tenant("globex", Some(5)).await;
    let (u, _) = fx.actor("ulla", SystemRole::User).await;
    let (v, _) = fx.actor("vern", SystemRole::User).await;
    let store = fx.service.memberships();

    // The plain insert applies no rules; admit does.
    let row = store.add_user_to_tenant(u.id, a.id).await.unwrap();
    assert!(store.is_user_in_tenant(u.id, a.id).await.unwrap());
    assert_eq!(
        membership_err(store.admit(v.id, a.id, 1).await.unwrap_err()),
        MembershipError::MaxUserLimitReached { max_users: 1 }
    );
    assert_eq!(
        membership_err(store.admit(u.id, b.id, 5).await.unwrap_err()),
        MembershipError::UserInOtherTenant
    );

    let suspended = store.deactivate(row.id).await.unwrap();
    assert!(!suspended.is_active);
    assert_eq!(store.count_active_users(a.id).await.unwrap(), 0);
    store.admit(v.id, a.id, 1).await.unwrap();

    let restored = store.activate(row.id).await.unwrap();
    assert!(restored.is_active);
    assert_eq!(store.history(u.id).await.unwrap().len(), 1);
}
