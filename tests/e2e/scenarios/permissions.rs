use crate::harness::Scenario;
use repohost_core::AccessPermission;

#[test]
fn test_permissions_follow_rename_and_delete() {
    Scenario::new("permissions_follow_rename_and_delete")
        .create_owned("team/app", "carol")
        .grant("dave", "team/app.git", AccessPermission::Push)
        .assert_permission("dave", "team/app.git", Some(AccessPermission::Push))
        .assert_permission("carol", "team/app.git", Some(AccessPermission::Rewind))
        .rename("team/app.git", "team/web")
        .assert_permission("dave", "team/web.git", Some(AccessPermission::Push))
        .assert_permission("dave", "team/app.git", None)
        .assert_permission("carol", "team/web.git", Some(AccessPermission::Rewind))
        .delete("team/web.git")
        .assert_permission("dave", "team/web.git", None)
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_fork_owner_gets_full_access() {
    Scenario::new("fork_owner_gets_full_access")
        .create("team/app")
        .fork("team/app.git", "alice")
        .assert_permission("alice", "~alice/app.git", Some(AccessPermission::Rewind))
        .assert_permission("alice", "team/app.git", None)
        .run()
        .unwrap();
}
