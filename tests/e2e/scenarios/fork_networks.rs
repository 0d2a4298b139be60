use crate::harness::Scenario;

#[test]
fn test_fork_chain_forms_one_network() {
    Scenario::new("fork_chain_forms_one_network")
        .create("team/app")
        .fork("team/app.git", "alice")
        .fork("~alice/app.git", "bob")
        .assert_listed(&["team/app.git", "~alice/app.git", "~bob/app.git"])
        .assert_forks("team/app.git", &["~alice/app.git"])
        .assert_origin("~bob/app.git", Some("~alice/app.git"))
        .assert_network_size("~bob/app.git", 3)
        .assert_fork_of("bob", "team/app.git", Some("~bob/app.git"))
        .assert_fork_of("carol", "team/app.git", None)
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_rename_relinks_forks() {
    Scenario::new("rename_relinks_forks")
        .create("team/app")
        .fork("team/app.git", "alice")
        .rename("team/app.git", "team/core")
        .assert_missing("team/app.git")
        .assert_forks("team/core.git", &["~alice/app.git"])
        .assert_origin("~alice/app.git", Some("team/core.git"))
        .assert_fork_of("alice", "team/core.git", Some("~alice/app.git"))
        .run()
        .unwrap();
}

#[test]
fn test_deleting_a_fork_leaves_origin() {
    Scenario::new("deleting_a_fork_leaves_origin")
        .create("team/app")
        .fork("team/app.git", "alice")
        .delete("~alice/app.git")
        .assert_forks("team/app.git", &[])
        .assert_fork_of("alice", "team/app.git", None)
        .assert_network_size("team/app.git", 1)
        .run()
        .unwrap();
}
