use crate::harness::Scenario;

#[test]
fn test_restart_rebuilds_catalog_from_disk() {
    Scenario::new("restart_rebuilds_catalog_from_disk")
        .create("team/app")
        .describe("team/app.git", "Main service")
        .fork("team/app.git", "alice")
        .restart()
        .assert_listed(&["team/app.git", "~alice/app.git"])
        .assert_description("team/app.git", "Main service")
        .assert_forks("team/app.git", &["~alice/app.git"])
        .assert_network_size("team/app.git", 2)
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_cached_list_ignores_outside_changes_until_settings_change() {
    Scenario::new("cached_list_ignores_outside_changes")
        .create("alpha")
        .assert_listed(&["alpha.git"])
        .create_on_disk("beta.git")
        .assert_listed(&["alpha.git"])
        .cache_repository_list(false)
        .assert_listed(&["alpha.git", "beta.git"])
        .create_on_disk("gamma.git")
        .assert_listed(&["alpha.git", "beta.git", "gamma.git"])
        .run()
        .unwrap();
}

#[test]
fn test_restart_picks_up_outside_repositories() {
    Scenario::new("restart_picks_up_outside_repositories")
        .create("alpha")
        .assert_listed(&["alpha.git"])
        .create_on_disk("beta.git")
        .assert_listed(&["alpha.git"])
        .restart()
        .assert_listed(&["alpha.git", "beta.git"])
        .assert_exists("beta.git")
        .run()
        .unwrap();
}
