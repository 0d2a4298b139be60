use crate::harness::{Assertion, Scenario};
use repohost_core::RepositoryCatalog;

#[test]
fn test_create_describe_delete() {
    Scenario::new("create_describe_delete")
        .create("main/team/app")
        .create("alpha")
        .assert_listed(&["alpha.git", "team/app.git"])
        .describe("team/app.git", "Main service")
        .assert_description("team/app.git", "Main service")
        .delete("team/app.git")
        .assert_missing("team/app.git")
        .assert_listed(&["alpha.git"])
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_duplicate_create_conflicts() {
    Scenario::new("duplicate_create_conflicts")
        .create("app")
        .create("APP.git")
        .fails_with("already exists")
        .assert_listed(&["app.git"])
        .run()
        .unwrap();
}

#[test]
fn test_push_makes_repository_non_empty() {
    Scenario::new("push_makes_repository_non_empty")
        .create("app")
        .assert(Assertion::Custom(Box::new(|catalog: &RepositoryCatalog| {
            let record = catalog
                .get("app.git")
                .ok_or_else(|| anyhow::anyhow!("app.git missing"))?;
            anyhow::ensure!(!record.has_commits, "new repository has commits");
            Ok(())
        })))
        .push_branch("app.git")
        .assert_has_commits("app.git")
        .allow_deleting_non_empty(false)
        .delete("app.git")
        .fails_with("refusing to delete non-empty repository")
        .assert_exists("app.git")
        .allow_deleting_non_empty(true)
        .delete("app.git")
        .assert_missing("app.git")
        .run()
        .unwrap();
}

#[test]
fn test_delete_closes_every_open_handle() {
    Scenario::new("delete_closes_every_open_handle")
        .create("app")
        .hold_open("app.git")
        .hold_open("app.git")
        .assert_use_count("app.git", 2)
        .delete("app.git")
        .assert_use_count("app.git", 0)
        .assert_missing("app.git")
        .run()
        .unwrap();
}

#[test]
fn test_rename_onto_existing_conflicts() {
    Scenario::new("rename_onto_existing_conflicts")
        .create("app")
        .create("web")
        .rename("app.git", "web")
        .fails_with("'web.git' already exists")
        .assert_listed(&["app.git", "web.git"])
        .rename("app.git", "api")
        .assert_listed(&["api.git", "web.git"])
        .run()
        .unwrap();
}

#[test]
fn test_missing_repository_is_not_found() {
    Scenario::new("missing_repository_is_not_found")
        .delete("ghost.git")
        .fails_with("repository not found")
        .create("../escape")
        .fails_with("invalid repository name")
        .assert_listed(&[])
        .run()
        .unwrap();
}
