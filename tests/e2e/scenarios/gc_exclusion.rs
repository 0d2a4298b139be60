use crate::harness::{Assertion, Scenario};
use repohost_core::RepositoryCatalog;

#[test]
fn test_collecting_repository_is_busy() {
    Scenario::new("collecting_repository_is_busy")
        .create("app")
        .create("web")
        .while_collecting("app.git", |s| {
            s.assert(Assertion::Custom(Box::new(|catalog: &RepositoryCatalog| {
                let record = catalog
                    .get("app.git")
                    .ok_or_else(|| anyhow::anyhow!("app.git missing"))?;
                anyhow::ensure!(record.is_collecting_garbage, "record is not flagged");
                Ok(())
            })))
            .assert_use_count("app.git", 0)
            .delete("app.git")
            .fails_with("busy collecting garbage")
            .rename("app.git", "other")
            .fails_with("busy collecting garbage")
            .describe("web.git", "still editable")
        })
        .assert_description("web.git", "still editable")
        .delete("app.git")
        .assert_listed(&["web.git"])
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_mirror_skips_collecting_repository() {
    Scenario::new("mirror_skips_collecting_repository")
        .create("mirror")
        .mirror_of("mirror.git", "https://example.com/upstream.git")
        .assert_listed(&["mirror.git"])
        .while_collecting("mirror.git", |s| s.mirror_sweep())
        .assert_fetch_count(0)
        .mirror_sweep()
        .assert_fetch_count(1)
        .run()
        .unwrap();
}
