//! End-to-end convergence tests
//!
//! These tests run the whole stack the way the CLI wires it for local
//! development: a filesystem catalog, the local provider, the file-backed
//! state store, and the file-backed parameter registry, all rooted in a
//! temporary directory. They tell the story of an operator driving a
//! repository of domain declarations from first deploy to teardown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stratus::catalog::FilesystemCatalog;
use stratus::engine::{Engine, EngineConfig, Mode, TupleStatus};
use stratus::provider::LocalProvider;
use stratus::registry::{registry_keys, FileParameterStore, ParameterStore, REGISTRY_PREFIX};
use stratus::retry::RetryConfig;
use stratus::state::{FileStateStore, LockRecord, StateStore};

const STATE_KEY: &str = "github.com/acme/sites";

struct Repo {
    root: tempfile::TempDir,
}

impl Repo {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn declare(&self, domain: &str, environment: &str, content: &str) {
        let dir = self.root.path().join("domains").join(domain).join(environment);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("domain.yaml"), content).unwrap();
    }

    fn catalog(&self) -> FilesystemCatalog {
        FilesystemCatalog::new(self.root.path().join("domains"))
    }

    fn state_dir(&self) -> std::path::PathBuf {
        self.root.path().join(".stratus/state")
    }

    fn state_store(&self) -> FileStateStore {
        FileStateStore::new(self.state_dir())
    }

    fn params(&self) -> Arc<FileParameterStore> {
        Arc::new(FileParameterStore::new(
            self.root.path().join(".stratus/registry.json"),
        ))
    }

    fn engine(&self) -> Engine {
        let provider = Arc::new(LocalProvider::new(self.root.path().join(".stratus/resources")));
        Engine::new(
            provider,
            Arc::new(self.state_store()),
            self.params(),
            EngineConfig {
                state_key: STATE_KEY.to_string(),
                project: "static-websites".to_string(),
                owner: "web-platform".to_string(),
                deployer: "tester".to_string(),
                certificate_timeout: Duration::from_secs(5),
                lock_lease: Duration::from_secs(60),
                lock_retry: RetryConfig {
                    max_attempts: 1,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(1),
                    backoff_multiplier: 1.0,
                },
            },
        )
    }
}

async fn registry_entries(repo: &Repo) -> Vec<(String, String)> {
    repo.params().list(REGISTRY_PREFIX).await.unwrap()
}

/// Story: a fresh repository converges to a full bundle per domain and the
/// registry exposes every identifier once the apply completes
#[tokio::test]
async fn story_first_deploy_provisions_and_publishes() {
    let repo = Repo::new();
    repo.declare("example.com", "production", "domain: example.com\nregister: true\n");
    repo.declare("other.org", "production", "domain: other.org\n");

    let report = repo.engine().apply(&repo.catalog()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.mode, Mode::Apply);
    assert_eq!(report.outcomes.len(), 2);
    // example.com carries a registration record, other.org does not
    assert_eq!(
        report
            .outcome_for("example.com", "production")
            .unwrap()
            .completed
            .len(),
        7
    );
    assert_eq!(
        report.outcome_for("other.org", "production").unwrap().completed.len(),
        6
    );

    let state = repo.state_store().read(STATE_KEY).await.unwrap().unwrap();
    assert_eq!(state.resources.len(), 13);

    let entries = registry_entries(&repo).await;
    assert_eq!(entries.len(), 12);
    for key in registry_keys("example.com").iter().chain(registry_keys("other.org").iter()) {
        assert!(entries.iter().any(|(k, _)| k == key), "{key} missing");
    }
}

/// Story: deploying an unchanged repository is a no-op
#[tokio::test]
async fn story_second_deploy_is_an_empty_diff() {
    let repo = Repo::new();
    repo.declare("example.com", "production", "domain: example.com\n");

    repo.engine().apply(&repo.catalog()).await.unwrap();
    let report = repo.engine().apply(&repo.catalog()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.completed_operations(), 0);
    assert_eq!(
        report.outcome_for("example.com", "production").unwrap().status,
        TupleStatus::Unchanged
    );
}

/// Story: editing a declaration converges only what changed
#[tokio::test]
async fn story_adding_a_typo_updates_the_affected_resources() {
    let repo = Repo::new();
    repo.declare("example.com", "production", "domain: example.com\n");
    repo.engine().apply(&repo.catalog()).await.unwrap();

    // The typo widens the certificate, the distribution aliases, and the
    // router artifact
    repo.declare(
        "example.com",
        "production",
        "domain: example.com\ntypos:\n  - exmaple.com\n",
    );
    let report = repo.engine().apply(&repo.catalog()).await.unwrap();

    assert!(report.is_success());
    let outcome = report.outcome_for("example.com", "production").unwrap();
    assert_eq!(outcome.status, TupleStatus::Converged);
    let touched: Vec<&str> = outcome
        .completed
        .iter()
        .map(|op| op.role.as_str())
        .collect();
    assert!(touched.contains(&"certificate"));
    assert!(touched.contains(&"distribution"));
    assert!(!touched.contains(&"storage"));
}

/// Story: a drifted resource fails its own domain, the rest converge, and
/// a re-run after the operator reconciles picks up exactly the remainder
#[tokio::test]
async fn story_drift_is_isolated_and_rerun_resumes() {
    let repo = Repo::new();
    repo.declare("drifted.com", "production", "domain: drifted.com\n");
    repo.declare("healthy.org", "production", "domain: healthy.org\n");

    // Someone created the storage container out-of-band
    let stray = repo
        .root
        .path()
        .join(".stratus/resources/drifted-com-production/storage.json");
    std::fs::create_dir_all(stray.parent().unwrap()).unwrap();
    std::fs::write(&stray, "{}").unwrap();

    let report = repo.engine().apply(&repo.catalog()).await.unwrap();
    assert!(!report.is_success());

    let drifted = report.outcome_for("drifted.com", "production").unwrap();
    let TupleStatus::Failed { error } = &drifted.status else {
        panic!("drifted.com should have failed");
    };
    assert!(error.contains("resource conflict"));

    let healthy = report.outcome_for("healthy.org", "production").unwrap();
    assert_eq!(healthy.status, TupleStatus::Converged);

    // Registry never shows the half-provisioned domain
    let entries = registry_entries(&repo).await;
    assert!(entries.iter().all(|(k, _)| !k.contains("drifted.com")));
    assert!(entries.iter().any(|(k, _)| k.contains("healthy.org")));

    // Operator removes the stray resource; the re-run converges only the
    // remaining work (the zone and certificate completed before the
    // conflict and stay recorded)
    std::fs::remove_file(&stray).unwrap();
    let report = repo.engine().apply(&repo.catalog()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(
        report.outcome_for("healthy.org", "production").unwrap().status,
        TupleStatus::Unchanged
    );
    let resumed = report.outcome_for("drifted.com", "production").unwrap();
    assert_eq!(resumed.status, TupleStatus::Converged);
    assert_eq!(resumed.completed.len(), 4);
    assert!(registry_entries(&repo)
        .await
        .iter()
        .any(|(k, _)| k.contains("drifted.com")));
}

/// Story: destroy tears everything down in reverse order and the registry
/// entries disappear only after the resources are gone
#[tokio::test]
async fn story_destroy_tears_down_and_withdraws() {
    let repo = Repo::new();
    repo.declare("example.com", "production", "domain: example.com\n");
    repo.engine().apply(&repo.catalog()).await.unwrap();
    assert!(!registry_entries(&repo).await.is_empty());

    let report = repo.engine().destroy().await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.mode, Mode::Destroy);

    let outcome = report.outcome_for("example.com", "production").unwrap();
    let roles: Vec<&str> = outcome.completed.iter().map(|op| op.role.as_str()).collect();
    let pos = |role: &str| roles.iter().position(|r| *r == role).unwrap();
    assert!(pos("alias-records") < pos("distribution"));
    assert!(pos("access-policy") < pos("distribution"));
    assert!(pos("distribution") < pos("certificate"));
    assert!(pos("certificate") < pos("dns-zone"));

    assert!(repo
        .state_store()
        .read(STATE_KEY)
        .await
        .unwrap()
        .unwrap()
        .resources
        .is_empty());
    assert!(registry_entries(&repo).await.is_empty());
}

/// Story: removing a declaration orphans its resources until an explicit
/// destroy; the catalog is not a garbage collector
#[tokio::test]
async fn story_removed_declaration_does_not_delete_resources() {
    let repo = Repo::new();
    repo.declare("keep.com", "production", "domain: keep.com\n");
    repo.declare("gone.org", "production", "domain: gone.org\n");
    repo.engine().apply(&repo.catalog()).await.unwrap();

    std::fs::remove_dir_all(repo.root.path().join("domains/gone.org")).unwrap();
    let report = repo.engine().apply(&repo.catalog()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.orphans.len(), 6);
    // The orphaned resources are still recorded
    let state = repo.state_store().read(STATE_KEY).await.unwrap().unwrap();
    assert_eq!(state.resources_for("gone.org", "production").len(), 6);
}

/// Story: a lock left by a crashed run is taken over once its lease
/// expires, and a live lock fails the run fast
#[tokio::test]
async fn story_lock_protocol_across_runs() {
    let repo = Repo::new();
    repo.declare("example.com", "production", "domain: example.com\n");

    // A live lock from another runner contends
    let store = repo.state_store();
    store
        .acquire(STATE_KEY, "other-runner", Duration::from_secs(600))
        .await
        .unwrap();
    let err = repo
        .engine()
        .apply(&repo.catalog())
        .await
        .expect_err("live lock should contend");
    assert!(err.to_string().contains("other-runner"));
    store.release(STATE_KEY, "other-runner").await.unwrap();

    // A crashed run's lock with an expired lease is stolen
    write_expired_lock(&repo.state_dir());
    let report = repo.engine().apply(&repo.catalog()).await.unwrap();
    assert!(report.is_success());

    // The lock is free again after the run
    store
        .acquire(STATE_KEY, "next-runner", Duration::from_secs(60))
        .await
        .expect("lock should be released after the run");
}

fn write_expired_lock(state_dir: &Path) {
    std::fs::create_dir_all(state_dir).unwrap();
    let mut record = LockRecord::new("crashed-runner", Duration::ZERO);
    record.expires_at = record.acquired_at - chrono::Duration::seconds(60);
    std::fs::write(
        state_dir.join("github.com-acme-sites.lock.json"),
        serde_json::to_string(&record).unwrap(),
    )
    .unwrap();
}
