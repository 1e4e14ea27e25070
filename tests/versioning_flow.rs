use std::sync::Arc;

use termserver::jobs::{CancelFlag, ProgressTracker};
use termserver::logic::{
    CoreError, MemoryTooling, OperationLockManager, ToolingRegistry, VersioningCoordinator,
};
use termserver::model::{
    DependencyScope, Resource, ResourceStatus, ResourceType, ResourceUri, UserContext,
    VersionRequest,
};
use termserver::store::{BranchStore, MemoryStore, ResourceStore, VersionStore};

struct Fixture {
    store: Arc<MemoryStore>,
    tooling: Arc<MemoryTooling>,
    coordinator: VersioningCoordinator<MemoryStore>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::with_root_branch().await);
    let tooling = Arc::new(MemoryTooling::new("snomed"));
    let mut registry = ToolingRegistry::new();
    registry.register(Arc::clone(&tooling) as Arc<dyn termserver::logic::Tooling>);
    let coordinator = VersioningCoordinator::new(
        Arc::clone(&store),
        Arc::new(OperationLockManager::new()),
        Arc::new(registry),
        100,
    );
    Fixture {
        store,
        tooling,
        coordinator,
    }
}

fn silent_progress() -> ProgressTracker {
    ProgressTracker::new(Box::new(|_| {}))
}

async fn run(
    fixture: &Fixture,
    request: VersionRequest,
) -> Result<termserver::logic::VersioningOutcome, CoreError> {
    let progress = silent_progress();
    let cancel = CancelFlag::new();
    fixture
        .coordinator
        .run(request, &UserContext::new("tester".to_string()), &progress, &cancel)
        .await
}

async fn seed_resource(fixture: &Fixture, resource: Resource) {
    fixture
        .store
        .upsert_resource(resource)
        .await
        .expect("in-memory upsert cannot fail");
}

fn code_system(id: &str, title: &str) -> Resource {
    Resource::new(id, title, "snomed", ResourceType::CodeSystem, "tester")
}

#[tokio::test]
async fn versioning_creates_branch_record_and_activates_draft() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    let outcome = run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("versioning should succeed");

    assert_eq!(outcome.resources, vec!["cs11"]);
    assert_eq!(outcome.branch_paths, vec!["MAIN/cs11/v1"]);

    // the version branch snapshot is live
    assert!(fx.store.branch_exists("MAIN/cs11/v1").await.unwrap());

    // the draft resource transitioned to active
    let resource = fx.store.get_resource(&"cs11".to_string()).await.unwrap().unwrap();
    assert_eq!(resource.status, ResourceStatus::Active);

    // the permanent record points at the snapshot branch
    let record = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .expect("version record should exist");
    assert_eq!(record.branch_path, "MAIN/cs11/v1");
    assert_eq!(record.effective_time, 20200415);
    assert_eq!(record.resource_snapshot.status, ResourceStatus::Active);

    // the content repository saw exactly one commit with the default comment
    let commits = fx.tooling.memory_repository().commits().await;
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].comment, "Created new version 'v1' for SNOMED CT.");
    assert_eq!(commits[0].author, "tester");
}

#[tokio::test]
async fn versioning_a_source_also_versions_derived_resources() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;
    seed_resource(
        &fx,
        code_system("cs12", "SNOMED CT Extension")
            .with_dependency("cs11", DependencyScope::SourceOf),
    )
    .await;

    let outcome = run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("versioning should succeed");

    // derivatives first, primary target last
    assert_eq!(outcome.resources, vec!["cs12", "cs11"]);
    assert!(fx.store.branch_exists("MAIN/cs12/v1").await.unwrap());
    assert!(fx.store.branch_exists("MAIN/cs11/v1").await.unwrap());

    // one shared creation instant across every record in the run
    let source = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .unwrap();
    let derived = fx
        .store
        .get_version(&ResourceUri::new("cs12"), "v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(source.created_at, derived.created_at);
}

#[tokio::test]
async fn versioning_a_collection_covers_non_retired_children_only() {
    let fx = fixture().await;
    let mut collection = Resource::new(
        "col1",
        "Bundle",
        "snomed",
        ResourceType::Collection,
        "tester",
    );
    collection.status = ResourceStatus::Active;
    let collection_path = collection.branch_path.clone();
    seed_resource(&fx, collection).await;

    let mut child = code_system("cs21", "Child Code System");
    child.branch_path = format!("{}/cs21", collection_path);
    seed_resource(&fx, child).await;

    let mut retired = code_system("cs22", "Retired Child");
    retired.branch_path = format!("{}/cs22", collection_path);
    retired.status = ResourceStatus::Retired;
    seed_resource(&fx, retired).await;

    let mut value_set = Resource::new("vs23", "Child Value Set", "snomed", ResourceType::ValueSet, "tester");
    value_set.branch_path = format!("{}/vs23", collection_path);
    seed_resource(&fx, value_set).await;

    let outcome = run(&fx, VersionRequest::new("col1", "2020-04-15", 20200415))
        .await
        .expect("collection versioning should succeed");

    assert_eq!(outcome.resources, vec!["cs21", "vs23", "col1"]);
    assert!(fx
        .store
        .get_version(&ResourceUri::new("cs22"), "2020-04-15")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn extension_rooted_under_parent_version_branch() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;
    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("parent versioning should succeed");

    // an extension created against cs11@v1 lives under the parent's
    // version branch
    let mut extension = code_system("cs12", "SNOMED CT Extension")
        .with_dependency("cs11@v1", DependencyScope::ExtensionOf);
    extension.branch_path = "MAIN/cs11/v1/cs12".to_string();
    seed_resource(&fx, extension).await;

    let outcome = run(&fx, VersionRequest::new("cs12", "v1", 20200415))
        .await
        .expect("extension versioning should succeed");

    assert_eq!(outcome.resources, vec!["cs12"]);
    assert_eq!(outcome.branch_paths, vec!["MAIN/cs11/v1/cs12/v1"]);
    let record = fx
        .store
        .get_version(&ResourceUri::new("cs12"), "v1")
        .await
        .unwrap()
        .expect("extension version record should exist");
    assert_eq!(record.resource_snapshot.id, "cs12");
}

#[tokio::test]
async fn reserved_aliases_are_rejected_as_tags() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    for tag in ["HEAD", "head", "Latest", "NEXT"] {
        let err = run(&fx, VersionRequest::new("cs11", tag, 20200415))
            .await
            .expect_err("reserved tag must fail");
        match err {
            CoreError::BadRequest(message) => {
                assert!(message.contains("reserved alias or branch name"), "{}", message)
            }
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn effective_time_must_advance() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("first version should succeed");

    // equal effective time without force is rejected
    let err = run(&fx, VersionRequest::new("cs11", "v2", 20200415))
        .await
        .expect_err("non-advancing effective time must fail");
    assert!(matches!(err, CoreError::BadRequest(_)));

    // a later effective time passes
    run(&fx, VersionRequest::new("cs11", "v2", 20200416))
        .await
        .expect("later effective time should succeed");
}

#[tokio::test]
async fn duplicate_tag_without_force_is_a_conflict() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("first version should succeed");

    let err = run(&fx, VersionRequest::new("cs11", "v1", 20200416))
        .await
        .expect_err("occupied branch must conflict");
    assert!(matches!(err, CoreError::Conflict(_)));
}

#[tokio::test]
async fn force_republish_of_latest_tag_is_idempotent() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("first version should succeed");
    let original = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .unwrap();

    run(&fx, VersionRequest::new("cs11", "v1", 20200415).force())
        .await
        .expect("force republish should succeed");

    let records = fx
        .store
        .list_versions_for_resource(&ResourceUri::new("cs11"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1, "republish must not add a second record");
    let republished = &records[0];
    assert_eq!(republished.created_at, original.created_at);
    assert!(fx.store.branch_exists("MAIN/cs11/v1").await.unwrap());

    // the republish run used the adjusted-effective-time commit comment
    let comments: Vec<String> = fx
        .tooling
        .memory_repository()
        .commits()
        .await
        .into_iter()
        .map(|commit| commit.comment)
        .collect();
    assert!(comments
        .iter()
        .any(|c| c == "Adjusted effective time to '2020-04-15' for SNOMED CT version 'v1'."));
}

#[tokio::test]
async fn force_republish_persists_the_adjusted_effective_time() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("first version should succeed");
    let original = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .unwrap();

    run(&fx, VersionRequest::new("cs11", "v1", 20200420).force())
        .await
        .expect("force republish at a later effective time should succeed");

    let republished = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .unwrap();
    // the record carries the adjusted effective time, not the stale one
    assert_eq!(republished.effective_time, 20200420);
    assert_eq!(republished.created_at, original.created_at);

    // later monotonicity checks compare against the adjusted value
    let err = run(&fx, VersionRequest::new("cs11", "v2", 20200416))
        .await
        .expect_err("effective time before the adjusted value must fail");
    assert!(matches!(err, CoreError::BadRequest(_)));
    run(&fx, VersionRequest::new("cs11", "v2", 20200421))
        .await
        .expect("effective time after the adjusted value should succeed");
}

#[tokio::test]
async fn force_cannot_recreate_an_older_version() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect("first version should succeed");
    run(&fx, VersionRequest::new("cs11", "v2", 20200416))
        .await
        .expect("second version should succeed");

    let err = run(&fx, VersionRequest::new("cs11", "v1", 20200417).force())
        .await
        .expect_err("force only re-tags the most recent version");
    assert!(matches!(err, CoreError::Conflict(_)));

    // the older record is untouched
    let v1 = fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(v1.effective_time, 20200415);
    let records = fx
        .store
        .list_versions_for_resource(&ResourceUri::new("cs11"))
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn retired_resources_cannot_be_versioned() {
    let fx = fixture().await;
    let mut retired = code_system("cs11", "SNOMED CT");
    retired.status = ResourceStatus::Retired;
    seed_resource(&fx, retired).await;

    let err = run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect_err("retired resource must fail");
    assert!(matches!(err, CoreError::BadRequest(_)));
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let fx = fixture().await;
    let err = run(&fx, VersionRequest::new("nope", "v1", 20200415))
        .await
        .expect_err("missing resource must fail");
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn cancellation_before_commit_leaves_no_side_effects() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    let progress = silent_progress();
    let cancel = CancelFlag::new();
    cancel.request();
    let err = fx
        .coordinator
        .run(
            VersionRequest::new("cs11", "v1", 20200415),
            &UserContext::new("tester".to_string()),
            &progress,
            &cancel,
        )
        .await
        .expect_err("canceled run must fail");
    assert!(matches!(err, CoreError::Canceled));

    assert!(!fx.store.branch_exists("MAIN/cs11/v1").await.unwrap());
    assert!(fx
        .store
        .get_version(&ResourceUri::new("cs11"), "v1")
        .await
        .unwrap()
        .is_none());
    assert!(fx.tooling.memory_repository().commits().await.is_empty());
}

#[tokio::test]
async fn validation_failure_in_one_member_blocks_the_whole_set() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;
    let mut derived = code_system("cs12", "Extension")
        .with_dependency("cs11", DependencyScope::SourceOf);
    derived.status = ResourceStatus::Retired;
    seed_resource(&fx, derived).await;

    let err = run(&fx, VersionRequest::new("cs11", "v1", 20200415))
        .await
        .expect_err("retired derivative must block the run");
    assert!(matches!(err, CoreError::BadRequest(_)));

    // nothing was committed for the valid member either
    assert!(!fx.store.branch_exists("MAIN/cs11/v1").await.unwrap());
    assert!(fx.tooling.memory_repository().commits().await.is_empty());
}

#[tokio::test]
async fn progress_reaches_one_hundred_percent() {
    let fx = fixture().await;
    seed_resource(&fx, code_system("cs11", "SNOMED CT")).await;

    let progress = ProgressTracker::new(Box::new(|_| {}));
    let cancel = CancelFlag::new();
    fx.coordinator
        .run(
            VersionRequest::new("cs11", "v1", 20200415),
            &UserContext::new("tester".to_string()),
            &progress,
            &cancel,
        )
        .await
        .expect("versioning should succeed");
    assert_eq!(progress.completion_level(), 100);
}
