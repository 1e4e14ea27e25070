use crate::model::{
    Branch, DependencyScope, Resource, ResourceType, MAIN_BRANCH,
};
use crate::store::traits::Store;
use anyhow::Result;

/// Helper function to create a Resource with system audit info, rooted under
/// an explicit parent branch
fn create_system_resource(
    id: &str,
    title: &str,
    tooling_id: &str,
    resource_type: ResourceType,
    parent_branch: &str,
) -> Resource {
    let mut resource = Resource::new(id, title, tooling_id, resource_type, "system");
    resource.branch_path = format!("{}/{}", parent_branch, id);
    resource
}

/// Loads a small demonstration dataset: a SNOMED CT code system, an extension
/// derived from it, and a collection with two member resources.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    store.upsert_branch(Branch::new_root()).await?;

    let cs11 = create_system_resource(
        "cs11",
        "SNOMED CT",
        "snomed",
        ResourceType::CodeSystem,
        MAIN_BRANCH,
    );
    let cs12 = create_system_resource(
        "cs12",
        "SNOMED CT Extension",
        "snomed",
        ResourceType::CodeSystem,
        MAIN_BRANCH,
    )
    .with_dependency("cs11", DependencyScope::SourceOf);

    let collection = create_system_resource(
        "col1",
        "Regional Terminology Bundle",
        "snomed",
        ResourceType::Collection,
        MAIN_BRANCH,
    );
    let cs21 = create_system_resource(
        "cs21",
        "Regional Code System",
        "snomed",
        ResourceType::CodeSystem,
        &collection.branch_path,
    );
    let vs22 = create_system_resource(
        "vs22",
        "Regional Value Set",
        "snomed",
        ResourceType::ValueSet,
        &collection.branch_path,
    );

    for resource in [&cs11, &cs12, &collection, &cs21, &vs22] {
        let parent = crate::model::branch::parent_of(&resource.branch_path)
            .unwrap_or(MAIN_BRANCH)
            .to_string();
        let segment = crate::model::branch::last_segment(&resource.branch_path);
        store.upsert_branch(Branch::new_child(&parent, segment)).await?;
        store.upsert_resource(resource.clone()).await?;
    }

    Ok(())
}
