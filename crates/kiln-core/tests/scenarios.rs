mod common;

use common::{TestContext, reference, requested_key, requires};
use kiln_core::{
    BuildPolicy, CompatibilityCandidate, ExitStatus, GraphError, HookError, InvalidReason, Outcome,
    Profile, Recipe, ResolveError, ResolveRequest,
};
use kiln_schema::{BinaryStatus, PackageId, PackageIdMode, Requirement};

fn linux_only() -> Recipe {
    Recipe::new(reference("pkg/0.1"))
        .with_settings(&["os", "compiler", "build_type"])
        .on_validate(|ctx| match ctx.setting("os") {
            Some("Windows") => Err(HookError::invalid("Windows not supported")),
            _ => Ok(()),
        })
}

fn create(os: &str) -> ResolveRequest {
    ResolveRequest::create(reference("pkg/0.1"))
        .with_profile(Profile::new().setting("os", os).setting("compiler", "gcc"))
        .with_policy(BuildPolicy::missing())
}

#[tokio::test]
async fn test_build_then_cache_then_invalid() {
    let ctx = TestContext::new().with(linux_only());

    let first = ctx.resolve(&create("Linux")).await.expect("resolves");
    let pkg = first.node("pkg").expect("pkg node");
    assert_eq!(pkg.status(), BinaryStatus::Build);
    assert_eq!(first.outcome(), Outcome::Ready);

    // the build lands in the local cache
    ctx.local.insert(requested_key(pkg)).await;
    let second = ctx.resolve(&create("Linux")).await.expect("resolves");
    let again = second.node("pkg").expect("pkg node");
    assert_eq!(again.status(), BinaryStatus::Cache);
    assert_eq!(again.package_id, pkg.package_id);

    let windows = ctx.resolve(&create("Windows")).await.expect("resolves");
    let pkg = windows.node("pkg").expect("pkg node");
    assert_eq!(pkg.status(), BinaryStatus::Invalid);
    assert_eq!(pkg.invalid, Some(InvalidReason::Own("Windows not supported".to_string())));
    assert_eq!(windows.outcome(), Outcome::InvalidPackages);
    assert_eq!(ExitStatus::from_result(&Ok(windows)), ExitStatus::InvalidConfiguration);
}

#[tokio::test]
async fn test_compatible_binary_rescues_invalid_configuration() {
    let recipe = linux_only()
        .on_compatibility(|ctx| match ctx.setting("os") {
            Some("Windows") => Ok(vec![CompatibilityCandidate::new().setting("os", "Linux")]),
            _ => Ok(Vec::new()),
        });
    let ctx = TestContext::new().with(recipe);

    let linux = ctx.resolve(&create("Linux")).await.expect("resolves");
    let linux = linux.node("pkg").expect("pkg node").clone();
    ctx.local.insert(requested_key(&linux)).await;

    let windows = ctx.resolve(&create("Windows")).await.expect("resolves");
    let pkg = windows.node("pkg").expect("pkg node");
    assert_eq!(pkg.status(), BinaryStatus::Cache);
    assert_eq!(pkg.effective_package_id(), linux.package_id.as_ref());
    assert_ne!(pkg.package_id, linux.package_id);

    let fallback = pkg.fallback.as_ref().expect("fallback recorded");
    assert_eq!(Some(&fallback.requested), pkg.package_id.as_ref());
    assert_eq!(Some(&fallback.selected), linux.package_id.as_ref());
    assert_eq!(fallback.candidate_index, 0);

    // rescued: not part of the invalid set
    assert!(windows.invalid_nodes().is_empty());
    assert_eq!(windows.outcome(), Outcome::Ready);
    assert_eq!(ctx.reporter.fallbacks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_header_only_collapses_identity() {
    let recipe = Recipe::new(reference("headers/1.0"))
        .with_settings(&["os", "compiler"])
        .with_option("header_only", &["True", "False"], "False")
        .on_package_id(|info| {
            if info.options.get("header_only") == Some("True") {
                info.clear();
            }
            Ok(())
        });
    let ctx = TestContext::new().with(recipe);

    let request = |compiler: &str, header_only: &str| {
        ResolveRequest::create(reference("headers/1.0")).with_profile(
            Profile::new()
                .setting("os", "Linux")
                .setting("compiler", compiler)
                .option("header_only", header_only),
        )
    };
    let id = |resolution: &kiln_core::Resolution| {
        resolution
            .node("headers")
            .and_then(|n| n.package_id.clone())
            .expect("package ID")
    };

    let gcc = ctx.resolve(&request("gcc", "True")).await.expect("resolves");
    let clang = ctx.resolve(&request("clang", "True")).await.expect("resolves");
    assert_eq!(id(&gcc), id(&clang));
    assert!(gcc.node("headers").expect("node").info.is_empty());

    let gcc = ctx.resolve(&request("gcc", "False")).await.expect("resolves");
    let clang = ctx.resolve(&request("clang", "False")).await.expect("resolves");
    assert_ne!(id(&gcc), id(&clang));
}

async fn tool_id(ctx: &TestContext, os: &str, arch: &str) -> PackageId {
    let request = ResolveRequest::create(reference("tool/2.1"))
        .with_profile(Profile::new().setting("os", os).setting("arch", arch));
    let resolution = ctx.resolve(&request).await.expect("resolves");
    resolution
        .node("tool")
        .and_then(|n| n.package_id.clone())
        .expect("package ID")
}

#[tokio::test]
async fn test_removed_field_collapses_only_that_field() {
    let recipe = Recipe::new(reference("tool/2.1"))
        .with_settings(&["os", "arch"])
        .on_package_id(|info| {
            info.settings.remove("os");
            Ok(())
        });
    let ctx = TestContext::new().with(recipe);

    assert_eq!(
        tool_id(&ctx, "Linux", "x86_64").await,
        tool_id(&ctx, "Windows", "x86_64").await
    );
    assert_ne!(
        tool_id(&ctx, "Linux", "x86_64").await,
        tool_id(&ctx, "Linux", "armv8").await
    );
}

#[tokio::test]
async fn test_diamond_conflict_names_both_requesters() {
    let ctx = TestContext::new()
        .with(Recipe::new(reference("zlib/1.2.13")))
        .with(Recipe::new(reference("zlib/1.3.1")))
        .with(Recipe::new(reference("libpng/1.6")).with_requirement(Requirement::parse("zlib/1.2.13").unwrap()))
        .with(Recipe::new(reference("freetype/2.13")).with_requirement(Requirement::parse("zlib/1.3.1").unwrap()));

    let request = ResolveRequest::requires(requires(&["libpng/1.6", "freetype/2.13"]));
    let result = ctx.resolve(&request).await;
    assert_eq!(ExitStatus::from_result(&result), ExitStatus::UnsolvableGraph);

    let Err(ResolveError::Graph(GraphError::Conflict { package, first_by, second_by, .. })) = &result else {
        panic!("expected a conflict");
    };
    assert_eq!(package.as_str(), "zlib");
    assert_eq!(first_by, &reference("libpng/1.6"));
    assert_eq!(second_by, &reference("freetype/2.13"));
    let message = result.err().unwrap().to_string();
    assert!(message.contains("libpng/1.6"));
    assert!(message.contains("freetype/2.13"));
}

#[tokio::test]
async fn test_buildable_dependent_reported_with_invalid_dependency() {
    let ctx = TestContext::new()
        .with_mode(PackageIdMode::FullPackage)
        .with(
            Recipe::new(reference("dep/1.0"))
                .with_settings(&["os"])
                .on_validate(|ctx| match ctx.setting("os") {
                    Some("Windows") => Err(HookError::invalid("dep does not build on Windows")),
                    _ => Ok(()),
                }),
        )
        .with(
            Recipe::new(reference("app/1.0"))
                .with_settings(&["os"])
                .with_requirement(Requirement::parse("dep/1.0").unwrap()),
        );

    let request = ResolveRequest::create(reference("app/1.0"))
        .with_profile(Profile::new().setting("os", "Windows"))
        .with_policy(BuildPolicy::missing());
    let resolution = ctx.resolve(&request).await.expect("resolves");

    let app = resolution.node("app").expect("app node");
    let dep = resolution.node("dep").expect("dep node");
    assert_eq!(app.status(), BinaryStatus::Build);
    assert_eq!(dep.status(), BinaryStatus::Invalid);
    assert!(matches!(
        &app.invalid,
        Some(InvalidReason::Dependency { reference, .. }) if reference.name == "dep"
    ));

    // full package mode embeds the dependency's ID
    let rendered = app.info.requires.get("dep").expect("dep contribution");
    let dep_id = dep.package_id.as_ref().expect("dep ID").to_string();
    assert_eq!(rendered, format!("dep/1.0:{dep_id}"));

    let invalid: Vec<String> = resolution
        .invalid_nodes()
        .iter()
        .map(|n| n.reference.to_string())
        .collect();
    assert_eq!(invalid, vec!["app/1.0", "dep/1.0"]);
    assert_eq!(resolution.outcome(), Outcome::InvalidPackages);

    // without a build policy the dependent is invalid too
    let strict = ResolveRequest::create(reference("app/1.0"))
        .with_profile(Profile::new().setting("os", "Windows"));
    let resolution = ctx.resolve(&strict).await.expect("resolves");
    assert_eq!(resolution.node("app").expect("app").status(), BinaryStatus::Invalid);
}
