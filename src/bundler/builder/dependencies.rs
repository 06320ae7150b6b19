//! Building the products an app depends on.
//!
//! Root dependencies are targets of the package itself and are built with
//! cargo. Every other dependency belongs to a project: its sources are fetched
//! into `<dependencies>/<project>/source` and its builder script runs once per
//! project, writing into `<dependencies>/<project>/build`.

use crate::bundler::{
    BundlerContext, Error, Result,
    context::BuiltDependency,
    error::ErrorExt,
    toolchain::{CargoBuild, CargoTarget, ProjectBuild, Toolchain},
    utils::fs,
};
use crate::config::{
    ConfigurationError, Dependency, FlatProjectConfiguration, ProductConfiguration, ProductType,
};
use crate::metadata::CargoManifest;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// A dependency product and where it currently is.
pub type BuiltProducts = Vec<(Dependency, BuiltDependency)>;

/// Builds `target` for every architecture of the run and leaves the result at
/// `<products>/<file_name>`.
///
/// Several architectures are merged with `lipo`. With `skip_build` nothing is
/// built and the product must already exist.
pub async fn build_cargo_product<T: Toolchain>(
    toolchain: &T,
    ctx: &BundlerContext,
    target: CargoTarget,
    file_name: &str,
    skip_build: bool,
) -> Result<PathBuf> {
    let destination = ctx.directories.products.join(file_name);
    if skip_build {
        return expect_existing(&format!("'{file_name}' (--skip-build)"), destination);
    }

    let mut outputs = Vec::with_capacity(ctx.architectures.len());
    for arch in &ctx.architectures {
        let triple = ctx.platform().rust_target(*arch)?;
        let output = ctx
            .directories
            .scratch
            .join(&triple)
            .join(ctx.configuration.directory_name())
            .join(file_name);

        toolchain
            .cargo_build(&CargoBuild {
                manifest_dir: ctx.directories.package.clone(),
                target_dir: ctx.directories.scratch.clone(),
                target: target.clone(),
                configuration: ctx.configuration,
                triple,
                output: output.clone(),
            })
            .await?;
        outputs.push(output);
    }

    match outputs.as_slice() {
        [single] if *single == destination => {}
        [single] => fs::copy_file(single, &destination).await?,
        several => toolchain.lipo(several, &destination).await?,
    }
    Ok(destination)
}

fn expect_existing(description: &str, path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(Error::MissingArtifact {
            description: description.to_string(),
            path,
        })
    }
}

/// File a project product is expected at after its builder ran.
pub fn project_product_path(
    ctx: &BundlerContext,
    build_dir: &Path,
    name: &str,
    product: &ProductConfiguration,
) -> PathBuf {
    let directory = match &product.output_directory {
        Some(dir) => build_dir.join(dir),
        None => build_dir.to_path_buf(),
    };
    let platform = ctx.platform();
    let file_name = match product.kind {
        ProductType::Executable => format!("{name}{}", platform.executable_suffix()),
        ProductType::DynamicLibrary => platform.dynamic_library_name(name),
        ProductType::StaticLibrary => platform.static_library_name(name),
    };
    directory.join(file_name)
}

/// How a root dependency is built and what it produces.
fn root_product(
    ctx: &BundlerContext,
    manifest: &CargoManifest,
    dependency: &Dependency,
) -> Result<(CargoTarget, ProductType, String)> {
    let product = &dependency.product;
    let platform = ctx.platform();

    if manifest.has_binary(product) {
        return Ok((
            CargoTarget::Bin(product.clone()),
            ProductType::Executable,
            format!("{product}{}", platform.executable_suffix()),
        ));
    }

    if let Some(library) = &manifest.library
        && library.name == product.replace('-', "_")
    {
        if manifest.library_has_crate_type("cdylib") || manifest.library_has_crate_type("dylib")
        {
            return Ok((
                CargoTarget::Lib,
                ProductType::DynamicLibrary,
                platform.dynamic_library_name(&library.name),
            ));
        }
        if manifest.library_has_crate_type("staticlib") {
            return Ok((
                CargoTarget::Lib,
                ProductType::StaticLibrary,
                platform.static_library_name(&library.name),
            ));
        }
        return Err(Error::InvalidArguments(format!(
            "dependency '{dependency}' is a library without a cdylib, dylib or staticlib crate-type"
        )));
    }

    let mut available = manifest.binaries.clone();
    available.extend(manifest.library.iter().map(|library| library.name.clone()));
    Err(ConfigurationError::UnknownDependency {
        app: ctx.app_name.clone(),
        dependency: dependency.clone(),
        available,
    }
    .into())
}

/// Builds (or, with `skip_build`, locates) every dependency of the app.
///
/// Products are returned in dependency order; nothing is recorded in `ctx`
/// yet because dynamic libraries still move into the products directory.
pub async fn build_dependencies<T: Toolchain>(
    toolchain: &T,
    ctx: &BundlerContext,
    projects: &BTreeMap<String, FlatProjectConfiguration>,
    manifest: &CargoManifest,
    skip_build: bool,
) -> Result<BuiltProducts> {
    let mut built = Vec::new();
    let mut by_project: BTreeMap<&str, Vec<&Dependency>> = BTreeMap::new();

    for dependency in &ctx.app.dependencies {
        if dependency.is_root() {
            let (target, kind, file_name) = root_product(ctx, manifest, dependency)?;
            log::info!("Building dependency '{}'", dependency);
            let path = build_cargo_product(toolchain, ctx, target, &file_name, skip_build).await?;
            built.push((dependency.clone(), BuiltDependency { kind, path }));
        } else {
            by_project
                .entry(dependency.project.as_str())
                .or_default()
                .push(dependency);
        }
    }

    for (name, dependencies) in by_project {
        let project = projects.get(name).ok_or_else(|| ConfigurationError::UnknownDependency {
            app: ctx.app_name.clone(),
            dependency: dependencies[0].clone(),
            available: projects.keys().cloned().collect(),
        })?;
        built.extend(build_project(toolchain, ctx, name, project, &dependencies, skip_build).await?);
    }

    Ok(built)
}

async fn build_project<T: Toolchain>(
    toolchain: &T,
    ctx: &BundlerContext,
    name: &str,
    project: &FlatProjectConfiguration,
    dependencies: &[&Dependency],
    skip_build: bool,
) -> Result<BuiltProducts> {
    let project_dir = ctx.directories.dependencies.join(name);
    let build_dir = project_dir.join("build");

    let mut products = Vec::with_capacity(dependencies.len());
    for dependency in dependencies {
        let product = project.products.get(&dependency.product).ok_or_else(|| {
            ConfigurationError::UnknownDependency {
                app: ctx.app_name.clone(),
                dependency: (*dependency).clone(),
                available: project.products.keys().cloned().collect(),
            }
        })?;
        let path = project_product_path(ctx, &build_dir, &dependency.product, product);
        products.push(((*dependency).clone(), BuiltDependency { kind: product.kind, path }));
    }

    if skip_build {
        for (dependency, product) in &products {
            expect_existing(
                &format!("product of dependency '{dependency}' (--skip-build)"),
                product.path.clone(),
            )?;
        }
        return Ok(products);
    }

    let source_dir = project
        .source
        .fetch(
            &ctx.directories.package,
            &project_dir.join("source"),
            project.revision.as_deref(),
        )
        .await?;

    let builder = source_dir.join(&project.builder.name);
    if !builder.is_file() {
        return Err(Error::MissingArtifact {
            description: format!("builder script of project '{name}'"),
            path: builder,
        });
    }

    tokio::fs::create_dir_all(&build_dir)
        .await
        .fs_context("creating project build directory", &build_dir)?;

    // Projects are built once, for the first architecture of the run.
    let arch = ctx
        .architectures
        .first()
        .copied()
        .ok_or_else(|| Error::ArchError("no architecture selected".to_string()))?;

    log::info!("Building project '{}'", name);
    toolchain
        .run_builder(&ProjectBuild {
            name: name.to_string(),
            builder,
            source_dir,
            build_dir,
            configuration: ctx.configuration,
            platform: ctx.platform(),
            triple: ctx.platform().rust_target(arch)?,
            outputs: products.iter().map(|(_, built)| built.path.clone()).collect(),
        })
        .await?;
    log::info!("✓ Built project '{}'", name);

    Ok(products)
}

/// Copies dynamic libraries next to the main product and records every
/// dependency in `ctx`, libraries at their copied location.
pub async fn install_dependencies(ctx: &mut BundlerContext, built: BuiltProducts) -> Result<()> {
    for (dependency, mut product) in built {
        if product.kind == ProductType::DynamicLibrary
            && let Some(file_name) = product.path.file_name()
        {
            let destination = ctx.directories.products.join(file_name);
            if destination != product.path {
                log::debug!("Copying {} to {}", product.path.display(), destination.display());
                fs::copy_file(&product.path, &destination).await?;
            }
            product.path = destination;
        }
        ctx.insert_built_dependency(dependency, product)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{context::tests::context, target::Platform, toolchain::FakeToolchain};
    use crate::config::{BuilderConfiguration, BuilderKind};
    use crate::metadata::{LibraryTarget, PackageMetadata};
    use crate::source::ProjectSource;

    fn manifest() -> CargoManifest {
        CargoManifest {
            metadata: PackageMetadata {
                name: "hello".into(),
                description: "Says hello".into(),
                version: "1.2.3".into(),
                authors: vec![],
                license: None,
                homepage: None,
            },
            binaries: vec!["hello".into(), "helper".into()],
            library: Some(LibraryTarget {
                name: "greeter".into(),
                crate_types: vec!["cdylib".into()],
            }),
        }
    }

    fn local_project(dir: &Path) -> FlatProjectConfiguration {
        std::fs::create_dir_all(dir.join("vendor/tools")).unwrap();
        std::fs::write(dir.join("vendor/tools/Builder.rs"), "fn main() {}").unwrap();
        FlatProjectConfiguration {
            source: ProjectSource::Local(PathBuf::from("vendor/tools")),
            revision: None,
            builder: BuilderConfiguration {
                name: "Builder.rs".into(),
                kind: BuilderKind::WholeProject,
            },
            products: BTreeMap::from([
                (
                    "greet".to_string(),
                    ProductConfiguration {
                        kind: ProductType::DynamicLibrary,
                        output_directory: Some(PathBuf::from("out")),
                    },
                ),
                (
                    "tool".to_string(),
                    ProductConfiguration {
                        kind: ProductType::Executable,
                        output_directory: None,
                    },
                ),
            ]),
        }
    }

    #[tokio::test]
    async fn builds_root_and_project_products() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.app.dependencies = vec![
            Dependency::new("root", "helper"),
            Dependency::new("tools", "greet"),
            Dependency::new("tools", "tool"),
            Dependency::new("root", "greeter"),
        ];
        let projects = BTreeMap::from([("tools".to_string(), local_project(dir.path()))]);
        let toolchain = FakeToolchain::new(Platform::Linux);

        let built = build_dependencies(&toolchain, &ctx, &projects, &manifest(), false)
            .await
            .unwrap();

        assert_eq!(
            toolchain.calls(),
            vec![
                "cargo_build bin helper x86_64-unknown-linux-gnu",
                "cargo_build lib x86_64-unknown-linux-gnu",
                "run_builder tools",
            ]
        );
        let build_dir = ctx.directories.dependencies.join("tools/build");
        assert_eq!(built.len(), 4);
        assert_eq!(built[2].1.path, build_dir.join("out/libgreet.so"));
        assert_eq!(built[3].1.path, build_dir.join("tool"));

        install_dependencies(&mut ctx, built).await.unwrap();
        let libraries: Vec<PathBuf> = ctx.dynamic_libraries().map(|l| l.path.clone()).collect();
        assert_eq!(
            libraries,
            vec![
                ctx.directories.products.join("libgreeter.so"),
                ctx.directories.products.join("libgreet.so"),
            ]
        );
        assert!(ctx.directories.products.join("libgreet.so").is_file());
    }

    #[tokio::test]
    async fn skip_build_requires_existing_products() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.app.dependencies = vec![Dependency::new("root", "helper")];
        let toolchain = FakeToolchain::new(Platform::Linux);

        let err = build_dependencies(&toolchain, &ctx, &BTreeMap::new(), &manifest(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingArtifact { .. }));
        assert!(toolchain.calls().is_empty());

        std::fs::create_dir_all(&ctx.directories.products).unwrap();
        std::fs::write(ctx.directories.products.join("helper"), b"bin").unwrap();
        let built = build_dependencies(&toolchain, &ctx, &BTreeMap::new(), &manifest(), true)
            .await
            .unwrap();
        assert_eq!(built[0].1.kind, ProductType::Executable);
    }

    #[tokio::test]
    async fn unknown_root_products_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.app.dependencies = vec![Dependency::new("root", "missing")];
        let toolchain = FakeToolchain::new(Platform::Linux);

        let err = build_dependencies(&toolchain, &ctx, &BTreeMap::new(), &manifest(), false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::UnknownDependency { .. })
        ));
    }

    #[tokio::test]
    async fn universal_products_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.device = crate::bundler::device::Device::Host(Platform::MacOs);
        ctx.architectures = vec![
            crate::bundler::target::Arch::AArch64,
            crate::bundler::target::Arch::X86_64,
        ];
        let toolchain = FakeToolchain::new(Platform::MacOs);

        let path = build_cargo_product(
            &toolchain,
            &ctx,
            CargoTarget::Bin("hello".into()),
            "hello",
            false,
        )
        .await
        .unwrap();

        assert_eq!(path, ctx.directories.products.join("hello"));
        assert_eq!(toolchain.calls().last().map(String::as_str), Some("lipo 2"));
        assert!(path.is_file());
    }
}
