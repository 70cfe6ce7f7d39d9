//! Subcommand bodies. `main.rs` only parses argv and dispatches here.

use std::collections::{BTreeSet, HashMap};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use bpt_diagnostics::{BptError, Cancellation};
use bpt_lockfile::CatalogDb;
use bpt_manifest::{parse_pkg_json, write_pkg_json, ProjectManifest};
use bpt_types::{Dependency, Name, PackageId, PackageMeta, Version};
use tracing::info;

use crate::ui;

fn to_bpt(message: impl std::fmt::Display) -> BptError {
    BptError::Generic(message.to_string())
}

fn io(path: &Path, source: std::io::Error) -> BptError {
    BptError::io(path.display().to_string(), source)
}

/// Default location of the user-wide catalog database: `<data dir>/catalog.db`.
fn default_catalog_path() -> Result<PathBuf, BptError> {
    let dirs = directories::ProjectDirs::from("dev", "bpt", "bpt")
        .ok_or_else(|| BptError::Generic("no data directory could be determined for this platform".into()))?;
    let dir = dirs.data_dir();
    std::fs::create_dir_all(dir).map_err(|e| io(dir, e))?;
    Ok(dir.join("catalog.db"))
}

fn open_catalog() -> Result<CatalogDb, BptError> {
    CatalogDb::open(&default_catalog_path()?).map_err(to_bpt)
}

fn load_manifest(path: Option<&Path>) -> Result<(ProjectManifest, PathBuf), BptError> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("bpt.yaml"));
    let manifest = ProjectManifest::load(&path).map_err(to_bpt)?;
    Ok((manifest, path))
}

fn manifest_to_meta(manifest: &ProjectManifest, revision: u32) -> Result<PackageMeta, BptError> {
    let name = manifest.name.clone().ok_or_else(|| BptError::manifest("missing 'name'"))?;
    let version = manifest.version.clone().ok_or_else(|| BptError::manifest("missing 'version'"))?;
    Ok(PackageMeta {
        id: PackageId::new(name, version, revision),
        libraries: manifest.libraries.clone(),
        meta: serde_json::Value::Null,
        extra: serde_json::Value::Null,
    })
}

// ---------------------------------------------------------------- repo ----

pub fn repo_ls() -> Result<(), BptError> {
    let catalog = open_catalog()?;
    for (name, url) in catalog.remotes().map_err(to_bpt)? {
        println!("{name}\t{url}");
    }
    Ok(())
}

pub fn repo_init() -> Result<(), BptError> {
    let path = default_catalog_path()?;
    open_catalog()?;
    ui::success(format!("initialized catalog at {}", path.display()));
    Ok(())
}

pub fn repo_add(name: &str, url: &str) -> Result<(), BptError> {
    let mut catalog = open_catalog()?;
    catalog.add_remote(name, url).map_err(to_bpt)?;
    info!(remote = %name, url = %url, "added remote");
    Ok(())
}

pub fn repo_remove(name: &str) -> Result<(), BptError> {
    let mut catalog = open_catalog()?;
    catalog.remove_remote(name).map_err(to_bpt)?;
    Ok(())
}

/// Imports every sdist (a directory with a `pkg.json`) found under `dir`
/// directly into the catalog, bypassing any remote — matches the local
/// `repo import` workflow of adding packages you've built yourself.
pub fn repo_import(dir: &Path) -> Result<(), BptError> {
    let mut catalog = open_catalog()?;
    let mut count = 0;
    for entry in walkdir::WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if entry.file_name() != "pkg.json" {
            continue;
        }
        let contents = std::fs::read_to_string(entry.path()).map_err(|e| io(entry.path(), e))?;
        let meta = match parse_pkg_json(&contents) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping unreadable pkg.json");
                continue;
            }
        };
        catalog.store(&meta, None).map_err(to_bpt)?;
        count += 1;
    }
    ui::success(format!("imported {count} package(s) from {}", dir.display()));
    Ok(())
}

pub async fn repo_refresh() -> Result<(), BptError> {
    let mut catalog = open_catalog()?;
    bpt_lockfile::update_all_remotes(&mut catalog).await.map_err(to_bpt)
}

// ----------------------------------------------------------------- pkg ----

pub fn pkg_init_db(path: &Path) -> Result<(), BptError> {
    CatalogDb::open(path).map_err(to_bpt)?;
    println!("initialized catalog at {}", path.display());
    Ok(())
}

pub fn pkg_search(name: &str) -> Result<(), BptError> {
    let catalog = open_catalog()?;
    let name = Name::parse(name).map_err(|e| BptError::manifest(e.to_string()))?;
    let found = catalog.by_name(&name).map_err(to_bpt)?;
    if found.is_empty() {
        let all = catalog.all().map_err(to_bpt)?;
        let known: Vec<&str> = all.iter().map(|m| m.id.name.as_str()).collect();
        let suggestion = bpt_manifest::closest_match(name.as_str(), &known).unwrap_or("<none>");
        return Err(BptError::package_not_found(name.as_str(), suggestion));
    }
    for meta in found {
        println!("{}", meta.id);
    }
    Ok(())
}

pub async fn pkg_get(name: &str, version: Option<&str>, dest: &Path) -> Result<(), BptError> {
    let catalog = open_catalog()?;
    let name = Name::parse(name).map_err(|e| BptError::manifest(e.to_string()))?;
    let version = version.map(Version::parse).transpose().map_err(|e| BptError::manifest(e.to_string()))?;
    let meta = catalog
        .for_package(&name, version.as_ref())
        .map_err(to_bpt)?
        .ok_or_else(|| BptError::package_not_found(name.as_str(), "<none>"))?;
    materialize_one(&catalog, &meta.id, dest).await?;
    ui::success(format!("fetched {} into {}", ui::pkg(&meta.id), dest.display()));
    Ok(())
}

pub fn pkg_create(project_dir: &Path, dest: &Path) -> Result<(), BptError> {
    let (manifest, _) = load_manifest(Some(&project_dir.join("bpt.yaml")))?;
    let meta = manifest_to_meta(&manifest, 1)?;
    bpt_sdist::SourceDist::create(project_dir, &meta, dest).map_err(to_bpt)?;
    ui::success(format!("created package at {}", dest.display()));
    Ok(())
}

// --------------------------------------------------------------- sdist ----

pub fn sdist_create(project_dir: &Path, out_path: &Path) -> Result<(), BptError> {
    let (manifest, _) = load_manifest(Some(&project_dir.join("bpt.yaml")))?;
    let meta = manifest_to_meta(&manifest, 1)?;
    let scratch = tempfile::tempdir().map_err(|e| io(project_dir, e))?;
    let sdist = bpt_sdist::SourceDist::create(project_dir, &meta, scratch.path()).map_err(to_bpt)?;
    sdist.pack_targz(out_path).map_err(to_bpt)?;
    ui::success(format!("wrote {}", out_path.display()));
    Ok(())
}

/// Regenerates `pkg.json` for an already-materialized sdist directory from
/// its project's current manifest, without re-copying source files.
pub fn sdist_regen(sdist_dir: &Path, project_dir: &Path) -> Result<(), BptError> {
    let existing = bpt_sdist::SourceDist::load(sdist_dir).map_err(to_bpt)?;
    let (manifest, _) = load_manifest(Some(&project_dir.join("bpt.yaml")))?;
    let meta = manifest_to_meta(&manifest, existing.meta.id.revision)?;
    let json = write_pkg_json(&meta).map_err(to_bpt)?;
    std::fs::write(sdist_dir.join("pkg.json"), json).map_err(|e| io(sdist_dir, e))?;
    ui::success(format!("regenerated {}", sdist_dir.join("pkg.json").display()));
    Ok(())
}

// ----------------------------------------------------------- new/init -----

pub fn new_project(name: &str, dir: Option<&Path>) -> Result<(), BptError> {
    let name = Name::parse(name).map_err(|e| BptError::manifest(e.to_string()))?;
    let root = dir.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(name.as_str()));
    std::fs::create_dir_all(root.join(name.as_str()).join("src")).map_err(|e| io(&root, e))?;
    std::fs::create_dir_all(root.join(name.as_str()).join("include").join(name.as_str()))
        .map_err(|e| io(&root, e))?;
    std::fs::write(
        root.join("bpt.yaml"),
        format!("name: {name}\nversion: 0.1.0\nnamespace: {name}\n"),
    )
    .map_err(|e| io(&root, e))?;
    std::fs::write(
        root.join(name.as_str()).join("src").join(format!("{name}.test.cpp")),
        "#include <catch2/catch.hpp>\n\nTEST_CASE(\"it builds\") { REQUIRE(true); }\n",
    )
    .map_err(|e| io(&root, e))?;
    ui::success(format!("created new project '{}' in {}", ui::pkg(&name), root.display()));
    Ok(())
}

// --------------------------------------------------------- materialize ----

/// Ensures `id` is present in the local cache, fetching it from its
/// recorded remote if not, and returns the materialized sdist.
async fn materialize_one(
    catalog: &CatalogDb,
    id: &PackageId,
    scratch_hint: &Path,
) -> Result<bpt_sdist::SourceDist, BptError> {
    let cache = bpt_cache::LocalCache::open().map_err(to_bpt)?;
    if let Some(sdist) = cache.get(id).map_err(to_bpt)? {
        return Ok(sdist);
    }

    let (remote_url, _remote_name, remote_base) = catalog
        .remote_of(id)
        .map_err(to_bpt)?
        .ok_or_else(|| BptError::network(format!("no remote recorded for {id}")))?;
    let origin = bpt_fetch::RemoteOrigin::parse(&remote_url, &remote_base, id)
        .unwrap_or(bpt_fetch::RemoteOrigin::DdsHttp { remote_base, id: id.clone() });

    let raw_dir = scratch_hint.join(format!(".fetch-{}-{}", id.name, id.version));
    origin.get_raw_directory(&raw_dir).await.map_err(to_bpt)?;

    let sdist = cache.import(id, &raw_dir, false).map_err(to_bpt)?;
    let _ = std::fs::remove_dir_all(&raw_dir);
    Ok(sdist)
}

/// Resolves `manifest`'s root dependencies and ensures every resolved
/// package is present in the local cache, fetching any that are missing.
/// Returns the resolved set alongside each one's materialized sdist.
async fn resolve_and_materialize(
    manifest: &ProjectManifest,
    cancellation: &Cancellation,
) -> Result<Vec<(PackageId, bpt_sdist::SourceDist)>, BptError> {
    let catalog = open_catalog()?;
    let resolved =
        bpt_resolver::resolve_with_cancellation(&catalog, manifest.dependencies.clone(), cancellation.clone())
            .map_err(to_bpt)?;

    let scratch = tempfile::tempdir().map_err(|e| io(Path::new("."), e))?;
    let mut out = Vec::new();
    for pkg in &resolved {
        cancellation.check()?;
        let spinner = indicatif::ProgressBar::new_spinner();
        spinner.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner} materializing {msg}")
                .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
        );
        spinner.set_message(pkg.id.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));

        let sdist = materialize_one(&catalog, &pkg.id, scratch.path()).await?;
        spinner.finish_and_clear();
        out.push((pkg.id.clone(), sdist));
    }
    Ok(out)
}

/// Flattens one set of dependency specs into the concrete sibling-library
/// names a depender `uses`, given each dependency's resolved metadata.
fn flatten_uses(deps: &[Dependency], metas: &HashMap<Name, &PackageMeta>) -> Vec<Name> {
    let mut out = Vec::new();
    for dep in deps {
        let Some(meta) = metas.get(&dep.name) else { continue };
        let all: Vec<Name> = meta.libraries.iter().map(|l| l.name.clone()).collect();
        for n in dep.uses.resolve(&all) {
            if !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

/// Builds the `bpt-build::LibraryBuildInput` list for every resolved
/// dependency's libraries, in resolution order (already a valid
/// dependency-first order: the resolver never returns a package before
/// everything it needs).
fn dependency_build_inputs(
    materialized: &[(PackageId, bpt_sdist::SourceDist)],
    out_root: &Path,
    warnings: bool,
) -> Vec<bpt_build::LibraryBuildInput> {
    let metas: HashMap<Name, &PackageMeta> =
        materialized.iter().map(|(id, sdist)| (id.name.clone(), &sdist.meta)).collect();

    let mut inputs = Vec::new();
    for (id, sdist) in materialized {
        for lib in &sdist.meta.libraries {
            let uses = flatten_uses(&lib.dependencies, &metas);
            inputs.push(bpt_build::LibraryBuildInput {
                info: lib.clone(),
                root_dir: sdist.root.clone(),
                qualifier: lib.name.clone(),
                uses,
                external_include_dirs: Vec::new(),
                test_extra_uses: Vec::new(),
                test_extra_include_dirs: Vec::new(),
                build_tests: false,
                build_apps: false,
                warnings,
                out_dir: out_root.join("_deps").join(id.to_string()).join(lib.name.as_str()),
            });
        }
    }
    inputs
}

fn root_build_inputs(
    manifest: &ProjectManifest,
    root_dir: &Path,
    materialized: &[(PackageId, bpt_sdist::SourceDist)],
    out_root: &Path,
    build_tests: bool,
    warnings: bool,
) -> Vec<bpt_build::LibraryBuildInput> {
    let metas: HashMap<Name, &PackageMeta> =
        materialized.iter().map(|(id, sdist)| (id.name.clone(), &sdist.meta)).collect();

    let mut own = BTreeSet::new();
    for dep in &manifest.dependencies {
        let Some(meta) = metas.get(&dep.name) else { continue };
        let all: Vec<Name> = meta.libraries.iter().map(|l| l.name.clone()).collect();
        own.extend(dep.uses.resolve(&all));
    }

    manifest
        .libraries
        .iter()
        .map(|lib| {
            let mut uses = flatten_uses(&lib.dependencies, &metas);
            for n in &own {
                if !uses.contains(n) {
                    uses.push(n.clone());
                }
            }
            bpt_build::LibraryBuildInput {
                info: lib.clone(),
                root_dir: root_dir.to_path_buf(),
                qualifier: lib.name.clone(),
                uses,
                external_include_dirs: Vec::new(),
                test_extra_uses: Vec::new(),
                test_extra_include_dirs: Vec::new(),
                build_tests,
                build_apps: true,
                warnings,
                out_dir: out_root.join(lib.name.as_str()),
            }
        })
        .collect()
}

fn detect_toolchain() -> Result<bpt_build::Toolchain, BptError> {
    let platform = bpt_platform::PlatformInfo::detect();
    let key = bpt_platform::default_toolchain_key(&platform).map_err(to_bpt)?;
    bpt_build::get_builtin(&key)
        .ok_or_else(|| BptError::Generic(format!("no builtin toolchain for detected key '{key}'")))
}

// ---------------------------------------------------------------- build ----

pub async fn install(manifest_path: Option<&Path>, cancellation: Cancellation) -> Result<(), BptError> {
    let (manifest, path) = load_manifest(manifest_path)?;
    let materialized = resolve_and_materialize(&manifest, &cancellation).await?;
    let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

    let lock_entries: Vec<_> = materialized.iter().map(|(id, _)| id.to_string()).collect();
    let lock_json = serde_json::to_string_pretty(&lock_entries).map_err(|e| to_bpt(e))?;
    std::fs::write(root.join("bpt-lock.json"), lock_json).map_err(|e| io(&root, e))?;

    ui::success(format!("installed {} package(s)", materialized.len()));
    Ok(())
}

pub async fn build(
    manifest_path: Option<&Path>,
    jobs: Option<usize>,
    run_tests: bool,
    cancellation: Cancellation,
) -> Result<(), BptError> {
    let (manifest, path) = load_manifest(manifest_path)?;
    let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let out_root = root.join("_build");

    let materialized = resolve_and_materialize(&manifest, &cancellation).await?;
    let toolchain = detect_toolchain()?;

    let mut libs = dependency_build_inputs(&materialized, &out_root, true);
    libs.extend(root_build_inputs(&manifest, &root, &materialized, &out_root, true, true));

    std::fs::create_dir_all(&out_root).map_err(|e| io(&out_root, e))?;
    let mut db = bpt_build::BuildDb::open(&out_root.join("build.db")).map_err(to_bpt)?;
    let options = bpt_build::BuildOptions {
        jobs: jobs.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)),
        run_tests,
        tty: std::io::stdout().is_terminal(),
    };
    let result = bpt_build::run_build(&mut db, &toolchain, &libs, &root, &options, &cancellation)
        .map_err(to_bpt)?;

    for failure in result.compile_report.failures.iter().chain(result.archive_failures.iter()).chain(result.link_failures.iter()) {
        ui::fail(format!("{}: {}", failure.output.display(), failure.captured_output.trim()));
    }
    for test in &result.test_results {
        if test.passed {
            ui::success(format!("{} ... ok", test.binary.display()));
        } else {
            ui::fail(format!("{} ... FAILED", test.binary.display()));
        }
    }

    if !result.build_ok() {
        return Err(BptError::Generic("build failed".to_string()));
    }
    ui::success("build finished");
    Ok(())
}

pub async fn build_deps(
    manifest_path: Option<&Path>,
    jobs: Option<usize>,
    cancellation: Cancellation,
) -> Result<(), BptError> {
    let (manifest, path) = load_manifest(manifest_path)?;
    let root = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let out_root = root.join("_build");

    let materialized = resolve_and_materialize(&manifest, &cancellation).await?;
    let toolchain = detect_toolchain()?;
    let libs = dependency_build_inputs(&materialized, &out_root, false);

    std::fs::create_dir_all(&out_root).map_err(|e| io(&out_root, e))?;
    let mut db = bpt_build::BuildDb::open(&out_root.join("build.db")).map_err(to_bpt)?;
    let options = bpt_build::BuildOptions {
        jobs: jobs.unwrap_or(4),
        run_tests: false,
        tty: false,
    };
    let result = bpt_build::run_build(&mut db, &toolchain, &libs, &root, &options, &cancellation)
        .map_err(to_bpt)?;
    if !result.build_ok() {
        return Err(BptError::Generic("dependency build failed".to_string()));
    }
    ui::success(format!("built {} dependency library(ies)", result.libraries.len()));
    Ok(())
}

pub fn compile_file(
    source: &Path,
    output: &Path,
    include_dirs: &[PathBuf],
    cancellation: Cancellation,
) -> Result<(), BptError> {
    let toolchain = detect_toolchain()?;
    let mut db = bpt_build::BuildDb::open_in_memory().map_err(to_bpt)?;
    let report = bpt_build::compile_one_file(
        &mut db,
        &toolchain,
        source,
        output,
        include_dirs,
        Path::new("."),
        &cancellation,
    )
    .map_err(to_bpt)?;
    if !report.ok() {
        for failure in &report.failures {
            ui::fail(failure.captured_output.trim());
        }
        return Err(BptError::Generic("compile failed".to_string()));
    }
    Ok(())
}
