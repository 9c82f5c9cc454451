/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::installer
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Drive one zypper patch run end to end: reduce the update
    request, plan the alternate-root upgrade, execute it via
    the build engine, compose the resulting layers, and verify
    the installed versions.

  Security / Safety Notes:
    Structural failures (missing manifest, missing RPM
    database, executor errors) are never softened by
    ignore-errors.

  Dependencies:
    async-trait for the backend seam, tokio for cancellation.

  Operational Scope:
    Entry point for callers patching RPM-based images whose
    target filesystem lacks zypper.

  Revision History:
    2025-11-12 COD  Authored zypper installer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Strictly sequential stages within one run
    - Cancellation honoured before and during execution
============================================================*/

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::composer::{compose, strip_manifest, PatchLineage};
use crate::engine::BuildEngine;
use crate::error::{PatchError, Result};
use crate::logger::PatchLog;
use crate::plan::{build_plan, PlanLayout, NO_DATABASE_EXIT_CODE};
use crate::tooling::ToolingSelector;
use crate::updates::{reduce_updates, UpdateManifest};
use crate::validate::validate_package_versions;
use crate::version::VersionComparer;

/// Image being patched, plus the result of any earlier run on it.
#[derive(Debug, Clone)]
pub struct PatchTarget<S> {
    pub image_state: S,
    pub patched_state: Option<S>,
    pub os_type: String,
    pub os_version: String,
}

/// Result of a patch run.
#[derive(Debug, Clone)]
pub struct InstallOutcome<S> {
    pub state: S,
    /// Set only under ignore-errors when some packages fell short.
    pub failed: Option<Vec<String>>,
}

/// A package-manager backend able to patch an image.
#[async_trait]
pub trait PackageManager: Send + Sync {
    type State: Clone + Send + Sync;

    async fn install_updates(
        &self,
        manifest: Option<&UpdateManifest>,
        ignore_errors: bool,
        cancel: &CancelSignal,
    ) -> Result<InstallOutcome<Self::State>>;

    fn package_type(&self) -> &'static str;
}

/// zypper backend operating on an alternate root.
pub struct RpmZypperManager<'a, E: BuildEngine> {
    engine: &'a E,
    target: PatchTarget<E::State>,
    layout: PlanLayout,
    tooling: ToolingSelector,
    extra_env: BTreeMap<String, String>,
    log: &'a dyn PatchLog,
}

impl<'a, E: BuildEngine> RpmZypperManager<'a, E> {
    pub fn new(engine: &'a E, target: PatchTarget<E::State>, log: &'a dyn PatchLog) -> Self {
        Self {
            engine,
            target,
            layout: PlanLayout::default(),
            tooling: ToolingSelector::default(),
            extra_env: BTreeMap::new(),
            log,
        }
    }

    pub fn with_layout(mut self, layout: PlanLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_tooling(mut self, tooling: ToolingSelector) -> Self {
        self.tooling = tooling;
        self
    }

    /// Extra environment (proxy settings) for the tooling container.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.extra_env = env;
        self
    }

    async fn run(
        &self,
        manifest: Option<&UpdateManifest>,
        ignore_errors: bool,
        cancel: &CancelSignal,
    ) -> Result<InstallOutcome<E::State>> {
        let manifest = manifest.ok_or(PatchError::NilManifest)?;
        let comparer = VersionComparer::rpm();

        let updates = reduce_updates(&manifest.updates, &comparer, ignore_errors, self.log)?;
        if updates.is_empty() {
            self.log
                .warn("EMPTY", "No update packages were specified to apply", &[]);
            return Ok(InstallOutcome {
                state: self.target.image_state.clone(),
                failed: None,
            });
        }
        self.log.debug(
            "UPDATES",
            "Latest unique RPMs",
            &[
                ("count", updates.len().to_string()),
                ("packages", updates.names().collect::<Vec<_>>().join(",")),
            ],
        );

        let tooling_image =
            self.tooling
                .select(&self.target.os_type, &self.target.os_version, self.log);
        let plan = build_plan(&updates, &tooling_image, &self.layout, &self.extra_env)?;

        if cancel.is_cancelled() {
            return Err(PatchError::Cancelled);
        }
        let executed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PatchError::Cancelled),
            result = async {
                let tooling = self.engine.resolve_image(&plan.tooling_image).await?;
                self.engine
                    .execute(&tooling, &plan, &self.target.image_state)
                    .await
            } => result.map_err(|err| self.classify_execution_error(err))?,
        };

        let manifest_bytes = self
            .engine
            .extract_file(&executed, &plan.manifest_output_path)
            .await
            .map_err(|err| match err {
                PatchError::ExtractionFailure { .. } => err,
                other => PatchError::ExtractionFailure {
                    path: plan.manifest_output_path.clone(),
                    reason: other.to_string(),
                },
            })?;

        let stripped = strip_manifest(self.engine, &executed, &plan.manifest_output_path);
        let lineage = PatchLineage::from_prior(self.target.patched_state.clone());
        let state = compose(
            self.engine,
            &self.target.image_state,
            &stripped,
            &lineage,
            self.log,
        );

        let failed = validate_package_versions(
            &updates,
            &comparer,
            &manifest_bytes,
            ignore_errors,
            self.log,
        )?;

        Ok(InstallOutcome {
            state,
            failed: if failed.is_empty() { None } else { Some(failed) },
        })
    }

    fn classify_execution_error(&self, err: PatchError) -> PatchError {
        match err {
            PatchError::ExecutionFailure { status, .. } if status == NO_DATABASE_EXIT_CODE => {
                PatchError::NoDatabaseFound {
                    path: self.layout.rpm_db_dir_path(),
                }
            }
            other => other,
        }
    }
}

#[async_trait]
impl<'a, E: BuildEngine> PackageManager for RpmZypperManager<'a, E> {
    type State = E::State;

    async fn install_updates(
        &self,
        manifest: Option<&UpdateManifest>,
        ignore_errors: bool,
        cancel: &CancelSignal,
    ) -> Result<InstallOutcome<E::State>> {
        self.run(manifest, ignore_errors, cancel).await
    }

    fn package_type(&self) -> &'static str {
        "rpm"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::cancel::cancel_pair;
    use crate::engine::memory::{
        render_rpm_db, zypper_simulator, MemState, MemoryEngine, RepoPackage,
    };
    use crate::logger::{LogLevel, MemoryLog, NullLog};
    use crate::plan::UpdatePlan;
    use crate::updates::{ManifestMetadata, OsInfo, UpdatePackage};

    const TOOLING: &str = "registry.opensuse.org/opensuse/leap:15.6";
    const DB: &str = "/var/lib/rpm/rpmdb.sqlite";

    fn pkg(version: &str) -> RepoPackage {
        RepoPackage {
            version: version.into(),
            arch: "x86_64".into(),
        }
    }

    fn base_image() -> MemState {
        let mut installed = BTreeMap::new();
        installed.insert("curl".to_string(), pkg("8.0.1-150400.5.20.1"));
        installed.insert("libopenssl3".to_string(), pkg("3.1.4-150600.5.7.1"));
        MemState::from_files([("/etc/os-release", "ID=opensuse-leap")])
            .with_file(DB, render_rpm_db(&installed))
    }

    fn repository() -> BTreeMap<String, RepoPackage> {
        let mut repo = BTreeMap::new();
        repo.insert("curl".to_string(), pkg("8.0.1-150400.5.26.1"));
        repo.insert("libopenssl3".to_string(), pkg("3.1.4-150600.5.10.1"));
        repo
    }

    fn engine() -> MemoryEngine {
        MemoryEngine::new(zypper_simulator(repository())).with_image(TOOLING, MemState::empty())
    }

    fn target(prior: Option<MemState>) -> PatchTarget<MemState> {
        PatchTarget {
            image_state: base_image(),
            patched_state: prior,
            os_type: "opensuse-leap".into(),
            os_version: "15.6".into(),
        }
    }

    fn manifest(updates: &[(&str, &str)]) -> UpdateManifest {
        UpdateManifest {
            api_version: "v1alpha1".into(),
            metadata: ManifestMetadata {
                os: OsInfo {
                    os_type: "opensuse-leap".into(),
                    version: "15.6".into(),
                },
                ..Default::default()
            },
            updates: updates
                .iter()
                .map(|(name, version)| UpdatePackage::new(*name, *version))
                .collect(),
        }
    }

    #[tokio::test]
    async fn nil_manifest_is_fatal() {
        let engine = engine();
        let manager = RpmZypperManager::new(&engine, target(None), &NullLog);
        let err = manager
            .install_updates(None, true, &CancelSignal::never())
            .await
            .expect_err("nil manifest");
        assert!(matches!(err, PatchError::NilManifest));
        assert_eq!(manager.package_type(), "rpm");
    }

    #[tokio::test]
    async fn empty_manifest_returns_base_unchanged() {
        let engine = engine();
        let log = MemoryLog::new();
        let manager = RpmZypperManager::new(&engine, target(None), &log);
        let outcome = manager
            .install_updates(Some(&manifest(&[])), false, &CancelSignal::never())
            .await
            .expect("no-op");
        assert_eq!(outcome.state, base_image());
        assert!(outcome.failed.is_none());
        assert_eq!(engine.executions(), 0);
        assert_eq!(log.at(LogLevel::Warn).len(), 1);
    }

    #[tokio::test]
    async fn strict_mode_fails_before_execution() {
        let engine = engine();
        let manager = RpmZypperManager::new(&engine, target(None), &NullLog);
        let err = manager
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1"), ("bash", "??")])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect_err("malformed version");
        assert!(matches!(err, PatchError::MalformedVersion { .. }));
        assert_eq!(engine.executions(), 0);
    }

    #[tokio::test]
    async fn first_patch_upgrades_and_strips_manifest() {
        let engine = engine();
        let manager = RpmZypperManager::new(&engine, target(None), &NullLog);
        let outcome = manager
            .install_updates(
                Some(&manifest(&[
                    ("libopenssl3", "3.1.4-150600.5.8.1"),
                    ("libopenssl3", "3.1.4-150600.5.10.1"),
                ])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect("patched");

        assert!(outcome.failed.is_none());
        assert!(outcome.state.file("/tmp/manifest").is_none());
        assert_eq!(
            outcome.state.file("/usr/share/libopenssl3/VERSION"),
            Some(&b"3.1.4-150600.5.10.1"[..])
        );
        assert!(outcome.state.file("/usr/share/curl/VERSION").is_none());
        assert_eq!(
            outcome.state.file("/etc/os-release"),
            base_image().file("/etc/os-release")
        );
    }

    #[tokio::test]
    async fn repatch_retains_previous_fix() {
        let engine = engine();
        let first = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect("first run");

        let second = RpmZypperManager::new(&engine, target(Some(first.state.clone())), &NullLog)
            .install_updates(
                Some(&manifest(&[("libopenssl3", "3.1.4-150600.5.10.1")])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect("second run");

        assert_eq!(
            second.state.file("/usr/share/curl/VERSION"),
            Some(&b"8.0.1-150400.5.26.1"[..])
        );
        assert_eq!(
            second.state.file("/usr/share/libopenssl3/VERSION"),
            Some(&b"3.1.4-150600.5.10.1"[..])
        );
    }

    #[tokio::test]
    async fn repeating_same_patch_is_idempotent() {
        let engine = engine();
        let request = manifest(&[("curl", "8.0.1-150400.5.26.1")]);
        let first = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(Some(&request), false, &CancelSignal::never())
            .await
            .expect("first run");
        let second = RpmZypperManager::new(&engine, target(Some(first.state.clone())), &NullLog)
            .install_updates(Some(&request), false, &CancelSignal::never())
            .await
            .expect("second run");
        assert_eq!(first.state.contents(), second.state.contents());
    }

    #[tokio::test]
    async fn unavailable_fix_is_partial_success_when_lenient() {
        let engine = engine();
        let manager = RpmZypperManager::new(&engine, target(None), &NullLog);
        let request = manifest(&[
            ("curl", "8.0.1-150400.5.26.1"),
            ("libopenssl3", "3.1.4-150600.5.99.1"),
        ]);

        let outcome = manager
            .install_updates(Some(&request), true, &CancelSignal::never())
            .await
            .expect("partial success");
        assert_eq!(outcome.failed, Some(vec!["libopenssl3".to_string()]));

        let err = manager
            .install_updates(Some(&request), false, &CancelSignal::never())
            .await
            .expect_err("strict shortfall");
        assert!(matches!(err, PatchError::VersionShortfall { .. }));
    }

    #[tokio::test]
    async fn missing_database_is_structural_even_when_lenient() {
        let engine = engine();
        let mut broken = target(None);
        broken.image_state = MemState::from_files([("/etc/os-release", "ID=sles")]);
        let err = RpmZypperManager::new(&engine, broken, &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                true,
                &CancelSignal::never(),
            )
            .await
            .expect_err("no database");
        match err {
            PatchError::NoDatabaseFound { path } => {
                assert_eq!(path, "/tmp/rootfs/var/lib/rpm")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn ndb_database_satisfies_precondition() {
        let engine = engine().with_image("registry.suse.com/bci/bci-base:15.6", MemState::empty());
        let mut installed = BTreeMap::new();
        installed.insert("curl".to_string(), pkg("8.0.1-150400.5.20.1"));
        let mut sles = target(None);
        sles.os_type = "sles".into();
        sles.os_version = "15.6".into();
        sles.image_state = MemState::from_files([("/etc/os-release", "ID=sles")])
            .with_file("/var/lib/rpm/Packages.db", render_rpm_db(&installed));

        let outcome = RpmZypperManager::new(&engine, sles, &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect("ndb image patches");
        assert!(outcome.failed.is_none());
        assert_eq!(
            outcome.state.file("/usr/share/curl/VERSION"),
            Some(&b"8.0.1-150400.5.26.1"[..])
        );
        assert!(outcome.state.file("/var/lib/rpm/rpmdb.sqlite").is_none());
    }

    #[tokio::test]
    async fn executor_failure_propagates_diagnostics() {
        let engine = MemoryEngine::new(Arc::new(
            |_: &UpdatePlan, _: &MemState| -> Result<MemState> {
                Err(PatchError::ExecutionFailure {
                    command: "zypper".into(),
                    status: 104,
                    diagnostics: "No provider of 'curl' found.".into(),
                })
            },
        ))
        .with_image(TOOLING, MemState::empty());
        let err = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                true,
                &CancelSignal::never(),
            )
            .await
            .expect_err("executor failure");
        match err {
            PatchError::ExecutionFailure {
                status,
                diagnostics,
                ..
            } => {
                assert_eq!(status, 104);
                assert!(diagnostics.contains("No provider"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_manifest_output_is_extraction_failure() {
        let engine = MemoryEngine::new(Arc::new(
            |_: &UpdatePlan, mount: &MemState| -> Result<MemState> { Ok(mount.clone()) },
        ))
        .with_image(TOOLING, MemState::empty());
        let err = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                true,
                &CancelSignal::never(),
            )
            .await
            .expect_err("nothing to extract");
        assert!(matches!(err, PatchError::ExtractionFailure { .. }));
    }

    #[tokio::test]
    async fn unresolvable_tooling_image_is_reported() {
        let engine = MemoryEngine::new(zypper_simulator(repository()));
        let err = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                false,
                &CancelSignal::never(),
            )
            .await
            .expect_err("tooling image unknown");
        assert!(matches!(err, PatchError::Resolution { .. }));
    }

    #[tokio::test]
    async fn cancelled_before_execution_never_runs_plan() {
        let engine = engine();
        let (handle, signal) = cancel_pair();
        handle.cancel();
        let err = RpmZypperManager::new(&engine, target(None), &NullLog)
            .install_updates(
                Some(&manifest(&[("curl", "8.0.1-150400.5.26.1")])),
                false,
                &signal,
            )
            .await
            .expect_err("cancelled");
        assert!(matches!(err, PatchError::Cancelled));
        assert_eq!(engine.executions(), 0);
    }

    #[tokio::test]
    async fn cancellation_during_execution_skips_composition() {
        let engine = engine().with_latency(Duration::from_secs(30));
        let (handle, signal) = cancel_pair();
        let request = manifest(&[("curl", "8.0.1-150400.5.26.1")]);
        let manager = RpmZypperManager::new(&engine, target(None), &NullLog);

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        };
        let (result, _) = tokio::join!(
            manager.install_updates(Some(&request), false, &signal),
            canceller
        );
        assert!(matches!(result, Err(PatchError::Cancelled)));
        assert_eq!(engine.executions(), 1);
    }
}
