/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::composer
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Fold the executed upgrade back onto the base image as a
    minimal delta, retaining any earlier patch layered on the
    same base.

  Security / Safety Notes:
    The installed-package manifest is stripped before any diff
    so it never reaches the published image.

  Dependencies:
    engine::BuildEngine algebra only.

  Operational Scope:
    Runs after a successful plan execution, before version
    validation results are returned to the caller.

  Revision History:
    2025-11-12 COD  Authored layer composer.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only state graph; no in-place mutation
    - Repeated patch runs never drop earlier fixes
============================================================*/

use crate::engine::BuildEngine;
use crate::logger::PatchLog;

/// Relationship between the base image and any earlier patch run.
#[derive(Debug, Clone)]
pub enum PatchLineage<S> {
    NoPriorPatch,
    /// An earlier run produced this state from the same base.
    HasPriorPatch(S),
}

impl<S> PatchLineage<S> {
    pub fn from_prior(prior: Option<S>) -> Self {
        match prior {
            Some(state) => PatchLineage::HasPriorPatch(state),
            None => PatchLineage::NoPriorPatch,
        }
    }
}

/// Remove the installed-package manifest from the executed state.
pub fn strip_manifest<E: BuildEngine>(engine: &E, executed: &E::State, path: &str) -> E::State {
    engine.remove_file(executed, path)
}

/// Merge the changes in `executed` (already stripped of its manifest)
/// onto `base`, keeping the prior patch delta when there is one.
///
/// Both paths rely on `merge` letting later arguments win, so the current
/// run's files override anything the prior patch wrote to the same path.
pub fn compose<E: BuildEngine>(
    engine: &E,
    base: &E::State,
    executed: &E::State,
    lineage: &PatchLineage<E::State>,
    log: &dyn PatchLog,
) -> E::State {
    match lineage {
        PatchLineage::NoPriorPatch => {
            log.debug("COMPOSE", "Composing first patch onto base", &[]);
            let diff = engine.diff(base, executed);
            engine.merge(&[engine.scratch(), base.clone(), diff])
        }
        PatchLineage::HasPriorPatch(prior) => {
            log.debug(
                "COMPOSE",
                "Retaining previous patch while composing update",
                &[],
            );
            let prev_diff = engine.diff(base, prior);
            let new_diff = engine.diff(base, executed);
            let combined = engine.merge(&[prev_diff, new_diff]);
            let squashed = engine.copy(&engine.scratch(), &combined, "/", "/");
            engine.merge(&[base.clone(), squashed])
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine::memory::{MemState, MemoryEngine};
    use crate::error::Result;
    use crate::logger::NullLog;
    use crate::plan::UpdatePlan;

    fn engine() -> MemoryEngine {
        MemoryEngine::new(Arc::new(
            |_: &UpdatePlan, mount: &MemState| -> Result<MemState> { Ok(mount.clone()) },
        ))
    }

    fn base() -> MemState {
        MemState::from_files([
            ("/etc/os-release", "ID=opensuse-leap"),
            ("/usr/lib64/libssl.so.3", "ssl-3.1.4-5.7"),
            ("/usr/lib64/libcurl.so.4", "curl-8.0.1-5.23"),
            ("/var/lib/rpm/rpmdb.sqlite", "db-0"),
        ])
    }

    #[test]
    fn first_patch_is_base_plus_changes() {
        let engine = engine();
        let base = base();
        let executed = base
            .with_file("/usr/lib64/libssl.so.3", "ssl-3.1.4-5.10")
            .with_file("/var/lib/rpm/rpmdb.sqlite", "db-1")
            .with_file("/tmp/manifest", "libopenssl3\t3.1.4-5.10\tx86_64\n");
        let executed = strip_manifest(&engine, &executed, "/tmp/manifest");

        let result = compose(&engine, &base, &executed, &PatchLineage::NoPriorPatch, &NullLog);
        assert_eq!(result.contents(), executed.contents());
        assert!(result.file("/tmp/manifest").is_none());
        assert_eq!(result.file("/etc/os-release"), base.file("/etc/os-release"));
    }

    #[test]
    fn repatch_keeps_prior_fix_and_prefers_new_changes() {
        let engine = engine();
        let base = base();
        let prior = base
            .with_file("/usr/lib64/libcurl.so.4", "curl-8.0.1-5.26")
            .with_file("/var/lib/rpm/rpmdb.sqlite", "db-prior");
        let executed = base
            .with_file("/usr/lib64/libssl.so.3", "ssl-3.1.4-5.10")
            .with_file("/var/lib/rpm/rpmdb.sqlite", "db-new");

        let result = compose(
            &engine,
            &base,
            &executed,
            &PatchLineage::HasPriorPatch(prior),
            &NullLog,
        );
        assert_eq!(
            result.file("/usr/lib64/libcurl.so.4"),
            Some(&b"curl-8.0.1-5.26"[..])
        );
        assert_eq!(
            result.file("/usr/lib64/libssl.so.3"),
            Some(&b"ssl-3.1.4-5.10"[..])
        );
        assert_eq!(result.file("/var/lib/rpm/rpmdb.sqlite"), Some(&b"db-new"[..]));
        assert_eq!(result.file("/etc/os-release"), base.file("/etc/os-release"));
    }

    #[test]
    fn composing_twice_is_idempotent() {
        let engine = engine();
        let base = base();
        let executed = base.with_file("/usr/lib64/libssl.so.3", "ssl-3.1.4-5.10");

        let once = compose(&engine, &base, &executed, &PatchLineage::NoPriorPatch, &NullLog);
        let twice = compose(
            &engine,
            &base,
            &executed,
            &PatchLineage::HasPriorPatch(once.clone()),
            &NullLog,
        );
        assert_eq!(once.contents(), twice.contents());
    }

    #[test]
    fn untouched_executed_state_reproduces_base() {
        let engine = engine();
        let base = base();
        let result = compose(&engine, &base, &base, &PatchLineage::NoPriorPatch, &NullLog);
        assert_eq!(result.contents(), base.contents());
    }
}
