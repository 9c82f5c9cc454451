/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Library root for Syn-Patch-Core: plan, apply, and verify
    minimal RPM upgrades on container image layer graphs.

  Security / Safety Notes:
    The core performs no I/O of its own beyond what the
    injected build engine and logger perform.

  Dependencies:
    See Cargo.toml; the build engine is an external
    collaborator behind `engine::BuildEngine`.

  Operational Scope:
    Linked by the `synpatch_core` binary and by embedding
    callers that own their own build engine.

  Revision History:
    2025-11-12 COD  Split library root from the binary.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Result-first error handling
============================================================*/

pub mod cancel;
pub mod composer;
pub mod config;
pub mod engine;
pub mod error;
pub mod installer;
pub mod logger;
pub mod plan;
pub mod tooling;
pub mod updates;
pub mod validate;
pub mod version;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use composer::{compose, PatchLineage};
pub use engine::BuildEngine;
pub use error::{PatchError, Result};
pub use installer::{InstallOutcome, PackageManager, PatchTarget, RpmZypperManager};
pub use logger::{Logger, NullLog, PatchLog};
pub use plan::{build_plan, PlanLayout, UpdatePlan};
pub use tooling::{select_tooling_image, ToolingSelector};
pub use updates::{reduce_updates, ReducedUpdateSet, UpdateManifest, UpdatePackage};
pub use validate::{validate_package_versions, InstalledPackageRecord};
pub use version::VersionComparer;
