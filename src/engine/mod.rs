/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::engine
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Boundary with the build-graph execution engine: image
    resolution, plan execution, single-file extraction, and the
    pure diff/merge/copy/remove algebra over image states.

  Security / Safety Notes:
    The core never mutates a state; every operation yields a
    new state value owned by the engine.

  Dependencies:
    async-trait for the async engine seam.

  Operational Scope:
    Implemented by container build backends; `memory` provides
    an in-process implementation for simulation and tests.

  Revision History:
    2025-11-12 COD  Defined build engine seam.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear interface boundaries
    - Deterministic testing with in-memory implementations
============================================================*/

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::plan::UpdatePlan;

/// Execution engine collaborator.
///
/// The algebra methods are referentially transparent: calling them twice
/// with equal inputs yields equivalent states, and inputs are untouched.
/// `merge` resolves same-path conflicts in favour of the later argument.
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Immutable handle to a filesystem layer graph node.
    type State: Clone + Send + Sync;

    /// Resolve an image reference into a state.
    async fn resolve_image(&self, reference: &str) -> Result<Self::State>;

    /// Run `plan` inside `tooling` with `mount` bound at
    /// `plan.input_mount_path`; returns the resulting mount contents.
    /// A non-zero exit surfaces as `PatchError::ExecutionFailure`.
    async fn execute(
        &self,
        tooling: &Self::State,
        plan: &UpdatePlan,
        mount: &Self::State,
    ) -> Result<Self::State>;

    /// Read one file out of `state`.
    async fn extract_file(&self, state: &Self::State, path: &str) -> Result<Vec<u8>>;

    /// The empty state.
    fn scratch(&self) -> Self::State;

    /// Changes needed to turn `lower` into `upper`.
    fn diff(&self, lower: &Self::State, upper: &Self::State) -> Self::State;

    /// Layer `states` in order; later entries win on conflicts.
    fn merge(&self, states: &[Self::State]) -> Self::State;

    /// Copy `from` out of `src` to `to` on top of `dest`.
    fn copy(&self, dest: &Self::State, src: &Self::State, from: &str, to: &str) -> Self::State;

    fn remove_file(&self, state: &Self::State, path: &str) -> Self::State;
}
