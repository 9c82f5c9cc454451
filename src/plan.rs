/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::plan
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Build the abstract execution plan for a zypper alternate
    root upgrade: tooling image, environment, command text,
    mount point, and the manifest path read back afterwards.

  Security / Safety Notes:
    Package names are the only manifest data that reach the
    command text; they are checked against a restricted
    character set and single-quoted. Layout paths travel
    through the environment, never the command text.

  Dependencies:
    serde for plan serialisation.

  Operational Scope:
    Consumed exactly once by the build engine per patch run.

  Revision History:
    2025-11-12 COD  Authored zypper plan builder.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Untrusted input never reaches a shell unquoted
    - Distinguishable exit for precondition failures
============================================================*/

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::LayoutConfig;
use crate::error::{PatchError, Result};
use crate::updates::ReducedUpdateSet;

/// Exit status the command uses when the alternate root has no RPM database.
pub const NO_DATABASE_EXIT_CODE: i32 = 86;

pub const ENV_CHROOT_DIR: &str = "SYNPATCH_CHROOT_DIR";
pub const ENV_RPM_DB_DIR: &str = "SYNPATCH_RPM_DB_DIR";
pub const ENV_RPM_DB_FILES: &str = "SYNPATCH_RPM_DB_FILES";
pub const ENV_MANIFEST_FILE: &str = "SYNPATCH_MANIFEST_FILE";

/// Database files rpm writes, one per backend: ndb (SLES and Leap 15),
/// sqlite (Tumbleweed), and legacy Berkeley DB.
pub const RPM_DB_BACKENDS: [&str; 3] = ["Packages.db", "rpmdb.sqlite", "Packages"];

const ZYPPER_SCRIPT: &str = r#"rpm_db_found=
for rpm_db_file in ${SYNPATCH_RPM_DB_FILES}; do
  if [ -e "${SYNPATCH_RPM_DB_DIR}/${rpm_db_file}" ]; then rpm_db_found=1; fi
done
if [ -z "${rpm_db_found}" ]; then echo "RPM DB not found" >&2; exit @NO_DB@; fi
zypper --non-interactive refresh
zypper --non-interactive --installroot "${SYNPATCH_CHROOT_DIR}" up --no-recommends @PACKAGES@
zypper --installroot "${SYNPATCH_CHROOT_DIR}" clean --all
rm -rf "${SYNPATCH_CHROOT_DIR}"/var/cache/zypp/* "${SYNPATCH_CHROOT_DIR}"/var/log/zypp/*
rm -rf "${SYNPATCH_CHROOT_DIR}"/var/tmp/* "${SYNPATCH_CHROOT_DIR}"/usr/share/doc/packages/*
rpm --dbpath "${SYNPATCH_RPM_DB_DIR}" -qa --qf='%{NAME}\t%{VERSION}-%{RELEASE}\t%{ARCH}\n' @PACKAGES@ > "${SYNPATCH_MANIFEST_FILE}"
"#;

/// Paths inside the tooling container and the mounted image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLayout {
    /// Where the target image filesystem is bind-mounted.
    pub chroot_dir: String,
    /// Manifest location relative to the mounted image root.
    pub manifest_file: String,
    /// RPM database directory relative to the image root.
    pub rpm_db_dir: String,
    /// Preferred database file; the other known backends are accepted too.
    pub rpm_db_file: String,
}

impl Default for PlanLayout {
    fn default() -> Self {
        Self::from(&LayoutConfig::default())
    }
}

impl From<&LayoutConfig> for PlanLayout {
    fn from(config: &LayoutConfig) -> Self {
        Self {
            chroot_dir: config.chroot_dir.clone(),
            manifest_file: config.manifest_file.clone(),
            rpm_db_dir: config.rpm_db_dir.clone(),
            rpm_db_file: config.rpm_db_file.clone(),
        }
    }
}

impl PlanLayout {
    /// Database directory as seen from inside the tooling container.
    pub fn rpm_db_dir_path(&self) -> String {
        join_paths(&self.chroot_dir, &self.rpm_db_dir)
    }

    /// Database files whose presence satisfies the precondition, the
    /// configured one first.
    pub fn rpm_db_candidates(&self) -> Vec<String> {
        let mut candidates = vec![self.rpm_db_file.clone()];
        candidates.extend(
            RPM_DB_BACKENDS
                .iter()
                .filter(|backend| **backend != self.rpm_db_file)
                .map(|backend| backend.to_string()),
        );
        candidates
    }

    /// Manifest file as seen from inside the tooling container.
    pub fn manifest_path(&self) -> String {
        join_paths(&self.chroot_dir, &self.manifest_file)
    }
}

/// Everything the build engine needs to run one upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatePlan {
    pub tooling_image: String,
    pub env_bindings: BTreeMap<String, String>,
    pub command_template: String,
    pub input_mount_path: String,
    pub manifest_output_path: String,
    pub packages: Vec<String>,
}

/// Build the zypper upgrade plan for `updates` using `tooling_image`.
pub fn build_plan(
    updates: &ReducedUpdateSet,
    tooling_image: &str,
    layout: &PlanLayout,
    extra_env: &BTreeMap<String, String>,
) -> Result<UpdatePlan> {
    let mut packages = Vec::with_capacity(updates.len());
    for name in updates.names() {
        validate_package_name(name)?;
        packages.push(name.to_string());
    }
    let package_args = packages
        .iter()
        .map(|name| shell_quote(name))
        .collect::<Vec<_>>()
        .join(" ");

    // The candidate list is word-split by the shell.
    let db_files = layout.rpm_db_candidates();
    if let Some(bad) = db_files.iter().find(|file| !is_plain_file_name(file)) {
        return Err(PatchError::Config(format!(
            "rpm database file `{bad}` must be a plain file name"
        )));
    }

    let command_template = ZYPPER_SCRIPT
        .replace("@NO_DB@", &NO_DATABASE_EXIT_CODE.to_string())
        .replace("@PACKAGES@", &package_args);

    let mut env_bindings = extra_env.clone();
    env_bindings.insert(ENV_CHROOT_DIR.into(), layout.chroot_dir.clone());
    env_bindings.insert(ENV_RPM_DB_DIR.into(), layout.rpm_db_dir_path());
    env_bindings.insert(ENV_RPM_DB_FILES.into(), db_files.join(" "));
    env_bindings.insert(ENV_MANIFEST_FILE.into(), layout.manifest_path());

    Ok(UpdatePlan {
        tooling_image: tooling_image.to_string(),
        env_bindings,
        command_template,
        input_mount_path: layout.chroot_dir.clone(),
        manifest_output_path: layout.manifest_file.clone(),
        packages,
    })
}

/// Package names must stick to rpm's conventional character set and may
/// not look like an option.
pub fn validate_package_name(name: &str) -> Result<()> {
    if !is_plain_file_name(name) {
        return Err(PatchError::InvalidPackageName {
            package: name.to_string(),
        });
    }
    Ok(())
}

/// Non-empty, `[A-Za-z0-9._+-]` only, no leading `-`.
pub(crate) fn is_plain_file_name(value: &str) -> bool {
    let allowed = |ch: char| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '+' | '-');
    !value.is_empty() && !value.starts_with('-') && value.chars().all(allowed)
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn join_paths(base: &str, rest: &str) -> String {
    let base = base.trim_end_matches('/');
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{rest}")
    }
}
