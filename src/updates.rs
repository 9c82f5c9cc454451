/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::updates
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Model the vulnerability-remediation manifest and reduce its
    update list to one "latest wins" entry per package name.

  Security / Safety Notes:
    Manifest contents are untrusted; versions are validated
    before they take part in any ordering.

  Dependencies:
    serde / serde_json for manifest decoding.

  Operational Scope:
    First stage of every patch run; the CLI also uses the
    loader to read manifests from disk.

  Revision History:
    2025-11-12 COD  Authored reducer and manifest model.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering for reproducible plans
    - Per-package diagnostics for skipped entries
============================================================*/

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PatchError, Result};
use crate::logger::PatchLog;
use crate::version::VersionComparer;

/// One requested package upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePackage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    pub fixed_version: String,
    #[serde(
        default,
        rename = "vulnerabilityID",
        skip_serializing_if = "Option::is_none"
    )]
    pub vulnerability_id: Option<String>,
}

impl UpdatePackage {
    pub fn new(name: impl Into<String>, fixed_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed_version: None,
            fixed_version: fixed_version.into(),
            vulnerability_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    #[serde(rename = "type")]
    pub os_type: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfigInfo {
    #[serde(default)]
    pub arch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub os: OsInfo,
    #[serde(default)]
    pub config: ImageConfigInfo,
}

/// Update request handed to the core by the report loader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateManifest {
    #[serde(default)]
    pub api_version: String,
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub updates: Vec<UpdatePackage>,
}

/// A package dropped from the reduced set and the version that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUpdate {
    pub name: String,
    pub version: String,
}

/// One entry per package name, holding the highest requested fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReducedUpdateSet {
    packages: BTreeMap<String, UpdatePackage>,
    skipped: Vec<SkippedUpdate>,
}

impl ReducedUpdateSet {
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&UpdatePackage> {
        self.packages.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UpdatePackage> {
        self.packages.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Packages left out because their version did not parse.
    pub fn skipped(&self) -> &[SkippedUpdate] {
        &self.skipped
    }
}

/// Reduce `updates` to the highest fixed version per package name.
pub fn reduce_updates(
    updates: &[UpdatePackage],
    comparer: &VersionComparer,
    ignore_errors: bool,
    log: &dyn PatchLog,
) -> Result<ReducedUpdateSet> {
    let mut reduced = ReducedUpdateSet::default();

    for update in updates {
        if !comparer.is_valid(&update.fixed_version) {
            if !ignore_errors {
                return Err(PatchError::MalformedVersion {
                    package: update.name.clone(),
                    version: update.fixed_version.clone(),
                });
            }
            log.warn(
                "SKIP",
                "Ignoring update with malformed version",
                &[
                    ("package", update.name.clone()),
                    ("version", update.fixed_version.clone()),
                ],
            );
            reduced.skipped.push(SkippedUpdate {
                name: update.name.clone(),
                version: update.fixed_version.clone(),
            });
            continue;
        }

        match reduced.packages.entry(update.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(update.clone());
            }
            Entry::Occupied(mut slot) => {
                if comparer.is_less_than(&slot.get().fixed_version, &update.fixed_version) {
                    slot.insert(update.clone());
                }
            }
        }
    }

    Ok(reduced)
}

/// Read an update manifest JSON document from disk.
pub fn load_update_manifest(path: &Path) -> Result<UpdateManifest> {
    let file = File::open(path).map_err(|err| {
        PatchError::Filesystem(format!(
            "Failed to open update manifest {}: {err}",
            path.display()
        ))
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| {
        PatchError::Serialization(format!(
            "Failed to decode update manifest {}: {err}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, MemoryLog, NullLog};

    fn pkg(name: &str, version: &str) -> UpdatePackage {
        UpdatePackage::new(name, version)
    }

    #[test]
    fn keeps_highest_fixed_version_per_name() {
        let updates = vec![
            pkg("openssl", "1.1.1l-150400.7.25.1"),
            pkg("curl", "8.0.1-150400.5.23.1"),
            pkg("openssl", "1.1.1l-150400.7.28.1"),
            pkg("openssl", "1.1.1l-150400.7.22.1"),
        ];
        let reduced =
            reduce_updates(&updates, &VersionComparer::rpm(), false, &NullLog).expect("reduces");
        assert_eq!(reduced.len(), 2);
        assert_eq!(
            reduced.get("openssl").map(|p| p.fixed_version.as_str()),
            Some("1.1.1l-150400.7.28.1")
        );
        assert_eq!(reduced.names().collect::<Vec<_>>(), vec!["curl", "openssl"]);
    }

    #[test]
    fn ties_keep_first_seen_entry() {
        let mut first = pkg("zlib", "1.2.13-150500.4.3.1");
        first.vulnerability_id = Some("CVE-2023-1".into());
        let mut second = pkg("zlib", "1.2.13-150500.4.3.1");
        second.vulnerability_id = Some("CVE-2023-2".into());

        let reduced = reduce_updates(&[first, second], &VersionComparer::rpm(), false, &NullLog)
            .expect("reduces");
        assert_eq!(
            reduced.get("zlib").and_then(|p| p.vulnerability_id.as_deref()),
            Some("CVE-2023-1")
        );
    }

    #[test]
    fn released_build_outranks_bare_version() {
        let reduced = reduce_updates(
            &[pkg("p", "1.2.3"), pkg("p", "1.2.3-5")],
            &VersionComparer::rpm(),
            false,
            &NullLog,
        )
        .expect("reduces");
        assert_eq!(
            reduced.get("p").map(|p| p.fixed_version.as_str()),
            Some("1.2.3-5")
        );
    }

    #[test]
    fn strict_mode_rejects_malformed_version() {
        let updates = vec![pkg("curl", "8.0.1-1"), pkg("bash", "not a version")];
        let err = reduce_updates(&updates, &VersionComparer::rpm(), false, &NullLog)
            .expect_err("malformed must fail");
        match err {
            PatchError::MalformedVersion { package, .. } => assert_eq!(package, "bash"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_skips_and_reports() {
        let log = MemoryLog::new();
        let updates = vec![pkg("curl", "8.0.1-1"), pkg("bash", "not a version")];
        let reduced =
            reduce_updates(&updates, &VersionComparer::rpm(), true, &log).expect("reduces");
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced.skipped().len(), 1);
        assert_eq!(reduced.skipped()[0].name, "bash");
        assert_eq!(log.at(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn empty_input_is_empty_set() {
        let reduced =
            reduce_updates(&[], &VersionComparer::rpm(), false, &NullLog).expect("reduces");
        assert!(reduced.is_empty());
    }

    #[test]
    fn loads_manifest_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{
  "apiVersion": "v1alpha1",
  "metadata": {
    "os": { "type": "opensuse-leap", "version": "15.6" },
    "config": { "arch": "amd64" }
  },
  "updates": [
    {
      "name": "libopenssl3",
      "installedVersion": "3.1.4-150600.5.7.1",
      "fixedVersion": "3.1.4-150600.5.10.1",
      "vulnerabilityID": "CVE-2024-5535"
    }
  ]
}"#,
        )
        .expect("write");

        let manifest = load_update_manifest(&path).expect("loads");
        assert_eq!(manifest.metadata.os.os_type, "opensuse-leap");
        assert_eq!(manifest.metadata.config.arch, "amd64");
        assert_eq!(manifest.updates.len(), 1);
        assert_eq!(
            manifest.updates[0].installed_version.as_deref(),
            Some("3.1.4-150600.5.7.1")
        );
    }
}
