/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::validate
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Parse the post-install manifest written by the upgrade plan
    and confirm every requested package reached at least its
    requested version.

  Security / Safety Notes:
    Manifest bytes come from the tooling container and are
    parsed defensively line by line.

  Dependencies:
    None beyond std.

  Operational Scope:
    Final stage of a patch run; its failure list is returned to
    the caller alongside the composed image state.

  Revision History:
    2025-11-12 COD  Authored post-install validation.
  ------------------------------------------------------------
  SSE Principles Observed:
    - No silent failure paths
    - Partial success reported as data under ignore-errors
============================================================*/

use std::collections::BTreeMap;

use crate::error::{PatchError, Result};
use crate::logger::PatchLog;
use crate::updates::ReducedUpdateSet;
use crate::version::VersionComparer;

/// One `name<TAB>version-release<TAB>arch` line from the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackageRecord {
    pub name: String,
    pub version: String,
    pub arch: String,
}

impl InstalledPackageRecord {
    fn parse(line: &str) -> std::result::Result<Self, String> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 3 {
            return Err(format!("expected 3 tab-separated fields, found {}", fields.len()));
        }
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err("empty field".into());
        }
        Ok(Self {
            name: fields[0].trim().to_string(),
            version: fields[1].trim().to_string(),
            arch: fields[2].trim().to_string(),
        })
    }
}

/// Parse manifest bytes; blank lines are ignored.
pub fn parse_installed_records(
    manifest: &[u8],
    ignore_errors: bool,
    log: &dyn PatchLog,
) -> Result<Vec<InstalledPackageRecord>> {
    let text = String::from_utf8_lossy(manifest);
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match InstalledPackageRecord::parse(line) {
            Ok(record) => records.push(record),
            Err(reason) if ignore_errors => {
                log.warn(
                    "MANIFEST",
                    "Skipping unparseable installed-package record",
                    &[("line", (index + 1).to_string()), ("reason", reason)],
                );
            }
            Err(reason) => {
                return Err(PatchError::ManifestRecord {
                    line: index + 1,
                    reason,
                });
            }
        }
    }
    Ok(records)
}

/// Names of requested packages that are missing or below the requested
/// version. Strict mode turns a non-empty list into `VersionShortfall`.
pub fn validate_package_versions(
    requested: &ReducedUpdateSet,
    comparer: &VersionComparer,
    manifest: &[u8],
    ignore_errors: bool,
    log: &dyn PatchLog,
) -> Result<Vec<String>> {
    let records = parse_installed_records(manifest, ignore_errors, log)?;

    // Multilib installs list a package once per arch; the lowest counts.
    let mut installed: BTreeMap<&str, &InstalledPackageRecord> = BTreeMap::new();
    for record in &records {
        installed
            .entry(record.name.as_str())
            .and_modify(|current| {
                if comparer.is_less_than(&record.version, &current.version) {
                    *current = record;
                }
            })
            .or_insert(record);
    }

    let mut failed = Vec::new();
    for update in requested.iter() {
        match installed.get(update.name.as_str()) {
            None => {
                log.warn(
                    "VALIDATE",
                    "Requested package missing from installed manifest",
                    &[("package", update.name.clone())],
                );
                failed.push(update.name.clone());
            }
            Some(record) => {
                if !comparer.is_valid(&record.version)
                    || comparer.is_less_than(&record.version, &update.fixed_version)
                {
                    log.warn(
                        "VALIDATE",
                        "Installed version below requested",
                        &[
                            ("package", update.name.clone()),
                            ("installed", record.version.clone()),
                            ("requested", update.fixed_version.clone()),
                        ],
                    );
                    failed.push(update.name.clone());
                } else {
                    log.debug(
                        "VALIDATE",
                        "Package upgraded",
                        &[
                            ("package", update.name.clone()),
                            ("installed", record.version.clone()),
                            ("arch", record.arch.clone()),
                        ],
                    );
                }
            }
        }
    }

    if !failed.is_empty() && !ignore_errors {
        return Err(PatchError::VersionShortfall { packages: failed });
    }
    Ok(failed)
}
