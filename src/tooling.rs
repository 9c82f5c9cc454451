/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::tooling
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Map an OS distribution identifier and version onto the
    container image that supplies zypper and rpm for patching
    images that lack a package manager of their own.

  Security / Safety Notes:
    The OS version is substituted into the image tag verbatim;
    tag validation is left to the registry.

  Dependencies:
    None beyond std.

  Operational Scope:
    Called once per patch run before the plan is built.

  Revision History:
    2025-11-12 COD  Authored tooling image table.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Closed mapping with documented fallback
    - No failure path: unknown distributions still get a toolchain
============================================================*/

use crate::config::ToolingConfig;
use crate::logger::PatchLog;

const OPENSUSE_REGISTRY: &str = "registry.opensuse.org";
const SUSE_REGISTRY: &str = "registry.suse.com";

/// Distribution used when the OS type is not in the table.
pub const FALLBACK_DISTRIBUTION: &str = "opensuse-tumbleweed";

/// Registry host and repository for a known distribution.
fn lookup(os_type: &str) -> Option<(&'static str, &'static str)> {
    match os_type {
        "sles" => Some((SUSE_REGISTRY, "bci/bci-base")),
        "opensuse-leap" => Some((OPENSUSE_REGISTRY, "opensuse/leap")),
        "opensuse-tumbleweed" => Some((OPENSUSE_REGISTRY, "opensuse/tumbleweed")),
        _ => None,
    }
}

/// Image reference providing zypper for `os_type` at `os_version`.
/// Unknown distributions fall back to openSUSE Tumbleweed.
pub fn select_tooling_image(os_type: &str, os_version: &str) -> String {
    let (registry, image) = lookup(os_type)
        .or_else(|| lookup(FALLBACK_DISTRIBUTION))
        .unwrap_or((OPENSUSE_REGISTRY, "opensuse/tumbleweed"));
    format!("{registry}/{image}:{os_version}")
}

/// Configuration-aware selector: applies the operator's fallback
/// distribution and registry mirrors over the closed table.
#[derive(Debug, Clone, Default)]
pub struct ToolingSelector {
    config: ToolingConfig,
}

impl ToolingSelector {
    pub fn new(config: ToolingConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, os_type: &str, os_version: &str, log: &dyn PatchLog) -> String {
        let known = lookup(os_type).is_some();
        let distribution = if known {
            os_type
        } else {
            self.config.default_distribution.as_str()
        };
        let (default_registry, image) = lookup(distribution)
            .or_else(|| lookup(FALLBACK_DISTRIBUTION))
            .unwrap_or((OPENSUSE_REGISTRY, "opensuse/tumbleweed"));
        let registry = self
            .config
            .registries
            .get(distribution)
            .map(String::as_str)
            .unwrap_or(default_registry);

        if !known {
            log.warn(
                "TOOLING",
                "Unrecognised distribution; using fallback tooling image",
                &[
                    ("os_type", os_type.to_string()),
                    ("fallback", distribution.to_string()),
                ],
            );
        }

        let reference = format!("{registry}/{image}:{os_version}");
        log.debug(
            "TOOLING",
            "Using image as basis for tooling",
            &[("image", reference.clone())],
        );
        reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogLevel, MemoryLog, NullLog};

    #[test]
    fn known_distributions_map_to_their_registries() {
        let cases = [
            ("sles", "15.7", "registry.suse.com/bci/bci-base:15.7"),
            (
                "opensuse-leap",
                "15.6",
                "registry.opensuse.org/opensuse/leap:15.6",
            ),
            (
                "opensuse-tumbleweed",
                "latest",
                "registry.opensuse.org/opensuse/tumbleweed:latest",
            ),
        ];
        for (os_type, os_version, expected) in cases {
            assert_eq!(select_tooling_image(os_type, os_version), expected);
        }
    }

    #[test]
    fn unknown_distribution_falls_back_to_tumbleweed() {
        assert_eq!(
            select_tooling_image("unknown-distro", "1.0"),
            "registry.opensuse.org/opensuse/tumbleweed:1.0"
        );
    }

    #[test]
    fn selector_matches_table_without_overrides() {
        let selector = ToolingSelector::default();
        for (os_type, version) in [("sles", "15.7"), ("opensuse-leap", "15.6"), ("x", "1")] {
            assert_eq!(
                selector.select(os_type, version, &NullLog),
                select_tooling_image(os_type, version)
            );
        }
    }

    #[test]
    fn selector_applies_fallback_and_mirror() {
        let mut config = ToolingConfig::default();
        config.default_distribution = "sles".into();
        config
            .registries
            .insert("sles".into(), "mirror.example.test".into());
        let log = MemoryLog::new();
        let image = ToolingSelector::new(config).select("rocky", "15.5", &log);
        assert_eq!(image, "mirror.example.test/bci/bci-base:15.5");
        assert_eq!(log.at(LogLevel::Warn).len(), 1);
    }
}
