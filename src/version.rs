/*============================================================
  Synavera Project: Syn-Patch
  Module: synpatch_core::version
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Pluggable package-version grammars. A backend supplies a
    `VersionComparer` (validate + less-than); the RPM grammar
    is implemented natively here.

  Security / Safety Notes:
    Pure string processing; no commands are executed.

  Dependencies:
    None beyond std.

  Operational Scope:
    Consumed by the update reducer and the post-install
    validator.

  Revision History:
    2025-11-12 COD  Native rpmvercmp replaces external vercmp.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic ordering independent of host tooling
    - Explicit validity checks before comparison
============================================================*/

use std::cmp::Ordering;

/// Capability pair describing one package-format version grammar.
#[derive(Clone, Copy)]
pub struct VersionComparer {
    pub is_valid: fn(&str) -> bool,
    pub is_less_than: fn(&str, &str) -> bool,
}

impl VersionComparer {
    pub fn new(is_valid: fn(&str) -> bool, is_less_than: fn(&str, &str) -> bool) -> Self {
        Self {
            is_valid,
            is_less_than,
        }
    }

    /// Comparer for `[epoch:]version[-release]` RPM strings.
    pub fn rpm() -> Self {
        Self::new(is_valid_rpm_version, is_less_than_rpm_version)
    }

    pub fn is_valid(&self, version: &str) -> bool {
        (self.is_valid)(version)
    }

    pub fn is_less_than(&self, a: &str, b: &str) -> bool {
        (self.is_less_than)(a, b)
    }
}

impl std::fmt::Debug for VersionComparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionComparer").finish_non_exhaustive()
    }
}

/// Epoch, version, and release split out of an RPM version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evr<'a> {
    pub epoch: u64,
    pub version: &'a str,
    pub release: Option<&'a str>,
}

impl<'a> Evr<'a> {
    /// Split `[epoch:]version[-release]`. Returns `None` when the epoch is
    /// not numeric or a component is empty.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (epoch, rest) = match raw.split_once(':') {
            Some((epoch, rest)) => {
                if epoch.is_empty() || !epoch.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                (epoch.parse::<u64>().ok()?, rest)
            }
            None => (0, raw),
        };
        if rest.contains(':') {
            return None;
        }
        let (version, release) = match rest.rsplit_once('-') {
            Some((version, release)) => (version, Some(release)),
            None => (rest, None),
        };
        if version.is_empty() || release.is_some_and(str::is_empty) {
            return None;
        }
        Some(Self {
            epoch,
            version,
            release,
        })
    }
}

fn is_rpm_version_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '+' | '~' | '^' | ':' | '-')
}

/// Accepts RPM version strings built from the characters rpm permits.
pub fn is_valid_rpm_version(version: &str) -> bool {
    if version.is_empty() || !version.chars().all(is_rpm_version_char) {
        return false;
    }
    if !version.chars().any(|ch| ch.is_ascii_alphanumeric()) {
        return false;
    }
    Evr::parse(version).is_some()
}

/// `a < b` under RPM EVR ordering. Unparseable input never sorts lower.
pub fn is_less_than_rpm_version(a: &str, b: &str) -> bool {
    compare_rpm_evr(a, b) == Ordering::Less
}

/// Full EVR comparison: epoch, then version, then release. A missing
/// release compares as empty, so it sorts below any release.
pub fn compare_rpm_evr(a: &str, b: &str) -> Ordering {
    let (Some(left), Some(right)) = (Evr::parse(a), Evr::parse(b)) else {
        return rpmvercmp(a, b);
    };
    left.epoch
        .cmp(&right.epoch)
        .then_with(|| rpmvercmp(left.version, right.version))
        .then_with(|| rpmvercmp(left.release.unwrap_or(""), right.release.unwrap_or("")))
}

/// Segment-wise comparison following rpm's `rpmvercmp`.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let mut one = a.as_bytes();
    let mut two = b.as_bytes();

    loop {
        one = skip_separators(one);
        two = skip_separators(two);

        // Tilde sorts before anything, including the end of the string.
        match (one.first() == Some(&b'~'), two.first() == Some(&b'~')) {
            (true, true) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }

        // Caret sorts after the end of the string but before any segment.
        match (one.first() == Some(&b'^'), two.first() == Some(&b'^')) {
            (true, true) => {
                one = &one[1..];
                two = &two[1..];
                continue;
            }
            (true, false) => {
                return if two.is_empty() {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
            }
            (false, true) => {
                return if one.is_empty() {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }
            (false, false) => {}
        }

        if one.is_empty() || two.is_empty() {
            break;
        }

        let numeric = one[0].is_ascii_digit();
        let take = |s: &[u8]| {
            s.iter()
                .take_while(|b| {
                    if numeric {
                        b.is_ascii_digit()
                    } else {
                        b.is_ascii_alphabetic()
                    }
                })
                .count()
        };
        let len_one = take(one);
        let len_two = take(two);
        let (seg_one, rest_one) = one.split_at(len_one);
        let (seg_two, rest_two) = two.split_at(len_two);

        // Segments of different kinds: numeric is newer.
        if seg_two.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            let trimmed_one = trim_leading_zeros(seg_one);
            let trimmed_two = trim_leading_zeros(seg_two);
            trimmed_one
                .len()
                .cmp(&trimmed_two.len())
                .then_with(|| trimmed_one.cmp(trimmed_two))
        } else {
            seg_one.cmp(seg_two)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }

        one = rest_one;
        two = rest_two;
    }

    match (one.is_empty(), two.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn skip_separators(input: &[u8]) -> &[u8] {
    let skip = input
        .iter()
        .take_while(|b| !b.is_ascii_alphanumeric() && **b != b'~' && **b != b'^')
        .count();
    &input[skip..]
}

fn trim_leading_zeros(segment: &[u8]) -> &[u8] {
    let zeros = segment.iter().take_while(|b| **b == b'0').count();
    &segment[zeros..]
}
