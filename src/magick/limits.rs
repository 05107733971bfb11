//! Engine resource limits.
//!
//! ImageMagick caps the pixel cache with five resources: `area`, `map`,
//! `disk`, `memory` and `file`. Limits are modelled in two layers:
//!
//! - a **baseline**: the engine's own defaults, captured once by the
//!   [`Magick`](super::Magick) context;
//! - an **override** layer held in [`ResourceLimits`], edited by the caller
//!   and rendered as `-limit <key> <value>` arguments on every invocation.
//!
//! Values stay symbolic (`"32mb"`) on the wire. [`parse_size`] converts them
//! to absolute counts with binary multipliers for display and comparison.

use super::runner::MagickError;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A limited engine resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    Area,
    Map,
    Disk,
    Memory,
    File,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Area,
        Resource::Map,
        Resource::Disk,
        Resource::Memory,
        Resource::File,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resource::Area => "area",
            Resource::Map => "map",
            Resource::Disk => "disk",
            Resource::Memory => "memory",
            Resource::File => "file",
        }
    }

    /// Environment variable the engine reads this limit from.
    pub fn env_var(self) -> &'static str {
        match self {
            Resource::Area => "MAGICK_AREA_LIMIT",
            Resource::Map => "MAGICK_MAP_LIMIT",
            Resource::Disk => "MAGICK_DISK_LIMIT",
            Resource::Memory => "MAGICK_MEMORY_LIMIT",
            Resource::File => "MAGICK_FILE_LIMIT",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Resource {
    type Err = MagickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MagickError::UnknownResource(s.to_string()))
    }
}

impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// A limit value as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LimitValue {
    /// Human-readable value with an optional unit suffix, e.g. `"32mb"`.
    Symbolic(String),
    /// Absolute count in base units (bytes, pixels or handles).
    Absolute(u64),
}

impl LimitValue {
    /// Convert to an absolute count when the value has a parsable size.
    pub fn to_actual(&self) -> LimitValue {
        match self {
            LimitValue::Symbolic(s) => match parse_size(s) {
                Some(n) => LimitValue::Absolute(n),
                None => self.clone(),
            },
            LimitValue::Absolute(_) => self.clone(),
        }
    }
}

impl fmt::Display for LimitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitValue::Symbolic(s) => f.write_str(s),
            LimitValue::Absolute(n) => write!(f, "{n}"),
        }
    }
}

impl PartialEq<&str> for LimitValue {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, LimitValue::Symbolic(s) if s == other)
    }
}

impl PartialEq<u64> for LimitValue {
    fn eq(&self, other: &u64) -> bool {
        matches!(self, LimitValue::Absolute(n) if n == other)
    }
}

/// Full set of limits, one value per [`Resource`].
pub type LimitTable = BTreeMap<Resource, LimitValue>;

/// How much of the limit set is currently overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitState {
    Unset,
    PartiallyOverridden,
    FullyOverridden,
}

/// The caller-controlled override layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    overrides: BTreeMap<Resource, String>,
}

impl ResourceLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `pairs` into the override layer, leaving other keys untouched.
    ///
    /// Every value is validated before any is applied.
    pub fn set<I, S>(&mut self, pairs: I) -> Result<(), MagickError>
    where
        I: IntoIterator<Item = (Resource, S)>,
        S: Into<String>,
    {
        let pairs: Vec<(Resource, String)> =
            pairs.into_iter().map(|(r, v)| (r, v.into())).collect();
        for (resource, value) in &pairs {
            validate_value(*resource, value)?;
        }
        self.overrides.extend(pairs);
        Ok(())
    }

    /// Drop overrides for `resources`, reverting them to the baseline.
    pub fn remove(&mut self, resources: &[Resource]) {
        for resource in resources {
            self.overrides.remove(resource);
        }
    }

    pub fn unset_all(&mut self) {
        self.overrides.clear();
    }

    pub fn get(&self, resource: Resource) -> Option<&str> {
        self.overrides.get(&resource).map(String::as_str)
    }

    pub fn state(&self) -> LimitState {
        match self.overrides.len() {
            0 => LimitState::Unset,
            n if n == Resource::ALL.len() => LimitState::FullyOverridden,
            _ => LimitState::PartiallyOverridden,
        }
    }

    /// Effective values: override if present, else `baseline`.
    pub fn effective(&self, baseline: &LimitTable, show_actual: bool) -> LimitTable {
        Resource::ALL
            .into_iter()
            .map(|r| {
                let value = match self.overrides.get(&r) {
                    Some(v) => LimitValue::Symbolic(v.clone()),
                    None => baseline
                        .get(&r)
                        .cloned()
                        .unwrap_or_else(|| LimitValue::Symbolic(UNLIMITED.to_string())),
                };
                let value = if show_actual { value.to_actual() } else { value };
                (r, value)
            })
            .collect()
    }

    /// Override layer as engine arguments, in resource order.
    pub fn as_args(&self) -> Vec<String> {
        self.overrides
            .iter()
            .flat_map(|(r, v)| ["-limit".to_string(), r.name().to_string(), v.clone()])
            .collect()
    }

    /// Override layer as a single `-limit <key> <value> ...` string.
    ///
    /// Empty when nothing is overridden.
    pub fn as_invocation_params(&self) -> String {
        self.overrides
            .iter()
            .map(|(r, v)| format!("-limit {} {}", r, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub(crate) const UNLIMITED: &str = "unlimited";

fn validate_value(resource: Resource, value: &str) -> Result<(), MagickError> {
    if value.eq_ignore_ascii_case(UNLIMITED) || parse_size(value).is_some() {
        Ok(())
    } else {
        Err(MagickError::InvalidLimitValue {
            resource,
            value: value.to_string(),
        })
    }
}

/// Convert a symbolic size such as `"64mb"`, `"1.5GiB"` or `"128MP"` to an
/// absolute count using binary multipliers (`1mb = 2^20`).
///
/// The trailing `b`/`ib`/`p` unit letters are optional. Returns `None` for
/// anything else, including `"unlimited"`.
///
/// # Examples
/// ```
/// # use magick_wrap::magick::parse_size;
/// assert_eq!(parse_size("64mb"), Some(64 * (1 << 20)));
/// assert_eq!(parse_size("0b"), Some(0));
/// assert_eq!(parse_size("768"), Some(768));
/// assert_eq!(parse_size("unlimited"), None);
/// ```
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    if number.is_empty() {
        return None;
    }
    let number: f64 = number.parse().ok()?;

    let unit = unit
        .strip_suffix("ib")
        .or_else(|| unit.strip_suffix('b'))
        .or_else(|| unit.strip_suffix('p'))
        .unwrap_or(unit);
    let exponent = match unit {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        "p" => 50,
        "e" => 60,
        _ => return None,
    };
    let scaled = number * 2f64.powi(exponent);
    if scaled.is_finite() && scaled < u64::MAX as f64 {
        Some(scaled.round() as u64)
    } else {
        None
    }
}

/// Parse the output of `identify -list resource`.
///
/// Understands the `Key: value` listing printed by current releases and the
/// older tabular layout (a header row of names over a row of values).
/// Only the five tracked resources are returned.
pub fn parse_resource_listing(output: &str) -> BTreeMap<Resource, String> {
    let mut found = BTreeMap::new();

    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if let Ok(resource) = key.parse::<Resource>() {
                let value = value.trim();
                if !value.is_empty() {
                    found.insert(resource, value.to_string());
                }
            }
        }
    }
    if !found.is_empty() {
        return found;
    }

    let mut lines = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('-'));
    while let Some(line) = lines.next() {
        let header: Vec<&str> = line.split_whitespace().collect();
        if !header.iter().any(|h| h.parse::<Resource>().is_ok()) {
            continue;
        }
        if let Some(values) = lines.next() {
            for (name, value) in header.iter().zip(values.split_whitespace()) {
                if let Ok(resource) = name.parse::<Resource>() {
                    found.insert(resource, value.to_string());
                }
            }
        }
        break;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> LimitTable {
        Resource::ALL
            .into_iter()
            .map(|r| (r, LimitValue::Symbolic("1GiB".to_string())))
            .collect()
    }

    #[test]
    fn resource_names_round_trip() {
        for r in Resource::ALL {
            assert_eq!(r.name().parse::<Resource>().unwrap(), r);
        }
        assert!(matches!(
            "thread".parse::<Resource>(),
            Err(MagickError::UnknownResource(name)) if name == "thread"
        ));
    }

    #[test]
    fn set_then_current_reports_override() {
        let mut limits = ResourceLimits::new();
        limits.set([(Resource::Area, "32mb")]).unwrap();
        let current = limits.effective(&baseline(), false);
        assert_eq!(current[&Resource::Area], "32mb");
        assert_eq!(current[&Resource::Memory], "1GiB");
    }

    #[test]
    fn remove_reverts_to_baseline() {
        let mut limits = ResourceLimits::new();
        limits.set([(Resource::Area, "32mb")]).unwrap();
        limits.remove(&[Resource::Area]);
        assert_eq!(limits.effective(&baseline(), false), baseline());
    }

    #[test]
    fn unset_all_restores_every_key() {
        let mut limits = ResourceLimits::new();
        limits
            .set([(Resource::Memory, "64mb"), (Resource::Disk, "0b")])
            .unwrap();
        limits.unset_all();
        assert_eq!(limits.state(), LimitState::Unset);
        assert_eq!(limits.effective(&baseline(), false), baseline());
    }

    #[test]
    fn show_actual_converts_units() {
        let mut limits = ResourceLimits::new();
        limits
            .set([(Resource::Memory, "64mb"), (Resource::Disk, "0b")])
            .unwrap();
        let current = limits.effective(&baseline(), true);
        assert_eq!(current[&Resource::Memory], 64 * (1u64 << 20));
        assert_eq!(current[&Resource::Disk], 0u64);
        assert_eq!(current[&Resource::Area], 1u64 << 30);
    }

    #[test]
    fn show_actual_keeps_unlimited_symbolic() {
        let limits = ResourceLimits::new();
        let mut base = baseline();
        base.insert(Resource::Disk, LimitValue::Symbolic("unlimited".into()));
        assert_eq!(limits.effective(&base, true)[&Resource::Disk], "unlimited");
    }

    #[test]
    fn invalid_value_is_rejected_without_partial_apply() {
        let mut limits = ResourceLimits::new();
        let err = limits
            .set([(Resource::Map, "2gb"), (Resource::Memory, "lots")])
            .unwrap_err();
        assert!(matches!(
            err,
            MagickError::InvalidLimitValue { resource: Resource::Memory, .. }
        ));
        assert_eq!(limits.get(Resource::Map), None);
    }

    #[test]
    fn state_tracks_override_count() {
        let mut limits = ResourceLimits::new();
        assert_eq!(limits.state(), LimitState::Unset);
        limits.set([(Resource::File, "64")]).unwrap();
        assert_eq!(limits.state(), LimitState::PartiallyOverridden);
        limits
            .set(Resource::ALL.into_iter().map(|r| (r, "1gb")))
            .unwrap();
        assert_eq!(limits.state(), LimitState::FullyOverridden);
    }

    #[test]
    fn params_render_override_layer_only() {
        let mut limits = ResourceLimits::new();
        assert_eq!(limits.as_invocation_params(), "");
        assert!(limits.as_args().is_empty());

        limits
            .set([(Resource::Memory, "64mb"), (Resource::Area, "32mb")])
            .unwrap();
        assert_eq!(
            limits.as_invocation_params(),
            "-limit area 32mb -limit memory 64mb"
        );
        assert_eq!(
            limits.as_args(),
            ["-limit", "area", "32mb", "-limit", "memory", "64mb"]
        );
    }

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("32mb"), Some(32 << 20));
        assert_eq!(parse_size("32MiB"), Some(32 << 20));
        assert_eq!(parse_size("2k"), Some(2048));
        assert_eq!(parse_size("1GB"), Some(1 << 30));
        assert_eq!(parse_size("128MP"), Some(128 << 20));
        assert_eq!(parse_size("1.5KiB"), Some(1536));
        assert_eq!(parse_size("0b"), Some(0));
        assert_eq!(parse_size("16KP"), Some(16 << 10));
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("mb"), None);
        assert_eq!(parse_size("12xb"), None);
        assert_eq!(parse_size("1.2.3mb"), None);
        assert_eq!(parse_size("unlimited"), None);
    }

    #[test]
    fn parses_key_value_listing() {
        let output = "\
Resource limits:
  Width: 16KP
  Height: 16KP
  List length: unlimited
  Area: 128MP
  Memory: 256MiB
  Map: 512MiB
  Disk: 1GiB
  File: 768
  Thread: 8
  Throttle: 0
  Time: unlimited
";
        let parsed = parse_resource_listing(output);
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[&Resource::Area], "128MP");
        assert_eq!(parsed[&Resource::Memory], "256MiB");
        assert_eq!(parsed[&Resource::Map], "512MiB");
        assert_eq!(parsed[&Resource::Disk], "1GiB");
        assert_eq!(parsed[&Resource::File], "768");
    }

    #[test]
    fn parses_tabular_listing() {
        let output = "\
File       Area     Memory        Map       Disk   Thread         Time
-------------------------------------------------------------------------------
 768   4.1508GB  1.9328GiB  3.8656GiB  unlimited        1    unlimited
";
        let parsed = parse_resource_listing(output);
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[&Resource::File], "768");
        assert_eq!(parsed[&Resource::Area], "4.1508GB");
        assert_eq!(parsed[&Resource::Disk], "unlimited");
    }

    #[test]
    fn unrelated_output_yields_nothing() {
        assert!(parse_resource_listing("convert: command not found").is_empty());
        assert!(parse_resource_listing("").is_empty());
    }
}
