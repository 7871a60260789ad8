//! Key/value store backing every brick and event parameter.
//!
//! Unknown keys read as absent: string reads yield `""`, boolean reads yield
//! `false`. Keys are kept sorted, which also fixes the order in which they are
//! written to a project file.

use crate::brick::disk::Disk;
use std::collections::BTreeMap;

/// Marker meaning "switch present, no value"
pub const PRESENT: &str = "*";

/// A single configuration value
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Text(String),
    Flag(bool),
    /// Owned sub-object, never written to a project file
    Disk(Disk),
}

impl ConfigValue {
    /// Flat textual form; `None` for owned sub-objects
    pub fn as_scalar(&self) -> Option<String> {
        match self {
            ConfigValue::Text(s) => Some(s.clone()),
            ConfigValue::Flag(true) => Some(PRESENT.to_string()),
            ConfigValue::Flag(false) => Some(String::new()),
            ConfigValue::Disk(_) => None,
        }
    }
}

/// Interpret a textual value as a boolean flag
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "*" | "1" | "true" | "yes" | "on"
    )
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigBag {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// String value of `key`, or `""` when absent or not a scalar
    pub fn get_string(&self, key: &str) -> String {
        self.entries
            .get(key)
            .and_then(ConfigValue::as_scalar)
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(ConfigValue::Flag(b)) => *b,
            Some(ConfigValue::Text(s)) => is_truthy(s),
            _ => false,
        }
    }

    pub fn get_disk(&self, key: &str) -> Option<&Disk> {
        match self.entries.get(key) {
            Some(ConfigValue::Disk(d)) => Some(d),
            _ => None,
        }
    }

    pub fn get_disk_mut(&mut self, key: &str) -> Option<&mut Disk> {
        match self.entries.get_mut(key) {
            Some(ConfigValue::Disk(d)) => Some(d),
            _ => None,
        }
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.entries
            .insert(key.to_string(), ConfigValue::Text(value.into()));
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.entries.insert(key.to_string(), ConfigValue::Flag(value));
    }

    pub fn set_owned(&mut self, key: &str, disk: Disk) {
        self.entries.insert(key.to_string(), ConfigValue::Disk(disk));
    }

    /// Apply one `key=value` assignment.
    ///
    /// The value is everything after the first `=`, so it may itself contain
    /// `=`; one pair of surrounding double quotes is stripped. A key that
    /// already holds a flag keeps its flag type. Returns `false` when the
    /// attribute has no `=` or an empty key, leaving the bag untouched.
    pub fn set(&mut self, attr: &str) -> bool {
        let Some((key, value)) = attr.split_once('=') else {
            return false;
        };
        let key = key.trim();
        if key.is_empty() {
            return false;
        }

        let value = unquote(value.trim());
        match self.entries.get(key) {
            Some(ConfigValue::Flag(_)) => self.set_flag(key, is_truthy(value)),
            Some(ConfigValue::Disk(_)) => return false,
            _ => self.set_text(key, value),
        }
        true
    }

    /// All scalar entries as `(key, text)` pairs, sorted by key
    pub fn scalars(&self) -> impl Iterator<Item = (&str, String)> {
        self.entries
            .iter()
            .filter_map(|(k, v)| v.as_scalar().map(|s| (k.as_str(), s)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_reads_as_absent() {
        let cfg = ConfigBag::new();
        assert_eq!(cfg.get_string("missing"), "");
        assert!(!cfg.get_bool("missing"));
        assert!(cfg.get("missing").is_none());
    }

    #[test]
    fn test_set_parses_key_value() {
        let mut cfg = ConfigBag::new();
        assert!(cfg.set("numports=16"));
        assert_eq!(cfg.get_string("numports"), "16");
        assert!(!cfg.set("novalue"));
        assert!(!cfg.set("=orphan"));
    }

    #[test]
    fn test_set_keeps_embedded_equals_and_strips_quotes() {
        let mut cfg = ConfigBag::new();
        assert!(cfg.set("kopt=\"root=/dev/sda1 console=ttyS0\""));
        assert_eq!(cfg.get_string("kopt"), "root=/dev/sda1 console=ttyS0");
    }

    #[test]
    fn test_flag_keys_stay_flags() {
        let mut cfg = ConfigBag::new();
        cfg.set_flag("hub", false);
        cfg.set("hub=*");
        assert_eq!(cfg.get("hub"), Some(&ConfigValue::Flag(true)));
        assert_eq!(cfg.get_string("hub"), PRESENT);
        cfg.set("hub=");
        assert!(!cfg.get_bool("hub"));
    }

    #[test]
    fn test_owned_values_are_not_scalars() {
        let mut cfg = ConfigBag::new();
        cfg.set_owned("hda", Disk::new("hda"));
        cfg.set_text("ram", "64");
        let keys: Vec<_> = cfg.scalars().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ram"]);
        assert!(!cfg.set("hda=/tmp/disk"));
        assert!(cfg.get_disk("hda").is_some());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut cfg = ConfigBag::new();
        cfg.set_owned("hda", Disk::new("hda"));
        let mut copy = cfg.clone();
        copy.get_disk_mut("hda").unwrap().cow = true;
        assert!(!cfg.get_disk("hda").unwrap().cow);
    }
}
