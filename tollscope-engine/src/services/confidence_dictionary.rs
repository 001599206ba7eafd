//! Plate → tag confidence dictionary
//!
//! Records which transponder each plate has been seen with and how many times
//! that pairing has been confirmed. A pairing confirmed often enough lets the
//! mismatch detector treat a later plate read without that tag as a missed
//! AVI read rather than a different vehicle.
//!
//! A dictionary is either dynamic (built from the record stream, new plates
//! seeded on first sighting) or static (loaded whole; no plates are added).
//! Read counts are never decremented.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tollscope_common::records::TagId;
use tollscope_common::Result;
use tracing::{debug, info};

/// Plate entry, exported as `[tag_id, read_count]`
///
/// `tag_id` is `None` when the plate was first seen without a tag read; such
/// an entry is never confirmed by later reads and exports as `[null, n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Option<TagId>, u32)", into = "(Option<TagId>, u32)")]
pub struct DictionaryEntry {
    pub tag_id: Option<TagId>,
    pub read_count: u32,
}

impl From<(Option<TagId>, u32)> for DictionaryEntry {
    fn from((tag_id, read_count): (Option<TagId>, u32)) -> Self {
        Self { tag_id, read_count }
    }
}

impl From<DictionaryEntry> for (Option<TagId>, u32) {
    fn from(entry: DictionaryEntry) -> Self {
        (entry.tag_id, entry.read_count)
    }
}

/// Whether new plates may be added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryMode {
    Dynamic,
    Static,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceDictionary {
    entries: HashMap<String, DictionaryEntry>,
    mode: DictionaryMode,
}

impl Default for ConfidenceDictionary {
    fn default() -> Self {
        Self::dynamic()
    }
}

impl ConfidenceDictionary {
    /// Empty dictionary that learns plates from the record stream
    pub fn dynamic() -> Self {
        Self {
            entries: HashMap::new(),
            mode: DictionaryMode::Dynamic,
        }
    }

    /// Fixed dictionary from preloaded entries
    pub fn fixed<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, DictionaryEntry)>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(|(p, e)| (p.into(), e)).collect(),
            mode: DictionaryMode::Static,
        }
    }

    pub fn mode(&self) -> DictionaryMode {
        self.mode
    }

    pub fn is_static(&self) -> bool {
        self.mode == DictionaryMode::Static
    }

    /// Switch to static mode, keeping all entries
    pub fn into_static(mut self) -> Self {
        self.mode = DictionaryMode::Static;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, plate: &str) -> Option<&DictionaryEntry> {
        self.entries.get(plate)
    }

    pub(crate) fn get_mut(&mut self, plate: &str) -> Option<&mut DictionaryEntry> {
        self.entries.get_mut(plate)
    }

    /// Seed a new plate with this row's tag read (possibly none) and zero
    /// confirmed reads
    ///
    /// Returns `false` (and changes nothing) in static mode or when the plate
    /// is already present.
    pub(crate) fn seed(&mut self, plate: &str, tag_id: Option<TagId>) -> bool {
        if self.is_static() || self.entries.contains_key(plate) {
            return false;
        }
        self.entries.insert(
            plate.to_string(),
            DictionaryEntry {
                tag_id,
                read_count: 0,
            },
        );
        true
    }

    /// Entries ordered by plate
    pub fn entries(&self) -> BTreeMap<&str, DictionaryEntry> {
        self.entries.iter().map(|(p, e)| (p.as_str(), *e)).collect()
    }

    /// Keep only the `n` most-read plates (ties broken by plate)
    pub fn top_n(&self, n: usize) -> Self {
        let mut ranked: Vec<(&String, &DictionaryEntry)> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.1.read_count.cmp(&a.1.read_count).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(n);

        Self {
            entries: ranked.into_iter().map(|(p, e)| (p.clone(), *e)).collect(),
            mode: self.mode,
        }
    }

    /// Export as a JSON object `{ plate: [tag_id, read_count] }`
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entries())?)
    }

    /// Import from the JSON export form
    pub fn from_json_str(content: &str, mode: DictionaryMode) -> Result<Self> {
        let entries: HashMap<String, DictionaryEntry> = serde_json::from_str(content)?;
        Ok(Self { entries, mode })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        info!(path = %path.display(), plates = self.len(), "Saved confidence dictionary");
        Ok(())
    }

    pub fn load_json(path: &Path, mode: DictionaryMode) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let dictionary = Self::from_json_str(&content, mode)?;
        debug!(path = %path.display(), plates = dictionary.len(), ?mode, "Loaded confidence dictionary");
        Ok(dictionary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag_id: TagId, read_count: u32) -> DictionaryEntry {
        DictionaryEntry {
            tag_id: Some(tag_id),
            read_count,
        }
    }

    #[test]
    fn test_fixed_dictionary_lookup() {
        let dict = ConfidenceDictionary::fixed([("BA", entry(1234, 5)), ("ZB", entry(3854, 8))]);
        assert!(dict.is_static());
        assert_eq!(dict.get("BA").unwrap().read_count, 5);
        assert_eq!(dict.get("ZB").unwrap().read_count, 8);
        assert!(dict.get("Bad Value").is_none());
    }

    #[test]
    fn test_seed_only_in_dynamic_mode() {
        let mut dynamic = ConfidenceDictionary::dynamic();
        assert!(dynamic.seed("ABC", Some(123)));
        assert!(!dynamic.seed("ABC", Some(999)));
        assert_eq!(dynamic.get("ABC"), Some(&entry(123, 0)));

        let mut fixed = ConfidenceDictionary::fixed(Vec::<(String, DictionaryEntry)>::new());
        assert!(!fixed.seed("ABC", Some(123)));
        assert!(fixed.is_empty());
    }

    #[test]
    fn test_top_n_keeps_most_read() {
        let dict = ConfidenceDictionary::fixed([
            ("AAA", entry(1, 3)),
            ("BBB", entry(2, 9)),
            ("CCC", entry(3, 9)),
            ("DDD", entry(4, 1)),
        ]);
        let top = dict.top_n(2);
        assert_eq!(top.len(), 2);
        assert!(top.get("BBB").is_some());
        assert!(top.get("CCC").is_some());
        assert!(dict.top_n(0).is_empty());
        assert_eq!(dict.top_n(10).len(), 4);
    }

    #[test]
    fn test_json_export_form() {
        let dict = ConfidenceDictionary::fixed([("ABC", entry(123, 6))]);
        let json = dict.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["ABC"], serde_json::json!([123, 6]));

        let restored = ConfidenceDictionary::from_json_str(&json, DictionaryMode::Static).unwrap();
        assert_eq!(restored, dict);
    }

    #[test]
    fn test_tagless_entry_exports_null() {
        let mut dict = ConfidenceDictionary::dynamic();
        assert!(dict.seed("XYZ", None));
        let json = dict.to_json_string().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["XYZ"], serde_json::json!([null, 0]));

        let restored = ConfidenceDictionary::from_json_str(&json, DictionaryMode::Dynamic).unwrap();
        assert_eq!(
            restored.get("XYZ"),
            Some(&DictionaryEntry {
                tag_id: None,
                read_count: 0
            })
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plate_tag.json");
        let dict = ConfidenceDictionary::fixed([("ZB", entry(3854, 8))]);
        dict.save_json(&path).unwrap();

        let loaded = ConfidenceDictionary::load_json(&path, DictionaryMode::Dynamic).unwrap();
        assert_eq!(loaded.mode(), DictionaryMode::Dynamic);
        assert_eq!(loaded.get("ZB"), Some(&entry(3854, 8)));
    }
}
