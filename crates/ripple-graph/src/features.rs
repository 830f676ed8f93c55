//! Named feature tables.
//!
//! A table maps an owner (user or piece) to a list of weighted values.
//! Owners without an entry simply have no features.

use std::collections::BTreeMap;

use ripple_types::FeatureValue;

/// One named, multi-valued feature table keyed by `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable<K: Ord> {
    values: BTreeMap<K, Vec<FeatureValue>>,
}

impl<K: Ord> FeatureTable<K> {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Append a value to the owner's list.
    pub fn push(&mut self, owner: K, value: FeatureValue) {
        self.values.entry(owner).or_default().push(value);
    }

    /// Values of the owner, empty when the owner has none.
    pub fn get(&self, owner: &K) -> &[FeatureValue] {
        self.values.get(owner).map_or(&[], Vec::as_slice)
    }

    /// Number of owners that have at least one value.
    pub fn owner_count(&self) -> usize {
        self.values.len()
    }

    /// Iterate over owners and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &[FeatureValue])> {
        self.values.iter().map(|(k, v)| (k, v.as_slice()))
    }
}

impl<K: Ord> Default for FeatureTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ripple_types::InfoId;

    use super::*;

    #[test]
    fn missing_owner_has_no_features() {
        let mut table = FeatureTable::new();
        table.push(InfoId::new(1), FeatureValue::new("rust", 1.0));
        assert!(table.get(&InfoId::new(2)).is_empty());
        assert_eq!(table.get(&InfoId::new(1)).len(), 1);
    }

    #[test]
    fn values_accumulate_per_owner() {
        let mut table = FeatureTable::new();
        table.push(InfoId::new(1), FeatureValue::new("rust", 1.0));
        table.push(InfoId::new(1), FeatureValue::new("graphs", 0.5));
        assert_eq!(table.owner_count(), 1);
        let values: Vec<&str> = table
            .get(&InfoId::new(1))
            .iter()
            .map(|v| v.value.as_str())
            .collect();
        assert_eq!(values, vec!["rust", "graphs"]);
    }
}
