use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{CalendarDate, Price};

use super::datekey::{DateKey, encode};

/// Per-date override. An override with neither field set means "no entry".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    #[serde(default)]
    pub occupied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

impl DateOverride {
    pub fn occupied() -> Self {
        Self { occupied: true, price: None }
    }

    pub fn priced(price: Price) -> Self {
        Self { occupied: false, price: Some(price) }
    }

    /// A zero price counts as "no custom price".
    fn normalized(self) -> Self {
        Self {
            occupied: self.occupied,
            price: self.price.filter(|p| *p > 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        let n = self.normalized();
        !n.occupied && n.price.is_none()
    }
}

/// Occupancy/price overrides keyed by `DateKey`. Serializes to the JSON object
/// stored under the `dateInfo` setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverrideTable {
    entries: BTreeMap<DateKey, DateOverride>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, date: CalendarDate) -> Option<&DateOverride> {
        self.entries.get(encode(date).as_str())
    }

    pub fn is_occupied(&self, date: CalendarDate) -> bool {
        self.get(date).is_some_and(|o| o.occupied)
    }

    pub fn custom_price(&self, date: CalendarDate) -> Option<Price> {
        self.get(date).and_then(|o| o.price).filter(|p| *p > 0)
    }

    /// Replace the entry for `date`. An empty override removes the entry
    /// instead of storing it. Returns the previous entry.
    pub fn set(&mut self, date: CalendarDate, entry: DateOverride) -> Option<DateOverride> {
        let key = encode(date);
        let entry = entry.normalized();
        if entry.is_empty() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, entry)
        }
    }

    pub fn remove(&mut self, date: CalendarDate) -> Option<DateOverride> {
        self.entries.remove(encode(date).as_str())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateKey, &DateOverride)> {
        self.entries.iter()
    }

    /// Decode the stored JSON object. Keys must be canonical date keys; empty
    /// entries are dropped.
    pub fn from_json(value: &serde_json::Value) -> Result<OverrideTable, String> {
        let raw: BTreeMap<String, DateOverride> =
            serde_json::from_value(value.clone()).map_err(|e| format!("bad dateInfo: {e}"))?;
        let mut entries = BTreeMap::new();
        for (k, v) in raw {
            let key = DateKey::from_canonical(&k)
                .ok_or_else(|| format!("bad dateInfo key: {k:?} (expected YYYY-MM-DD)"))?;
            let v = v.normalized();
            if !v.is_empty() {
                entries.insert(key, v);
            }
        }
        Ok(OverrideTable { entries })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.entries.len());
        for (key, entry) in &self.entries {
            let mut obj = serde_json::Map::new();
            obj.insert("occupied".into(), serde_json::Value::Bool(entry.occupied));
            if let Some(price) = entry.price {
                obj.insert("price".into(), serde_json::Value::from(price));
            }
            map.insert(key.to_string(), serde_json::Value::Object(obj));
        }
        serde_json::Value::Object(map)
    }
}
