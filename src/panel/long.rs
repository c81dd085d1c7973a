use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::Result;
use crate::panel::wide::WidePanel;

#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub entity_id: Arc<str>,
    pub date: NaiveDate,
    pub value: f64,
    pub entity_code: u32,
}

/// Dense integer codes for entities, assigned in sorted first-seen order.
#[derive(Debug, Clone, Default)]
pub struct EntityLookup {
    codes: HashMap<Arc<str>, u32>,
    ids: Vec<Arc<str>>,
}

impl EntityLookup {
    fn register(&mut self, entity_id: &str) -> (Arc<str>, u32) {
        if let Some((id, code)) = self.codes.get_key_value(entity_id) {
            return (Arc::clone(id), *code);
        }
        let id: Arc<str> = Arc::from(entity_id);
        let code = self.ids.len() as u32;
        self.ids.push(Arc::clone(&id));
        self.codes.insert(Arc::clone(&id), code);
        (id, code)
    }

    pub fn code(&self, entity_id: &str) -> Option<u32> {
        self.codes.get(entity_id).copied()
    }

    pub fn entity_id(&self, code: u32) -> Option<&str> {
        self.ids.get(code as usize).map(|id| id.as_ref())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(code, id)| (code as u32, id.as_ref()))
    }
}

/// Tidy one-row-per-entity-per-date panel, sorted by `(entity, date)`.
#[derive(Debug, Clone)]
pub struct LongPanel {
    records: Vec<LongRecord>,
    lookup: EntityLookup,
}

impl LongPanel {
    /// Melts the complete rows of `wide`. Fails with `DataIncomplete` when no
    /// entity has a value in every dated column.
    pub fn melt(wide: &WidePanel) -> Result<Self> {
        let mut complete = wide.complete_rows()?;
        complete.sort_by(|a, b| entity_order(&a.entity_id, &b.entity_id));

        let mut lookup = EntityLookup::default();
        let mut records = Vec::with_capacity(complete.len() * wide.dates().len());
        for row in complete {
            let (entity_id, entity_code) = lookup.register(&row.entity_id);
            for (date, value) in wide.dates().iter().zip(&row.values) {
                // complete_rows guarantees every value is present
                if let Some(value) = value {
                    records.push(LongRecord {
                        entity_id: Arc::clone(&entity_id),
                        date: *date,
                        value: *value,
                        entity_code,
                    });
                }
            }
        }

        Ok(Self { records, lookup })
    }

    /// Adds `delta` to every value. Must run before features are derived.
    pub fn shift_values(&mut self, delta: f64) {
        for record in &mut self.records {
            record.value += delta;
        }
    }

    pub fn records(&self) -> &[LongRecord] {
        &self.records
    }

    pub fn lookup(&self) -> &EntityLookup {
        &self.lookup
    }

    pub fn into_parts(self) -> (Vec<LongRecord>, EntityLookup) {
        (self.records, self.lookup)
    }
}

/// Integer identifiers (ZIP codes) sort numerically and ahead of any
/// non-numeric identifier, which sort lexicographically.
pub fn entity_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
