use std::collections::HashMap;

use crate::numeric::parse_numeric;

/// Maps logical field names to column indices, resolved from a header row by
/// keyword synonyms. Headers are matched lower-cased, so bilingual exports
/// ("Menge"/"Quantity") resolve to the same field. A column equal to one of
/// the keywords wins outright; otherwise the first header column containing
/// any keyword wins ("Wert" must not be claimed by
/// "Vermögenswertkategorie"). An absent column is not an error, the field
/// just reads as empty/zero later.
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    idx: HashMap<String, usize>,
}

impl ColumnMap {
    pub fn resolve(header: &[String], fields: &[(&str, &[&str])]) -> ColumnMap {
        let lowered: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut idx = HashMap::new();
        for (field, keywords) in fields {
            let exact = lowered
                .iter()
                .position(|col| keywords.iter().any(|k| col == k));
            let found = exact.or_else(|| {
                lowered.iter().position(|col| {
                    !col.is_empty() && keywords.iter().any(|k| col.contains(k))
                })
            });
            if let Some(i) = found {
                idx.insert((*field).to_string(), i);
            }
        }
        ColumnMap { idx }
    }

    pub fn has(&self, field: &str) -> bool {
        self.idx.contains_key(field)
    }

    /// Fields from `required` that did not resolve, for diagnostics.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|f| !self.has(f))
            .copied()
            .collect()
    }

    pub fn get<'a>(&self, row: &'a [String], field: &str) -> Option<&'a str> {
        let i = *self.idx.get(field)?;
        row.get(i).map(|s| s.as_str())
    }

    /// The field's raw text, or "" when the column is absent from the header
    /// or the row is too short.
    pub fn text(&self, row: &[String], field: &str) -> String {
        self.get(row, field).unwrap_or("").trim().to_string()
    }

    /// The field parsed as a number, 0.0 when absent or unparseable.
    pub fn number(&self, row: &[String], field: &str) -> f64 {
        parse_numeric(self.get(row, field).unwrap_or(""))
    }
}
