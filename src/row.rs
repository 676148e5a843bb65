/// One input record: column name to raw text, in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Identifies the record in error reports (the CSV line number).
    pub id: u64,
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new(id: u64, fields: Vec<(String, String)>) -> Self {
        Self { id, fields }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<K, V>(id: u64, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            id,
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        )
    }

    /// Raw text of a column, if the row has it.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

/// Missing or whitespace-only text counts as no value.
pub fn is_empty(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
