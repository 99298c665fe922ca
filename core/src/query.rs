//! Field selection, sorting and pagination for list calls.

/// Sort key, with `$` allowed as the property-path separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub key: String,
    pub descending: bool,
}

impl Sort {
    /// The `_orderBy` text before URL encoding: `$` becomes `.` and a
    /// descending sort gets a ` desc` suffix.
    pub fn to_order_by(&self) -> String {
        let mut text = self.key.clone();
        if self.descending {
            text.push_str(" desc");
        }
        text.replace('$', ".")
    }
}

/// Optional shaping of a list call. Unset fields use the service default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub fields: Vec<String>,
    pub sort: Option<Sort>,
    pub start_row: Option<u32>,
    pub end_row: Option<u32>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, key: &str) -> Self {
        self.sort = Some(Sort {
            key: key.to_string(),
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, key: &str) -> Self {
        self.sort = Some(Sort {
            key: key.to_string(),
            descending: true,
        });
        self
    }

    /// Row window as understood by the service (`_startRow`, `_endRow`).
    pub fn rows(mut self, start_row: u32, end_row: u32) -> Self {
        self.start_row = Some(start_row);
        self.end_row = Some(end_row);
        self
    }
}
