//! Fluent SELECT builder rendered to SQL text.
//!
//! The builder is deliberately small: it renders a projection, a row
//! source (table or parenthesized subquery), a WHERE conjunction, and
//! LIMIT/OFFSET. Query values clone it to derive refined queries, so every
//! method consumes and returns `self`.

use std::fmt;

/// Raw SQL text spliced verbatim into a builder clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment(String);

impl SqlFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SqlFragment {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for SqlFragment {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// Splices raw predicate text into builder clauses.
pub fn sql(text: impl Into<String>) -> SqlFragment {
    SqlFragment::new(text)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FromSource {
    Table(String),
    Subquery { text: String, alias: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectBuilder {
    columns: Vec<String>,
    source: Option<FromSource>,
    predicates: Vec<SqlFragment>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts raw query text as a subquery source so it can be refined
    /// like a table.
    pub fn wrap_raw(text: impl Into<String>) -> Self {
        Self {
            source: Some(FromSource::Subquery {
                text: text.into(),
                alias: format!("input_query_{}", short_alias()),
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn from(mut self, table: impl Into<String>) -> Self {
        self.source = Some(FromSource::Table(table.into()));
        self
    }

    #[must_use]
    pub fn from_subquery(mut self, text: impl Into<String>, alias: impl Into<String>) -> Self {
        self.source = Some(FromSource::Subquery {
            text: text.into(),
            alias: alias.into(),
        });
        self
    }

    /// Adds a projected column; the projection defaults to `*` when none
    /// are added.
    #[must_use]
    pub fn select(mut self, column: impl Into<String>) -> Self {
        self.columns.push(column.into());
        self
    }

    /// Adds a predicate to the WHERE conjunction.
    #[must_use]
    pub fn where_(mut self, predicate: impl Into<SqlFragment>) -> Self {
        self.predicates.push(predicate.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }
}

impl fmt::Display for SelectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            write!(f, "SELECT *")?;
        } else {
            write!(f, "SELECT {}", self.columns.join(", "))?;
        }
        match &self.source {
            Some(FromSource::Table(table)) => write!(f, " FROM {}", table)?,
            Some(FromSource::Subquery { text, alias }) => {
                write!(f, " FROM ({}) AS {}", text, alias)?
            }
            None => {}
        }
        if !self.predicates.is_empty() {
            let rendered: Vec<String> = self
                .predicates
                .iter()
                .map(|p| format!("({})", p.as_str()))
                .collect();
            write!(f, " WHERE {}", rendered.join(" AND "))?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {}", n)?;
        }
        if let Some(n) = self.offset {
            write!(f, " OFFSET {}", n)?;
        }
        Ok(())
    }
}

fn short_alias() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_projection() {
        let builder = SelectBuilder::new().from("users");
        assert_eq!(builder.to_string(), "SELECT * FROM users");
    }

    #[test]
    fn test_full_rendering() {
        let builder = SelectBuilder::new()
            .select("name")
            .select("age")
            .from("users")
            .where_("age > 21")
            .where_(sql("dept = 'eng'"))
            .limit(10)
            .offset(20);
        assert_eq!(
            builder.to_string(),
            "SELECT name, age FROM users WHERE (age > 21) AND (dept = 'eng') LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_wrap_raw_aliases_the_subquery() {
        let builder = SelectBuilder::wrap_raw("SELECT 1 AS one");
        let rendered = builder.to_string();
        assert!(rendered.starts_with("SELECT * FROM (SELECT 1 AS one) AS input_query_"));
    }

    #[test]
    fn test_wrap_raw_aliases_are_unique() {
        let a = SelectBuilder::wrap_raw("SELECT 1").to_string();
        let b = SelectBuilder::wrap_raw("SELECT 1").to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_clone_refinement_leaves_original_untouched() {
        let base = SelectBuilder::new().from("events");
        let refined = base.clone().where_("kind = 'click'").limit(5);
        assert_eq!(base.to_string(), "SELECT * FROM events");
        assert_eq!(
            refined.to_string(),
            "SELECT * FROM events WHERE (kind = 'click') LIMIT 5"
        );
    }

    #[test]
    fn test_from_subquery() {
        let builder = SelectBuilder::new().from_subquery("SELECT 2", "inner_q");
        assert_eq!(builder.to_string(), "SELECT * FROM (SELECT 2) AS inner_q");
    }
}
