//! Dynamic `WHERE` clause construction.
//!
//! A [`WhereClause`] collects predicate fragments and, in parallel, the values
//! bound to their `?` placeholders. Optional request fields only contribute a
//! predicate when they carry a value, so the same builder serves every
//! combination of filters a list request can send.

use chrono::NaiveDate;

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Integer(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Boolean(value)
    }
}

impl From<NaiveDate> for FilterValue {
    fn from(value: NaiveDate) -> Self {
        FilterValue::Date(value)
    }
}

/// Predicates ANDed together plus their parameters in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    predicates: Vec<String>,
    params: Vec<FilterValue>,
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw predicate and the values for its placeholders.
    pub fn push<I>(&mut self, predicate: impl Into<String>, params: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<FilterValue>,
    {
        let predicate = predicate.into();
        let params: Vec<FilterValue> = params.into_iter().map(Into::into).collect();
        debug_assert_eq!(
            predicate.matches('?').count(),
            params.len(),
            "placeholder count must match parameters for `{}`",
            predicate
        );
        self.predicates.push(predicate);
        self.params.extend(params);
        self
    }

    /// Unconditional equality, used for mandatory parent keys.
    pub fn eq(&mut self, column: &str, value: impl Into<FilterValue>) -> &mut Self {
        let value: FilterValue = value.into();
        self.push(format!("{} = ?", column), [value])
    }

    /// Equality on a foreign key, only when the id is positive.
    pub fn eq_id(&mut self, column: &str, id: i64) -> &mut Self {
        if id > 0 {
            self.eq(column, id);
        }
        self
    }

    /// Case-insensitive exact match, only when the value is not blank.
    pub fn eq_text(&mut self, column: &str, value: &str) -> &mut Self {
        if !blank(value) {
            self.push(
                format!("UPPER({}) = UPPER(?)", column),
                [value.trim().to_string()],
            );
        }
        self
    }

    /// Boolean equality, only when set.
    pub fn eq_bool(&mut self, column: &str, value: Option<bool>) -> &mut Self {
        if let Some(value) = value {
            self.eq(column, value);
        }
        self
    }

    /// Case-insensitive substring match against any of `columns`.
    pub fn contains_any(&mut self, columns: &[&str], value: &str) -> &mut Self {
        if blank(value) || columns.is_empty() {
            return self;
        }
        let value = value.trim().to_string();
        let predicate = columns
            .iter()
            .map(|column| format!("INSTR(UPPER({}), UPPER(?)) > 0", column))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push(
            format!("({})", predicate),
            std::iter::repeat_n(value, columns.len()),
        )
    }

    /// Lower bound on a date column, inclusive.
    pub fn date_from(&mut self, column: &str, value: Option<NaiveDate>) -> &mut Self {
        if let Some(date) = value {
            self.push(format!("{} >= ?", column), [date]);
        }
        self
    }

    /// Upper bound on a date column, inclusive.
    pub fn date_to(&mut self, column: &str, value: Option<NaiveDate>) -> &mut Self {
        if let Some(date) = value {
            self.push(format!("{} <= ?", column), [date]);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[String] {
        &self.predicates
    }

    pub fn params(&self) -> &[FilterValue] {
        &self.params
    }

    /// Render as `" WHERE a AND b"`, or an empty string when nothing was added.
    pub fn to_sql(&self) -> String {
        if self.predicates.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.predicates.join(" AND "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clause_renders_nothing() {
        let clause = WhereClause::new();
        assert!(clause.is_empty());
        assert_eq!(clause.to_sql(), "");
        assert!(clause.params().is_empty());
    }

    #[test]
    fn absent_optional_fields_add_no_predicate() {
        let mut clause = WhereClause::new();
        clause
            .eq_id("business_partner_id", 0)
            .eq_text("value", "  ")
            .eq_bool("is_customer", None)
            .contains_any(&["name"], "")
            .date_from("date_trx", None);
        assert!(clause.is_empty());
    }

    #[test]
    fn predicates_are_anded_with_parallel_params() {
        let mut clause = WhereClause::new();
        clause
            .eq_text("bp.value", "C-100")
            .eq_id("bp.group_id", 7)
            .eq_bool("bp.is_vendor", Some(true));

        assert_eq!(
            clause.to_sql(),
            " WHERE UPPER(bp.value) = UPPER(?) AND bp.group_id = ? AND bp.is_vendor = ?"
        );
        assert_eq!(
            clause.params(),
            &[
                FilterValue::Text("C-100".to_string()),
                FilterValue::Integer(7),
                FilterValue::Boolean(true),
            ]
        );
    }

    #[test]
    fn search_value_spans_columns_in_one_group() {
        let mut clause = WhereClause::new();
        clause.contains_any(&["value", "name"], " joe ");
        assert_eq!(
            clause.to_sql(),
            " WHERE (INSTR(UPPER(value), UPPER(?)) > 0 OR INSTR(UPPER(name), UPPER(?)) > 0)"
        );
        assert_eq!(
            clause.params(),
            &[
                FilterValue::Text("joe".to_string()),
                FilterValue::Text("joe".to_string())
            ]
        );
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let mut clause = WhereClause::new();
        clause.date_from("date_trx", Some(from)).date_to("date_trx", Some(to));
        assert_eq!(clause.to_sql(), " WHERE date_trx >= ? AND date_trx <= ?");
        assert_eq!(
            clause.params(),
            &[FilterValue::Date(from), FilterValue::Date(to)]
        );
    }

    #[test]
    fn raw_predicates_keep_their_params() {
        let mut clause = WhereClause::new();
        clause.push(
            "EXISTS (SELECT 1 FROM bp_contacts c WHERE c.business_partner_id = bp.id AND UPPER(c.email) = UPPER(?))",
            ["a@b.com"],
        );
        assert_eq!(clause.predicates().len(), 1);
        assert_eq!(clause.params(), &[FilterValue::Text("a@b.com".to_string())]);
    }
}
