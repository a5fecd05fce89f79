//! Translate profile search filters into document-store query constraints.
//!
//! The document store only accepts a restricted query shape, and these rules
//! are enforced here so that a bad filter combination fails fast as
//! `InvalidFilters` instead of as a backend round trip:
//!
//! - range inequalities (`>=`, `<=`) may target at most one field;
//! - when a range is present, the first `order_by` must be on that field;
//! - `array-contains-any` takes at most [`ARRAY_CONTAINS_ANY_MAX`] values.

use crate::config::SearchConfig;
use crate::error::{AmaError, Result};
use crate::types::{Role, SortOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ARRAY_CONTAINS_ANY_MAX: usize = 10;

/// Upper bound appended to a prefix to turn it into a range scan.
pub const PREFIX_SENTINEL: char = '\u{f8ff}';

pub const FIELD_ROLE: &str = "role";
pub const FIELD_LOCATION: &str = "location";
pub const FIELD_VERIFIED: &str = "verified";
pub const FIELD_SPORTS: &str = "sports";
pub const FIELD_AGE: &str = "age";
pub const FIELD_NAME: &str = "name_lower";
pub const FIELD_CREATED: &str = "created_at";
pub const FIELD_FOLLOWERS: &str = "followers_count";

// ---------------------------------------------------------------------------
// SearchFilters (input)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sports: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// QueryConstraint (output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    ArrayContains,
    ArrayContainsAny,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "==",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
            FilterOp::ArrayContains => "array-contains",
            FilterOp::ArrayContainsAny => "array-contains-any",
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, FilterOp::Gte | FilterOp::Lte)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Int(n) => write!(f, "{n}"),
            FilterValue::Text(s) => write!(f, "{s:?}"),
            FilterValue::List(items) => write!(f, "{items:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryConstraint {
    Where {
        field: String,
        op: FilterOp,
        value: FilterValue,
    },
    OrderBy {
        field: String,
        direction: Direction,
    },
    Limit {
        count: u32,
    },
}

impl QueryConstraint {
    fn filter(field: &str, op: FilterOp, value: FilterValue) -> Self {
        QueryConstraint::Where {
            field: field.to_string(),
            op,
            value,
        }
    }

    fn order_by(field: &str, direction: Direction) -> Self {
        QueryConstraint::OrderBy {
            field: field.to_string(),
            direction,
        }
    }
}

impl fmt::Display for QueryConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryConstraint::Where { field, op, value } => {
                write!(f, "where({field} {} {value})", op.as_str())
            }
            QueryConstraint::OrderBy { field, direction } => {
                let dir = match direction {
                    Direction::Asc => "asc",
                    Direction::Desc => "desc",
                };
                write!(f, "order_by({field} {dir})")
            }
            QueryConstraint::Limit { count } => write!(f, "limit({count})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub collection: String,
    pub constraints: Vec<QueryConstraint>,
}

impl SearchQuery {
    /// Stable textual form, usable as a cache or log key.
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
        format!("{}[{}]", self.collection, parts.join(", "))
    }

    pub fn limit(&self) -> Option<u32> {
        self.constraints.iter().find_map(|c| match c {
            QueryConstraint::Limit { count } => Some(*count),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalized_sports(sports: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for sport in sports {
        let s = sport.trim().to_lowercase();
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

fn sort_order_by(sort: SortOrder) -> QueryConstraint {
    match sort {
        SortOrder::Name => QueryConstraint::order_by(FIELD_NAME, Direction::Asc),
        SortOrder::Newest => QueryConstraint::order_by(FIELD_CREATED, Direction::Desc),
        SortOrder::Followers => QueryConstraint::order_by(FIELD_FOLLOWERS, Direction::Desc),
    }
}

pub fn build_query(
    collection: &str,
    filters: &SearchFilters,
    limits: &SearchConfig,
) -> Result<SearchQuery> {
    let mut constraints = Vec::new();

    // Equality filters
    if let Some(role) = filters.role {
        constraints.push(QueryConstraint::filter(
            FIELD_ROLE,
            FilterOp::Eq,
            FilterValue::Text(role.as_str().to_string()),
        ));
    }
    if let Some(location) = non_blank(filters.location.as_deref()) {
        constraints.push(QueryConstraint::filter(
            FIELD_LOCATION,
            FilterOp::Eq,
            FilterValue::Text(location),
        ));
    }
    if let Some(verified) = filters.verified {
        constraints.push(QueryConstraint::filter(
            FIELD_VERIFIED,
            FilterOp::Eq,
            FilterValue::Bool(verified),
        ));
    }

    // Membership
    let sports = normalized_sports(&filters.sports);
    match sports.len() {
        0 => {}
        1 => constraints.push(QueryConstraint::filter(
            FIELD_SPORTS,
            FilterOp::ArrayContains,
            FilterValue::Text(sports[0].clone()),
        )),
        n if n > ARRAY_CONTAINS_ANY_MAX => {
            return Err(AmaError::InvalidFilters(format!(
                "at most {ARRAY_CONTAINS_ANY_MAX} sports can be combined, got {n}"
            )));
        }
        _ => constraints.push(QueryConstraint::filter(
            FIELD_SPORTS,
            FilterOp::ArrayContainsAny,
            FilterValue::List(sports),
        )),
    }

    // Ranges: only one field may carry inequalities.
    let text = non_blank(filters.text.as_deref()).map(|t| t.to_lowercase());
    let has_age_range = filters.min_age.is_some() || filters.max_age.is_some();
    if let (Some(min), Some(max)) = (filters.min_age, filters.max_age) {
        if min > max {
            return Err(AmaError::InvalidFilters(format!(
                "min_age {min} is greater than max_age {max}"
            )));
        }
    }
    if has_age_range && text.is_some() {
        return Err(AmaError::InvalidFilters(
            "text search cannot be combined with an age range".to_string(),
        ));
    }

    let mut range_field = None;
    if has_age_range {
        if let Some(min) = filters.min_age {
            constraints.push(QueryConstraint::filter(
                FIELD_AGE,
                FilterOp::Gte,
                FilterValue::Int(i64::from(min)),
            ));
        }
        if let Some(max) = filters.max_age {
            constraints.push(QueryConstraint::filter(
                FIELD_AGE,
                FilterOp::Lte,
                FilterValue::Int(i64::from(max)),
            ));
        }
        range_field = Some(FIELD_AGE);
    }
    if let Some(text) = text {
        let upper = format!("{text}{PREFIX_SENTINEL}");
        constraints.push(QueryConstraint::filter(
            FIELD_NAME,
            FilterOp::Gte,
            FilterValue::Text(text),
        ));
        constraints.push(QueryConstraint::filter(
            FIELD_NAME,
            FilterOp::Lte,
            FilterValue::Text(upper),
        ));
        range_field = Some(FIELD_NAME);
    }

    // Ordering: the range field must lead.
    let requested = sort_order_by(filters.sort.unwrap_or_default());
    if let Some(field) = range_field {
        let lead = QueryConstraint::order_by(field, Direction::Asc);
        let same_field =
            matches!(&requested, QueryConstraint::OrderBy { field: f, .. } if f == field);
        constraints.push(lead);
        if !same_field {
            constraints.push(requested);
        }
    } else {
        constraints.push(requested);
    }

    let max = limits.max_limit.max(1);
    let count = filters.limit.unwrap_or(limits.default_limit).clamp(1, max);
    constraints.push(QueryConstraint::Limit { count });

    Ok(SearchQuery {
        collection: collection.to_string(),
        constraints,
    })
}

/// Count the distinct fields carrying range operators. A valid query has at
/// most one.
pub fn range_fields(query: &SearchQuery) -> Vec<&str> {
    let mut fields: Vec<&str> = Vec::new();
    for c in &query.constraints {
        if let QueryConstraint::Where { field, op, .. } = c {
            if op.is_range() && !fields.contains(&field.as_str()) {
                fields.push(field.as_str());
            }
        }
    }
    fields
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn build(filters: &SearchFilters) -> Result<SearchQuery> {
        build_query("users", filters, &SearchConfig::default())
    }

    fn first_order_by(query: &SearchQuery) -> Option<&str> {
        query.constraints.iter().find_map(|c| match c {
            QueryConstraint::OrderBy { field, .. } => Some(field.as_str()),
            _ => None,
        })
    }

    #[test]
    fn empty_filters_sort_by_name_with_default_limit() {
        let q = build(&SearchFilters::default()).unwrap();
        assert_eq!(q.describe(), "users[order_by(name_lower asc), limit(20)]");
    }

    #[test]
    fn equality_filters_come_first() {
        let q = build(&SearchFilters {
            role: Some(Role::Athlete),
            location: Some("  Lagos ".into()),
            verified: Some(true),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            q.describe(),
            "users[where(role == \"athlete\"), where(location == \"Lagos\"), \
             where(verified == true), order_by(name_lower asc), limit(20)]"
        );
    }

    #[test]
    fn single_sport_uses_array_contains() {
        let q = build(&SearchFilters {
            sports: vec!["Football".into(), "football ".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(q.constraints.contains(&QueryConstraint::Where {
            field: FIELD_SPORTS.into(),
            op: FilterOp::ArrayContains,
            value: FilterValue::Text("football".into()),
        }));
    }

    #[test]
    fn several_sports_use_array_contains_any() {
        let q = build(&SearchFilters {
            sports: vec!["football".into(), "tennis".into()],
            ..Default::default()
        })
        .unwrap();
        assert!(q.describe().contains("array-contains-any"));
    }

    #[test]
    fn too_many_sports_rejected() {
        let sports = (0..11).map(|i| format!("sport-{i}")).collect();
        let err = build(&SearchFilters {
            sports,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, AmaError::InvalidFilters(_)));
    }

    #[test]
    fn age_range_leads_ordering() {
        let q = build(&SearchFilters {
            min_age: Some(16),
            max_age: Some(21),
            sort: Some(SortOrder::Followers),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(first_order_by(&q), Some(FIELD_AGE));
        assert!(q.describe().ends_with(
            "order_by(age asc), order_by(followers_count desc), limit(20)]"
        ));
        assert_eq!(range_fields(&q), vec![FIELD_AGE]);
    }

    #[test]
    fn inverted_age_range_rejected() {
        let err = build(&SearchFilters {
            min_age: Some(30),
            max_age: Some(18),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("min_age 30"));
    }

    #[test]
    fn text_prefix_becomes_name_range() {
        let q = build(&SearchFilters {
            text: Some(" Ama ".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(q.constraints.contains(&QueryConstraint::Where {
            field: FIELD_NAME.into(),
            op: FilterOp::Lte,
            value: FilterValue::Text(format!("ama{PREFIX_SENTINEL}")),
        }));
        // Name sort already leads; it is not repeated.
        let order_bys = q
            .constraints
            .iter()
            .filter(|c| matches!(c, QueryConstraint::OrderBy { .. }))
            .count();
        assert_eq!(order_bys, 1);
    }

    #[test]
    fn blank_text_is_ignored() {
        let q = build(&SearchFilters {
            text: Some("   ".into()),
            ..Default::default()
        })
        .unwrap();
        assert!(range_fields(&q).is_empty());
    }

    #[test]
    fn text_with_age_range_rejected() {
        let err = build(&SearchFilters {
            text: Some("ama".into()),
            min_age: Some(12),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, AmaError::InvalidFilters(_)));
    }

    #[test]
    fn limit_is_clamped() {
        let q = build(&SearchFilters {
            limit: Some(10_000),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.limit(), Some(100));

        let q = build(&SearchFilters {
            limit: Some(0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.limit(), Some(1));
    }

    #[test]
    fn constraints_serialize_tagged() {
        let json = serde_json::to_string(&QueryConstraint::Limit { count: 5 }).unwrap();
        assert_eq!(json, r#"{"type":"limit","count":5}"#);
    }
}
