//! GAQL search requests

use crate::ads::errors::{AdsError, AdsResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;

/// Whether a summary row is returned with search results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryRowSetting {
    NoSummaryRow,
    SummaryRowWithResults,
    SummaryRowOnly,
}

impl SummaryRowSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryRowSetting::NoSummaryRow => "NO_SUMMARY_ROW",
            SummaryRowSetting::SummaryRowWithResults => "SUMMARY_ROW_WITH_RESULTS",
            SummaryRowSetting::SummaryRowOnly => "SUMMARY_ROW_ONLY",
        }
    }
}

/// Optional search fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
    #[serde(default)]
    pub return_total_results_count: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_row_setting: Option<SummaryRowSetting>,
    #[serde(default)]
    pub validate_only: bool,
}

impl SearchOptions {
    pub fn with_page_token(mut self, token: &str) -> Self {
        self.page_token = Some(token.to_string());
        self
    }
}

fn check_query(query: &str) -> AdsResult<()> {
    if query.trim().is_empty() {
        return Err(AdsError::InvalidRequest("Query is empty".to_string()));
    }
    Ok(())
}

/// `GoogleAdsService.Search` body
pub fn build_search_request(customer_id: &str, query: &str, options: &SearchOptions) -> AdsResult<Value> {
    check_query(query)?;

    let mut body = Map::new();
    body.insert("customer_id".to_string(), Value::String(customer_id.to_string()));
    body.insert("query".to_string(), Value::String(query.to_string()));
    if let Some(token) = options.page_token.as_deref().filter(|t| !t.is_empty()) {
        body.insert("page_token".to_string(), Value::String(token.to_string()));
    }
    if options.return_total_results_count {
        body.insert("return_total_results_count".to_string(), Value::Bool(true));
    }
    if let Some(setting) = options.summary_row_setting {
        body.insert(
            "summary_row_setting".to_string(),
            Value::String(setting.as_str().to_string()),
        );
    }
    if options.validate_only {
        body.insert("validate_only".to_string(), Value::Bool(true));
    }

    Ok(Value::Object(body))
}

/// `GoogleAdsService.SearchStream` body. Streams are not paged.
pub fn build_search_stream_request(
    customer_id: &str,
    query: &str,
    summary_row_setting: Option<SummaryRowSetting>,
) -> AdsResult<Value> {
    check_query(query)?;

    let mut body = Map::new();
    body.insert("customer_id".to_string(), Value::String(customer_id.to_string()));
    body.insert("query".to_string(), Value::String(query.to_string()));
    if let Some(setting) = summary_row_setting {
        body.insert(
            "summary_row_setting".to_string(),
            Value::String(setting.as_str().to_string()),
        );
    }

    Ok(Value::Object(body))
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub results: Vec<Value>,
    pub next_page_token: Option<String>,
    pub total_results_count: Option<i64>,
    pub summary_row: Option<Value>,
    pub field_mask: Option<String>,
}

impl SearchPage {
    /// Read a search (or search-stream chunk) response body
    pub fn from_body(body: Value) -> Self {
        let Value::Object(mut map) = body else {
            return Self::default();
        };

        let results = match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let next_page_token = map
            .remove("next_page_token")
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.is_empty());
        // int64 fields arrive as strings in the JSON mapping
        let total_results_count = map.remove("total_results_count").and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let summary_row = map.remove("summary_row").filter(|v| !v.is_null());
        let field_mask = map
            .remove("field_mask")
            .and_then(|v| v.as_str().map(|s| s.to_string()));

        Self {
            results,
            next_page_token,
            total_results_count,
            summary_row,
            field_mask,
        }
    }
}

/// Small GAQL assembler
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryBuilder {
    select: Vec<String>,
    from: Option<String>,
    conditions: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    parameters: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn from(mut self, resource: &str) -> Self {
        self.from = Some(resource.to_string());
        self
    }

    /// Add a condition; conditions are joined with AND
    pub fn where_clause(mut self, condition: &str) -> Self {
        self.conditions.push(condition.to_string());
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        let direction = if descending { "DESC" } else { "ASC" };
        self.order_by.push(format!("{} {}", field, direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a PARAMETERS entry, e.g. `include_drafts=true`
    pub fn parameter(mut self, name: &str, value: &str) -> Self {
        self.parameters.push(format!("{}={}", name, value));
        self
    }

    pub fn build(&self) -> AdsResult<String> {
        let fields: Vec<&str> = self
            .select
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return Err(AdsError::InvalidRequest("Query needs a SELECT clause".to_string()));
        }
        let Some(from) = self.from.as_deref().map(str::trim).filter(|f| !f.is_empty()) else {
            return Err(AdsError::InvalidRequest("Query needs a FROM clause".to_string()));
        };

        let mut query = format!("SELECT {} FROM {}", fields.join(", "), from);
        if !self.conditions.is_empty() {
            let _ = write!(query, " WHERE {}", self.conditions.join(" AND "));
        }
        if !self.order_by.is_empty() {
            let _ = write!(query, " ORDER BY {}", self.order_by.join(", "));
        }
        if let Some(limit) = self.limit {
            let _ = write!(query, " LIMIT {}", limit);
        }
        if !self.parameters.is_empty() {
            let _ = write!(query, " PARAMETERS {}", self.parameters.join(", "));
        }

        Ok(query)
    }
}
