use crate::domain::{Condition, FieldType, Operator, QueryPayload};
use crate::error::HarvestError;

pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Compiles a condition list into an arXiv `search_query` string.
pub fn build_simple_query(conditions: &[Condition]) -> Option<String> {
    let mut query = String::new();
    let mut first = true;

    for condition in conditions {
        let keyword = condition.keyword.trim();
        if keyword.is_empty() {
            continue;
        }
        let part = match condition.field {
            FieldType::All => keyword.to_string(),
            field => format!("{field}:{keyword}"),
        };
        if first {
            query.push_str(&part);
            first = false;
        } else {
            let operator = condition.operator.unwrap_or(Operator::And);
            query.push_str(&format!(" {operator} {part}"));
        }
    }

    (!first).then_some(query)
}

pub fn build_advanced_query(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl QueryPayload {
    pub fn to_query(&self) -> Result<String, HarvestError> {
        let query = match self {
            QueryPayload::Simple { conditions, .. } => build_simple_query(conditions),
            QueryPayload::Advanced { query, .. } => build_advanced_query(query),
        };
        query.ok_or(HarvestError::EmptyQuery)
    }
}
