//! OCAPI search query DSL.
//!
//! These types serialize to the shapes accepted by the Data API `*_search` resources, e.g.
//! `{"bool_query":{"must":[{"text_query":{"fields":["name"],"search_phrase":"shirt"}}]}}`.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Projection selector attached to every search body.
pub const SELECT_ALL: &str = "(**)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchQuery {
    #[serde(rename = "match_all_query")]
    MatchAll(MatchAllQuery),
    #[serde(rename = "text_query")]
    Text(TextQuery),
    #[serde(rename = "term_query")]
    Term(TermQuery),
    #[serde(rename = "range_query")]
    Range(RangeQuery),
    #[serde(rename = "prefix_query")]
    Prefix(PrefixQuery),
    #[serde(rename = "bool_query")]
    Bool(BoolQuery),
}

impl SearchQuery {
    #[must_use]
    pub fn match_all() -> Self {
        Self::MatchAll(MatchAllQuery {})
    }

    #[must_use]
    pub fn text(fields: &[&str], phrase: impl Into<String>) -> Self {
        Self::Text(TextQuery {
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
            search_phrase: phrase.into(),
        })
    }

    /// `term_query` with operator `is` and a single value.
    #[must_use]
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Term(TermQuery {
            fields: vec![field.into()],
            operator: TermOperator::Is,
            values: vec![value.into()],
        })
    }

    /// `term_query` with operator `one_of`.
    #[must_use]
    pub fn one_of(field: impl Into<String>, values: Vec<String>) -> Self {
        Self::Term(TermQuery {
            fields: vec![field.into()],
            operator: TermOperator::OneOf,
            values,
        })
    }

    #[must_use]
    pub fn prefix(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Prefix(PrefixQuery {
            field: field.into(),
            prefix: prefix.into(),
        })
    }

    /// Combine filter conditions: none matches everything, one stays unwrapped and more than one
    /// are all required through a `bool_query`.
    #[must_use]
    pub fn from_conditions(mut conditions: Vec<SearchQuery>) -> Self {
        match conditions.len() {
            0 => Self::match_all(),
            1 => conditions.remove(0),
            _ => Self::Bool(BoolQuery { must: conditions }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAllQuery {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQuery {
    pub fields: Vec<String>,
    pub search_phrase: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermQuery {
    pub fields: Vec<String>,
    pub operator: TermOperator,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermOperator {
    Is,
    OneOf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixQuery {
    pub field: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<SearchQuery>,
}

/// Complete request body for a Data API search resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: SearchQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_ids: Option<Vec<String>>,
    pub select: String,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: SearchQuery) -> Self {
        Self {
            query,
            count: None,
            start: None,
            expand: None,
            inventory_ids: None,
            select: SELECT_ALL.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn condition_count_decides_shape() {
        assert_eq!(
            serde_json::to_value(SearchQuery::from_conditions(vec![])).expect("json"),
            json!({ "match_all_query": {} })
        );

        let single = SearchQuery::from_conditions(vec![SearchQuery::prefix("key", "config_")]);
        assert_eq!(
            serde_json::to_value(&single).expect("json"),
            json!({ "prefix_query": { "field": "key", "prefix": "config_" } })
        );

        let many = SearchQuery::from_conditions(vec![
            SearchQuery::text(&["name"], "summer sale"),
            SearchQuery::one_of("customer_groups", vec!["VIP".into(), "PREMIUM".into()]),
        ]);
        assert_eq!(
            serde_json::to_value(&many).expect("json"),
            json!({
                "bool_query": {
                    "must": [
                        { "text_query": { "fields": ["name"], "search_phrase": "summer sale" } },
                        { "term_query": {
                            "fields": ["customer_groups"],
                            "operator": "one_of",
                            "values": ["VIP", "PREMIUM"]
                        } }
                    ]
                }
            })
        );
    }

    #[test]
    fn range_omits_missing_bounds() {
        let q = SearchQuery::Range(RangeQuery {
            field: "price".into(),
            from: Some(Number::from(10)),
            to: None,
        });
        assert_eq!(
            serde_json::to_value(&q).expect("json"),
            json!({ "range_query": { "field": "price", "from": 10 } })
        );
    }

    #[test]
    fn request_body_skips_unset_fields() {
        let body = SearchRequest::new(SearchQuery::match_all());
        assert_eq!(
            serde_json::to_value(&body).expect("json"),
            json!({ "query": { "match_all_query": {} }, "select": "(**)" })
        );
    }
}
