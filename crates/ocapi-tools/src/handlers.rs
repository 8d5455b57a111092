//! Per-tool request handlers.
//!
//! Most tools pass their arguments straight to the dispatcher ([`ToolHandler::Generic`]). The
//! Data API `*_search` resources instead expect a structured query body; their tools are bound
//! to a [`SearchBuilderConfig`] that turns flat arguments into a [`SearchRequest`].
//!
//! The binding is resolved once per tool when the tool surface is built.

use crate::error::{OcapiToolsError, Result};
use crate::query::{RangeQuery, SearchQuery, SearchRequest, TextQuery};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Flat tool-call arguments.
pub type Arguments = serde_json::Map<String, Value>;

/// Handler bound to a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolHandler {
    /// Pass arguments through to the dispatcher unchanged.
    Generic,
    /// Build a search body from the arguments.
    Search(Arc<SearchBuilderConfig>),
}

/// Arguments plus the body produced for them, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedCall {
    pub arguments: Arguments,
    pub body: Option<Value>,
}

impl ToolHandler {
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Validation`] if a search argument is malformed.
    pub fn prepare(&self, arguments: Arguments) -> Result<PreparedCall> {
        match self {
            Self::Generic => Ok(PreparedCall {
                arguments,
                body: None,
            }),
            Self::Search(config) => {
                let request = config.build(&arguments)?;
                let body = serde_json::to_value(&request)?;
                Ok(PreparedCall {
                    arguments,
                    body: Some(body),
                })
            }
        }
    }

    #[must_use]
    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct TextFilter {
    arg: String,
    fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct TermFilter {
    arg: String,
    field: String,
    /// Comma-separated input, matched with `one_of`.
    multi: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct FieldArg {
    arg: String,
    field: String,
}

#[derive(Debug, Clone, PartialEq)]
struct RangeFilter {
    min_arg: String,
    max_arg: String,
    field: String,
}

/// Declarative description of how a search tool maps arguments onto query conditions.
///
/// Conditions are emitted in a fixed order: text filters, term filters (including key pattern
/// and custom field), boolean flags, then the range filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchBuilderConfig {
    text: Vec<TextFilter>,
    terms: Vec<TermFilter>,
    key_pattern: Option<FieldArg>,
    custom_field_arg: Option<String>,
    flags: Vec<FieldArg>,
    range: Option<RangeFilter>,
    default_expand: Vec<String>,
}

impl SearchBuilderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Free-text search of `fields` with the value of `arg`.
    #[must_use]
    pub fn text(mut self, arg: &str, fields: &[&str]) -> Self {
        self.text.push(TextFilter {
            arg: arg.to_string(),
            fields: fields.iter().map(|f| (*f).to_string()).collect(),
        });
        self
    }

    /// Exact match of `field` against the value of `arg`.
    #[must_use]
    pub fn term(mut self, arg: &str, field: &str) -> Self {
        self.terms.push(TermFilter {
            arg: arg.to_string(),
            field: field.to_string(),
            multi: false,
        });
        self
    }

    /// Match `field` against any of the comma-separated values of `arg`.
    #[must_use]
    pub fn one_of(mut self, arg: &str, field: &str) -> Self {
        self.terms.push(TermFilter {
            arg: arg.to_string(),
            field: field.to_string(),
            multi: true,
        });
        self
    }

    /// Boolean field, sent as the string `"true"` / `"false"`.
    #[must_use]
    pub fn flag(mut self, arg: &str, field: &str) -> Self {
        self.flags.push(FieldArg {
            arg: arg.to_string(),
            field: field.to_string(),
        });
        self
    }

    #[must_use]
    pub fn range(mut self, min_arg: &str, max_arg: &str, field: &str) -> Self {
        self.range = Some(RangeFilter {
            min_arg: min_arg.to_string(),
            max_arg: max_arg.to_string(),
            field: field.to_string(),
        });
        self
    }

    /// Key match where a trailing `*` turns the value into a prefix search.
    #[must_use]
    pub fn key_pattern(mut self, arg: &str, field: &str) -> Self {
        self.key_pattern = Some(FieldArg {
            arg: arg.to_string(),
            field: field.to_string(),
        });
        self
    }

    /// `"field:value"` argument matched as a term on `field`.
    #[must_use]
    pub fn custom_field(mut self, arg: &str) -> Self {
        self.custom_field_arg = Some(arg.to_string());
        self
    }

    /// Expansions requested when the caller doesn't pass `expand`.
    #[must_use]
    pub fn default_expand(mut self, expand: &[&str]) -> Self {
        self.default_expand = expand.iter().map(|e| (*e).to_string()).collect();
        self
    }

    /// Build the search body for `args`.
    ///
    /// # Errors
    ///
    /// Returns [`OcapiToolsError::Validation`] for malformed pagination, flags, prices or
    /// custom-field encodings.
    pub fn build(&self, args: &Arguments) -> Result<SearchRequest> {
        let mut conditions = Vec::new();

        for filter in &self.text {
            if let Some(phrase) = string_arg(args, &filter.arg)? {
                conditions.push(SearchQuery::Text(TextQuery {
                    fields: filter.fields.clone(),
                    search_phrase: phrase,
                }));
            }
        }

        for filter in &self.terms {
            let Some(value) = string_arg(args, &filter.arg)? else {
                continue;
            };
            if filter.multi {
                let values = split_list(&value);
                if !values.is_empty() {
                    conditions.push(SearchQuery::one_of(filter.field.clone(), values));
                }
            } else {
                conditions.push(SearchQuery::term(filter.field.clone(), value));
            }
        }

        if let Some(key) = &self.key_pattern
            && let Some(pattern) = string_arg(args, &key.arg)?
            && let Some(condition) = key_pattern_condition(&key.field, &pattern)
        {
            conditions.push(condition);
        }

        if let Some(arg) = &self.custom_field_arg
            && let Some(raw) = string_arg(args, arg)?
        {
            conditions.push(custom_field_condition(arg, &raw)?);
        }

        for flag in &self.flags {
            if let Some(value) = flag_arg(args, &flag.arg)? {
                conditions.push(SearchQuery::term(flag.field.clone(), value.to_string()));
            }
        }

        if let Some(range) = &self.range {
            let from = number_arg(args, &range.min_arg)?;
            let to = number_arg(args, &range.max_arg)?;
            if from.is_some() || to.is_some() {
                conditions.push(SearchQuery::Range(RangeQuery {
                    field: range.field.clone(),
                    from,
                    to,
                }));
            }
        }

        let mut request = SearchRequest::new(SearchQuery::from_conditions(conditions));
        request.count = pagination_arg(args, "count")?;
        request.start = pagination_arg(args, "start")?;
        request.expand = list_arg(args, "expand")?.or_else(|| {
            (!self.default_expand.is_empty()).then(|| self.default_expand.clone())
        });
        request.inventory_ids = list_arg(args, "inventory_ids")?;
        Ok(request)
    }
}

/// Tool name -> handler bindings.
#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, ToolHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_search_handlers()
    }
}

impl HandlerRegistry {
    /// Registry where every tool is generic.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in Data API search handlers.
    #[must_use]
    pub fn with_search_handlers() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "product_search",
            SearchBuilderConfig::new()
                .text("product_name", &["name"])
                .term("product_id", "id")
                .term("brand", "brand")
                .flag("online_flag", "online_flag")
                .range("min_price", "max_price", "price")
                .default_expand(&["availability", "images", "prices"]),
        );
        registry.register(
            "catalog_search",
            SearchBuilderConfig::new()
                .text("catalog_name", &["name"])
                .term("catalog_id", "id")
                .flag("online_flag", "online_flag"),
        );
        registry.register(
            "campaign_search",
            SearchBuilderConfig::new()
                .text("campaign_name", &["name"])
                .term("campaign_id", "campaign_id")
                .one_of("customer_groups", "customer_groups")
                .flag("enabled", "enabled"),
        );
        registry.register(
            "promotion_search",
            SearchBuilderConfig::new()
                .text("promotion_name", &["name"])
                .term("promotion_id", "id")
                .term("promotion_class", "promotion_class")
                .flag("enabled", "enabled"),
        );
        registry.register(
            "coupon_search",
            SearchBuilderConfig::new()
                .text("coupon_code", &["coupon_id", "description"])
                .term("coupon_id", "coupon_id")
                .flag("enabled", "enabled")
                .flag("single_use", "single_use"),
        );
        registry.register(
            "custom_objects_search",
            SearchBuilderConfig::new()
                .key_pattern("key_pattern", "key")
                .custom_field("custom_field"),
        );
        registry
    }

    pub fn register(&mut self, tool_name: impl Into<String>, config: SearchBuilderConfig) {
        self.handlers
            .insert(tool_name.into(), ToolHandler::Search(Arc::new(config)));
    }

    #[must_use]
    pub fn has_handler(&self, tool_name: &str) -> bool {
        self.handlers.contains_key(tool_name)
    }

    /// Handler for `tool_name`; tools without a registered builder are generic.
    #[must_use]
    pub fn resolve(&self, tool_name: &str) -> ToolHandler {
        self.handlers
            .get(tool_name)
            .cloned()
            .unwrap_or(ToolHandler::Generic)
    }
}

fn string_arg(args: &Arguments, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
                .collect();
            Ok((!parts.is_empty()).then(|| parts.join(",")))
        }
        Some(Value::Object(_)) => Err(OcapiToolsError::Validation(format!(
            "{name} must be a string, got an object"
        ))),
    }
}

fn flag_arg(args: &Arguments, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => Ok(Some(n.as_f64().is_some_and(|f| f != 0.0))),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            other => Err(OcapiToolsError::Validation(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        },
        Some(other) => Err(OcapiToolsError::Validation(format!(
            "{name} must be a boolean, got {other}"
        ))),
    }
}

fn number_arg(args: &Arguments, name: &str) -> Result<Option<Number>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(n.clone())),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Some(Number::from(i)));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Some)
                .ok_or_else(|| {
                    OcapiToolsError::Validation(format!("{name} must be a number, got '{s}'"))
                })
        }
        Some(other) => Err(OcapiToolsError::Validation(format!(
            "{name} must be a number, got {other}"
        ))),
    }
}

fn pagination_arg(args: &Arguments, name: &str) -> Result<Option<u32>> {
    let invalid = |shown: &dyn std::fmt::Display| {
        OcapiToolsError::Validation(format!(
            "{name} must be a non-negative integer, got '{shown}'"
        ))
    };
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| invalid(n)),
        Some(Value::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.parse::<u32>().map(Some).map_err(|_| invalid(&s))
        }
        Some(other) => Err(invalid(other)),
    }
}

fn list_arg(args: &Arguments, name: &str) -> Result<Option<Vec<String>>> {
    Ok(string_arg(args, name)?
        .map(|raw| split_list(&raw))
        .filter(|items| !items.is_empty()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn key_pattern_condition(field: &str, pattern: &str) -> Option<SearchQuery> {
    match pattern.strip_suffix('*') {
        Some(prefix) => {
            let prefix = prefix.trim_end_matches('*');
            // A bare `*` matches every key.
            (!prefix.is_empty()).then(|| SearchQuery::prefix(field, prefix))
        }
        None => Some(SearchQuery::term(field, pattern)),
    }
}

fn custom_field_condition(arg: &str, raw: &str) -> Result<SearchQuery> {
    let (field, value) = raw
        .split_once(':')
        .map(|(f, v)| (f.trim(), v.trim()))
        .filter(|(f, v)| !f.is_empty() && !v.is_empty())
        .ok_or_else(|| {
            OcapiToolsError::Validation(format!(
                "{arg} must use the form 'field:value', got '{raw}'"
            ))
        })?;
    Ok(SearchQuery::term(field, value))
}
