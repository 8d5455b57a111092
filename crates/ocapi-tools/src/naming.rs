//! Tool name generation for OCAPI endpoint paths.
//!
//! `/sites/{site_id}/campaign_search` becomes `sites_by_site_id_campaign_search`. Long names are
//! shortened with a table of OCAPI abbreviations first, then by keeping the head and the tail
//! of the name. Every name handed out by one generator is unique and at most
//! [`HARD_MAX_TOOL_NAME_LEN`] bytes.

use std::collections::HashSet;

/// Names longer than this are abbreviated, then truncated.
pub const MAX_TOOL_NAME_LEN: usize = 54;

/// Absolute ceiling, including any `_N` uniqueness suffix.
pub const HARD_MAX_TOOL_NAME_LEN: usize = 64;

const TRUNCATED_HEAD_LEN: usize = 27;
const TRUNCATED_TAIL_LEN: usize = 27;

/// Applied in order; longer phrases come before the words they contain.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("preference_groups", "pref_groups"),
    ("preferences", "prefs"),
    ("variation_groups", "var_groups"),
    ("variation_attributes", "var_attrs"),
    ("product_options", "prod_opts"),
    ("product_inventory_records", "inventory"),
    ("custom_object_definitions", "custom_obj_defs"),
    ("custom_objects", "custom_obj"),
    ("attribute_definitions", "attr_defs"),
    ("gift_certificates", "gift_certs"),
    ("customer_groups", "cust_groups"),
    ("customer_no", "cust_no"),
    ("customers", "custs"),
    ("addresses", "addrs"),
    ("instance_type", "inst_type"),
    ("object_type", "obj_type"),
    ("master_product_id", "master_id"),
    ("product_id", "prod_id"),
    ("inventory_list_id", "inv_list_id"),
    ("option_id", "opt_id"),
    ("attribute_id", "attr_id"),
    ("merchant_id", "merch_id"),
    ("library_id", "lib_id"),
    ("content_id", "cont_id"),
    ("catalog_id", "cat_id"),
    ("group_id", "grp_id"),
];

/// Hands out unique tool names.
#[derive(Debug, Default)]
pub struct ToolNameGenerator {
    used: HashSet<String>,
}

impl ToolNameGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tool name for `path`, or reserve `explicit` when the endpoint names its tool.
    pub fn create_tool_name(&mut self, path: &str, explicit: Option<&str>) -> String {
        if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
            return self.reserve_unique(name);
        }

        let mut name = canonical_name(path);
        if name.len() > MAX_TOOL_NAME_LEN {
            name = abbreviate(&name);
        }
        if name.len() > MAX_TOOL_NAME_LEN {
            name = truncate_middle(&name);
        }
        self.reserve_unique(&name)
    }

    /// Whether `name` has already been handed out.
    #[must_use]
    pub fn is_used(&self, name: &str) -> bool {
        self.used.contains(name)
    }

    fn reserve_unique(&mut self, base: &str) -> String {
        let base = floor_prefix(base, HARD_MAX_TOOL_NAME_LEN).to_string();
        if self.used.insert(base.clone()) {
            return base;
        }

        let mut counter = 1usize;
        loop {
            let suffix = format!("_{counter}");
            let stem = floor_prefix(&base, HARD_MAX_TOOL_NAME_LEN - suffix.len());
            let candidate = format!("{stem}{suffix}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// `/a/{b}/c` -> `a_by_b_c`
fn canonical_name(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    let mut out = String::with_capacity(trimmed.len() + 8);
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        match c {
            '/' => out.push('_'),
            '{' => {
                let param: String = chars.by_ref().take_while(|&c| c != '}').collect();
                out.push_str("by_");
                out.push_str(&param);
            }
            other => out.push(other),
        }
    }
    out
}

fn abbreviate(name: &str) -> String {
    ABBREVIATIONS
        .iter()
        .fold(name.to_string(), |acc, (full, short)| acc.replace(full, short))
}

/// Keep the head and the tail of `name`, joined by `_`.
fn truncate_middle(name: &str) -> String {
    let mut tail_start = ceil_boundary(name, name.len().saturating_sub(TRUNCATED_TAIL_LEN));

    // Don't split a `by_<param>` placeholder: pull the cut back to the `by_` when the longer
    // tail still fits.
    if let Some(start) = placeholder_start_at_or_before(name, tail_start)
        && name.len() - start < HARD_MAX_TOOL_NAME_LEN
    {
        tail_start = start;
    }
    let tail = name[tail_start..].trim_start_matches('_');

    let head_budget = HARD_MAX_TOOL_NAME_LEN
        .saturating_sub(tail.len() + 1)
        .min(TRUNCATED_HEAD_LEN);
    let mut head = floor_prefix(name, head_budget).trim_end_matches('_');
    if let Some(stripped) = head.strip_suffix("_by") {
        head = stripped;
    }

    if head.is_empty() {
        return tail.to_string();
    }
    format!("{head}_{tail}")
}

/// Byte offset of the last `by_` that starts a segment and begins at or before `idx`.
fn placeholder_start_at_or_before(name: &str, idx: usize) -> Option<usize> {
    let window_end = ceil_boundary(name, (idx + "by_".len()).min(name.len()));
    name[..window_end]
        .rfind("_by_")
        .map(|i| i + 1)
        .or_else(|| name.starts_with("by_").then_some(0))
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char boundary.
fn floor_prefix(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
