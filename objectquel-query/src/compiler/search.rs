//! `search(columns..., "query")` expansion.
//!
//! The query string is split into terms: `term` (optional), `+term`
//! (required), `-term` (excluded) and `"quoted phrase"` (any prefix).

use super::quote_string;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchTerms {
    pub optional: Vec<String>,
    pub required: Vec<String>,
    pub excluded: Vec<String>,
}

impl SearchTerms {
    pub fn is_empty(&self) -> bool {
        self.optional.is_empty() && self.required.is_empty() && self.excluded.is_empty()
    }
}

pub fn parse_search_query(query: &str) -> SearchTerms {
    let mut terms = SearchTerms::default();
    let mut chars = query.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut bucket = &mut terms.optional;
        if first == '+' || first == '-' {
            chars.next();
            bucket = if first == '+' {
                &mut terms.required
            } else {
                &mut terms.excluded
            };
        }

        let mut term = String::new();
        if chars.next_if_eq(&'"').is_some() {
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                term.push(c);
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                term.push(c);
            }
        }

        let term = term.trim();
        if !term.is_empty() {
            bucket.push(term.to_string());
        }
    }
    terms
}

fn contains_pattern(term: &str) -> String {
    let escaped = term.replace('%', "\\%").replace('_', "\\_");
    quote_string(&format!("%{escaped}%"))
}

fn any_column_like(columns: &[String], term: &str) -> String {
    let pattern = contains_pattern(term);
    let parts: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} LIKE {pattern}"))
        .collect();
    format!("({})", parts.join(" OR "))
}

fn no_column_like(columns: &[String], term: &str) -> String {
    let pattern = contains_pattern(term);
    let parts: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} NOT LIKE {pattern}"))
        .collect();
    format!("({})", parts.join(" AND "))
}

/// SQL condition over already-rendered column expressions.
pub fn search_condition(columns: &[String], terms: &SearchTerms) -> String {
    if terms.is_empty() || columns.is_empty() {
        return "1 = 1".to_string();
    }

    let mut groups: Vec<String> = terms
        .required
        .iter()
        .map(|t| any_column_like(columns, t))
        .collect();

    if !terms.optional.is_empty() {
        let optional: Vec<String> = terms
            .optional
            .iter()
            .map(|t| any_column_like(columns, t))
            .collect();
        groups.push(if optional.len() == 1 {
            optional.concat()
        } else {
            format!("({})", optional.join(" OR "))
        });
    }

    groups.extend(terms.excluded.iter().map(|t| no_column_like(columns, t)));

    if groups.len() == 1 {
        groups.concat()
    } else {
        format!("({})", groups.join(" AND "))
    }
}
