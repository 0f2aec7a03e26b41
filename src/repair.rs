//! SQL Repair Pipeline
//!
//! Text-level fixes for the mistakes SQL models make when asked for T-SQL.
//! The stages run in a fixed order and later stages rely on the output of
//! earlier ones (for example the TOP rewrite must happen before unrequested
//! TOP clauses are dropped). Every stage is a no-op when its pattern is absent.
//!
//! There is no parser here: the output is not guaranteed to be valid SQL, only
//! free of the specific classes of error each stage targets.

use crate::intent::{DATE_COLUMN, MONTH_BUCKET};
use crate::models::Filters;
use lazy_static::lazy_static;
use regex::{Captures, NoExpand, Regex};
use serde_json::Value;
use tracing::debug;

/// Question words that make an explicit `TOP n` legitimate.
pub const RANKING_WORDS: &[&str] = &["top", "highest", "lowest", "best", "peak", "limit"];

lazy_static! {
    static ref EQ_DOUBLE_QUOTED: Regex = Regex::new(r#"=\s*"([^"]*)""#).unwrap();
    static ref IN_LIST: Regex = Regex::new(r"(?i)\bIN\s*\(([^)]*)\)").unwrap();
    static ref DOUBLE_QUOTED: Regex = Regex::new(r#""([^"]*)""#).unwrap();

    static ref CURRENT_DATE_FN: Regex = Regex::new(r"(?i)\bCURRENT_(?:DATE|TIMESTAMP)\b").unwrap();
    static ref NOW_FN: Regex = Regex::new(r"(?i)\bNOW\(\)").unwrap();
    static ref INTERVAL_DAYS: Regex = Regex::new(
        r"(?i)GETDATE\(\)\s*([+-])\s*interval\s*'?\s*(\d+)\s*'?\s*days?\b'?"
    )
    .unwrap();

    static ref LIMIT_N: Regex = Regex::new(r"(?i)\bLIMIT\s+(\d+)").unwrap();
    static ref LIMIT_CLAUSE: Regex = Regex::new(r"(?i)\s*\bLIMIT\s+\d+").unwrap();
    static ref HAS_TOP: Regex = Regex::new(r"(?i)\bTOP\s*\(?\s*\d+").unwrap();
    static ref SELECT_HEAD: Regex = Regex::new(r"(?i)\bSELECT\s+(DISTINCT\s+)?").unwrap();

    static ref NULLS_ORDERING: Regex = Regex::new(r"(?i)\s+NULLS\s+(?:LAST|FIRST)\b").unwrap();
    static ref ILIKE: Regex = Regex::new(r"(?i)\bILIKE\b").unwrap();

    static ref MONTH_FILTER: Regex =
        Regex::new(&format!(r"{}\s*IN\b", regex::escape(MONTH_BUCKET))).unwrap();
    static ref RECENCY_CONDITION: Regex = Regex::new(&format!(
        r"(?i)\b(?:\w+\.)*{}\s*>=\s*(?:DATEADD|GETDATE)\s*\(",
        DATE_COLUMN
    ))
    .unwrap();
    static ref ENDS_WITH_AND: Regex = Regex::new(r"(?i)\bAND$").unwrap();
    static ref ENDS_WITH_WHERE: Regex = Regex::new(r"(?i)\bWHERE$").unwrap();
    static ref LEADING_AND: Regex = Regex::new(r"(?i)^\s+AND\s+").unwrap();

    static ref SELECT_TOP: Regex =
        Regex::new(r"(?i)\bSELECT\s+(DISTINCT\s+)?TOP\s*\(?\s*\d+\s*\)?(?:\s+PERCENT)?(?:\s+WITH\s+TIES)?\s+")
            .unwrap();

    static ref GROUP_BY_MONTH: Regex =
        Regex::new(&format!(r"(?i)\bGROUP\s+BY\s+{}", regex::escape(MONTH_BUCKET))).unwrap();
    static ref SELECT_PREFIX: Regex = Regex::new(
        r"(?i)\bSELECT\s+((?:DISTINCT\s+)?(?:TOP\s*\(?\s*\d+\s*\)?\s+)?)"
    )
    .unwrap();
    static ref FROM_KEYWORD: Regex = Regex::new(r"(?i)\bFROM\b").unwrap();

    static ref PHANTOM_MIDDLE: Regex = Regex::new(r"(?i),\s*\b(?:Month|Year|Day)\b\s*,").unwrap();
    static ref PHANTOM_BEFORE_FROM: Regex =
        Regex::new(r"(?i),\s*\b(?:Month|Year|Day)\b\s+FROM\b").unwrap();
    static ref PHANTOM_FIRST: Regex =
        Regex::new(r"(?i)\bSELECT\s+(?:Month|Year|Day)\b\s*,\s*").unwrap();

    static ref WHERE_HEAD: Regex = Regex::new(r"(?i)\bWHERE\s+").unwrap();
    static ref GROUP_BY: Regex = Regex::new(r"(?i)\bGROUP\s+BY\b").unwrap();
    static ref ORDER_BY: Regex = Regex::new(r"(?i)\bORDER\s+BY\b").unwrap();
    static ref WHERE_CLAUSE_END: Regex =
        Regex::new(r"(?i)\b(?:GROUP\s+BY|ORDER\s+BY|HAVING)\b").unwrap();
    static ref OR_KEYWORD: Regex = Regex::new(r"(?i)\bOR\b").unwrap();

    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Per-request inputs some stages consult.
pub struct RepairContext<'a> {
    pub question: &'a str,
    pub filters: Option<&'a Filters>,
}

type Stage = fn(&str, &RepairContext<'_>) -> String;

/// Stage order is significant.
const STAGES: &[(&str, Stage)] = &[
    ("strip_backticks", strip_backticks),
    ("single_quote_literals", single_quote_literals),
    ("normalize_date_functions", normalize_date_functions),
    ("rewrite_interval_arithmetic", rewrite_interval_arithmetic),
    ("limit_to_top", limit_to_top),
    ("strip_nulls_ordering", strip_nulls_ordering),
    ("normalize_ilike", normalize_ilike),
    ("drop_conflicting_recency_filter", drop_conflicting_recency_filter),
    ("drop_unrequested_top", drop_unrequested_top),
    ("inject_month_bucket", inject_month_bucket),
    ("strip_phantom_date_columns", strip_phantom_date_columns),
    ("inject_filters", inject_filters),
    ("trim_terminator", trim_terminator),
];

/// Pull the query out of raw model text.
///
/// Takes the first fenced block when the model used code fences, drops a
/// leading `sql` language tag, and restores the `SELECT` the prompt ended
/// with when the model continued mid-statement.
pub fn extract_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if sql.contains("```") {
        if let Some(block) = sql.split("```").nth(1) {
            let block = block.trim_start();
            sql = match block.get(..3) {
                Some(tag) if tag.eq_ignore_ascii_case("sql") => &block[3..],
                _ => block,
            };
            sql = sql.trim();
        }
    }

    let upper = sql.to_uppercase();
    if upper.starts_with("SELECT") || upper.starts_with("WITH ") {
        sql.to_string()
    } else {
        format!("SELECT {}", sql)
    }
}

/// Run every repair stage in order.
pub fn repair_sql(sql: &str, question: &str, filters: Option<&Filters>) -> String {
    let ctx = RepairContext { question, filters };
    STAGES.iter().fold(sql.to_string(), |current, (name, stage)| {
        let next = stage(&current, &ctx);
        if next != current {
            debug!("repair stage {} rewrote query", name);
        }
        next
    })
}

/// Collapse whitespace runs so the query fits on one line.
pub fn flatten(sql: &str) -> String {
    WHITESPACE.replace_all(sql, " ").trim().to_string()
}

/// extract, repair, flatten
pub fn finalize_sql(raw: &str, question: &str, filters: Option<&Filters>) -> String {
    flatten(&repair_sql(&extract_sql(raw), question, filters))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

pub fn strip_backticks(sql: &str, _ctx: &RepairContext<'_>) -> String {
    sql.replace('`', "")
}

pub fn single_quote_literals(sql: &str, _ctx: &RepairContext<'_>) -> String {
    let sql = EQ_DOUBLE_QUOTED.replace_all(sql, "= '${1}'");
    IN_LIST
        .replace_all(&sql, |caps: &Captures| {
            let whole = &caps[0];
            if !caps[1].contains('"') {
                return whole.to_string();
            }
            let open = whole.find('(').map_or(0, |i| i + 1);
            format!(
                "{}{})",
                &whole[..open],
                DOUBLE_QUOTED.replace_all(&caps[1], "'${1}'")
            )
        })
        .into_owned()
}

pub fn normalize_date_functions(sql: &str, _ctx: &RepairContext<'_>) -> String {
    let sql = CURRENT_DATE_FN.replace_all(sql, "GETDATE()");
    NOW_FN.replace_all(&sql, "GETDATE()").into_owned()
}

pub fn rewrite_interval_arithmetic(sql: &str, _ctx: &RepairContext<'_>) -> String {
    INTERVAL_DAYS
        .replace_all(sql, |caps: &Captures| {
            let sign = if &caps[1] == "-" { "-" } else { "" };
            format!("DATEADD(DAY, {}{}, GETDATE())", sign, &caps[2])
        })
        .into_owned()
}

pub fn limit_to_top(sql: &str, _ctx: &RepairContext<'_>) -> String {
    let limit = match LIMIT_N.captures(sql) {
        Some(caps) => caps[1].to_string(),
        None => return sql.to_string(),
    };

    let without_limit = LIMIT_CLAUSE.replace_all(sql, "").into_owned();
    if HAS_TOP.is_match(&without_limit) {
        return without_limit;
    }

    SELECT_HEAD
        .replacen(&without_limit, 1, |caps: &Captures| {
            format!(
                "SELECT {}TOP {} ",
                caps.get(1).map_or("", |m| m.as_str()),
                limit
            )
        })
        .into_owned()
}

pub fn strip_nulls_ordering(sql: &str, _ctx: &RepairContext<'_>) -> String {
    NULLS_ORDERING.replace_all(sql, "").into_owned()
}

pub fn normalize_ilike(sql: &str, _ctx: &RepairContext<'_>) -> String {
    ILIKE.replace_all(sql, "LIKE").into_owned()
}

/// An explicit month list beats a hardcoded "last N days" bound; drop the bound.
///
/// Only top-level conditions joined by `AND` are removed. Anything under `OR`
/// or inside parentheses is left as written.
pub fn drop_conflicting_recency_filter(sql: &str, _ctx: &RepairContext<'_>) -> String {
    let select_end = select_list_end(sql);
    if !MONTH_FILTER.is_match(&sql[select_end..]) {
        return sql.to_string();
    }

    let mut sql = sql.to_string();
    let mut from = select_end;
    while let Some(m) = RECENCY_CONDITION.find_at(&sql, from) {
        // Truncated call; leave the remainder alone
        let end = match closing_paren(&sql, m.end()) {
            Some(end) => end,
            None => break,
        };
        match recency_removal_span(&sql, m.start(), end) {
            Some((cut_start, cut_end)) => {
                sql.replace_range(cut_start..cut_end, "");
                from = cut_start;
            }
            None => from = end,
        }
    }
    sql
}

/// Byte range to cut for the condition at `start..end`, connective included.
fn recency_removal_span(sql: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if paren_depth(&sql[..start]) > 0 {
        return None;
    }
    let before = sql[..start].trim_end();
    if let Some(and) = ENDS_WITH_AND.find(before) {
        return Some((before[..and.start()].trim_end().len(), end));
    }
    if ENDS_WITH_WHERE.is_match(before) {
        return LEADING_AND.find(&sql[end..]).map(|and| (start, end + and.end()));
    }
    None
}

pub fn drop_unrequested_top(sql: &str, ctx: &RepairContext<'_>) -> String {
    let question = ctx.question.to_lowercase();
    if RANKING_WORDS.iter().any(|w| question.contains(w)) {
        return sql.to_string();
    }
    SELECT_TOP.replace_all(sql, "SELECT ${1}").into_owned()
}

/// Keep SELECT consistent with a monthly GROUP BY.
pub fn inject_month_bucket(sql: &str, _ctx: &RepairContext<'_>) -> String {
    if !GROUP_BY_MONTH.is_match(sql) {
        return sql.to_string();
    }
    if sql[..select_list_end(sql)].contains(MONTH_BUCKET) {
        return sql.to_string();
    }
    SELECT_PREFIX
        .replacen(sql, 1, |caps: &Captures| {
            format!("SELECT {}{} AS [Month], ", &caps[1], MONTH_BUCKET)
        })
        .into_owned()
}

/// Bare `Month`, `Year` or `Day` select items with no expression behind them.
pub fn strip_phantom_date_columns(sql: &str, _ctx: &RepairContext<'_>) -> String {
    let mut sql = sql.to_string();
    // Adjacent phantoms share a comma, so repeat until none are left
    while PHANTOM_MIDDLE.is_match(&sql) {
        sql = PHANTOM_MIDDLE.replace_all(&sql, ",").into_owned();
    }
    let sql = PHANTOM_BEFORE_FROM.replace_all(&sql, " FROM");
    PHANTOM_FIRST.replace_all(&sql, "SELECT ").into_owned()
}

pub fn inject_filters(sql: &str, ctx: &RepairContext<'_>) -> String {
    let filters = match ctx.filters {
        Some(f) => f,
        None => return sql.to_string(),
    };

    let mut sql = sql.to_string();
    for (column, value) in filters {
        if sql.contains(column.as_str()) {
            continue;
        }
        let condition = format!("{} = {}", column, sql_literal(value));
        debug!("injecting mandatory filter {}", condition);

        sql = if let Some(head) = WHERE_HEAD.find(&sql) {
            conjoin_where(&sql, head.start(), head.end(), &condition)
        } else if GROUP_BY.is_match(&sql) {
            GROUP_BY
                .replacen(&sql, 1, NoExpand(&format!("WHERE {} GROUP BY", condition)))
                .into_owned()
        } else if ORDER_BY.is_match(&sql) {
            ORDER_BY
                .replacen(&sql, 1, NoExpand(&format!("WHERE {} ORDER BY", condition)))
                .into_owned()
        } else {
            format!("{} WHERE {}", sql.trim_end().trim_end_matches(';').trim_end(), condition)
        };
    }
    sql
}

/// `WHERE <condition> AND <existing>`, parenthesizing an existing predicate
/// that contains `OR` so the condition applies to every row.
fn conjoin_where(sql: &str, head_start: usize, head_end: usize, condition: &str) -> String {
    let clause_end = WHERE_CLAUSE_END
        .find_at(sql, head_end)
        .map_or(sql.len(), |m| m.start());
    let predicate = sql[head_end..clause_end]
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    let predicate_end = head_end + predicate.len();

    let predicate = if OR_KEYWORD.is_match(predicate) {
        format!("({})", predicate)
    } else {
        predicate.to_string()
    };
    format!(
        "{}WHERE {} AND {}{}",
        &sql[..head_start],
        condition,
        predicate,
        &sql[predicate_end..]
    )
}

pub fn trim_terminator(sql: &str, _ctx: &RepairContext<'_>) -> String {
    sql.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn sql_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

/// Byte offset where the select list ends (first FROM, or end of text).
fn select_list_end(sql: &str) -> usize {
    FROM_KEYWORD.find(sql).map_or(sql.len(), |m| m.start())
}

/// Parentheses still open at the end of `sql`, ignoring string literals.
fn paren_depth(sql: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// Offset just past the parenthesis closing the one opened before `start`.
fn closing_paren(sql: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    for (i, ch) in sql[start..].char_indices() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
