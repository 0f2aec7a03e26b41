//! Query Intent Extractor
//!
//! Reads time range, grouping and aggregation hints out of the question text
//! with plain pattern matching. Each hint renders as one line of the prompt's
//! execution plan. Extraction never fails: when nothing matches, a documented
//! default applies.

use crate::models::Filters;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

/// Timestamp column of the performance tables.
pub const DATE_COLUMN: &str = "DataCollectionDate";
/// Measurement column of the performance tables.
pub const VALUE_COLUMN: &str = "DataValue";
/// Monthly bucket expression. The repair pipeline keys on this exact text.
pub const MONTH_BUCKET: &str = "FORMAT(DataCollectionDate, 'yyyy-MM')";

lazy_static! {
    static ref TODAY: Regex = Regex::new(r"\btoday\b").unwrap();
    static ref LAST_N_MONTHS: Regex =
        Regex::new(r"last\s+(\d+)\s+months?\s+(?:of\s+)?(\d{4})").unwrap();
    static ref YEAR: Regex = Regex::new(r"\b(20[2-3]\d)\b").unwrap();
    static ref MONTH: Regex = Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeRule {
    Today,
    /// Trailing `months` of `year`. The start month is `12 - months + 1` and
    /// does not roll back into the previous year.
    LastMonths { months: i64, year: String },
    /// `'YYYY-MM'` tokens, sorted and distinct
    Months(Vec<String>),
    Years(Vec<String>),
    /// Caller-supplied hint such as `last_30_days`
    Hint(String),
    LastSevenDays,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Monthly,
    Daily,
    Hourly,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Max,
    Avg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MandatoryFilter {
    /// Filters serialized as JSON, verbatim
    Structured(String),
    DeviceNameIfMentioned,
}

/// Hints derived from one question. Lives for one request only.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryIntent {
    pub time_rule: TimeRule,
    pub grouping: Grouping,
    pub aggregation: Aggregation,
    pub mandatory_filter: MandatoryFilter,
}

impl QueryIntent {
    pub fn extract(question: &str, time_range: Option<&str>, filters: Option<&Filters>) -> Self {
        let lower = question.to_lowercase();
        Self {
            time_rule: TimeRule::extract(question, &lower, time_range),
            grouping: Grouping::extract(&lower),
            aggregation: Aggregation::extract(&lower),
            mandatory_filter: MandatoryFilter::from_filters(filters),
        }
    }

    pub fn time_filter_clause(&self) -> String {
        self.time_rule.to_string()
    }

    pub fn grouping_clause(&self) -> String {
        self.grouping.to_string()
    }

    pub fn aggregation_clause(&self) -> String {
        self.aggregation.to_string()
    }

    pub fn mandatory_filter_clause(&self) -> String {
        self.mandatory_filter.to_string()
    }
}

impl TimeRule {
    /// First match wins, in declaration order of the variants.
    fn extract(question: &str, lower: &str, time_range: Option<&str>) -> Self {
        if TODAY.is_match(lower) {
            return TimeRule::Today;
        }

        if let Some(caps) = LAST_N_MONTHS.captures(lower) {
            if let Ok(months) = caps[1].parse::<i64>() {
                return TimeRule::LastMonths {
                    months,
                    year: caps[2].to_string(),
                };
            }
        }

        let years: Vec<&str> = YEAR
            .captures_iter(question)
            .map(|c| c.get(1).map_or("", |m| m.as_str()))
            .collect();

        if let Some(first_year) = years.first() {
            let months: Vec<String> = MONTH
                .captures_iter(question)
                .filter_map(|c| month_number(&c[1]))
                .map(|m| format!("{}-{}", first_year, m))
                .sorted()
                .dedup()
                .collect();

            if !months.is_empty() {
                return TimeRule::Months(months);
            }

            return TimeRule::Years(years.into_iter().map(String::from).sorted().dedup().collect());
        }

        match time_range.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => TimeRule::Hint(hint.to_string()),
            None => TimeRule::LastSevenDays,
        }
    }
}

fn month_number(name: &str) -> Option<&'static str> {
    let prefix: String = name.chars().take(3).collect::<String>().to_lowercase();
    let num = match prefix.as_str() {
        "jan" => "01",
        "feb" => "02",
        "mar" => "03",
        "apr" => "04",
        "may" => "05",
        "jun" => "06",
        "jul" => "07",
        "aug" => "08",
        "sep" => "09",
        "oct" => "10",
        "nov" => "11",
        "dec" => "12",
        _ => return None,
    };
    Some(num)
}

impl Grouping {
    fn extract(lower: &str) -> Self {
        if lower.contains("monthly") {
            Grouping::Monthly
        } else if lower.contains("daily") {
            Grouping::Daily
        } else if lower.contains("hourly") {
            Grouping::Hourly
        } else {
            Grouping::None
        }
    }

    /// Truncation expression and output alias
    pub fn bucket(&self) -> Option<(&'static str, &'static str)> {
        match self {
            Grouping::Monthly => Some((MONTH_BUCKET, "Month")),
            Grouping::Daily => Some(("FORMAT(DataCollectionDate, 'yyyy-MM-dd')", "Day")),
            Grouping::Hourly => Some(("FORMAT(DataCollectionDate, 'dd HH')", "Hour")),
            Grouping::None => None,
        }
    }
}

impl Aggregation {
    fn extract(lower: &str) -> Self {
        if ["sum", "total"].iter().any(|w| lower.contains(w)) {
            Aggregation::Sum
        } else if ["max", "peak"].iter().any(|w| lower.contains(w)) {
            Aggregation::Max
        } else {
            Aggregation::Avg
        }
    }

    pub fn function(&self) -> &'static str {
        match self {
            Aggregation::Sum => "SUM",
            Aggregation::Max => "MAX",
            Aggregation::Avg => "AVG",
        }
    }
}

impl MandatoryFilter {
    fn from_filters(filters: Option<&Filters>) -> Self {
        match filters.filter(|f| !f.is_empty()) {
            Some(f) => MandatoryFilter::Structured(
                serde_json::to_string(f).unwrap_or_else(|_| "{}".to_string()),
            ),
            None => MandatoryFilter::DeviceNameIfMentioned,
        }
    }
}

impl fmt::Display for TimeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeRule::Today => write!(
                f,
                "FILTER RULE: Use `{} >= CAST(GETDATE() AS DATE)`.",
                DATE_COLUMN
            ),
            TimeRule::LastMonths { months, year } => write!(
                f,
                "FILTER RULE: Last {months} months of {year}. Use: `YEAR({col})={year} AND MONTH({col}) >= {start}`.",
                months = months,
                year = year,
                col = DATE_COLUMN,
                start = 12 - months + 1
            ),
            TimeRule::Months(targets) => {
                let list = targets.iter().map(|t| format!("'{}'", t)).join(", ");
                write!(
                    f,
                    "FILTER RULE: User wants specific months: {list}. Use EXACTLY: `{bucket} IN ({list})`.",
                    list = list,
                    bucket = MONTH_BUCKET
                )
            }
            TimeRule::Years(years) => write!(
                f,
                "FILTER RULE: Use `YEAR({}) IN ({})`.",
                DATE_COLUMN,
                years.join(", ")
            ),
            TimeRule::Hint(hint) => write!(f, "FILTER RULE: Context hint is '{}'.", hint),
            TimeRule::LastSevenDays => write!(
                f,
                "FILTER RULE: Default to last 7 days: `{} >= DATEADD(DAY, -7, GETDATE())`.",
                DATE_COLUMN
            ),
        }
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bucket() {
            Some((expr, alias)) => write!(
                f,
                "GROUPING RULE: GROUP BY `{}`. SELECT this as [{}].",
                expr, alias
            ),
            None => write!(f, "GROUPING RULE: None."),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AGGREGATION: Use {}({}).", self.function(), VALUE_COLUMN)
    }
}

impl fmt::Display for MandatoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MandatoryFilter::Structured(json) => write!(f, "MANDATORY FILTER: {}", json),
            MandatoryFilter::DeviceNameIfMentioned => {
                write!(f, "MANDATORY FILTER: Filter by DeviceName if mentioned.")
            }
        }
    }
}
