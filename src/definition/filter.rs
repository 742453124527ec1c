//! Filter definitions attached to schema or report fields.

use chrono::{Days, Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Suffix marking the lower bound of a range filter key.
pub const RANGE_START_SUFFIX: &str = ".start";
/// Suffix marking the upper bound of a range filter key.
pub const RANGE_END_SUFFIX: &str = ".end";

static DATE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^today\(\s*(?:(-?\d+)\s*,\s*(days?|weeks?|months?|years?)\s*)?\)$")
        .expect("date token regex is valid")
});

/// How a filter is presented and which tag its validated values carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterType {
    Radio,
    Select,
    Multiselect,
    Text,
    Date,
    #[serde(alias = "daterange")]
    DateRange,
    NumericRange,
    AutoComplete,
}

/// One pre-enumerated filter option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticOption {
    pub name: String,
    #[serde(default)]
    pub display: Option<String>,
}

impl StaticOption {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display: None,
        }
    }
}

/// Settings for type-ahead filters whose options are looked up live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicOptions {
    pub minimum_length: usize,
    #[serde(default)]
    pub source_dataset: Option<String>,
    #[serde(default)]
    pub max_results: Option<u64>,
    #[serde(default)]
    pub return_as_static_options: bool,
}

/// Declarative filter rules for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub static_options: Option<Vec<StaticOption>>,
    #[serde(default)]
    pub dynamic_options: Option<DynamicOptions>,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
}

impl FilterDefinition {
    pub fn new(filter_type: FilterType) -> Self {
        Self {
            filter_type,
            mandatory: false,
            interactive: false,
            pattern: None,
            static_options: None,
            dynamic_options: None,
            default: None,
            min: None,
            max: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_static_options(mut self, options: Vec<StaticOption>) -> Self {
        self.static_options = Some(options);
        self
    }

    pub fn with_dynamic_options(mut self, options: DynamicOptions) -> Self {
        self.dynamic_options = Some(options);
        self
    }

    pub fn with_bounds(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min = min.map(str::to_string);
        self.max = max.map(str::to_string);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Default value with date tokens resolved against `today`.
    ///
    /// Non-token defaults are returned verbatim.
    pub fn resolved_default(&self, today: NaiveDate) -> Option<String> {
        let raw = self.default.as_deref()?;
        if is_date_token(raw) {
            resolve_date_token(raw, today).map(|d| d.format("%Y-%m-%d").to_string())
        } else {
            Some(raw.to_string())
        }
    }
}

/// Whether `value` is a `today(...)` token.
pub fn is_date_token(value: &str) -> bool {
    DATE_TOKEN.is_match(value.trim())
}

/// Resolve a date bound: either an ISO date or a `today([n, unit])` token.
pub fn resolve_date_token(value: &str, today: NaiveDate) -> Option<NaiveDate> {
    let value = value.trim();
    let Some(caps) = DATE_TOKEN.captures(value) else {
        return NaiveDate::parse_from_str(value, "%Y-%m-%d").ok();
    };

    let (Some(amount), Some(unit)) = (caps.get(1), caps.get(2)) else {
        return Some(today);
    };
    let amount: i64 = amount.as_str().parse().ok()?;
    let magnitude = amount.unsigned_abs();

    match unit.as_str().trim_end_matches('s') {
        "day" => shift_days(today, amount, magnitude),
        "week" => shift_days(today, amount, magnitude.checked_mul(7)?),
        "month" => shift_months(today, amount, u32::try_from(magnitude).ok()?),
        "year" => shift_months(today, amount, u32::try_from(magnitude.checked_mul(12)?).ok()?),
        _ => None,
    }
}

fn shift_days(date: NaiveDate, sign: i64, days: u64) -> Option<NaiveDate> {
    if sign < 0 {
        date.checked_sub_days(Days::new(days))
    } else {
        date.checked_add_days(Days::new(days))
    }
}

fn shift_months(date: NaiveDate, sign: i64, months: u32) -> Option<NaiveDate> {
    if sign < 0 {
        date.checked_sub_months(Months::new(months))
    } else {
        date.checked_add_months(Months::new(months))
    }
}
