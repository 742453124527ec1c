//! Crate-level error types.
//!
//! Caller-input problems surface as [`ValidationError`], backend conditions
//! as [`BackendError`], formatting failures as [`FormulaError`]. All of
//! them aggregate into [`ReportError`], which exposes a stable machine
//! reason and whether a retry may help.

use crate::backend::BackendError;
use crate::config::SettingsError;
use crate::formula::FormulaError;

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Kinds of filter validation failure, each with a fixed message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    InvalidFilters,
    MissingMandatoryFilter,
    StageMismatch,
    InvalidValue,
    InvalidStaticOption,
    PatternMismatch,
    OutOfRange,
    InvalidPattern,
    InvalidDynamicFilter,
    InvalidDynamicOptions,
    InvalidSortColumn,
}

impl ValidationErrorKind {
    /// Message template; each `{}` is filled from the construction arguments.
    pub fn template(&self) -> &'static str {
        match self {
            Self::InvalidFilters => "Invalid filters provided: {}",
            Self::MissingMandatoryFilter => "Mandatory filter value not provided: {}",
            Self::StageMismatch => {
                "Filter {} does not apply to the requested stage (interactive = {})"
            }
            Self::InvalidValue => "Invalid value {} for filter {}. Cannot be parsed as {}",
            Self::InvalidStaticOption => "Invalid static options provided for filter {}: {}",
            Self::PatternMismatch => "Filter value {} for {} does not match pattern {}",
            Self::OutOfRange => "Filter value {} for {} is outside the range {} to {}",
            Self::InvalidPattern => "Filter {} declares an invalid pattern {}",
            Self::InvalidDynamicFilter => "Error. This filter is not a dynamic filter: {}",
            Self::InvalidDynamicOptions => {
                "Invalid dynamic options length provided for {}: minimum length is {}"
            }
            Self::InvalidSortColumn => "Invalid sortColumn provided: {}",
        }
    }

    /// Stable reason string for callers.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidFilters => "INVALID_FILTERS",
            Self::MissingMandatoryFilter => "MISSING_MANDATORY_FILTER",
            Self::StageMismatch => "FILTER_STAGE_MISMATCH",
            Self::InvalidValue => "INVALID_FILTER_VALUE",
            Self::InvalidStaticOption => "INVALID_STATIC_OPTION",
            Self::PatternMismatch => "FILTER_PATTERN_MISMATCH",
            Self::OutOfRange => "FILTER_OUT_OF_RANGE",
            Self::InvalidPattern => "INVALID_FILTER_PATTERN",
            Self::InvalidDynamicFilter => "INVALID_DYNAMIC_FILTER",
            Self::InvalidDynamicOptions => "INVALID_DYNAMIC_OPTIONS",
            Self::InvalidSortColumn => "INVALID_SORT_COLUMN",
        }
    }

    /// Build an error of this kind. Missing arguments render as empty.
    pub fn error(self, args: &[&str]) -> ValidationError {
        let mut message = String::new();
        let mut args = args.iter();
        let mut parts = self.template().split("{}").peekable();
        while let Some(part) = parts.next() {
            message.push_str(part);
            if parts.peek().is_some() {
                message.push_str(args.next().copied().unwrap_or_default());
            }
        }
        ValidationError { kind: self, message }
    }
}

/// A rejected client filter or sort request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

/// Errors surfaced by the execution services.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Invalid report id or variant id provided: {report_id}/{variant_id}")]
    InvalidReportReference {
        report_id: String,
        variant_id: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Result table {0} does not exist")]
    MissingTable(String),

    #[error("Summary {0} is not defined for this report")]
    UnknownSummary(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    Config(#[from] SettingsError),
}

impl ReportError {
    pub fn invalid_reference(report_id: &str, variant_id: &str) -> Self {
        Self::InvalidReportReference {
            report_id: report_id.to_string(),
            variant_id: variant_id.to_string(),
        }
    }

    /// Machine-distinguishable reason for the API layer.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidReportReference { .. } => "INVALID_REPORT_REFERENCE",
            Self::Validation(err) => err.kind.reason(),
            Self::MissingTable(_) => "MISSING_TABLE",
            Self::UnknownSummary(_) => "UNKNOWN_SUMMARY",
            Self::Backend(err) => err.reason(),
            Self::Formula(_) => "FORMULA_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the caller may retry later (backend throttling only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(err) if err.is_busy())
    }

    /// Whether this is a caller-input error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidReportReference { .. } | Self::Validation(_) | Self::UnknownSummary(_)
        )
    }
}
