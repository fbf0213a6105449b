//! Exact date-difference arithmetic.
//!
//! Language models approximate; date arithmetic must not. Leap years and
//! month lengths are delegated to `chrono`, never reimplemented.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{PipelineTool, ToolOutcome};

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Deserialize)]
struct DateDifferenceArgs {
    start_date: String,
    end_date: String,
}

/// `days_between(start_date, end_date)`: whole days from start to end.
/// Negative when end precedes start, zero when equal.
pub struct DateDifferenceTool;

impl DateDifferenceTool {
    fn compute(args: &DateDifferenceArgs) -> ToolOutcome {
        let start = match NaiveDate::parse_from_str(&args.start_date, ISO_DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                return ToolOutcome::failure(format!(
                    "invalid start_date '{}': {} (expected YYYY-MM-DD)",
                    args.start_date, e
                ))
            }
        };
        let end = match NaiveDate::parse_from_str(&args.end_date, ISO_DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                return ToolOutcome::failure(format!(
                    "invalid end_date '{}': {} (expected YYYY-MM-DD)",
                    args.end_date, e
                ))
            }
        };

        let days = (end - start).num_days();

        ToolOutcome {
            success: true,
            output: format!("{} days", days),
            data: json!({
                "days": days,
                "start_date": args.start_date,
                "end_date": args.end_date,
            }),
            error: None,
        }
    }
}

#[async_trait]
impl PipelineTool for DateDifferenceTool {
    fn name(&self) -> &str {
        "days_between"
    }

    fn description(&self) -> &str {
        "Calculate the exact number of days between two calendar dates. \
         Use this for any elapsed-time question; never estimate date \
         arithmetic yourself. The result is negative when end_date precedes \
         start_date."
    }

    fn parameters_schema(&self) -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "start_date": {
                    "type": "string",
                    "description": "Start date in YYYY-MM-DD format (e.g. '2024-01-24')"
                },
                "end_date": {
                    "type": "string",
                    "description": "End date in YYYY-MM-DD format (e.g. '2024-02-18')"
                }
            },
            "required": ["start_date", "end_date"]
        })
    }

    async fn execute(&self, arguments: JsonValue) -> Result<ToolOutcome> {
        let args: DateDifferenceArgs = match serde_json::from_value(arguments) {
            Ok(args) => args,
            Err(e) => {
                return Ok(ToolOutcome::failure(format!(
                    "missing or malformed arguments: {}",
                    e
                )))
            }
        };
        Ok(Self::compute(&args))
    }
}
