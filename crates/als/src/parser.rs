//! Raw rating record parsing.
//!
//! Input records arrive either as comma-delimited text or as a 4-element
//! JSON array; both decode to (user, item, score, timestamp). An empty
//! score field is valid input and signifies deletion of the association.

use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::types::{RatingEvent, Score};

/// Parse one raw record into a typed rating event.
///
/// Records whose trailing character indicates array-style encoding are
/// decoded as a JSON array; everything else is split on commas. Exactly
/// four fields are required.
pub fn parse_record(line: &str) -> Result<RatingEvent> {
    let fields = split_fields(line)?;

    let user = parse_i32(&fields[0], line)?;
    let item = parse_i32(&fields[1], line)?;
    let score = if fields[2].is_empty() {
        Score::Delete
    } else {
        Score::Value(fields[2].parse::<f64>().map_err(|_| {
            PipelineError::MalformedRecord(format!("bad score field in {line:?}"))
        })?)
    };
    let timestamp = fields[3]
        .parse::<i64>()
        .map_err(|_| PipelineError::MalformedRecord(format!("bad timestamp field in {line:?}")))?;

    Ok(RatingEvent {
        user,
        item,
        score,
        timestamp,
    })
}

/// Parse a whole batch, dropping malformed records with a warning.
///
/// This is the documented batch-level policy: one bad line does not abort
/// the batch. Use [`parse_record`] where a malformed record must be an
/// error.
pub fn parse_batch<'a, I>(lines: I) -> Vec<RatingEvent>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .filter_map(|line| match parse_record(line) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Skipping malformed record");
                None
            }
        })
        .collect()
}

fn split_fields(line: &str) -> Result<Vec<String>> {
    let fields: Vec<String> = if line.trim_end().ends_with(']') {
        let values: Vec<serde_json::Value> = serde_json::from_str(line)
            .map_err(|_| PipelineError::MalformedRecord(format!("bad array encoding: {line:?}")))?;
        values
            .into_iter()
            .map(|value| match value {
                serde_json::Value::String(s) => Ok(s),
                serde_json::Value::Number(n) => Ok(n.to_string()),
                serde_json::Value::Null => Ok(String::new()),
                other => Err(PipelineError::MalformedRecord(format!(
                    "non-scalar field {other} in {line:?}"
                ))),
            })
            .collect::<Result<Vec<String>>>()?
    } else {
        line.split(',').map(str::to_string).collect()
    };

    if fields.len() != 4 {
        return Err(PipelineError::MalformedRecord(format!(
            "expected 4 fields, got {} in {line:?}",
            fields.len()
        )));
    }
    Ok(fields)
}

fn parse_i32(field: &str, line: &str) -> Result<i32> {
    field
        .parse::<i32>()
        .map_err(|_| PipelineError::MalformedRecord(format!("bad id field {field:?} in {line:?}")))
}
