//! Result and error rendering for the terminal.

use std::io::{self, Write};

use kg_client::{ClientError, QueryResult};
use serde_json::Value;

/// Write `result` as a tab-separated table: a header line, then one line
/// per row.
pub fn write_table(out: &mut impl Write, result: &QueryResult) -> io::Result<()> {
    if !result.columns.is_empty() {
        writeln!(out, "{}", result.columns.join("\t"))?;
    }
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(cell).collect();
        writeln!(out, "{}", cells.join("\t"))?;
    }
    Ok(())
}

pub fn write_json(out: &mut impl Write, result: &QueryResult) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, result)?;
    writeln!(out)
}

/// One-line summary for stderr, e.g. `3 rows (12.5 ms)`.
pub fn summary(result: &QueryResult) -> String {
    let noun = if result.row_count == 1 { "row" } else { "rows" };
    let mut line = format!(
        "{} {noun} ({:.1} ms)",
        result.row_count, result.execution_time_ms
    );
    if result.truncated {
        line.push_str(&format!(", truncated from {}", result.total_count));
    }
    if let Some(kg) = &result.switched_kg {
        line.push_str(&format!(", now using {kg}"));
    }
    line
}

/// Print a result to stdout and its summary to stderr.
pub fn print_result(result: &QueryResult, json: bool) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        write_json(&mut out, result)?;
    } else {
        write_table(&mut out, result)?;
        eprintln!("{}", summary(result));
    }
    out.flush()
}

/// Describe a failed request, one diagnostic per line.
pub fn describe_error(err: &ClientError) -> String {
    match err {
        ClientError::Protocol {
            message,
            validation_errors,
        } if !validation_errors.is_empty() => {
            let mut text = message.clone();
            for ve in validation_errors {
                text.push_str(&format!("\n  {ve}"));
            }
            text
        }
        other => other.to_string(),
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kg_client::ValidationError;
    use serde_json::json;

    fn sample() -> QueryResult {
        QueryResult {
            columns: vec!["name".into(), "age".into()],
            rows: vec![
                vec![json!("ada"), json!(36)],
                vec![json!("alan"), Value::Null],
            ],
            row_count: 2,
            total_count: 2,
            truncated: false,
            execution_time_ms: 3.5,
            row_provenance: None,
            metadata: None,
            switched_kg: None,
        }
    }

    #[test]
    fn table_is_tab_separated() {
        let mut out = Vec::new();
        write_table(&mut out, &sample()).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "name\tage\nada\t36\nalan\t\n");
    }

    #[test]
    fn json_output_parses_back() {
        let mut out = Vec::new();
        write_json(&mut out, &sample()).unwrap();
        let back: QueryResult = serde_json::from_slice(&out).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn summary_mentions_truncation_and_switch() {
        let mut result = sample();
        assert_eq!(summary(&result), "2 rows (3.5 ms)");
        result.truncated = true;
        result.total_count = 500;
        result.switched_kg = Some("movies".into());
        assert_eq!(
            summary(&result),
            "2 rows (3.5 ms), truncated from 500, now using movies"
        );
    }

    #[test]
    fn validation_errors_are_listed() {
        let err = ClientError::Protocol {
            message: "invalid program".into(),
            validation_errors: vec![ValidationError {
                message: "unknown relation foo".into(),
                statement: Some(0),
                line: Some(2),
                column: Some(4),
            }],
        };
        assert_eq!(
            describe_error(&err),
            "invalid program\n  2:4: unknown relation foo"
        );
        assert_eq!(describe_error(&ClientError::NotConnected), "not connected");
    }
}
