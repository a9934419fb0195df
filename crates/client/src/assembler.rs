//! Reassembles a streamed outcome (`result_start`, `result_chunk`*,
//! `result_end`) into one [`QueryResult`].

use kg_protocol::{QueryResult, ResultChunk, ResultStart, Row};

/// Rows accumulated between a `result_start` and its `result_end`.
#[derive(Debug)]
pub(crate) struct StreamingAssembly {
    header: ResultStart,
    rows: Vec<Row>,
    provenance: Vec<String>,
    saw_provenance: bool,
}

impl StreamingAssembly {
    pub fn begin(header: ResultStart) -> Self {
        Self {
            header,
            rows: Vec::new(),
            provenance: Vec::new(),
            saw_provenance: false,
        }
    }

    pub fn push(&mut self, chunk: ResultChunk) {
        self.rows.extend(chunk.rows);
        if let Some(labels) = chunk.row_provenance {
            self.saw_provenance = true;
            self.provenance.extend(labels);
        }
    }

    pub fn rows_so_far(&self) -> usize {
        self.rows.len()
    }

    pub fn finish(self) -> QueryResult {
        let ResultStart {
            columns,
            total_count,
            truncated,
            execution_time_ms,
            metadata,
            switched_kg,
        } = self.header;

        QueryResult {
            columns,
            row_count: self.rows.len() as u64,
            rows: self.rows,
            total_count,
            truncated,
            execution_time_ms,
            row_provenance: self.saw_provenance.then_some(self.provenance),
            metadata,
            switched_kg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(columns: &[&str], total: u64) -> ResultStart {
        ResultStart {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            total_count: total,
            truncated: false,
            execution_time_ms: 4.0,
            metadata: None,
            switched_kg: None,
        }
    }

    fn chunk(rows: Vec<Row>, provenance: Option<Vec<&str>>) -> ResultChunk {
        ResultChunk {
            rows,
            row_provenance: provenance.map(|p| p.into_iter().map(String::from).collect()),
        }
    }

    #[test]
    fn concatenates_chunks_in_order() {
        let mut asm = StreamingAssembly::begin(header(&["A"], 2));
        asm.push(chunk(vec![vec![json!(1)]], None));
        asm.push(chunk(vec![vec![json!(2)]], None));
        assert_eq!(asm.rows_so_far(), 2);

        let result = asm.finish();
        assert_eq!(result.columns, vec!["A"]);
        assert_eq!(result.rows, vec![vec![json!(1)], vec![json!(2)]]);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.total_count, 2);
        assert!(result.row_provenance.is_none());
    }

    #[test]
    fn many_chunks_keep_row_count_consistent() {
        let mut asm = StreamingAssembly::begin(header(&["N"], 30));
        for batch in 0..10 {
            let rows = (0..3).map(|i| vec![json!(batch * 3 + i)]).collect();
            asm.push(chunk(rows, None));
        }
        let result = asm.finish();
        assert_eq!(result.row_count, 30);
        let flat: Vec<i64> = result.rows.iter().map(|r| r[0].as_i64().unwrap()).collect();
        assert_eq!(flat, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn zero_chunks_yield_empty_result() {
        let result = StreamingAssembly::begin(header(&["A", "B"], 0)).finish();
        assert!(result.rows.is_empty());
        assert_eq!(result.row_count, 0);
        assert_eq!(result.columns.len(), 2);
    }

    #[test]
    fn provenance_present_if_any_chunk_supplied_it() {
        let mut asm = StreamingAssembly::begin(header(&["A"], 3));
        asm.push(chunk(vec![vec![json!(1)]], None));
        asm.push(chunk(vec![vec![json!(2)], vec![json!(3)]], Some(vec!["edb", "idb"])));
        let result = asm.finish();
        assert_eq!(
            result.row_provenance,
            Some(vec!["edb".to_string(), "idb".to_string()])
        );
    }

    #[test]
    fn header_fields_carry_over() {
        let mut h = header(&["A"], 100);
        h.truncated = true;
        h.metadata = Some(json!({"plan": "scan"}));
        h.switched_kg = Some("movies".into());
        let result = StreamingAssembly::begin(h).finish();
        assert!(result.truncated);
        assert_eq!(result.total_count, 100);
        assert_eq!(result.metadata, Some(json!({"plan": "scan"})));
        assert_eq!(result.switched_kg.as_deref(), Some("movies"));
    }
}
