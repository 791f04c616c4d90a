//! Long-horizon context compression (`spec.md` §4.7): keeps the first and
//! last few step results verbatim and summarizes the rest, so synthesis
//! prompts stay bounded regardless of plan length. Counts fixed per
//! `SPEC_FULL.md` §9 decision #3 (first 2, last 3 — the example `spec.md`
//! §4.7 itself gives).

use serde::Serialize;
use vantage_types::StepResult;

const KEEP_FIRST: usize = 2;
const KEEP_LAST: usize = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddleSummary {
    pub count: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedHistory<'a> {
    pub first: Vec<&'a StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle: Option<MiddleSummary>,
    pub last: Vec<&'a StepResult>,
}

/// Compresses `results` for the synthesis call. Short histories (at or
/// below `KEEP_FIRST + KEEP_LAST`) are returned verbatim with no summary.
pub fn compress(results: &[StepResult]) -> CompressedHistory<'_> {
    if results.len() <= KEEP_FIRST + KEEP_LAST {
        return CompressedHistory {
            first: results.iter().collect(),
            middle: None,
            last: Vec::new(),
        };
    }

    let first: Vec<&StepResult> = results[..KEEP_FIRST].iter().collect();
    let last: Vec<&StepResult> = results[results.len() - KEEP_LAST..].iter().collect();
    let middle_slice = &results[KEEP_FIRST..results.len() - KEEP_LAST];
    let succeeded = middle_slice.iter().filter(|r| r.success).count();
    let failed = middle_slice.len() - succeeded;

    CompressedHistory {
        first,
        middle: Some(MiddleSummary {
            count: middle_slice.len(),
            succeeded,
            failed,
        }),
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(index: usize, success: bool) -> StepResult {
        StepResult {
            step_index: index,
            tool_name: "t".into(),
            tool_args: serde_json::Value::Null,
            output: None,
            error: None,
            success,
            duration_ms: 1,
            confidence: None,
        }
    }

    #[test]
    fn short_histories_are_kept_verbatim() {
        let results = vec![result(0, true), result(1, true), result(2, false)];
        let compressed = compress(&results);
        assert_eq!(compressed.first.len(), 3);
        assert!(compressed.middle.is_none());
        assert!(compressed.last.is_empty());
    }

    #[test]
    fn long_histories_summarize_the_middle() {
        let results: Vec<StepResult> = (0..10).map(|i| result(i, i % 3 != 0)).collect();
        let compressed = compress(&results);
        assert_eq!(compressed.first.len(), 2);
        assert_eq!(compressed.last.len(), 3);
        let middle = compressed.middle.unwrap();
        assert_eq!(middle.count, 5);
        assert_eq!(middle.succeeded + middle.failed, 5);
    }
}
