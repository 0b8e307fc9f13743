//! Line assembly: byte chunks → candidate entry strings → parsed entries.
//!
//! Keeps two pieces of state between chunks: the trailing partial line of
//! the previous chunk (`leftover`) and at most one partially-assembled
//! multi-line entry (`buffered`). The buffering heuristics are intentionally
//! narrow — only `[sql]:` statements awaiting their fields line and
//! timestamped-but-fieldless entries defer emission.

use std::sync::Arc;

use crate::metrics::PipelineMetrics;
use crate::parser::{self, ansi, timestamp, LogEntry};

/// Per-line size cap. Anything longer is dropped before parsing.
pub const MAX_LINE_BYTES: usize = 100 * 1024;

enum LineKind {
    Drop,
    NewEntry,
    Continuation,
}

pub struct LineAssembler {
    leftover: Vec<u8>,
    buffered: Option<LogEntry>,
    metrics: Arc<PipelineMetrics>,
}

impl LineAssembler {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            leftover: Vec::new(),
            buffered: None,
            metrics,
        }
    }

    /// Feed one demuxed payload chunk; returns the entries that completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<LogEntry> {
        let mut data = std::mem::take(&mut self.leftover);
        data.extend_from_slice(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some(pos) = data[start..].iter().position(|&b| b == b'\n') {
            let line = &data[start..start + pos];
            self.accept_line(line, &mut out);
            start += pos + 1;
        }
        // The chunk did not end on a line boundary — keep the fragment.
        self.leftover = data[start..].to_vec();
        out
    }

    /// Drain remaining state at stream end: the trailing partial line is
    /// treated as a complete line, then any buffered entry is flushed.
    pub fn finish(&mut self) -> Vec<LogEntry> {
        let mut out = Vec::new();
        if !self.leftover.is_empty() {
            let line = std::mem::take(&mut self.leftover);
            self.accept_line(&line, &mut out);
        }
        if let Some(pending) = self.buffered.take() {
            out.push(pending);
        }
        out
    }

    fn accept_line(&mut self, line_bytes: &[u8], out: &mut Vec<LogEntry>) {
        if line_bytes.len() > MAX_LINE_BYTES {
            self.metrics
                .ingest
                .lines_dropped_oversize
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::debug!(len = line_bytes.len(), "dropping oversized log line");
            return;
        }
        let line = String::from_utf8_lossy(line_bytes);
        let line = line.strip_suffix('\r').unwrap_or(&line);

        match self.classify(line) {
            LineKind::Drop => {}
            LineKind::Continuation => self.continuation(line, out),
            LineKind::NewEntry => self.new_entry(line, out),
        }
    }

    fn classify(&self, line: &str) -> LineKind {
        if line.is_empty() {
            return LineKind::Drop;
        }
        if ansi::starts_with_csi(line) {
            return LineKind::NewEntry;
        }
        if timestamp::appears_within(line, parser::TIMESTAMP_PREFIX_WINDOW) {
            return LineKind::NewEntry;
        }
        if parser::starts_with_level(line) {
            return LineKind::NewEntry;
        }
        if line.starts_with(char::is_whitespace) {
            return LineKind::Continuation;
        }
        if self.buffered.is_some() {
            LineKind::Continuation
        } else {
            LineKind::NewEntry
        }
    }

    fn continuation(&mut self, line: &str, out: &mut Vec<LogEntry>) {
        match self.buffered.take() {
            Some(pending) => {
                let combined = format!("{}\n{}", pending.raw, line.trim());
                let reparsed = parser::parse(&combined);
                // SQL statements commonly span two lines: the statement, then
                // its fields. Once the fields arrive the entry is complete.
                if reparsed.message.contains("[sql]:") && !reparsed.fields.is_empty() {
                    out.push(reparsed);
                } else {
                    self.buffered = Some(reparsed);
                }
            }
            // Nothing to continue — emit as a standalone entry.
            None => out.push(parser::parse(line)),
        }
    }

    fn new_entry(&mut self, line: &str, out: &mut Vec<LogEntry>) {
        if let Some(pending) = self.buffered.take() {
            out.push(pending);
        }
        let entry = parser::parse(line);
        if should_buffer(&entry) {
            self.buffered = Some(entry);
        } else {
            out.push(entry);
        }
    }
}

/// Defer emission when a follow-up line is likely: a `[sql]` statement still
/// missing its fields, or a timestamped message with no fields yet.
fn should_buffer(entry: &LogEntry) -> bool {
    if entry.message.contains("[sql]") && entry.fields.is_empty() {
        return true;
    }
    entry.timestamp.is_some() && !entry.message.is_empty() && entry.fields.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> LineAssembler {
        LineAssembler::new(Arc::new(PipelineMetrics::new()))
    }

    fn feed_lines(asm: &mut LineAssembler, lines: &[&str]) -> Vec<LogEntry> {
        let joined = format!("{}\n", lines.join("\n"));
        asm.feed(joined.as_bytes())
    }

    // ─── Basic delimitation ─────────────────────────────────────

    #[test]
    fn test_plain_lines_emit_immediately() {
        let mut asm = assembler();
        let entries = feed_lines(&mut asm, &["first message", "second message"]);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "first message");
        assert_eq!(entries[1].message, "second message");
    }

    #[test]
    fn test_partial_line_across_chunks() {
        let mut asm = assembler();
        assert!(asm.feed(b"half a li").is_empty());
        let entries = asm.feed(b"ne done\nnext full=1\n");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "half a line done");
        assert_eq!(entries[1].fields["full"], "1");
    }

    #[test]
    fn test_empty_lines_dropped() {
        let mut asm = assembler();
        let entries = asm.feed(b"\n\nreal line here=1\n\n");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_crlf_stripped() {
        let mut asm = assembler();
        let entries = asm.feed(b"windows line\r\n");
        assert_eq!(entries[0].message, "windows line");
    }

    // ─── SQL two-line buffering ─────────────────────────────────

    #[test]
    fn test_sql_statement_waits_for_fields_line() {
        let mut asm = assembler();
        let first = feed_lines(
            &mut asm,
            &["DBG db/query.go:45 > [sql]: SELECT * FROM users WHERE id = $1"],
        );
        assert!(first.is_empty(), "sql line without fields should buffer");

        let entries = feed_lines(
            &mut asm,
            &["    duration=1.234 db.table=users db.operation=select db.rows=1 request_id=abc"],
        );
        assert_eq!(entries.len(), 1, "fields line completes the entry");
        let entry = &entries[0];
        assert!(entry.message.contains("[sql]: SELECT * FROM users WHERE id = $1"));
        assert_eq!(entry.fields["duration"], "1.234");
        assert_eq!(entry.fields["db.table"], "users");
        assert_eq!(entry.fields["db.operation"], "select");
        assert_eq!(entry.fields["db.rows"], "1");
        assert_eq!(entry.fields["request_id"], "abc");
    }

    // ─── ANSI boundary + continuation merge ─────────────────────

    #[test]
    fn test_ansi_prefixed_entry_collects_continuation() {
        let mut asm = assembler();
        let first = feed_lines(&mut asm, &["\x1b[32mOct  3 21:53:27\x1b[0m INF Application started"]);
        assert!(first.is_empty(), "timestamped fieldless entry should buffer");

        let still_empty = feed_lines(&mut asm, &["  loading config /etc/app.yaml"]);
        assert!(still_empty.is_empty());

        let entries = asm.finish();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(entry.raw.contains("Application started"));
        assert!(entry.raw.contains("loading config /etc/app.yaml"));
        assert_eq!(entry.raw.matches('\n').count(), 1);
    }

    #[test]
    fn test_new_entry_flushes_buffered() {
        let mut asm = assembler();
        feed_lines(&mut asm, &["Oct  3 21:53:27 INF first"]);
        let entries = feed_lines(&mut asm, &["Oct  3 21:53:28 INF second"]);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].raw.contains("first"));

        let rest = asm.finish();
        assert_eq!(rest.len(), 1);
        assert!(rest[0].raw.contains("second"));
    }

    #[test]
    fn test_fielded_entry_not_buffered() {
        let mut asm = assembler();
        let entries = feed_lines(&mut asm, &["Oct  3 21:53:27 INF ready port=8080"]);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_standalone_continuation_without_buffer() {
        let mut asm = assembler();
        let entries = feed_lines(&mut asm, &["   orphaned indented line"]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "orphaned indented line");
    }

    #[test]
    fn test_unindented_line_continues_buffered_entry() {
        let mut asm = assembler();
        feed_lines(&mut asm, &["Oct  3 21:53:27 INF something happened"]);
        assert!(feed_lines(&mut asm, &["continued detail"]).is_empty());
        let entries = asm.finish();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].raw.contains("continued detail"));
    }

    // ─── Size cap ───────────────────────────────────────────────

    #[test]
    fn test_oversized_line_dropped() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut asm = LineAssembler::new(metrics.clone());
        let mut big = vec![b'x'; MAX_LINE_BYTES + 1];
        big.push(b'\n');
        big.extend_from_slice(b"small line\n");

        let entries = asm.feed(&big);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "small line");
        assert_eq!(
            metrics
                .ingest
                .lines_dropped_oversize
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    // ─── Drain semantics ────────────────────────────────────────

    #[test]
    fn test_finish_drains_leftover_fragment() {
        let mut asm = assembler();
        assert!(asm.feed(b"no trailing newline key=1").is_empty());
        let entries = asm.finish();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields["key"], "1");
    }

    #[test]
    fn test_finish_empty() {
        let mut asm = assembler();
        assert!(asm.finish().is_empty());
    }
}
