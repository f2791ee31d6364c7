use std::path::Path;

use crate::{Error, Scheduler};

/// One row of a replay trace: an absolute (dataset-relative) timestamp plus
/// the token counts that went with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceEntry {
    pub timestamp: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Reads a CSV trace of `timestamp,input_tokens,output_tokens` rows. A
/// non-numeric first column on the first line is treated as a header and
/// skipped; malformed lines are skipped with a warning rather than failing
/// the whole load.
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, Error> {
    let text = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            if i == 0 {
                continue; // short header line
            }
            tracing::debug!(line = i, "skipping malformed trace line: too few fields");
            continue;
        }
        let parsed = fields[0]
            .parse::<f64>()
            .and_then(|ts| fields[1].parse::<u32>().map(|it| (ts, it)))
            .and_then(|(ts, it)| fields[2].parse::<u32>().map(|ot| (ts, it, ot)));
        match parsed {
            Ok((ts, input_tokens, output_tokens)) => entries.push(TraceEntry { timestamp: ts, input_tokens, output_tokens }),
            Err(_) if i == 0 => continue, // header row
            Err(e) => tracing::debug!(line = i, error = %e, "skipping malformed trace line"),
        }
    }
    if entries.is_empty() {
        return Err(Error::EmptyTrace(path.display().to_string()));
    }
    Ok(entries)
}

/// Replays absolute inter-arrival gaps from a trace: `t[i] = initial +
/// (trace[i].timestamp - trace[0].timestamp)`. The trace's entry count is
/// authoritative for the stage's request count; calls past the last entry
/// saturate at the final timestamp rather than panicking, since the
/// orchestrator is expected to stop pulling once `dataset.count()` requests
/// have been scheduled.
pub struct TraceReplayScheduler {
    entries: Vec<TraceEntry>,
    t0: f64,
    initial: f64,
    idx: usize,
}

impl TraceReplayScheduler {
    pub fn new(entries: Vec<TraceEntry>, initial: f64) -> Self {
        let t0 = entries.first().map(|e| e.timestamp).unwrap_or(0.0);
        TraceReplayScheduler { entries, t0, initial, idx: 0 }
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }
}

impl Scheduler for TraceReplayScheduler {
    fn next(&mut self) -> f64 {
        let i = self.idx.min(self.entries.len().saturating_sub(1));
        let ts = self.entries.get(i).map(|e| e.timestamp).unwrap_or(self.t0);
        self.idx += 1;
        self.initial + (ts - self.t0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replays_gaps_relative_to_first_entry() {
        let entries = vec![
            TraceEntry { timestamp: 100.0, input_tokens: 100, output_tokens: 50 },
            TraceEntry { timestamp: 101.0, input_tokens: 200, output_tokens: 75 },
            TraceEntry { timestamp: 102.5, input_tokens: 150, output_tokens: 60 },
        ];
        let mut s = TraceReplayScheduler::new(entries, 10.0);
        assert!((s.next() - 10.0).abs() < 1e-9);
        assert!((s.next() - 11.0).abs() < 1e-9);
        assert!((s.next() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn reads_csv_with_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,input_tokens,output_tokens").unwrap();
        writeln!(file, "0.0,100,50").unwrap();
        writeln!(file, "1.0,200,75").unwrap();
        let entries = read_trace_file(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].input_tokens, 200);
    }

    #[test]
    fn reads_csv_without_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0.0,100,50").unwrap();
        writeln!(file, "1.0,200,75").unwrap();
        let entries = read_trace_file(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn empty_trace_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = read_trace_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::EmptyTrace(_)));
    }
}
