use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// JSONL timing and counter sink. Each span and count is written as one
/// line; totals are ranked into a sibling `<stem>_hot.log` when the last
/// handle drops.
#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, run_id: Option<u64>, ms: f64) {
        let line = json!({
            "type": "perf.span",
            "name": name,
            "run_id": run_id,
            "unit": "ms",
            "ms": round_ms(ms),
        });
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn log_counts(&self, name: &str, run_id: Option<u64>, counts: &[(&str, u64)]) {
        let values: Map<String, Value> = counts
            .iter()
            .map(|(key, value)| (key.to_string(), Value::from(*value)))
            .collect();
        let line = json!({
            "type": "perf.counts",
            "name": name,
            "run_id": run_id,
            "counts": values,
        });
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let entry = state.count_totals.entry(format!("{name}.{key}")).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let hot_path = hot_path_for(&self.path);
        let Ok(file) = File::create(&hot_path) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().take(100).enumerate() {
            let count = *self.span_counts.get(name).unwrap_or(&1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let line = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "unit": "ms",
                "agg": "sum",
                "ms": round_ms(*ms),
                "count": count,
                "avg_ms": round_ms(avg),
            });
            let _ = writeln!(writer, "{line}");
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(100).enumerate() {
            let line = json!({
                "type": "perf.hot.count",
                "rank": rank + 1,
                "name": name,
                "value": value,
            });
            let _ = writeln!(writer, "{line}");
        }
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 1000.0).round() / 1000.0
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("pagewright_perf.log");
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_path_sits_next_to_the_log() {
        assert_eq!(
            hot_path_for(Path::new("/tmp/run/perf.jsonl")),
            PathBuf::from("/tmp/run/perf_hot.log")
        );
        assert_eq!(
            hot_path_for(Path::new("perf")),
            PathBuf::from("perf_hot.log")
        );
    }

    #[test]
    fn writes_spans_counts_and_hot_summary() {
        let dir = std::env::temp_dir().join(format!("pagewright_perf_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("perf.log");
        {
            let logger = PerfLogger::new(&path).unwrap();
            logger.log_span_ms("measure", Some(1), 2.5);
            logger.log_span_ms("measure", Some(1), 1.5);
            logger.log_counts("run", Some(1), &[("blocks", 3), ("pages", 2)]);
            logger.flush();
        }
        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = log
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "perf.span");
        assert_eq!(lines[2]["counts"]["pages"], 2);

        let hot = std::fs::read_to_string(dir.join("perf_hot.log")).unwrap();
        let first: Value = serde_json::from_str(hot.lines().next().unwrap()).unwrap();
        assert_eq!(first["name"], "measure");
        assert_eq!(first["count"], 2);
        assert_eq!(first["ms"], 4.0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
