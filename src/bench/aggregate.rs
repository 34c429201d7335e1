use std::fmt::Write as _;

use serde::Serialize;

use crate::config::Preset;

use super::store::BenchmarkRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedScript {
    pub script: String,
    pub mean_elapsed: f64,
    /// Number of process runs (log records), not individual compute calls.
    pub run_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetRanking {
    pub preset: String,
    pub entries: Vec<RankedScript>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct BenchmarkSummary {
    pub presets: Vec<PresetRanking>,
}

impl BenchmarkSummary {
    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn preset(&self, name: &str) -> Option<&PresetRanking> {
        self.presets.iter().find(|p| p.preset == name)
    }
}

/// Groups by preset, then by script, and ranks each preset's scripts by mean
/// elapsed time, fastest first. Ties keep first-seen order.
///
/// Presets come out in canonical order (easy, medium, hard); names outside
/// the preset table follow in the order they first appear.
pub fn aggregate(records: &[BenchmarkRecord]) -> BenchmarkSummary {
    // (preset, [(script, total, runs)]) in first-seen order at both levels.
    let mut groups: Vec<(&str, Vec<(&str, f64, usize)>)> = Vec::new();
    for record in records {
        let scripts = match groups.iter().position(|(p, _)| *p == record.preset) {
            Some(i) => &mut groups[i].1,
            None => {
                groups.push((record.preset.as_str(), Vec::new()));
                let last = groups.len() - 1;
                &mut groups[last].1
            }
        };
        match scripts.iter_mut().find(|(s, _, _)| *s == record.script) {
            Some((_, total, runs)) => {
                *total += record.avg_elapsed_seconds;
                *runs += 1;
            }
            None => scripts.push((record.script.as_str(), record.avg_elapsed_seconds, 1)),
        }
    }

    groups.sort_by_key(|(preset, _)| Preset::rank_of(preset).unwrap_or(usize::MAX));

    let presets = groups
        .into_iter()
        .map(|(preset, scripts)| {
            let mut entries: Vec<RankedScript> = scripts
                .into_iter()
                .map(|(script, total, runs)| RankedScript {
                    script: script.to_string(),
                    mean_elapsed: total / runs as f64,
                    run_count: runs,
                })
                .collect();
            entries.sort_by(|a, b| a.mean_elapsed.total_cmp(&b.mean_elapsed));
            PresetRanking {
                preset: preset.to_string(),
                entries,
            }
        })
        .collect();

    BenchmarkSummary { presets }
}

// ------------------------- Report -------------------------

const COL_RANK: usize = 5;
const COL_SCRIPT: usize = 30;
const COL_AVG: usize = 18;
const COL_RUNS: usize = 7;
const TABLE_WIDTH: usize = COL_RANK + 1 + COL_SCRIPT + 1 + COL_AVG + 1 + COL_RUNS;

/// Fixed-width text tables, one per preset.
pub fn render_report(summary: &BenchmarkSummary) -> String {
    let mut out = String::new();
    for ranking in &summary.presets {
        let _ = writeln!(
            out,
            "\n================ Mandelbrot Benchmark Summary ({}) ================",
            ranking.preset
        );
        let _ = writeln!(
            out,
            "{:<COL_RANK$} {:<COL_SCRIPT$} {:<COL_AVG$} {:<COL_RUNS$}",
            "Rank", "Script", "Avg Time (s)", "Runs"
        );
        let _ = writeln!(out, "{}", "-".repeat(TABLE_WIDTH));
        for (i, entry) in ranking.entries.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:<COL_RANK$} {:<COL_SCRIPT$} {:<COL_AVG$.4} {:<COL_RUNS$}",
                i + 1,
                entry.script,
                entry.mean_elapsed,
                entry.run_count
            );
        }
        let _ = writeln!(out, "{}", "=".repeat(TABLE_WIDTH));
    }
    out
}
