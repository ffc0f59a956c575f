//! Unified diff rendering for audit artifacts.
//!
//! Line-based diff between the pre-fix and proposed file contents. The output
//! is only ever written as an inspection artifact; it is never parsed back or
//! applied, so fidelity to `diff -u` formatting matters more than speed.

const CONTEXT_LINES: usize = 3;

/// Line budget for the LCS table. Beyond this the diff degrades to one
/// whole-file replacement hunk.
const MAX_LCS_LINES: usize = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DiffOp {
    Equal(String),
    Remove(String),
    Add(String),
}

/// Render a unified diff between `old` and `new`, labeled with `path`.
///
/// Returns an empty string when the contents are identical.
pub fn render_unified_diff(path: &str, old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let ops = if old_lines.len() > MAX_LCS_LINES || new_lines.len() > MAX_LCS_LINES {
        replace_all_ops(&old_lines, &new_lines)
    } else {
        diff_ops(&old_lines, &new_lines)
    };

    let mut out = String::new();
    out.push_str(&format!("--- a/{path}\n"));
    out.push_str(&format!("+++ b/{path}\n"));
    for hunk in build_hunks(&ops) {
        out.push_str(&hunk.render());
    }
    out
}

fn replace_all_ops(old_lines: &[&str], new_lines: &[&str]) -> Vec<DiffOp> {
    let mut ops = Vec::with_capacity(old_lines.len() + new_lines.len());
    ops.extend(old_lines.iter().map(|line| DiffOp::Remove((*line).to_string())));
    ops.extend(new_lines.iter().map(|line| DiffOp::Add((*line).to_string())));
    ops
}

/// Longest-common-subsequence diff, backtracked into an op list.
fn diff_ops(old_lines: &[&str], new_lines: &[&str]) -> Vec<DiffOp> {
    let n = old_lines.len();
    let m = new_lines.len();
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let idx = |i: usize, j: usize| i * (m + 1) + j;

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[idx(i, j)] = if old_lines[i] == new_lines[j] {
                table[idx(i + 1, j + 1)] + 1
            } else {
                table[idx(i + 1, j)].max(table[idx(i, j + 1)])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old_lines[i] == new_lines[j] {
            ops.push(DiffOp::Equal(old_lines[i].to_string()));
            i += 1;
            j += 1;
        } else if table[idx(i + 1, j)] >= table[idx(i, j + 1)] {
            ops.push(DiffOp::Remove(old_lines[i].to_string()));
            i += 1;
        } else {
            ops.push(DiffOp::Add(new_lines[j].to_string()));
            j += 1;
        }
    }
    ops.extend(old_lines[i..].iter().map(|line| DiffOp::Remove((*line).to_string())));
    ops.extend(new_lines[j..].iter().map(|line| DiffOp::Add((*line).to_string())));
    ops
}

struct Hunk {
    old_start: usize,
    old_count: usize,
    new_start: usize,
    new_count: usize,
    lines: Vec<String>,
}

impl Hunk {
    fn render(&self) -> String {
        let mut out = format!(
            "@@ -{},{} +{},{} @@\n",
            self.old_start, self.old_count, self.new_start, self.new_count
        );
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Group ops into hunks with `CONTEXT_LINES` lines of surrounding context.
fn build_hunks(ops: &[DiffOp]) -> Vec<Hunk> {
    // Indices of ops that are actual changes.
    let change_indices: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, DiffOp::Equal(_)))
        .map(|(i, _)| i)
        .collect();
    if change_indices.is_empty() {
        return Vec::new();
    }

    // Merge changes whose context windows touch into ranges over the op list.
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &change in &change_indices {
        let start = change.saturating_sub(CONTEXT_LINES);
        let end = (change + CONTEXT_LINES + 1).min(ops.len());
        match ranges.last_mut() {
            Some((_, prev_end)) if start <= *prev_end => *prev_end = end,
            _ => ranges.push((start, end)),
        }
    }

    let mut hunks = Vec::new();
    let mut old_line = 1usize;
    let mut new_line = 1usize;
    let mut op_index = 0usize;
    for (start, end) in ranges {
        while op_index < start {
            match &ops[op_index] {
                DiffOp::Equal(_) => {
                    old_line += 1;
                    new_line += 1;
                }
                DiffOp::Remove(_) => old_line += 1,
                DiffOp::Add(_) => new_line += 1,
            }
            op_index += 1;
        }

        let old_start = old_line;
        let new_start = new_line;
        let mut old_count = 0usize;
        let mut new_count = 0usize;
        let mut lines = Vec::new();
        while op_index < end {
            match &ops[op_index] {
                DiffOp::Equal(line) => {
                    lines.push(format!(" {line}"));
                    old_line += 1;
                    new_line += 1;
                    old_count += 1;
                    new_count += 1;
                }
                DiffOp::Remove(line) => {
                    lines.push(format!("-{line}"));
                    old_line += 1;
                    old_count += 1;
                }
                DiffOp::Add(line) => {
                    lines.push(format!("+{line}"));
                    new_line += 1;
                    new_count += 1;
                }
            }
            op_index += 1;
        }
        hunks.push(Hunk {
            old_start,
            old_count,
            new_start,
            new_count,
            lines,
        });
    }
    hunks
}
