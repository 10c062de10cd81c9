//! Renders EXPLAIN output the way the interactive shell does:
//!
//! ```text
//!                     QUERY PLAN
//! ---------------------------------------------------
//!  Access Path:
//!  +-STORAGE ACCESS for users [Cost: 12, Rows: 1K]
//! (2 rows)
//! ```

use crate::types::QueryResult;

pub fn pretty_print(result: &QueryResult) -> String {
    let header = result.columns().first().map(String::as_str).unwrap_or_default();
    let lines: Vec<String> = result
        .rows_ref()
        .iter()
        .map(|row| row.get_index(0).map(ToString::to_string).unwrap_or_default())
        .collect();

    // One character of padding on each side.
    let width = lines
        .iter()
        .map(|line| line.chars().count())
        .chain(std::iter::once(header.chars().count()))
        .max()
        .unwrap_or(0)
        + 2;

    let mut out = Vec::with_capacity(lines.len() + 3);
    out.push(format!("{header:^width$}").trim_end().to_string());
    out.push("-".repeat(width));
    out.extend(lines.iter().map(|line| format!(" {line}")));

    let nrows = lines.len();
    let label = if nrows == 1 { "row" } else { "rows" };
    out.push(format!("({nrows} {label})"));

    out.join("\n") + "\n"
}
