use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::MergeArgs;
use crate::table::{Placement, Table};

/// How key cells are compared between target and source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyMode {
    #[default]
    Exact,
    /// Keys are published URLs; see [`normalize_url_key`].
    Url,
}

impl KeyMode {
    fn key(self, raw: &str) -> String {
        match self {
            Self::Exact => raw.trim().to_owned(),
            Self::Url => normalize_url_key(raw),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub rows: usize,
    pub matched: usize,
    /// Columns actually merged, in output order. Empty when the merge was a no-op.
    pub columns: Vec<String>,
}

impl MergeStats {
    pub fn applied(&self) -> bool {
        !self.columns.is_empty()
    }
}

pub fn run(args: MergeArgs) -> anyhow::Result<MergeStats> {
    let target_path = PathBuf::from(&args.target);
    let out_path = PathBuf::from(&args.out);

    let target = Table::read_csv(&target_path).context("read merge target")?;
    let mode = if args.normalize_urls {
        KeyMode::Url
    } else {
        KeyMode::Exact
    };
    let (merged, stats) = merge_from_path(
        target,
        Path::new(&args.source),
        &args.key,
        &args.columns,
        mode,
    );
    merged
        .write_csv(&out_path, args.force)
        .context("write merge output")?;

    tracing::info!(
        rows = stats.rows,
        matched = stats.matched,
        columns = %stats.columns.join(", "),
        out = %out_path.display(),
        "merge complete"
    );
    Ok(stats)
}

/// Like [`merge`], but a source that cannot be loaded leaves the target untouched.
pub fn merge_from_path(
    target: Table,
    source_path: &Path,
    key_column: &str,
    columns: &[String],
    mode: KeyMode,
) -> (Table, MergeStats) {
    match Table::read_csv(source_path) {
        Ok(source) => merge(target, &source, key_column, columns, mode),
        Err(err) => {
            tracing::warn!(
                source = %source_path.display(),
                err = %format!("{err:#}"),
                "merge source unavailable; skipping merge"
            );
            let stats = MergeStats {
                rows: target.len(),
                ..MergeStats::default()
            };
            (target, stats)
        }
    }
}

/// Left-joins `columns` from `source` onto `target` by `key_column`.
///
/// Merged columns replace same-named target columns and move to the front in
/// the requested order. Rows never change count or order. Unmatched rows and
/// rows with a blank key get empty cells; the first source row wins on
/// duplicate keys.
pub fn merge(
    target: Table,
    source: &Table,
    key_column: &str,
    columns: &[String],
    mode: KeyMode,
) -> (Table, MergeStats) {
    let mut stats = MergeStats {
        rows: target.len(),
        ..MergeStats::default()
    };

    let (Some(target_key), Some(source_key)) = (
        target.column_index(key_column),
        source.column_index(key_column),
    ) else {
        tracing::warn!(key = key_column, "key column missing; skipping merge");
        return (target, stats);
    };

    let mut mergeable: Vec<(String, usize)> = Vec::new();
    for column in columns {
        if column == key_column || mergeable.iter().any(|(c, _)| c == column) {
            continue;
        }
        match source.column_index(column) {
            Some(idx) => mergeable.push((column.clone(), idx)),
            None => tracing::warn!(%column, "column missing from merge source; skipped"),
        }
    }
    if mergeable.is_empty() {
        tracing::warn!("no mergeable columns; skipping merge");
        return (target, stats);
    }

    let mut lookup: HashMap<String, usize> = HashMap::new();
    for (row_idx, row) in source.rows().iter().enumerate() {
        let key = mode.key(&row[source_key]);
        if key.is_empty() {
            continue;
        }
        lookup.entry(key).or_insert(row_idx);
    }
    tracing::debug!(keys = lookup.len(), "built merge lookup");

    let matches = target
        .rows()
        .iter()
        .map(|row| {
            let key = mode.key(&row[target_key]);
            if key.is_empty() {
                None
            } else {
                lookup.get(&key).copied()
            }
        })
        .collect::<Vec<_>>();
    stats.matched = matches.iter().flatten().count();

    let added = mergeable
        .iter()
        .map(|(name, idx)| {
            let values = matches
                .iter()
                .map(|m| m.map(|row| source.rows()[row][*idx].clone()).unwrap_or_default())
                .collect();
            (name.clone(), values)
        })
        .collect::<Vec<_>>();
    stats.columns = mergeable.into_iter().map(|(name, _)| name).collect();

    (target.with_columns(added, Placement::Front), stats)
}

/// Canonical form of a published doc URL: no query or fragment, no `/en-us/`
/// locale segment, no trailing `.md` or `/`.
pub fn normalize_url_key(raw: &str) -> String {
    let trimmed = raw.trim();
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    let path = path.replace("/en-us/", "/");
    let path = path.strip_suffix(".md").unwrap_or(&path);
    path.trim_end_matches('/').to_owned()
}

/// Splits a comma-separated column list, dropping blanks.
pub fn parse_columns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_owned)
        .collect()
}
