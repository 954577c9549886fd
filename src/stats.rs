//! Inventory-wide totals: how many documents carry each content feature and
//! each kind of header metadata, plus service and language breakdowns.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Context as _;

use crate::cli::StatsArgs;
use crate::table::Table;

pub const SUMMARY_COLUMNS: [&str; 4] = ["section", "name", "files", "total"];

/// `(label, column counted for files, column summed for the total)`.
const CONTENT_FEATURES: [(&str, &str, Option<&str>); 7] = [
    ("Tabs", "has_tabs", Some("tab_count")),
    ("Images", "image_count", Some("image_count")),
    ("Code blocks", "code_block_count", Some("code_block_count")),
    ("Code references", "code_ref_count", Some("code_ref_count")),
    ("Portal steps", "has_portal_steps", Some("portal_step_count")),
    ("Portal links without cid", "contains_link_no_param", None),
    ("Portal links with cid", "contains_link_with_param", None),
];

const METADATA_FEATURES: [(&str, &str); 6] = [
    ("Authors", "ms.author"),
    ("Topics", "ms.topic"),
    ("Services", "ms.service"),
    ("Descriptions", "description"),
    ("Pivot groups", "pivot_groups"),
    ("Hub-only", "hub_only"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub section: &'static str,
    pub name: String,
    pub files: usize,
    pub total: Option<usize>,
}

impl SummaryRow {
    fn new(section: &'static str, name: impl Into<String>, files: usize, total: Option<usize>) -> Self {
        Self {
            section,
            name: name.into(),
            files,
            total,
        }
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.section.to_owned(),
            self.name.clone(),
            self.files.to_string(),
            self.total.map(|t| t.to_string()).unwrap_or_default(),
        ]
    }
}

pub fn run(args: StatsArgs) -> anyhow::Result<Vec<SummaryRow>> {
    let input_path = PathBuf::from(&args.input);
    let out_path = PathBuf::from(&args.out);

    let table = Table::read_csv(&input_path).context("read stats input")?;
    let rows = summarize_table(&table);
    summary_table(&rows)
        .write_csv(&out_path, args.force)
        .context("write stats output")?;

    log_summary(&rows);
    tracing::info!(rows = rows.len(), out = %out_path.display(), "stats complete");
    Ok(rows)
}

/// Summarizes whichever content and metadata columns the table carries.
pub fn summarize_table(table: &Table) -> Vec<SummaryRow> {
    let mut rows = vec![SummaryRow::new("inventory", "Rows", table.len(), None)];
    if table.column_index("file_found").is_some() {
        rows.push(SummaryRow::new(
            "inventory",
            "Files found",
            count_present(table, "file_found"),
            None,
        ));
    }

    for (label, flag_column, total_column) in CONTENT_FEATURES {
        if table.column_index(flag_column).is_none() {
            continue;
        }
        let total = total_column
            .filter(|c| table.column_index(c).is_some())
            .map(|c| sum_column(table, c));
        rows.push(SummaryRow::new(
            "content",
            label,
            count_present(table, flag_column),
            total,
        ));
    }

    for (label, column) in METADATA_FEATURES {
        if table.column_index(column).is_none() {
            continue;
        }
        let total = (column == "ms.service").then(|| value_counts(table, column).len());
        rows.push(SummaryRow::new(
            "metadata",
            label,
            count_present(table, column),
            total,
        ));
    }

    rows.extend(
        ranked(value_counts(table, "ms.service"))
            .map(|(service, files)| SummaryRow::new("service", service, files, None)),
    );
    rows.extend(
        ranked(language_counts(table))
            .map(|(language, files)| SummaryRow::new("language", language, files, None)),
    );
    rows
}

pub fn summary_table(rows: &[SummaryRow]) -> Table {
    Table::new(
        SUMMARY_COLUMNS.iter().map(|c| (*c).to_owned()).collect(),
        rows.iter().map(SummaryRow::to_cells).collect(),
    )
}

pub fn log_summary(rows: &[SummaryRow]) {
    for row in rows {
        match row.section {
            "service" | "language" => tracing::debug!(
                section = row.section,
                name = %row.name,
                files = row.files,
                "summary"
            ),
            _ => tracing::info!(
                section = row.section,
                name = %row.name,
                files = row.files,
                total = ?row.total,
                "summary"
            ),
        }
    }
}

/// Blank cells, `false` and `0` mean the feature is absent.
fn is_present(cell: &str) -> bool {
    !matches!(cell.trim(), "" | "false" | "0")
}

fn cells<'a>(table: &'a Table, column: &str) -> impl Iterator<Item = &'a str> {
    let idx = table.column_index(column);
    table
        .rows()
        .iter()
        .filter_map(move |row| idx.map(|i| row[i].as_str()))
}

fn count_present(table: &Table, column: &str) -> usize {
    cells(table, column).filter(|c| is_present(c)).count()
}

fn sum_column(table: &Table, column: &str) -> usize {
    cells(table, column)
        .filter_map(|c| c.trim().parse::<usize>().ok())
        .sum()
}

fn value_counts(table: &Table, column: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in cells(table, column).map(str::trim).filter(|c| !c.is_empty()) {
        *counts.entry(value.to_owned()).or_insert(0) += 1;
    }
    counts
}

/// Files per code language; a file listing a language twice counts once.
fn language_counts(table: &Table) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for cell in cells(table, "code_languages") {
        let languages = cell
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<BTreeSet<_>>();
        for language in languages {
            *counts.entry(language.to_owned()).or_insert(0) += 1;
        }
    }
    counts
}

/// Most files first, ties by name.
fn ranked(counts: BTreeMap<String, usize>) -> impl Iterator<Item = (String, usize)> {
    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| (*c).to_owned()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| (*c).to_owned()).collect())
                .collect(),
        )
    }

    fn find<'a>(rows: &'a [SummaryRow], section: &str, name: &str) -> Option<&'a SummaryRow> {
        rows.iter().find(|r| r.section == section && r.name == name)
    }

    #[test]
    fn content_features_count_files_and_instances() {
        let inventory = table(
            &["has_tabs", "tab_count", "image_count", "has_portal_steps", "portal_step_count"],
            &[
                &["true", "3", "2", "true", "4"],
                &["false", "0", "0", "false", "1"],
                &["true", "2", "5", "false", "0"],
            ],
        );

        let rows = summarize_table(&inventory);

        assert_eq!(
            find(&rows, "content", "Tabs").map(|r| (r.files, r.total)),
            Some((2, Some(5)))
        );
        assert_eq!(
            find(&rows, "content", "Images").map(|r| (r.files, r.total)),
            Some((2, Some(7)))
        );
        assert_eq!(
            find(&rows, "content", "Portal steps").map(|r| (r.files, r.total)),
            Some((1, Some(5)))
        );
        assert!(find(&rows, "content", "Code blocks").is_none());
    }

    #[test]
    fn metadata_counts_include_service_breakdown() {
        let inventory = table(
            &["file_found", "ms.author", "ms.service", "hub_only", "description"],
            &[
                &["true", "jdoe", "ai-foundry", "true", "A"],
                &["true", "", "ai-services", "false", ""],
                &["true", "asmith", "ai-foundry", "false", "C"],
                &["false", "", "", "false", ""],
            ],
        );

        let rows = summarize_table(&inventory);

        assert_eq!(rows[0], SummaryRow::new("inventory", "Rows", 4, None));
        assert_eq!(find(&rows, "inventory", "Files found").map(|r| r.files), Some(3));
        assert_eq!(find(&rows, "metadata", "Authors").map(|r| r.files), Some(2));
        assert_eq!(
            find(&rows, "metadata", "Services").map(|r| (r.files, r.total)),
            Some((3, Some(2)))
        );
        assert_eq!(find(&rows, "metadata", "Hub-only").map(|r| r.files), Some(1));
        assert_eq!(find(&rows, "metadata", "Descriptions").map(|r| r.files), Some(2));
        let services = rows
            .iter()
            .filter(|r| r.section == "service")
            .map(|r| (r.name.as_str(), r.files))
            .collect::<Vec<_>>();
        assert_eq!(services, vec![("ai-foundry", 2), ("ai-services", 1)]);
    }

    #[test]
    fn languages_are_ranked_by_files() {
        let inventory = table(
            &["code_languages"],
            &[&["bash, python"], &["python"], &[""], &["csharp, python"]],
        );

        let languages = summarize_table(&inventory)
            .into_iter()
            .filter(|r| r.section == "language")
            .map(|r| (r.name, r.files))
            .collect::<Vec<_>>();

        assert_eq!(
            languages,
            vec![
                ("python".to_owned(), 3),
                ("bash".to_owned(), 1),
                ("csharp".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn summary_table_leaves_missing_totals_blank() {
        let rows = vec![
            SummaryRow::new("content", "Tabs", 2, Some(5)),
            SummaryRow::new("metadata", "Authors", 1, None),
        ];

        let table = summary_table(&rows);

        assert_eq!(table.columns(), SUMMARY_COLUMNS.map(String::from).as_slice());
        assert_eq!(table.cell(0, "total"), Some("5"));
        assert_eq!(table.cell(1, "total"), Some(""));
    }
}
