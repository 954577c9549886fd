use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context as _;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::cli::MetadataArgs;
use crate::document::{DocumentLocator, EmptyReason, Extraction, read_document, split_header};
use crate::formats::{FileMetadata, METADATA_COLUMNS};
use crate::table::{Placement, Table};

const HUB_ONLY_TOKEN: &str = "hub-only";

/// Header keys that already feed a fixed metadata column.
const FIXED_HEADER_KEYS: [&str; 9] = [
    "title",
    "description",
    "author",
    "ms.author",
    "ms.topic",
    "ms.service",
    "ms.date",
    "zone_pivot_groups",
    HUB_ONLY_TOKEN,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetadataStats {
    pub rows: usize,
    pub found: usize,
    pub missing: usize,
    pub not_local: usize,
    pub unreadable: usize,
    pub headers_missing: usize,
    pub headers_malformed: usize,
}

impl MetadataStats {
    fn record(&mut self, extraction: &Extraction<FileMetadata>) {
        self.rows += 1;
        match extraction.reason() {
            None => self.found += 1,
            Some(EmptyReason::FileMissing) => self.missing += 1,
            Some(EmptyReason::NoHref | EmptyReason::ExternalHref) => self.not_local += 1,
            Some(EmptyReason::Unreadable) => self.unreadable += 1,
            Some(EmptyReason::HeaderMissing) => self.headers_missing += 1,
            Some(EmptyReason::HeaderMalformed) => self.headers_malformed += 1,
        }
        if extraction.reason().is_some_and(EmptyReason::file_found) {
            self.found += 1;
        }
    }
}

pub fn run(args: MetadataArgs) -> anyhow::Result<MetadataStats> {
    let input_path = PathBuf::from(&args.input);
    let out_path = PathBuf::from(&args.out);

    let table = Table::read_csv(&input_path).context("read metadata input")?;
    let pivots = match args.pivot_map.as_deref() {
        Some(path) => match PivotMapping::load(Path::new(path)) {
            Ok(mapping) => {
                tracing::debug!(groups = mapping.len(), path, "loaded pivot mapping");
                Some(mapping)
            }
            Err(err) => {
                tracing::warn!(path, err = %format!("{err:#}"), "pivot mapping unavailable; using group ids");
                None
            }
        },
        None => None,
    };

    let extra = HeaderColumns {
        fields: args.fields,
        flags: args.flags,
    };
    let locator = DocumentLocator::new(&args.base_dir);
    let (enriched, stats) = enrich_table(table, &locator, pivots.as_ref(), &extra)?;
    enriched
        .write_csv(&out_path, args.force)
        .context("write metadata output")?;

    tracing::info!(
        rows = stats.rows,
        found = stats.found,
        missing = stats.missing,
        headers_malformed = stats.headers_malformed,
        out = %out_path.display(),
        "metadata complete"
    );
    Ok(stats)
}

/// Appends (or replaces) the metadata columns on a flattened TOC table, followed
/// by the configured extra header columns.
pub fn enrich_table(
    table: Table,
    locator: &DocumentLocator,
    pivots: Option<&PivotMapping>,
    extra: &HeaderColumns,
) -> anyhow::Result<(Table, MetadataStats)> {
    let href_column = href_column(&table)?;
    let mut stats = MetadataStats::default();
    let mut columns = METADATA_COLUMNS
        .iter()
        .map(|c| (*c).to_owned())
        .chain(extra.names())
        .map(|c| (c, Vec::with_capacity(table.len())))
        .collect::<Vec<_>>();

    let total = table.len();
    for row in 0..total {
        if row % 50 == 0 {
            tracing::debug!(row = row + 1, total, "extracting metadata");
        }
        let href = table.cell(row, href_column).unwrap_or_default();
        let toc_dir = source_toc_dir(&table, row);

        let header = extract_header(locator, href, toc_dir.as_deref());
        let extraction = header
            .as_ref()
            .map(|header| metadata_from_header(header, pivots));
        if let Some(reason) = extraction.reason() {
            tracing::debug!(href, reason = reason.as_str(), "no metadata");
        }
        stats.record(&extraction);

        let cells = metadata_or_empty(extraction)
            .to_cells()
            .into_iter()
            .chain(extra.cells(header.found()));
        for ((_, values), cell) in columns.iter_mut().zip(cells) {
            values.push(cell);
        }
    }

    Ok((table.with_columns(columns, Placement::Back), stats))
}

pub(crate) fn href_column(table: &Table) -> anyhow::Result<&'static str> {
    ["href", "filename"]
        .into_iter()
        .find(|c| table.column_index(c).is_some())
        .ok_or_else(|| anyhow::anyhow!("input table has no `href` column"))
}

pub(crate) fn source_toc_dir(table: &Table, row: usize) -> Option<PathBuf> {
    let source = table.cell(row, "source_toc")?.trim();
    if source.is_empty() {
        return None;
    }
    Path::new(source).parent().map(Path::to_path_buf)
}

/// Collapses an extraction into a row value. A missing file yields the all-empty
/// record; a file without usable header is found but otherwise empty.
pub fn metadata_or_empty(extraction: Extraction<FileMetadata>) -> FileMetadata {
    match extraction {
        Extraction::Found(metadata) => metadata,
        Extraction::Empty(reason) if reason.file_found() => FileMetadata::found_without_header(),
        Extraction::Empty(_) => FileMetadata::default(),
    }
}

pub fn extract(
    locator: &DocumentLocator,
    href: &str,
    toc_dir: Option<&Path>,
    pivots: Option<&PivotMapping>,
) -> Extraction<FileMetadata> {
    extract_header(locator, href, toc_dir).map(|header| metadata_from_header(&header, pivots))
}

pub fn extract_header(
    locator: &DocumentLocator,
    href: &str,
    toc_dir: Option<&Path>,
) -> Extraction<Mapping> {
    locator
        .resolve(href, toc_dir)
        .and_then(|path| read_document(&path))
        .and_then(|contents| parse_header(&contents))
}

pub fn parse_header(contents: &str) -> Extraction<Mapping> {
    let header = match split_header(contents).header {
        Ok(header) => header,
        Err(reason) => return Extraction::Empty(reason),
    };
    match serde_yaml::from_str::<Value>(header) {
        Ok(Value::Mapping(mapping)) => Extraction::Found(mapping),
        Ok(_) => Extraction::Empty(EmptyReason::HeaderMalformed),
        Err(err) => {
            tracing::debug!(%err, "header block is not valid yaml");
            Extraction::Empty(EmptyReason::HeaderMalformed)
        }
    }
}

pub fn metadata_from_header(header: &Mapping, pivots: Option<&PivotMapping>) -> FileMetadata {
    let text = |key: &str| header.get(key).map(scalar_text).unwrap_or_default();

    let pivot_groups = header
        .get("zone_pivot_groups")
        .map(pivot_group_ids)
        .unwrap_or_default();
    let resolved_pivots = match pivots {
        Some(mapping) => mapping.resolve(&pivot_groups),
        None => pivot_groups.iter().cloned().collect(),
    };

    FileMetadata {
        file_found: true,
        owner: text("ms.author"),
        topic: text("ms.topic"),
        author: text("author"),
        description: text("description"),
        pivot_groups,
        pivots: resolved_pivots,
        hub_only: hub_only(header),
        doc_title: text("title"),
        service: text("ms.service"),
        date: text("ms.date"),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Sequence(items) => items
            .iter()
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Null | Value::Mapping(_) => String::new(),
    }
}

fn pivot_group_ids(value: &Value) -> BTreeSet<String> {
    let raw = match value {
        Value::Sequence(items) => items.iter().map(scalar_text).collect::<Vec<_>>(),
        other => vec![scalar_text(other)],
    };
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `hub-only: yes` style flags and `ms.custom` entries tagged `hub-only` both count.
fn hub_only(header: &Mapping) -> bool {
    let flagged = header.get(HUB_ONLY_TOKEN).is_some_and(|value| match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => is_truthy(s),
        _ => false,
    });
    flagged
        || header
            .get("ms.custom")
            .is_some_and(|value| mentions(value, HUB_ONLY_TOKEN))
}

/// Whether any string in `value` contains `token`, ignoring ASCII case.
fn mentions(value: &Value, token: &str) -> bool {
    match value {
        Value::String(s) => s
            .to_ascii_lowercase()
            .contains(&token.to_ascii_lowercase()),
        Value::Sequence(items) => items.iter().any(|item| mentions(item, token)),
        Value::Mapping(map) => map.values().any(|item| mentions(item, token)),
        Value::Tagged(tagged) => mentions(&tagged.value, token),
        _ => false,
    }
}

/// A `field:flag` rule. It adds a `flag` column that is true when the header
/// value of `field` mentions `flag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRule {
    pub field: String,
    pub flag: String,
}

impl FromStr for FlagRule {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (field, flag) = raw
            .split_once(':')
            .map(|(field, flag)| (field.trim(), flag.trim()))
            .filter(|(field, flag)| !field.is_empty() && !flag.is_empty())
            .ok_or_else(|| format!("invalid flag rule `{raw}` (expected `field:flag`)"))?;
        Ok(Self {
            field: field.to_owned(),
            flag: flag.to_owned(),
        })
    }
}

/// Parses a comma-separated list of `field:flag` rules.
pub fn parse_flag_rules(raw: &str) -> anyhow::Result<Vec<FlagRule>> {
    raw.split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(|rule| rule.parse().map_err(anyhow::Error::msg))
        .collect()
}

/// Header columns beyond the fixed set: raw values of extra keys, then flag columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderColumns {
    pub fields: Vec<String>,
    pub flags: Vec<FlagRule>,
}

impl HeaderColumns {
    fn fields(&self) -> impl Iterator<Item = &str> {
        let mut seen = BTreeSet::new();
        self.fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty() && !FIXED_HEADER_KEYS.contains(f))
            .filter(move |f| seen.insert(*f))
    }

    fn flags(&self) -> impl Iterator<Item = &FlagRule> {
        let mut seen = BTreeSet::new();
        self.flags.iter().filter(move |rule| {
            let rule = *rule;
            !METADATA_COLUMNS.contains(&rule.flag.as_str()) && seen.insert(rule.flag.as_str())
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.fields()
            .map(str::to_owned)
            .chain(self.flags().map(|rule| rule.flag.clone()))
            .collect()
    }

    /// Cells in [`HeaderColumns::names`] order. Without a header every field is
    /// empty and every flag is false.
    pub fn cells(&self, header: Option<&Mapping>) -> Vec<String> {
        let fields = self.fields().map(|key| {
            header
                .and_then(|h| h.get(key))
                .map(scalar_text)
                .unwrap_or_default()
        });
        let flags = self.flags().map(|rule| {
            header
                .and_then(|h| h.get(rule.field.as_str()))
                .is_some_and(|value| mentions(value, &rule.flag))
                .to_string()
        });
        fields.chain(flags).collect()
    }
}

pub fn is_truthy(token: &str) -> bool {
    matches!(
        token.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "on"
    )
}

#[derive(Debug, Deserialize)]
struct PivotFile {
    #[serde(default)]
    groups: Vec<PivotGroup>,
}

#[derive(Debug, Deserialize)]
struct PivotGroup {
    id: String,
    #[serde(default)]
    pivots: Option<Vec<PivotOption>>,
}

#[derive(Debug, Deserialize)]
struct PivotOption {
    id: String,
}

/// Zone-pivot group id → the individual pivot ids it offers.
#[derive(Debug, Clone, Default)]
pub struct PivotMapping {
    groups: HashMap<String, Vec<String>>,
}

impl PivotMapping {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read pivot mapping: {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("parse pivot mapping: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let file: PivotFile = serde_yaml::from_str(yaml).context("deserialize pivot groups")?;
        let groups = file
            .groups
            .into_iter()
            .filter_map(|g| {
                let pivots = g.pivots?.into_iter().map(|p| p.id).collect::<Vec<_>>();
                Some((g.id, pivots))
            })
            .collect();
        Ok(Self { groups })
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Unknown groups, and groups listing no pivots, resolve to their own id.
    pub fn resolve(&self, group_ids: &BTreeSet<String>) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut resolved = Vec::new();
        for group in group_ids {
            let pivots = match self.groups.get(group) {
                Some(pivots) if !pivots.is_empty() => pivots.clone(),
                _ => vec![group.clone()],
            };
            for pivot in pivots {
                if seen.insert(pivot.clone()) {
                    resolved.push(pivot);
                }
            }
        }
        resolved
    }
}
