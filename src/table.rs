use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::Context as _;

/// Where replaced or added columns land in [`Table::with_columns`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Front,
    Back,
}

/// An ordered set of named string columns. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| r[idx].as_str())
    }

    /// Returns a new table where each named column replaces any same-named column
    /// and is placed at the front or back, keeping the given order.
    pub fn with_columns(self, added: Vec<(String, Vec<String>)>, placement: Placement) -> Self {
        let drop = self
            .columns
            .iter()
            .map(|c| added.iter().any(|(name, _)| name == c))
            .collect::<Vec<_>>();

        let kept_columns = self
            .columns
            .into_iter()
            .zip(&drop)
            .filter(|(_, dropped)| !**dropped)
            .map(|(c, _)| c);
        let added_names = added.iter().map(|(name, _)| name.clone());
        let columns = match placement {
            Placement::Front => added_names.chain(kept_columns).collect(),
            Placement::Back => kept_columns.chain(added_names).collect(),
        };

        let rows = self
            .rows
            .into_iter()
            .enumerate()
            .map(|(row_idx, row)| {
                let kept = row
                    .into_iter()
                    .zip(&drop)
                    .filter(|(_, dropped)| !**dropped)
                    .map(|(cell, _)| cell);
                let new = added
                    .iter()
                    .map(|(_, values)| values.get(row_idx).cloned().unwrap_or_default());
                match placement {
                    Placement::Front => new.chain(kept).collect(),
                    Placement::Back => kept.chain(new).collect(),
                }
            })
            .collect();

        Self::new(columns, rows)
    }

    pub fn read_csv(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("open table: {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("read table: {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let columns = rdr
            .headers()
            .context("read csv header")?
            .iter()
            .map(|h| h.trim().to_owned())
            .collect::<Vec<_>>();

        let width = columns.len();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.context("read csv record")?;
            // Blank cells past the header width are dropped; anything else is an error.
            if record.iter().skip(width).any(|cell| !cell.trim().is_empty()) {
                let line = record.position().map_or(0, |p| p.line());
                anyhow::bail!(
                    "csv record on line {line} has {} cells but the header has {width}",
                    record.len()
                );
            }
            rows.push(record.iter().take(width).map(str::to_owned).collect());
        }
        Ok(Self::new(columns, rows))
    }

    pub fn write_csv(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        if path.exists() && !force {
            anyhow::bail!("output already exists: {}", path.display());
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir: {}", parent.display()))?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if force {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options
            .open(path)
            .with_context(|| format!("open output: {}", path.display()))?;
        self.to_writer(file)
            .with_context(|| format!("write table: {}", path.display()))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(writer);
        wtr.write_record(&self.columns).context("write csv header")?;
        for row in &self.rows {
            wtr.write_record(row).context("write csv record")?;
        }
        wtr.flush().context("flush csv")?;
        Ok(())
    }
}
