use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::ContentArgs;
use crate::document::{DocumentLocator, EmptyReason, Extraction, read_document, split_header};
use crate::formats::{CONTENT_COLUMNS, ContentProfile};
use crate::metadata::{href_column, source_toc_dir};
use crate::scan::{Scanner, Token};
use crate::table::{Placement, Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub rows: usize,
    pub analyzed: usize,
    pub missing: usize,
    pub not_local: usize,
    pub unreadable: usize,
}

impl ContentStats {
    fn record(&mut self, extraction: &Extraction<ContentProfile>) {
        self.rows += 1;
        match extraction.reason() {
            None => self.analyzed += 1,
            Some(EmptyReason::NoHref | EmptyReason::ExternalHref) => self.not_local += 1,
            Some(EmptyReason::FileMissing) => self.missing += 1,
            Some(_) => self.unreadable += 1,
        }
    }
}

pub fn run(args: ContentArgs) -> anyhow::Result<ContentStats> {
    let input_path = PathBuf::from(&args.input);
    let out_path = PathBuf::from(&args.out);

    let table = Table::read_csv(&input_path).context("read content input")?;
    let locator = DocumentLocator::new(&args.base_dir);
    let (enriched, stats) = enrich_table(table, &locator)?;
    enriched
        .write_csv(&out_path, args.force)
        .context("write content output")?;

    tracing::info!(
        rows = stats.rows,
        analyzed = stats.analyzed,
        missing = stats.missing,
        out = %out_path.display(),
        "content analysis complete"
    );
    Ok(stats)
}

pub fn enrich_table(table: Table, locator: &DocumentLocator) -> anyhow::Result<(Table, ContentStats)> {
    let href_column = href_column(&table)?;
    let mut stats = ContentStats::default();
    let mut columns = CONTENT_COLUMNS
        .iter()
        .map(|c| ((*c).to_owned(), Vec::with_capacity(table.len())))
        .collect::<Vec<_>>();

    let total = table.len();
    for row in 0..total {
        if row % 50 == 0 {
            tracing::debug!(row = row + 1, total, "analyzing content");
        }
        let href = table.cell(row, href_column).unwrap_or_default();
        let toc_dir = source_toc_dir(&table, row);

        let extraction = analyze_path(locator, href, toc_dir.as_deref());
        stats.record(&extraction);

        let cells = extraction.unwrap_or_empty().to_cells();
        for ((_, values), cell) in columns.iter_mut().zip(cells) {
            values.push(cell);
        }
    }

    Ok((table.with_columns(columns, Placement::Back), stats))
}

pub fn analyze_path(
    locator: &DocumentLocator,
    href: &str,
    toc_dir: Option<&Path>,
) -> Extraction<ContentProfile> {
    locator
        .resolve(href, toc_dir)
        .and_then(|path| read_document(&path))
        .map(|contents| analyze_document(&contents))
}

/// Profiles a whole document, skipping its header block when present.
pub fn analyze_document(contents: &str) -> ContentProfile {
    analyze(split_header(contents).body)
}

pub fn analyze(body: &str) -> ContentProfile {
    let mut profile = ContentProfile::default();
    let mut tab_group_open = false;
    let mut first_step = None;

    for token in Scanner::new(body) {
        match token {
            Token::CodeFenceOpen { language } => {
                profile.code_block_count += 1;
                if let Some(language) = language {
                    profile.code_languages.insert(language);
                }
            }
            Token::CodeFenceClose => {}
            Token::ImageRef => profile.image_count += 1,
            Token::TabMarker { id } => {
                profile.tab_count += 1;
                profile.tab_ids.insert(id);
                tab_group_open = true;
            }
            Token::TabGroupClose => {
                profile.tab_group_count += 1;
                tab_group_open = false;
            }
            Token::StepMarker { number } => {
                profile.portal_step_count += 1;
                first_step.get_or_insert(number);
            }
            Token::CodeRef => profile.code_ref_count += 1,
            Token::PortalLink { tracked: true } => profile.portal_link_tracked = true,
            Token::PortalLink { tracked: false } => profile.portal_link_untracked = true,
        }
    }

    if tab_group_open {
        profile.tab_group_count += 1;
    }
    profile.has_tabs = profile.tab_count > 0;
    profile.has_portal_steps = first_step == Some(1) && profile.portal_step_count >= 2;
    profile
}
