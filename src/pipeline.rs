use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::{ContentArgs, FlattenArgs, MetadataArgs, RunArgs};
use crate::config::Config;
use crate::content::ContentStats;
use crate::merge::{KeyMode, MergeStats};
use crate::metadata::MetadataStats;
use crate::stats::SummaryRow;
use crate::table::Table;
use crate::toc::FlattenStats;

/// Per-stage results of one `run`. A stage that was skipped leaves `None`.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub flatten: Option<FlattenStats>,
    pub metadata: Option<MetadataStats>,
    pub content: Option<ContentStats>,
    pub merge: Option<MergeStats>,
    pub output: PathBuf,
    /// Per-feature totals over the final output.
    pub summary: Vec<SummaryRow>,
}

impl RunReport {
    fn log(&self) {
        let flatten = self.flatten.unwrap_or_default();
        let metadata = self.metadata.unwrap_or_default();
        let content = self.content.unwrap_or_default();
        let merged = self.merge.as_ref().map_or(0, |m| m.matched);
        tracing::info!(
            entries = flatten.entries,
            unresolved = flatten.unresolved(),
            cycles = flatten.cycles,
            files_found = metadata.found,
            files_missing = metadata.missing,
            headers_missing = metadata.headers_missing,
            headers_malformed = metadata.headers_malformed,
            analyzed = content.analyzed,
            merged,
            output = %self.output.display(),
            "run complete"
        );
    }
}

pub fn run(config: &Config, args: &RunArgs) -> anyhow::Result<RunReport> {
    let toc_out = config.toc_output_path();
    let metadata_out = config.metadata_output_path();
    let content_out = config.content_output_path();
    let mut report = RunReport::default();

    if args.skip_build {
        require_existing(&toc_out, "--skip-build")?;
        tracing::info!(toc = %toc_out.display(), "run: flatten skipped");
    } else {
        tracing::info!("run: flatten");
        let stats = crate::toc::run(FlattenArgs {
            toc: path_arg(config.require_toc_file()?),
            url_path: config.require_url_path()?.to_owned(),
            base_dir: config.base_dir.as_deref().map(path_arg),
            out: path_arg(&toc_out),
            skip_headers: false,
            force: args.force,
        })
        .context("flatten")?;
        report.flatten = Some(stats);
    }
    report.output = toc_out.clone();

    if args.skip_metadata {
        if !args.skip_content {
            require_existing(&metadata_out, "--skip-metadata")?;
            report.output = metadata_out.clone();
        }
        tracing::info!("run: metadata skipped");
    } else {
        tracing::info!("run: metadata");
        let stats = crate::metadata::run(MetadataArgs {
            input: path_arg(&toc_out),
            base_dir: path_arg(config.require_base_dir()?),
            out: path_arg(&metadata_out),
            pivot_map: config.pivot_map_file.as_deref().map(path_arg),
            fields: config.metadata_fields.clone(),
            flags: config.metadata_flags.clone(),
            force: args.force,
        })
        .context("metadata")?;
        report.metadata = Some(stats);
        report.output = metadata_out.clone();
    }

    if args.skip_content {
        tracing::info!("run: content skipped");
    } else {
        tracing::info!("run: content");
        let stats = crate::content::run(ContentArgs {
            input: path_arg(&report.output),
            base_dir: path_arg(config.require_base_dir()?),
            out: path_arg(&content_out),
            force: args.force,
        })
        .context("content")?;
        report.content = Some(stats);
        report.output = content_out;
    }

    match (&config.merge.file, args.skip_merge) {
        (Some(source), false) => {
            tracing::info!(source = %source.display(), "run: merge");
            report.merge = Some(merge_into(&report.output, source, config).context("merge")?);
        }
        (Some(_), true) => tracing::info!("run: merge skipped"),
        (None, _) => tracing::debug!("no merge source configured"),
    }

    report.summary = write_summary(&report.output, &config.summary_output_path())
        .context("summary")?;
    report.log();
    Ok(report)
}

/// Merges the configured source into `output` in place. Merging is idempotent,
/// so re-running over an already merged file is safe.
fn merge_into(output: &Path, source: &Path, config: &Config) -> anyhow::Result<MergeStats> {
    let target = Table::read_csv(output).context("read merge target")?;
    let mode = if config.merge.normalize_urls {
        KeyMode::Url
    } else {
        KeyMode::Exact
    };
    let (merged, stats) = crate::merge::merge_from_path(
        target,
        source,
        &config.merge.key_column,
        &config.merge.columns,
        mode,
    );
    if stats.applied() {
        merged
            .write_csv(output, true)
            .context("write merged output")?;
    }
    Ok(stats)
}

/// Regenerated on every run from the final output, so it is always overwritten.
fn write_summary(output: &Path, summary_out: &Path) -> anyhow::Result<Vec<SummaryRow>> {
    let table = Table::read_csv(output).context("read final output")?;
    let rows = crate::stats::summarize_table(&table);
    crate::stats::summary_table(&rows)
        .write_csv(summary_out, true)
        .context("write summary")?;
    crate::stats::log_summary(&rows);
    Ok(rows)
}

fn require_existing(path: &Path, flag: &str) -> anyhow::Result<()> {
    if !path.is_file() {
        anyhow::bail!("{flag} requires an existing {}", path.display());
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
