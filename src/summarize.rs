use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context as _;
use chrono::Utc;

use crate::cli::{SummarizeArgs, SummarizeEngine};
use crate::document::{DocumentLocator, Extraction, read_document, split_header};
use crate::formats::SummaryRecord;
use crate::merge::KeyMode;
use crate::metadata::{href_column, source_toc_dir};
use crate::openai::ResponsesClient;
use crate::table::Table;

pub const SUMMARY_COLUMN: &str = "summary";
const NOOP_MAX_CHARS: usize = 200;
const RETRY_BACKOFF_MS: u64 = 250;

const INSTRUCTIONS: &str = "You summarize technical documentation articles.\n\
Write one or two short Markdown bullet points (\"- \") describing what the article helps the reader do.\n\
Do not add headings, commentary, or text outside the bullets.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummarizeStats {
    pub rows: usize,
    pub summarized: usize,
    /// Keys already present in the checkpoint.
    pub resumed: usize,
    /// Rows without a key or a readable, non-empty document.
    pub skipped: usize,
    pub failed: usize,
}

pub enum Summarizer {
    Noop,
    Command { program: String, args: Vec<String> },
    Openai(ResponsesClient),
}

impl Summarizer {
    pub fn from_args(args: &SummarizeArgs) -> anyhow::Result<Self> {
        match args.engine {
            SummarizeEngine::Noop => Ok(Self::Noop),
            SummarizeEngine::Command => {
                let Some(program) = args.command.clone() else {
                    anyhow::bail!("missing --command (required when --engine=command)");
                };
                Ok(Self::Command {
                    program,
                    args: args.command_args.clone(),
                })
            }
            SummarizeEngine::Openai => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
                let client = ResponsesClient::new(
                    &args.openai_base_url,
                    api_key,
                    args.openai_model.clone(),
                )?;
                Ok(Self::Openai(client))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Command { .. } => "command",
            Self::Openai(_) => "openai",
        }
    }

    pub fn summarize(&self, key: &str, body: &str) -> anyhow::Result<String> {
        let summary = match self {
            Self::Noop => first_paragraph(body, NOOP_MAX_CHARS),
            Self::Command { program, args } => summarize_via_command(program, args, key, body)?,
            Self::Openai(client) => client.complete(INSTRUCTIONS, body)?,
        };
        let summary = summary.trim().to_owned();
        if summary.is_empty() {
            anyhow::bail!("summary is empty");
        }
        Ok(summary)
    }
}

pub fn run(args: SummarizeArgs) -> anyhow::Result<SummarizeStats> {
    let input_path = PathBuf::from(&args.input);
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() && !args.force {
        anyhow::bail!("output already exists: {}", out_path.display());
    }

    let table = Table::read_csv(&input_path).context("read summarize input")?;
    if table.column_index(&args.key).is_none() {
        anyhow::bail!("input table has no `{}` column", args.key);
    }
    let href_column = href_column(&table)?;

    let summarizer = Summarizer::from_args(&args)?;
    let checkpoint = args.checkpoint.as_deref().map(Path::new);
    let mut summaries = match checkpoint {
        Some(path) => load_checkpoint(path)?,
        None => HashMap::new(),
    };
    tracing::info!(
        engine = summarizer.name(),
        rows = table.len(),
        resumed = summaries.len(),
        "summarize"
    );

    let locator = DocumentLocator::new(&args.base_dir);
    let delay = Duration::from_millis(args.delay_ms);
    let mut stats = SummarizeStats {
        rows: table.len(),
        ..SummarizeStats::default()
    };
    let mut calls = 0usize;

    for row in 0..table.len() {
        let key = table.cell(row, &args.key).unwrap_or_default().trim();
        if key.is_empty() {
            stats.skipped += 1;
            continue;
        }
        if summaries.contains_key(key) {
            stats.resumed += 1;
            continue;
        }

        let href = table.cell(row, href_column).unwrap_or_default();
        let toc_dir = source_toc_dir(&table, row);
        let body = match locator
            .resolve(href, toc_dir.as_deref())
            .and_then(|path| read_document(&path))
        {
            Extraction::Found(contents) => split_header(&contents).body.trim().to_owned(),
            Extraction::Empty(reason) => {
                tracing::debug!(key, reason = reason.as_str(), "no document to summarize");
                stats.skipped += 1;
                continue;
            }
        };
        if body.is_empty() {
            stats.skipped += 1;
            continue;
        }

        if calls > 0 && !delay.is_zero() {
            std::thread::sleep(delay);
        }
        calls += 1;

        match summarize_with_retries(&summarizer, key, &body, args.retries) {
            Ok(summary) => {
                let record = SummaryRecord {
                    key: key.to_owned(),
                    summary,
                    summarized_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                };
                if let Some(path) = checkpoint {
                    append_checkpoint(path, &record)?;
                }
                tracing::debug!(key, "summarized");
                summaries.insert(record.key, record.summary);
                stats.summarized += 1;
            }
            Err(err) => {
                tracing::warn!(key, err = %format!("{err:#}"), "summarize failed; skipping");
                stats.failed += 1;
            }
        }
    }

    let merged = merge_summaries(table, &args.key, &summaries);
    merged
        .write_csv(&out_path, args.force)
        .context("write summarize output")?;

    tracing::info!(
        summarized = stats.summarized,
        resumed = stats.resumed,
        skipped = stats.skipped,
        failed = stats.failed,
        out = %out_path.display(),
        "summarize complete"
    );
    Ok(stats)
}

fn summarize_with_retries(
    summarizer: &Summarizer,
    key: &str,
    body: &str,
    retries: usize,
) -> anyhow::Result<String> {
    let attempts = retries.saturating_add(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match summarizer.summarize(key, body) {
            Ok(summary) => return Ok(summary),
            Err(err) if attempt < attempts => {
                tracing::warn!(
                    engine = summarizer.name(),
                    key,
                    attempt,
                    attempts,
                    err = %format!("{err:#}"),
                    "summarize attempt failed; retrying"
                );
                std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64));
            }
            Err(err) => {
                return Err(err.context(format!("summarize (attempt {attempt}/{attempts})")));
            }
        }
    }
}

fn summarize_via_command(
    program: &str,
    args: &[String],
    key: &str,
    body: &str,
) -> anyhow::Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .env("TOCINVENTORY_SUMMARY_KEY", key)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawn summarizer command: {program}"))?;

    {
        let mut stdin = child.stdin.take().context("open summarizer stdin")?;
        stdin
            .write_all(body.as_bytes())
            .context("write summarizer stdin")?;
    }

    let output = child.wait_with_output().context("wait summarizer process")?;
    if !output.status.success() {
        anyhow::bail!("summarizer command failed: {program} ({})", output.status);
    }
    String::from_utf8(output.stdout).context("summarizer stdout is not valid UTF-8")
}

/// First prose paragraph of a Markdown body, flattened to one line and capped
/// at `max_chars` characters. Headings, fences and directive lines are skipped.
pub fn first_paragraph(body: &str, max_chars: usize) -> String {
    let mut paragraph = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed.is_empty() {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        if trimmed.starts_with('#') || trimmed.starts_with(":::") || trimmed.starts_with('<') {
            if paragraph.is_empty() {
                continue;
            }
            break;
        }
        paragraph.push(trimmed);
    }

    let joined = paragraph.join(" ");
    match joined.char_indices().nth(max_chars) {
        Some((cut, _)) => joined[..cut].trim_end().to_owned(),
        None => joined,
    }
}

pub fn load_checkpoint(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    let file = match OpenOptions::new().read(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("open checkpoint: {}", path.display()));
        }
    };

    let mut summaries = HashMap::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("read checkpoint: {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SummaryRecord>(&line) {
            Ok(record) => {
                summaries.entry(record.key).or_insert(record.summary);
            }
            Err(err) => {
                tracing::warn!(line = idx + 1, %err, "skipping invalid checkpoint line");
            }
        }
    }
    Ok(summaries)
}

fn append_checkpoint(path: &Path, record: &SummaryRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create checkpoint dir: {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open checkpoint: {}", path.display()))?;
    let line = serde_json::to_string(record).context("serialize checkpoint record")?;
    writeln!(file, "{line}").with_context(|| format!("append checkpoint: {}", path.display()))
}

/// Joins summaries onto the table by `key`, as a leading `summary` column.
fn merge_summaries(table: Table, key: &str, summaries: &HashMap<String, String>) -> Table {
    let mut rows = summaries
        .iter()
        .map(|(k, s)| vec![k.clone(), s.clone()])
        .collect::<Vec<_>>();
    rows.sort();
    let source = Table::new(vec![key.to_owned(), SUMMARY_COLUMN.to_owned()], rows);
    let (merged, _) = crate::merge::merge(
        table,
        &source,
        key,
        &[SUMMARY_COLUMN.to_owned()],
        KeyMode::Exact,
    );
    merged
}
