use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::metadata::FlagRule;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level (same as `DEBUG=1`; `RUST_LOG` still wins).
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Flatten a (possibly nested) `toc.yml` into a CSV inventory.
    Flatten(FlattenArgs),
    /// Add document header metadata columns to an inventory.
    Metadata(MetadataArgs),
    /// Add content-shape columns (tabs, images, code, steps) to an inventory.
    Content(ContentArgs),
    /// Left-join columns from another CSV onto an inventory.
    Merge(MergeArgs),
    /// Run flatten, metadata, content and the configured merge in sequence.
    Run(RunArgs),
    /// Summarize each document and merge the summaries into an inventory.
    Summarize(SummarizeArgs),
    /// Write per-feature totals (content, metadata, services, languages) for an inventory.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct FlattenArgs {
    /// Root TOC file (`toc.yml`).
    #[arg(long)]
    pub toc: String,

    /// Published URL prefix that relative hrefs resolve against.
    #[arg(long)]
    pub url_path: String,

    /// Content root for `/`-rooted nested TOC references (defaults to the root TOC's directory).
    #[arg(long)]
    pub base_dir: Option<String>,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// Drop grouping entries that have no href.
    #[arg(long, default_value_t = false)]
    pub skip_headers: bool,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct MetadataArgs {
    /// Inventory CSV (created by `flatten`).
    #[arg(long)]
    pub input: String,

    /// Content root that hrefs resolve against.
    #[arg(long)]
    pub base_dir: String,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// `zone-pivot-groups.yml` used to expand pivot groups to pivot ids.
    #[arg(long)]
    pub pivot_map: Option<String>,

    /// Extra header keys copied into same-named columns (comma-separated or repeated).
    #[arg(long = "field", value_delimiter = ',')]
    pub fields: Vec<String>,

    /// `field:flag` rules; each adds a `flag` column that is true when the
    /// header value of `field` mentions `flag`.
    #[arg(long = "flag", value_delimiter = ',')]
    pub flags: Vec<FlagRule>,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ContentArgs {
    /// Inventory CSV (created by `flatten` or `metadata`).
    #[arg(long)]
    pub input: String,

    /// Content root that hrefs resolve against.
    #[arg(long)]
    pub base_dir: String,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// CSV that receives the merged columns.
    #[arg(long)]
    pub target: String,

    /// CSV the merged columns are read from.
    #[arg(long)]
    pub source: String,

    /// Column present in both files that rows are matched on.
    #[arg(long, default_value = "url")]
    pub key: String,

    /// Columns to copy from the source (comma-separated or repeated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub columns: Vec<String>,

    /// Compare keys as URLs (ignore query, locale segment, `.md`, trailing `/`).
    #[arg(long, default_value_t = false)]
    pub normalize_urls: bool,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// YAML config file (values are overridden by env vars and flags).
    #[arg(long)]
    pub config: Option<String>,

    /// Root TOC file (overrides `TOC_FILE`).
    #[arg(long)]
    pub toc: Option<String>,

    /// Published URL prefix (overrides `URL_PATH`).
    #[arg(long)]
    pub url_path: Option<String>,

    /// Content root (overrides `BASE_PATH`).
    #[arg(long)]
    pub base_dir: Option<String>,

    /// Directory the stage outputs are written to (overrides `OUTPUT_DIR`).
    #[arg(long)]
    pub output_dir: Option<String>,

    /// Reuse an existing TOC inventory instead of flattening.
    #[arg(long, default_value_t = false)]
    pub skip_build: bool,

    /// Reuse an existing metadata inventory.
    #[arg(long, default_value_t = false)]
    pub skip_metadata: bool,

    /// Skip content analysis.
    #[arg(long, default_value_t = false)]
    pub skip_content: bool,

    /// Skip the configured merge.
    #[arg(long, default_value_t = false)]
    pub skip_merge: bool,

    /// Overwrite output files if they exist.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SummarizeEngine {
    /// First paragraph of the document, no external calls.
    Noop,
    /// Pipe the document to `--command` and read the summary from stdout.
    Command,
    /// OpenAI Responses API (`OPENAI_API_KEY`).
    Openai,
}

#[derive(Debug, Args)]
pub struct SummarizeArgs {
    /// Inventory CSV to summarize.
    #[arg(long)]
    pub input: String,

    /// Content root that hrefs resolve against.
    #[arg(long)]
    pub base_dir: String,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// JSONL checkpoint; existing entries are reused and new ones appended.
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Column that identifies rows (summaries are merged on it).
    #[arg(long, default_value = "url")]
    pub key: String,

    #[arg(long, value_enum, default_value_t = SummarizeEngine::Noop)]
    pub engine: SummarizeEngine,

    /// Program run by `--engine command`.
    #[arg(long)]
    pub command: Option<String>,

    /// Arguments passed to `--command`.
    #[arg(long = "command-arg", allow_hyphen_values = true)]
    pub command_args: Vec<String>,

    #[arg(long, default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Extra attempts per document after a failed call.
    #[arg(long, default_value_t = 2)]
    pub retries: usize,

    /// Delay between documents.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    /// Inventory CSV (usually the final `run` output).
    #[arg(long)]
    pub input: String,

    /// Output CSV path.
    #[arg(long)]
    pub out: String,

    /// Overwrite the output file if it exists.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
