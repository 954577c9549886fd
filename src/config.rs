//! Run configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! environment variables, then command-line flags. The resolved [`Config`] is
//! built once and handed to every stage.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::cli::RunArgs;
use crate::merge::parse_columns;
use crate::metadata::{FlagRule, is_truthy, parse_flag_rules};

pub const DEFAULT_TOC_OUTPUT: &str = "toc.csv";
pub const DEFAULT_METADATA_OUTPUT: &str = "toc_with_metadata.csv";
pub const DEFAULT_CONTENT_OUTPUT: &str = "toc_with_content.csv";
pub const DEFAULT_SUMMARY_OUTPUT: &str = "toc_summary.csv";
pub const DEFAULT_MERGE_KEY: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub toc_file: Option<PathBuf>,
    pub url_path: Option<String>,
    pub base_dir: Option<PathBuf>,
    pub pivot_map_file: Option<PathBuf>,
    /// Header keys copied into extra metadata columns.
    pub metadata_fields: Vec<String>,
    pub metadata_flags: Vec<FlagRule>,
    pub output_dir: PathBuf,
    pub toc_output: String,
    pub metadata_output: String,
    pub content_output: String,
    pub summary_output: String,
    pub merge: MergeConfig,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeConfig {
    /// CSV merged into the final output. No file, no merge.
    pub file: Option<PathBuf>,
    pub key_column: String,
    pub columns: Vec<String>,
    pub normalize_urls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            toc_file: None,
            url_path: None,
            base_dir: None,
            pivot_map_file: None,
            metadata_fields: Vec::new(),
            metadata_flags: Vec::new(),
            output_dir: PathBuf::from("."),
            toc_output: DEFAULT_TOC_OUTPUT.to_owned(),
            metadata_output: DEFAULT_METADATA_OUTPUT.to_owned(),
            content_output: DEFAULT_CONTENT_OUTPUT.to_owned(),
            summary_output: DEFAULT_SUMMARY_OUTPUT.to_owned(),
            merge: MergeConfig::default(),
            debug: false,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            file: None,
            key_column: DEFAULT_MERGE_KEY.to_owned(),
            columns: Vec::new(),
            normalize_urls: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    toc_file: Option<PathBuf>,
    url_path: Option<String>,
    base_dir: Option<PathBuf>,
    pivot_map_file: Option<PathBuf>,
    metadata_fields: Option<Vec<String>>,
    metadata_flags: Option<Vec<String>>,
    output_dir: Option<PathBuf>,
    toc_output: Option<String>,
    metadata_output: Option<String>,
    content_output: Option<String>,
    summary_output: Option<String>,
    debug: Option<bool>,
    merge: Option<MergeFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MergeFile {
    file: Option<PathBuf>,
    key_column: Option<String>,
    columns: Option<Vec<String>>,
    normalize_urls: Option<bool>,
}

impl Config {
    /// Resolves the configuration for `run`: YAML file, process environment, flags.
    pub fn for_run(args: &RunArgs) -> anyhow::Result<Self> {
        let mut config = match args.config.as_deref() {
            Some(path) => Self::from_yaml_file(Path::new(path))?,
            None => Self::default(),
        };
        config
            .apply_env(|key| std::env::var(key).ok())
            .context("read environment")?;
        config.apply_args(args);
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("parse config: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(yaml).context("deserialize config")?;
        let mut config = Self::default();

        set(&mut config.toc_file, file.toc_file);
        set(&mut config.url_path, file.url_path);
        set(&mut config.base_dir, file.base_dir);
        set(&mut config.pivot_map_file, file.pivot_map_file);
        if let Some(fields) = file.metadata_fields {
            config.metadata_fields = fields;
        }
        if let Some(flags) = file.metadata_flags {
            config.metadata_flags = flags
                .iter()
                .map(|rule| rule.parse::<FlagRule>().map_err(anyhow::Error::msg))
                .collect::<anyhow::Result<Vec<_>>>()
                .context("metadata_flags")?;
        }
        if let Some(dir) = file.output_dir {
            config.output_dir = dir;
        }
        if let Some(name) = file.toc_output {
            config.toc_output = name;
        }
        if let Some(name) = file.metadata_output {
            config.metadata_output = name;
        }
        if let Some(name) = file.content_output {
            config.content_output = name;
        }
        if let Some(name) = file.summary_output {
            config.summary_output = name;
        }
        if let Some(debug) = file.debug {
            config.debug = debug;
        }
        if let Some(merge) = file.merge {
            set(&mut config.merge.file, merge.file);
            if let Some(key) = merge.key_column {
                config.merge.key_column = key;
            }
            if let Some(columns) = merge.columns {
                config.merge.columns = columns;
            }
            if let Some(normalize) = merge.normalize_urls {
                config.merge.normalize_urls = normalize;
            }
        }
        Ok(config)
    }

    /// Applies environment overrides. Empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        set(&mut self.toc_file, var("TOC_FILE").map(PathBuf::from));
        set(&mut self.url_path, var("URL_PATH"));
        set(&mut self.base_dir, var("BASE_PATH").map(PathBuf::from));
        set(&mut self.pivot_map_file, var("PIVOT_MAP_FILE").map(PathBuf::from));
        if let Some(fields) = var("METADATA_FIELDS") {
            self.metadata_fields = parse_columns(&fields);
        }
        if let Some(flags) = var("METADATA_FLAGS") {
            self.metadata_flags = parse_flag_rules(&flags).context("METADATA_FLAGS")?;
        }
        if let Some(dir) = var("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(name) = var("OUTPUT_FILE") {
            self.toc_output = name;
        }
        if let Some(name) = var("METADATA_OUTPUT_FILE") {
            self.metadata_output = name;
        }
        if let Some(name) = var("CONTENT_OUTPUT_FILE") {
            self.content_output = name;
        }
        if let Some(name) = var("SUMMARY_OUTPUT_FILE") {
            self.summary_output = name;
        }
        if let Some(debug) = var("DEBUG") {
            self.debug = is_truthy(&debug);
        }
        set(&mut self.merge.file, var("MERGE_FILE").map(PathBuf::from));
        if let Some(key) = var("MERGE_KEY") {
            self.merge.key_column = key;
        }
        if let Some(columns) = var("MERGE_COLUMNS") {
            self.merge.columns = parse_columns(&columns);
        }
        if let Some(normalize) = var("MERGE_NORMALIZE_URLS") {
            self.merge.normalize_urls = is_truthy(&normalize);
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &RunArgs) {
        set(&mut self.toc_file, args.toc.as_ref().map(PathBuf::from));
        set(&mut self.url_path, args.url_path.clone());
        set(&mut self.base_dir, args.base_dir.as_ref().map(PathBuf::from));
        if let Some(dir) = &args.output_dir {
            self.output_dir = PathBuf::from(dir);
        }
    }

    pub fn toc_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.toc_output)
    }

    pub fn metadata_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.metadata_output)
    }

    pub fn content_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.content_output)
    }

    pub fn summary_output_path(&self) -> PathBuf {
        self.output_dir.join(&self.summary_output)
    }

    pub fn require_toc_file(&self) -> anyhow::Result<&Path> {
        self.toc_file
            .as_deref()
            .context("TOC file is not configured (set TOC_FILE or pass --toc)")
    }

    pub fn require_url_path(&self) -> anyhow::Result<&str> {
        self.url_path
            .as_deref()
            .context("URL path is not configured (set URL_PATH or pass --url-path)")
    }

    pub fn require_base_dir(&self) -> anyhow::Result<&Path> {
        self.base_dir
            .as_deref()
            .context("base directory is not configured (set BASE_PATH or pass --base-dir)")
    }
}

fn set<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

/// `DEBUG` from the process environment, for commands that take no config file.
pub fn env_debug() -> bool {
    std::env::var("DEBUG").is_ok_and(|v| is_truthy(&v))
}
