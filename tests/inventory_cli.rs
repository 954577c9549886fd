use std::fs;
use std::path::Path;

use predicates::prelude::*;
use tocinventory::table::Table;

const BASE_URL: &str = "https://learn.example.com/azure/agents";

fn write(root: &Path, name: &str, contents: &str) -> anyhow::Result<()> {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// A root TOC with one article and one nested TOC, plus the documents they point at.
fn write_docset(root: &Path) -> anyhow::Result<()> {
    write(
        root,
        "articles/toc.yml",
        concat!(
            "items:\n",
            "  - name: Overview\n",
            "    href: overview.md\n",
            "  - name: How-to guides\n",
            "    href: how-to/toc.yml\n",
            "  - name: Loop\n",
            "    href: loop/toc.yml\n",
        ),
    )?;
    write(
        root,
        "articles/how-to/toc.yml",
        concat!(
            "- name: Deploy\n",
            "  href: deploy.md\n",
            "- name: Monitor\n",
            "  href: monitor.md\n",
        ),
    )?;
    write(
        root,
        "articles/loop/toc.yml",
        "- name: Back to root\n  href: ../toc.yml\n",
    )?;
    write(
        root,
        "articles/overview.md",
        concat!(
            "---\n",
            "title: Agents overview\n",
            "ms.author: owner-a\n",
            "ms.topic: overview\n",
            "ms.subservice: agent-service\n",
            "zone_pivot_groups: programming-languages\n",
            "ms.custom: hub-only\n",
            "---\n",
            "# Overview\n",
            "# [Python](#tab/python)\n",
            "```python\nprint(1)\n```\n",
            "# [C#](#tab/csharp)\n",
            "```csharp\nConsole.WriteLine();\n```\n",
            "---\n",
            ":::image type=\"content\" source=\"media/arch.png\" alt-text=\"Architecture\":::\n",
            "Try it in [the portal](https://ai.azure.com/?cid=learnDocs).\n",
        ),
    )?;
    write(
        root,
        "articles/how-to/deploy.md",
        concat!(
            "---\n",
            "title: Deploy\n",
            "ms.author: owner-b\n",
            "---\n",
            "1. Sign in to the portal.\n",
            "2. Select **Deploy**.\n",
            "```bash\naz deploy\n```\n",
        ),
    )?;
    write(
        root,
        "zone-pivot-groups.yml",
        concat!(
            "groups:\n",
            "  - id: programming-languages\n",
            "    pivots:\n",
            "      - id: python\n",
            "      - id: csharp\n",
        ),
    )?;
    Ok(())
}

fn cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("tocinventory");
    for var in [
        "RUST_LOG",
        "DEBUG",
        "TOC_FILE",
        "URL_PATH",
        "BASE_PATH",
        "PIVOT_MAP_FILE",
        "OUTPUT_DIR",
        "OUTPUT_FILE",
        "METADATA_OUTPUT_FILE",
        "CONTENT_OUTPUT_FILE",
        "SUMMARY_OUTPUT_FILE",
        "METADATA_FIELDS",
        "METADATA_FLAGS",
        "MERGE_FILE",
        "MERGE_KEY",
        "MERGE_COLUMNS",
        "MERGE_NORMALIZE_URLS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn flatten_expands_nested_tocs_and_stops_at_cycles() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;
    let out = temp.path().join("out").join("toc.csv");

    cmd()
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("articles/toc.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("flatten complete"));

    let table = Table::read_csv(&out)?;
    let titles = (0..table.len())
        .filter_map(|row| table.cell(row, "title"))
        .collect::<Vec<_>>();
    assert_eq!(
        titles,
        vec![
            "Overview",
            "How-to guides",
            "Deploy",
            "Monitor",
            "Loop",
            "Back to root",
        ]
    );
    assert_eq!(table.cell(2, "depth"), Some("1"));
    assert_eq!(table.cell(2, "url"), Some("https://learn.example.com/azure/agents/how-to/deploy"));
    assert_eq!(table.cell(2, "breadcrumb"), Some("How-to guides"));
    assert_eq!(table.cell(5, "toc_status"), Some("cycle"));
    assert_eq!(table.cell(5, "other_toc"), Some("true"));
    Ok(())
}

#[test]
fn flatten_refuses_to_overwrite_without_force() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;
    let out = temp.path().join("toc.csv");
    fs::write(&out, "keep me\n")?;

    let flatten = |force: bool| {
        let mut cmd = cmd();
        cmd.arg("flatten")
            .arg("--toc")
            .arg(temp.path().join("articles/toc.yml"))
            .args(["--url-path", BASE_URL])
            .arg("--out")
            .arg(&out);
        if force {
            cmd.arg("--force");
        }
        cmd
    };

    flatten(false)
        .assert()
        .failure()
        .stderr(predicate::str::contains("output already exists"));
    assert_eq!(fs::read_to_string(&out)?, "keep me\n");

    flatten(true).assert().success();
    assert!(fs::read_to_string(&out)?.starts_with("depth,title,href,url"));
    Ok(())
}

#[test]
fn missing_root_toc_fails_with_context() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    cmd()
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("missing.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(temp.path().join("toc.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("load root toc"));
    Ok(())
}

#[test]
fn metadata_and_content_stages_enrich_rows() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;
    let toc_csv = temp.path().join("toc.csv");
    let metadata_csv = temp.path().join("toc_with_metadata.csv");
    let content_csv = temp.path().join("toc_with_content.csv");

    cmd()
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("articles/toc.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(&toc_csv)
        .assert()
        .success();
    cmd()
        .arg("metadata")
        .arg("--input")
        .arg(&toc_csv)
        .arg("--base-dir")
        .arg(temp.path().join("articles"))
        .arg("--pivot-map")
        .arg(temp.path().join("zone-pivot-groups.yml"))
        .args(["--field", "ms.subservice", "--flag", "ms.topic:overview"])
        .arg("--out")
        .arg(&metadata_csv)
        .assert()
        .success();
    cmd()
        .arg("content")
        .arg("--input")
        .arg(&metadata_csv)
        .arg("--base-dir")
        .arg(temp.path().join("articles"))
        .arg("--out")
        .arg(&content_csv)
        .assert()
        .success();

    let table = Table::read_csv(&content_csv)?;
    assert_eq!(table.len(), 6);

    assert_eq!(table.cell(0, "ms.author"), Some("owner-a"));
    assert_eq!(table.cell(0, "pivot_groups"), Some("programming-languages"));
    assert_eq!(table.cell(0, "pivots"), Some("python, csharp"));
    assert_eq!(table.cell(0, "hub_only"), Some("true"));
    assert_eq!(table.cell(0, "has_tabs"), Some("true"));
    assert_eq!(table.cell(0, "tab_count"), Some("2"));
    assert_eq!(table.cell(0, "tab_group_count"), Some("1"));
    assert_eq!(table.cell(0, "code_languages"), Some("csharp, python"));
    assert_eq!(table.cell(0, "image_count"), Some("1"));
    assert_eq!(table.cell(0, "ms.subservice"), Some("agent-service"));
    assert_eq!(table.cell(0, "overview"), Some("true"));
    assert_eq!(table.cell(0, "contains_link_with_param"), Some("true"));
    assert_eq!(table.cell(0, "contains_link_no_param"), Some("false"));
    assert_eq!(table.cell(2, "overview"), Some("false"));

    assert_eq!(table.cell(2, "ms.author"), Some("owner-b"));
    assert_eq!(table.cell(2, "has_portal_steps"), Some("true"));
    assert_eq!(table.cell(2, "code_block_count"), Some("1"));

    // Monitor has no document.
    assert_eq!(table.cell(3, "file_found"), Some("false"));
    assert_eq!(table.cell(3, "ms.author"), Some(""));
    assert_eq!(table.cell(3, "code_block_count"), Some("0"));
    Ok(())
}

#[test]
fn merge_command_joins_columns_at_the_front() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write(
        temp.path(),
        "target.csv",
        "url,title\nX,Doc X\nY,Doc Y\nZ,Doc Z\n",
    )?;
    write(temp.path(), "source.csv", "url,Notes\nX,note x\nY,note y\n")?;
    let out = temp.path().join("merged.csv");

    cmd()
        .arg("merge")
        .arg("--target")
        .arg(temp.path().join("target.csv"))
        .arg("--source")
        .arg(temp.path().join("source.csv"))
        .args(["--columns", "Notes"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(&out)?,
        "Notes,url,title\nnote x,X,Doc X\nnote y,Y,Doc Y\n,Z,Doc Z\n"
    );
    Ok(())
}

#[test]
fn merge_with_missing_source_copies_target() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write(temp.path(), "target.csv", "url,title\nX,Doc X\n")?;
    let out = temp.path().join("merged.csv");

    cmd()
        .arg("merge")
        .arg("--target")
        .arg(temp.path().join("target.csv"))
        .arg("--source")
        .arg(temp.path().join("missing.csv"))
        .args(["--columns", "Notes"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("merge source unavailable"));

    assert_eq!(fs::read_to_string(&out)?, "url,title\nX,Doc X\n");
    Ok(())
}

#[test]
fn run_reads_environment_and_merges_final_output() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;
    write(
        temp.path(),
        "traffic.csv",
        "url,Views\nhttps://learn.example.com/en-us/azure/agents/overview/,1200\n",
    )?;
    let out_dir = temp.path().join("out");

    cmd()
        .env("TOC_FILE", temp.path().join("articles/toc.yml"))
        .env("URL_PATH", BASE_URL)
        .env("BASE_PATH", temp.path().join("articles"))
        .env("OUTPUT_DIR", &out_dir)
        .env("MERGE_FILE", temp.path().join("traffic.csv"))
        .env("MERGE_COLUMNS", "Views")
        .env("MERGE_NORMALIZE_URLS", "true")
        .env("METADATA_FIELDS", "ms.subservice")
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("run complete"));

    assert!(out_dir.join("toc.csv").is_file());
    let summary = Table::read_csv(&out_dir.join("toc_summary.csv"))?;
    assert_eq!(summary.cell(0, "name"), Some("Rows"));
    assert_eq!(summary.cell(0, "files"), Some("6"));
    assert!(out_dir.join("toc_with_metadata.csv").is_file());
    let table = Table::read_csv(&out_dir.join("toc_with_content.csv"))?;
    assert_eq!(table.columns()[0], "Views");
    assert_eq!(table.cell(0, "Views"), Some("1200"));
    assert_eq!(table.cell(1, "Views"), Some(""));
    assert_eq!(table.cell(0, "ms.subservice"), Some("agent-service"));
    Ok(())
}

#[test]
fn stats_command_reports_feature_totals() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write(
        temp.path(),
        "inventory.csv",
        concat!(
            "title,file_found,ms.service,has_tabs,tab_count,code_block_count,code_languages\n",
            "A,true,ai-foundry,true,2,3,\"bash, python\"\n",
            "B,true,ai-foundry,false,0,1,python\n",
            "C,false,,false,0,0,\n",
        ),
    )?;
    let out = temp.path().join("stats.csv");

    cmd()
        .arg("stats")
        .arg("--input")
        .arg(temp.path().join("inventory.csv"))
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("stats complete"));

    let rows = fs::read_to_string(&out)?;
    assert!(rows.starts_with("section,name,files,total\ninventory,Rows,3,\n"));
    assert!(rows.contains("inventory,Files found,2,\n"));
    assert!(rows.contains("content,Tabs,1,2\n"));
    assert!(rows.contains("content,Code blocks,2,4\n"));
    assert!(rows.contains("metadata,Services,2,1\n"));
    assert!(rows.contains("service,ai-foundry,2,\n"));
    assert!(rows.contains("language,python,2,\nlanguage,bash,1,\n"));
    Ok(())
}

#[test]
fn flatten_accepts_numeric_titles_and_empty_groups() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write(
        temp.path(),
        "toc.yml",
        concat!(
            "items:\n",
            "  - name: 2024\n",
            "    href: release-2024.md\n",
            "  - name: Empty\n",
            "    items:\n",
        ),
    )?;
    let out = temp.path().join("toc.csv");

    cmd()
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("toc.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let table = Table::read_csv(&out)?;
    assert_eq!(table.len(), 2);
    assert_eq!(table.cell(0, "title"), Some("2024"));
    assert_eq!(
        table.cell(0, "url"),
        Some("https://learn.example.com/azure/agents/release-2024")
    );
    assert_eq!(table.cell(1, "title"), Some("Empty"));
    Ok(())
}

#[test]
fn run_with_config_file_and_skipped_build() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;
    let out_dir = temp.path().join("out");
    write(
        temp.path(),
        "config.yml",
        &format!(
            "base_dir: {}\noutput_dir: {}\ncontent_output: inventory.csv\n",
            temp.path().join("articles").display(),
            out_dir.display(),
        ),
    )?;

    cmd()
        .arg("run")
        .arg("--config")
        .arg(temp.path().join("config.yml"))
        .arg("--skip-build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--skip-build requires an existing"));

    cmd()
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("articles/toc.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(out_dir.join("toc.csv"))
        .assert()
        .success();

    cmd()
        .arg("run")
        .arg("--config")
        .arg(temp.path().join("config.yml"))
        .arg("--skip-build")
        .assert()
        .success();

    assert!(out_dir.join("inventory.csv").is_file());
    Ok(())
}

#[test]
fn run_without_toc_file_is_an_error() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;

    cmd()
        .env("OUTPUT_DIR", temp.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TOC file is not configured"));
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write_docset(temp.path())?;

    cmd()
        .env("RUST_LOG", "debug")
        .arg("flatten")
        .arg("--toc")
        .arg(temp.path().join("articles/toc.yml"))
        .args(["--url-path", BASE_URL])
        .arg("--out")
        .arg(temp.path().join("toc.csv"))
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}

#[test]
fn debug_env_enables_debug_logging() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    write(temp.path(), "target.csv", "url\nX\n")?;

    cmd()
        .env("DEBUG", "1")
        .arg("merge")
        .arg("--target")
        .arg(temp.path().join("target.csv"))
        .arg("--source")
        .arg(temp.path().join("target.csv"))
        .args(["--columns", "url"])
        .arg("--out")
        .arg(temp.path().join("out.csv"))
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
