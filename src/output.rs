use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CrawlResult, DirsResult, ProgressEvent, ProgressSink, SearchResult};
use crate::archive::{ArchiveFile, ArchiveSummary, MergeReport};
use crate::download::BatchReport;
use crate::error::HarvestError;
use crate::presets::Preset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    Json,
}

#[derive(Serialize)]
struct Success<'a, T: Serialize> {
    success: bool,
    #[serde(flatten)]
    result: &'a T,
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    error: String,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_search(result: &SearchResult) -> io::Result<()> {
        Self::print_success(result)
    }

    pub fn print_crawl(result: &CrawlResult) -> io::Result<()> {
        Self::print_success(result)
    }

    pub fn print_merge(result: &MergeReport) -> io::Result<()> {
        Self::print_success(result)
    }

    pub fn print_batch(result: &BatchReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_presets(presets: &[Preset]) -> io::Result<()> {
        Self::print_json(&presets)
    }

    pub fn print_preset(preset: &Preset) -> io::Result<()> {
        Self::print_json(preset)
    }

    pub fn print_archives(archives: &[ArchiveSummary]) -> io::Result<()> {
        Self::print_json(&archives)
    }

    pub fn print_archive(archive: &ArchiveFile) -> io::Result<()> {
        Self::print_json(archive)
    }

    pub fn print_dirs(dirs: &DirsResult) -> io::Result<()> {
        Self::print_json(dirs)
    }

    pub fn print_failure(error: &HarvestError) -> io::Result<()> {
        Self::print_json(&Failure {
            success: false,
            error: error.to_string(),
        })
    }

    fn print_success<T: Serialize>(result: &T) -> io::Result<()> {
        Self::print_json(&Success {
            success: true,
            result,
        })
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_search(result: &SearchResult) {
        println!("query: {}", result.query);
        println!("{} papers (from {})", result.total, result.start);
        for (index, paper) in result.papers.iter().enumerate() {
            println!();
            println!("{:>3}. {}", result.start as usize + index + 1, one_line(&paper.title));
            println!("     id: {}", paper.id);
            if !paper.authors.is_empty() {
                println!("     authors: {}", paper.authors.join(", "));
            }
            if !paper.published.is_empty() {
                println!("     published: {}", paper.published);
            }
            if !paper.categories.is_empty() {
                println!("     categories: {}", paper.categories.join(" "));
            }
            if let Some(url) = paper.pdf_url() {
                println!("     pdf: {url}");
            }
        }
    }

    pub fn print_crawl(result: &CrawlResult) {
        println!("preset: {}", result.preset);
        println!("query: {}", result.query);
        println!("fetched: {}", result.fetched);
        Self::print_merge(&result.merge);
    }

    pub fn print_merge(result: &MergeReport) {
        println!("archive: {}", result.file_path);
        println!("new papers: {}", result.new_count);
        println!("total papers: {}", result.total_count);
    }

    pub fn print_batch(result: &BatchReport) {
        println!("directory: {}", result.directory);
        for item in &result.downloaded {
            println!("ok     {}  {}", item.identifier, item.file_path);
        }
        for item in &result.failed {
            println!("failed {}  {}", display_name(&item.identifier, &item.title), item.reason);
        }
        println!(
            "{} downloaded, {} failed",
            result.downloaded.len(),
            result.failed.len()
        );
    }

    pub fn print_presets(presets: &[Preset]) {
        if presets.is_empty() {
            println!("no saved searches");
            return;
        }
        for preset in presets {
            let query = preset
                .data
                .to_query()
                .unwrap_or_else(|err| format!("<{err}>"));
            println!(
                "{:<24} {:<8} max={:<5} {}",
                preset.name,
                preset.search_type,
                preset.data.max_results(),
                query
            );
        }
    }

    pub fn print_preset(preset: &Preset) {
        println!("name: {}", preset.name);
        println!("id: {}", preset.id);
        println!("type: {}", preset.search_type);
        match preset.data.to_query() {
            Ok(query) => println!("query: {query}"),
            Err(err) => println!("query: <{err}>"),
        }
        println!("max results: {}", preset.data.max_results());
        println!("created: {}", preset.created_at);
        if let Some(updated) = &preset.updated_at {
            println!("updated: {updated}");
        }
    }

    pub fn print_archives(archives: &[ArchiveSummary]) {
        if archives.is_empty() {
            println!("no archives");
            return;
        }
        for archive in archives {
            println!(
                "{:<24} {:>6} papers  {}  {}",
                archive.search_name, archive.paper_count, archive.updated_at, archive.file_path
            );
        }
    }

    pub fn print_archive(archive: &ArchiveFile) {
        println!("search: {} ({})", archive.search_name, archive.search_type);
        println!("query: {}", archive.query);
        println!("updated: {}", archive.updated_at);
        println!("papers: {}", archive.paper_count);
        for record in archive.stored_papers() {
            println!(
                "  {}  {}  [{}]",
                record.paper.id,
                one_line(&record.paper.title),
                record.record_created_at
            );
        }
    }

    pub fn print_dirs(dirs: &DirsResult) {
        let show = |dir: &Option<String>| dir.clone().unwrap_or_else(|| "(not set)".to_string());
        println!("archive:  {}  [{}]", show(&dirs.archive_dir), dirs.archive_config);
        println!("download: {}  [{}]", show(&dirs.download_dir), dirs.download_config);
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn display_name<'a>(identifier: &'a str, title: &'a str) -> &'a str {
    if identifier.is_empty() { title } else { identifier }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_wrapper_flattens_result() {
        let report = MergeReport {
            file_path: "/tmp/data/x.json".to_string(),
            new_count: 2,
            total_count: 5,
        };
        let json = serde_json::to_value(Success {
            success: true,
            result: &report,
        })
        .unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["newCount"], 2);
        assert_eq!(json["filePath"], "/tmp/data/x.json");
    }

    #[test]
    fn failure_carries_message() {
        let json = serde_json::to_value(Failure {
            success: false,
            error: HarvestError::EmptyQuery.to_string(),
        })
        .unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "search query is empty");
    }

    #[test]
    fn titles_collapse_to_one_line() {
        assert_eq!(one_line("  Deep\n   Learning  "), "Deep Learning");
    }
}
