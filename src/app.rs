use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use serde_json::Value;

use crate::archive::{ArchiveFile, ArchiveMerger, ArchiveSummary, MergeReport, MergeRequest};
use crate::arxiv::{ArxivClient, SearchPage};
use crate::domain::{Paper, QueryPayload, SearchType};
use crate::download::{BatchDownloader, BatchReport, DownloadItem, PdfTransport};
use crate::error::HarvestError;
use crate::paths::PathResolver;
use crate::presets::{NewPreset, Preset, PresetStore};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub query: String,
    pub start: u32,
    pub papers: Vec<Paper>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlResult {
    pub preset: String,
    pub query: String,
    pub fetched: usize,
    #[serde(flatten)]
    pub merge: MergeReport,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirsResult {
    pub archive_dir: Option<String>,
    pub archive_config: String,
    pub download_dir: Option<String>,
    pub download_config: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<A: ArxivClient, T: PdfTransport, P: PresetStore> {
    arxiv: A,
    archives: ArchiveMerger,
    downloader: BatchDownloader<T>,
    presets: P,
}

impl<A: ArxivClient, T: PdfTransport, P: PresetStore> App<A, T, P> {
    pub fn new(
        arxiv: A,
        archives: ArchiveMerger,
        downloader: BatchDownloader<T>,
        presets: P,
    ) -> Self {
        Self {
            arxiv,
            archives,
            downloader,
            presets,
        }
    }

    pub fn search(
        &self,
        payload: &QueryPayload,
        start: u32,
        sink: &dyn ProgressSink,
    ) -> Result<SearchResult, HarvestError> {
        let query = payload.to_query()?;
        let page = self.fetch(&query, start, Some(payload.max_results()), sink)?;
        Ok(SearchResult {
            query,
            start,
            papers: page.papers,
            total: page.total,
        })
    }

    pub fn crawl(&self, preset_name: &str, sink: &dyn ProgressSink) -> Result<CrawlResult, HarvestError> {
        let preset = self.find_preset(preset_name)?;
        let query = preset.data.to_query()?;
        let max_results = preset.data.max_results();

        let page = self.fetch(&query, 0, Some(max_results), sink)?;
        let fetched = page.total;

        let request = MergeRequest {
            search_name: preset.name.clone(),
            search_type: preset.search_type,
            query: query.clone(),
            max_results,
        };
        let merge = self.merge_and_save(&request, page.papers, sink)?;

        Ok(CrawlResult {
            preset: preset.name,
            query,
            fetched,
            merge,
        })
    }

    pub fn resolve_archive_dir(&self) -> Result<Utf8PathBuf, HarvestError> {
        self.archives.resolve_dir()
    }

    pub fn resolve_download_dir(&self) -> Result<Utf8PathBuf, HarvestError> {
        self.downloader.resolver().resolve()
    }

    pub fn set_archive_dir(&self, path: &str) -> Result<Utf8PathBuf, HarvestError> {
        self.archives.resolver().update(path)
    }

    pub fn set_download_dir(&self, path: &str) -> Result<Utf8PathBuf, HarvestError> {
        self.downloader.resolver().update(path)
    }

    pub fn current_dirs(&self) -> DirsResult {
        let describe = |resolver: &PathResolver| {
            (
                resolver.current().map(|path| path.to_string()),
                resolver.config_file().to_string(),
            )
        };
        let (archive_dir, archive_config) = describe(self.archives.resolver());
        let (download_dir, download_config) = describe(self.downloader.resolver());
        DirsResult {
            archive_dir,
            archive_config,
            download_dir,
            download_config,
        }
    }

    pub fn merge_and_save(
        &self,
        request: &MergeRequest,
        papers: Vec<Paper>,
        sink: &dyn ProgressSink,
    ) -> Result<MergeReport, HarvestError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Merge; {} papers into {}",
                papers.len(),
                request.search_name
            ),
            elapsed: None,
        });
        let report = self.archives.merge_and_save(request, papers)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Merge; {} new, {} total",
                report.new_count, report.total_count
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn import_json(
        &self,
        search_name: &str,
        papers: Value,
        sink: &dyn ProgressSink,
    ) -> Result<MergeReport, HarvestError> {
        let request = match self.archives.load(search_name) {
            Ok(existing) => MergeRequest {
                search_name: search_name.to_string(),
                search_type: existing.search_type,
                query: existing.query,
                max_results: existing.max_results,
            },
            Err(HarvestError::ArchiveNotFound(_)) => MergeRequest {
                search_name: search_name.to_string(),
                search_type: SearchType::Advanced,
                query: String::new(),
                max_results: 0,
            },
            Err(err) => return Err(err),
        };
        sink.event(ProgressEvent {
            message: format!("phase=Merge; importing into {search_name}"),
            elapsed: None,
        });
        self.archives.merge_json(&request, papers)
    }

    pub fn list_archives(&self) -> Result<Vec<ArchiveSummary>, HarvestError> {
        self.archives.list()
    }

    pub fn load_archive(&self, search_name: &str) -> Result<ArchiveFile, HarvestError> {
        self.archives.load(search_name)
    }

    pub fn download_batch(
        &self,
        items: &[DownloadItem],
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, HarvestError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Download; {} items", items.len()),
            elapsed: None,
        });
        let report = self.downloader.download_batch(items)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Download; {} downloaded, {} failed",
                report.downloaded.len(),
                report.failed.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(report)
    }

    pub fn download_archive(
        &self,
        search_name: &str,
        ids: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, HarvestError> {
        let archive = self.archives.load(search_name)?;
        let stored = archive.stored_papers();

        let items: Vec<DownloadItem> = if ids.is_empty() {
            stored
                .iter()
                .map(|record| DownloadItem::from_paper(&record.paper))
                .collect()
        } else {
            let unknown: Vec<&str> = ids
                .iter()
                .filter(|id| !stored.iter().any(|record| &record.paper.id == *id))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(HarvestError::InvalidInput(format!(
                    "not in archive {search_name}: {}",
                    unknown.join(", ")
                )));
            }
            stored
                .iter()
                .filter(|record| ids.contains(&record.paper.id))
                .map(|record| DownloadItem::from_paper(&record.paper))
                .collect()
        };

        self.download_batch(&items, sink)
    }

    pub fn list_presets(&self) -> Result<Vec<Preset>, HarvestError> {
        self.presets.list()
    }

    pub fn find_preset(&self, name: &str) -> Result<Preset, HarvestError> {
        self.presets
            .find_by_name(name)?
            .ok_or_else(|| HarvestError::PresetNotFound(name.to_string()))
    }

    pub fn add_preset(&self, preset: NewPreset) -> Result<Preset, HarvestError> {
        self.presets.create(preset)
    }

    pub fn edit_preset(&self, name: &str, preset: NewPreset) -> Result<Preset, HarvestError> {
        let existing = self.find_preset(name)?;
        self.presets.update(existing.id, preset)
    }

    pub fn remove_preset(&self, name: &str) -> Result<Preset, HarvestError> {
        let existing = self.find_preset(name)?;
        self.presets.delete(existing.id)
    }

    fn fetch(
        &self,
        query: &str,
        start: u32,
        max_results: Option<u32>,
        sink: &dyn ProgressSink,
    ) -> Result<SearchPage, HarvestError> {
        let started = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Query; {query}"),
            elapsed: None,
        });
        let page = self.arxiv.search(query, start, max_results)?;
        tracing::info!(query, start, count = page.total, "arxiv search finished");
        sink.event(ProgressEvent {
            message: format!("phase=Query; {} papers", page.total),
            elapsed: Some(started.elapsed()),
        });
        Ok(page)
    }
}
