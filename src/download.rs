use std::fs::{self, File};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;
use crate::domain::Paper;
use crate::error::HarvestError;
use crate::fs_util::{ensure_dir, sanitize_file_name, unique_path, with_extension};
use crate::paths::PathResolver;

pub const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadItem {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub row_key: Option<String>,
}

impl DownloadItem {
    pub fn from_paper(paper: &Paper) -> Self {
        Self {
            identifier: paper.id.clone(),
            title: paper.title.clone(),
            download_url: paper.pdf_url(),
            row_key: None,
        }
    }

    pub fn file_name(&self) -> String {
        let stem = [
            Some(self.title.as_str()),
            Some(self.identifier.as_str()),
            self.row_key.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(sanitize_file_name)
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| format!("paper-{}", chrono::Utc::now().format("%Y%m%d%H%M%S")));
        with_extension(&stem, "pdf")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedFile {
    pub identifier: String,
    pub title: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDownload {
    pub identifier: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub success: bool,
    pub directory: String,
    pub downloaded: Vec<DownloadedFile>,
    pub failed: Vec<FailedDownload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("missing link")]
    MissingLink,
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("{0}")]
    Stream(String),
    #[error("filesystem error: {0}")]
    Filesystem(String),
}

pub struct TransportResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: Box<dyn Read + Send>,
}

pub trait PdfTransport: Send + Sync {
    fn get(&self, url: &str) -> Result<TransportResponse, DownloadFailure>;
}

#[derive(Clone)]
pub struct HttpPdfTransport {
    client: Client,
}

impl HttpPdfTransport {
    pub fn new(settings: &Settings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| HarvestError::InvalidInput(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .redirect(Policy::none())
            .build()
            .map_err(|err| HarvestError::ArxivHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl PdfTransport for HttpPdfTransport {
    fn get(&self, url: &str) -> Result<TransportResponse, DownloadFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| DownloadFailure::Request(err.to_string()))?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        Ok(TransportResponse {
            status,
            location,
            body: Box::new(response),
        })
    }
}

pub struct BatchDownloader<T: PdfTransport> {
    resolver: PathResolver,
    transport: T,
    workers: usize,
}

impl<T: PdfTransport> BatchDownloader<T> {
    pub fn new(resolver: PathResolver, transport: T, workers: usize) -> Self {
        Self {
            resolver,
            transport,
            workers: workers.max(1),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn download_batch(&self, items: &[DownloadItem]) -> Result<BatchReport, HarvestError> {
        let directory = self.resolver.resolve()?;
        ensure_dir(&directory)?;

        let workers = self.workers.min(items.len()).max(1);
        let next = &AtomicUsize::new(0);
        let name_lock = &Mutex::new(());
        let target = directory.as_path();

        let mut outcomes: Vec<Option<Result<Utf8PathBuf, DownloadFailure>>> =
            (0..items.len()).map(|_| None).collect();
        let finished = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            let Some(item) = items.get(index) else {
                                break;
                            };
                            done.push((index, self.download_one(item, target, name_lock)));
                        }
                        done
                    })
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .flatten()
                .collect::<Vec<_>>()
        });
        for (index, outcome) in finished {
            outcomes[index] = Some(outcome);
        }

        let mut downloaded = Vec::new();
        let mut failed = Vec::new();
        for (item, outcome) in items.iter().zip(outcomes) {
            let outcome = outcome
                .unwrap_or_else(|| Err(DownloadFailure::Stream("download worker panicked".to_string())));
            match outcome {
                Ok(path) => {
                    tracing::info!(identifier = %item.identifier, path = %path, "pdf downloaded");
                    downloaded.push(DownloadedFile {
                        identifier: item.identifier.clone(),
                        title: item.title.clone(),
                        file_path: path.to_string(),
                    });
                }
                Err(failure) => {
                    tracing::warn!(identifier = %item.identifier, reason = %failure, "pdf download failed");
                    failed.push(FailedDownload {
                        identifier: item.identifier.clone(),
                        title: item.title.clone(),
                        reason: failure.to_string(),
                    });
                }
            }
        }

        Ok(BatchReport {
            success: failed.is_empty(),
            directory: directory.to_string(),
            downloaded,
            failed,
        })
    }

    fn download_one(
        &self,
        item: &DownloadItem,
        directory: &Utf8Path,
        name_lock: &Mutex<()>,
    ) -> Result<Utf8PathBuf, DownloadFailure> {
        let url = item
            .download_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(DownloadFailure::MissingLink)?;
        let file_name = item.file_name();

        let mut response = self.follow_redirects(url)?;

        let (path, mut file) = {
            let _guard = name_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let path = unique_path(directory, &file_name);
            let file = File::create_new(path.as_std_path())
                .map_err(|err| DownloadFailure::Filesystem(format!("create {path}: {err}")))?;
            (path, file)
        };

        if let Err(err) = io::copy(&mut response.body, &mut file) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(path.as_std_path()) {
                tracing::warn!(path = %path, error = %remove_err, "failed to remove partial download");
            }
            return Err(DownloadFailure::Stream(err.to_string()));
        }
        Ok(path)
    }

    fn follow_redirects(&self, url: &str) -> Result<TransportResponse, DownloadFailure> {
        let mut current = url.to_string();
        for _ in 0..=MAX_REDIRECTS {
            let response = self.transport.get(&current)?;
            let status = response.status;
            if (300..400).contains(&status) {
                let Some(location) = response.location else {
                    return Err(DownloadFailure::Status(status));
                };
                tracing::debug!(from = %current, to = %location, status, "following redirect");
                current = resolve_location(&current, &location)?;
                continue;
            }
            if status != 200 {
                return Err(DownloadFailure::Status(status));
            }
            return Ok(response);
        }
        Err(DownloadFailure::TooManyRedirects)
    }
}

fn resolve_location(current: &str, location: &str) -> Result<String, DownloadFailure> {
    let base = Url::parse(current).map_err(|err| DownloadFailure::Request(err.to_string()))?;
    base.join(location)
        .map(|url| url.to_string())
        .map_err(|err| DownloadFailure::Request(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_prefers_title() {
        let item = DownloadItem {
            identifier: "2401.00001v1".to_string(),
            title: "Attention: Is It All?".to_string(),
            download_url: None,
            row_key: None,
        };
        assert_eq!(item.file_name(), "Attention Is It All.pdf");
    }

    #[test]
    fn file_name_falls_back_to_identifier_then_row_key() {
        let mut item = DownloadItem {
            identifier: "2401.00001v1".to_string(),
            title: " ?? ".to_string(),
            download_url: None,
            row_key: Some("row-7".to_string()),
        };
        assert_eq!(item.file_name(), "2401.00001v1.pdf");

        item.identifier.clear();
        assert_eq!(item.file_name(), "row-7.pdf");
    }

    #[test]
    fn relative_redirects_resolve_against_current_url() {
        let next = resolve_location("https://arxiv.org/pdf/2401.00001", "/pdf/2401.00001v2").unwrap();
        assert_eq!(next, "https://arxiv.org/pdf/2401.00001v2");

        let next = resolve_location("https://arxiv.org/pdf/x", "https://cdn.example.org/x.pdf").unwrap();
        assert_eq!(next, "https://cdn.example.org/x.pdf");
    }
}
