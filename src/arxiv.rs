use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::config::Settings;
use crate::domain::{ABS_URL_PREFIX, Paper, PaperLink};
use crate::error::HarvestError;

static RATE_EXCEEDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)rate\s+exceeded").expect("static regex"));

const MESSAGE_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub papers: Vec<Paper>,
    pub total: usize,
}

pub trait ArxivClient: Send + Sync {
    fn search(
        &self,
        query: &str,
        start: u32,
        max_results: Option<u32>,
    ) -> Result<SearchPage, HarvestError>;
}

#[derive(Clone)]
pub struct ArxivHttpClient {
    client: Client,
    base_url: String,
}

impl ArxivHttpClient {
    pub fn new(settings: &Settings) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| HarvestError::InvalidInput(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|err| HarvestError::ArxivHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.api_base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ArxivClient for ArxivHttpClient {
    fn search(
        &self,
        query: &str,
        start: u32,
        max_results: Option<u32>,
    ) -> Result<SearchPage, HarvestError> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("search_query", query)])
            .query(&[("start", start)]);
        if let Some(max_results) = max_results {
            request = request.query(&[("max_results", max_results)]);
        }

        tracing::debug!(query, start, ?max_results, "arxiv.request");
        let response = request
            .send()
            .map_err(|err| HarvestError::ArxivHttp(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| HarvestError::ArxivHttp(err.to_string()))?;

        let papers = classify_response(status, &body)?;
        tracing::debug!(status, count = papers.len(), "arxiv.response");
        Ok(SearchPage {
            total: papers.len(),
            papers,
        })
    }
}

pub fn classify_response(status: u16, body: &str) -> Result<Vec<Paper>, HarvestError> {
    let success = (200..300).contains(&status);
    if !success && (status == 503 || RATE_EXCEEDED.is_match(body)) {
        return Err(HarvestError::RateLimited {
            status,
            body: body.to_string(),
        });
    }
    if !success {
        return Err(HarvestError::Transport {
            status,
            message: preview(body),
        });
    }
    parse_feed(body)
}

fn preview(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    let mut out: String = trimmed.chars().take(MESSAGE_PREVIEW_CHARS).collect();
    if trimmed.chars().count() > MESSAGE_PREVIEW_CHARS {
        out.push('…');
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Summary,
    Published,
    Updated,
    AuthorName,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

#[derive(Debug)]
struct EntryBuilder {
    depth: usize,
    author_depth: Option<usize>,
    capture: Option<Capture>,
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
    links: Vec<PaperLink>,
}

impl EntryBuilder {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            author_depth: None,
            capture: None,
            id: None,
            title: None,
            summary: None,
            published: None,
            updated: None,
            authors: Vec::new(),
            categories: Vec::new(),
            links: Vec::new(),
        }
    }

    fn open(&mut self, element: &BytesStart<'_>, depth: usize, empty: bool) -> Result<(), String> {
        let local = element.local_name();
        match local.as_ref() {
            b"author" => {
                if !empty && self.author_depth.is_none() {
                    self.author_depth = Some(depth);
                }
            }
            b"category" => {
                let term = attribute(element, b"term")?.unwrap_or_default();
                self.categories.push(term);
            }
            b"link" => {
                self.links.push(PaperLink {
                    href: attribute(element, b"href")?.unwrap_or_default(),
                    rel: attribute(element, b"rel")?.unwrap_or_default(),
                    link_type: attribute(element, b"type")?.unwrap_or_default(),
                });
            }
            name => {
                if self.capture.is_some() {
                    return Ok(());
                }
                let field = match name {
                    b"id" if self.id.is_none() => Field::Id,
                    b"title" if self.title.is_none() => Field::Title,
                    b"summary" if self.summary.is_none() => Field::Summary,
                    b"published" if self.published.is_none() => Field::Published,
                    b"updated" if self.updated.is_none() => Field::Updated,
                    b"name" if self.author_depth.is_some() => Field::AuthorName,
                    _ => return Ok(()),
                };
                if empty {
                    self.store(field, String::new());
                } else {
                    self.capture = Some(Capture {
                        field,
                        depth,
                        text: String::new(),
                    });
                }
            }
        }
        Ok(())
    }

    fn text(&mut self, value: &str) {
        if let Some(capture) = self.capture.as_mut() {
            capture.text.push_str(value);
        }
    }

    fn close(&mut self, depth: usize) {
        if self
            .capture
            .as_ref()
            .is_some_and(|capture| capture.depth == depth)
            && let Some(capture) = self.capture.take()
        {
            self.store(capture.field, capture.text);
        }
        if self.author_depth == Some(depth) {
            self.author_depth = None;
        }
    }

    fn store(&mut self, field: Field, text: String) {
        match field {
            Field::Id => {
                let id = text.strip_prefix(ABS_URL_PREFIX).unwrap_or(&text).to_string();
                self.id = Some(id);
            }
            Field::Title => self.title = Some(text.trim().to_string()),
            Field::Summary => self.summary = Some(text.trim().to_string()),
            Field::Published => self.published = Some(text),
            Field::Updated => self.updated = Some(text),
            Field::AuthorName => self.authors.push(text),
        }
    }

    fn finish(self) -> Paper {
        Paper {
            id: self.id.unwrap_or_default(),
            title: self.title.unwrap_or_default(),
            summary: self.summary.unwrap_or_default(),
            published: self.published.unwrap_or_default(),
            updated: self.updated.unwrap_or_default(),
            authors: self.authors,
            categories: self.categories,
            links: self.links,
        }
    }
}

fn attribute(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, HarvestError> {
    let malformed = |message: String| HarvestError::MalformedResponse {
        message,
        body: xml.to_string(),
    };

    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut root_closed = false;
    let mut entry: Option<EntryBuilder> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => {
                return Err(malformed(format!(
                    "{err} (at byte {})",
                    reader.buffer_position()
                )));
            }
        };

        match event {
            Event::Start(element) => {
                if root_closed {
                    return Err(malformed("more than one root element".to_string()));
                }
                root_seen = true;
                depth += 1;
                match entry.as_mut() {
                    Some(builder) => builder.open(&element, depth, false).map_err(&malformed)?,
                    None if element.local_name().as_ref() == b"entry" => {
                        entry = Some(EntryBuilder::new(depth));
                    }
                    None => {}
                }
            }
            Event::Empty(element) => {
                if root_closed {
                    return Err(malformed("more than one root element".to_string()));
                }
                if depth == 0 {
                    root_seen = true;
                    root_closed = true;
                }
                match entry.as_mut() {
                    Some(builder) => builder
                        .open(&element, depth + 1, true)
                        .map_err(&malformed)?,
                    None if element.local_name().as_ref() == b"entry" => {
                        papers.push(EntryBuilder::new(depth + 1).finish());
                    }
                    None => {}
                }
            }
            Event::End(_) => {
                if depth == 0 {
                    return Err(malformed("unexpected closing tag".to_string()));
                }
                if let Some(builder) = entry.as_mut() {
                    builder.close(depth);
                    if builder.depth == depth
                        && let Some(done) = entry.take()
                    {
                        papers.push(done.finish());
                    }
                }
                depth -= 1;
                if depth == 0 {
                    root_closed = true;
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|err| malformed(err.to_string()))?;
                if depth == 0 {
                    if !value.trim().is_empty() {
                        return Err(malformed("text outside of the root element".to_string()));
                    }
                    continue;
                }
                if let Some(builder) = entry.as_mut() {
                    builder.text(&value);
                }
            }
            Event::CData(data) => {
                if depth == 0 {
                    return Err(malformed("text outside of the root element".to_string()));
                }
                if let Some(builder) = entry.as_mut() {
                    builder.text(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !root_seen {
        return Err(malformed("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(malformed("unexpected end of document".to_string()));
    }
    Ok(papers)
}
