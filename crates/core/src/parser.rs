use crate::error::ProcessingError;
use crate::models::DocumentMetadata;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::{Dictionary, Document, Object};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_PAGE_LIMIT: usize = 1_000;

/// Fallback geometry (US Letter, points) when a page carries no MediaBox.
const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Extraction backends. No single engine is reliably accurate across all
/// PDFs, so the engine is an explicit selector rather than a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionEngine {
    #[default]
    Lopdf,
    RemoteOcr,
}

#[derive(Debug, Clone)]
pub struct RemoteOcrConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct RemoteOcrRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteOcrResponse {
    pages: Option<Vec<RemoteOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageDimensions {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegion {
    pub page_index: usize,
    pub first_line: usize,
    pub row_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub page_index: usize,
    pub name: String,
    pub width: Option<i64>,
    pub height: Option<i64>,
}

/// Per-page access to one loaded PDF. All extraction is synchronous and
/// blocking; async callers drive it through `spawn_blocking`.
pub struct DocumentParser {
    path: PathBuf,
    document: Document,
    page_ids: Vec<(u32, lopdf::ObjectId)>,
    remote_ocr: Option<RemoteOcrConfig>,
}

impl DocumentParser {
    pub fn open(path: &Path) -> Result<Self, ProcessingError> {
        Self::open_with_limit(path, DEFAULT_PAGE_LIMIT, None)
    }

    pub fn open_with_limit(
        path: &Path,
        page_limit: usize,
        remote_ocr: Option<RemoteOcrConfig>,
    ) -> Result<Self, ProcessingError> {
        if !path.exists() {
            return Err(ProcessingError::FileNotFound(
                path.to_string_lossy().to_string(),
            ));
        }

        let document = Document::load(path)
            .map_err(|error| ProcessingError::Corrupted(error.to_string()))?;

        if document.is_encrypted() {
            return Err(ProcessingError::PasswordProtected(
                path.to_string_lossy().to_string(),
            ));
        }

        let page_ids: Vec<(u32, lopdf::ObjectId)> = document.get_pages().into_iter().collect();
        if page_ids.is_empty() {
            return Err(ProcessingError::Corrupted(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }
        if page_ids.len() > page_limit {
            return Err(ProcessingError::PageLimitExceeded {
                pages: page_ids.len(),
                limit: page_limit,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            document,
            page_ids,
            remote_ocr,
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    pub fn metadata(&self) -> DocumentMetadata {
        let mut metadata = DocumentMetadata {
            page_count: self.page_ids.len(),
            ..Default::default()
        };

        if let Some(info) = self.info_dictionary() {
            metadata.title = dictionary_string(info, b"Title");
            metadata.author = dictionary_string(info, b"Author");
            metadata.subject = dictionary_string(info, b"Subject");
            metadata.producer = dictionary_string(info, b"Producer");
        }

        metadata
    }

    /// Extracts plain text per page. Individual page failures are logged and
    /// skipped; the map holds whatever pages succeeded.
    pub fn text(
        &self,
        engine: ExtractionEngine,
        pages: Option<&[usize]>,
    ) -> Result<BTreeMap<usize, String>, ProcessingError> {
        match engine {
            ExtractionEngine::Lopdf => Ok(self.text_lopdf(pages)),
            ExtractionEngine::RemoteOcr => self.text_remote(pages),
        }
    }

    /// Explicit fallback policy: pages that came back degenerate (missing or
    /// whitespace-only) from `primary` are re-run through `alternate`. Plain
    /// `text()` never falls back on its own.
    pub fn text_with_fallback(
        &self,
        primary: ExtractionEngine,
        alternate: ExtractionEngine,
    ) -> Result<BTreeMap<usize, String>, ProcessingError> {
        let mut extracted = self.text(primary, None)?;
        let retry = degenerate_pages(&extracted, self.page_ids.len());
        if retry.is_empty() || alternate == primary {
            return Ok(extracted);
        }

        warn!(
            count = retry.len(),
            ?primary,
            ?alternate,
            "re-running degenerate pages through alternate engine"
        );
        match self.text(alternate, Some(&retry)) {
            Ok(recovered) => {
                for (index, text) in recovered {
                    if !text.trim().is_empty() {
                        extracted.insert(index, text);
                    }
                }
            }
            Err(error) => {
                warn!(%error, "alternate engine failed, keeping primary output");
            }
        }
        Ok(extracted)
    }

    fn text_lopdf(&self, pages: Option<&[usize]>) -> BTreeMap<usize, String> {
        let mut result = BTreeMap::new();
        for (index, (page_number, _)) in self.page_ids.iter().enumerate() {
            if let Some(wanted) = pages {
                if !wanted.contains(&index) {
                    continue;
                }
            }
            match self.document.extract_text(&[*page_number]) {
                Ok(text) => {
                    result.insert(index, text);
                }
                Err(error) => {
                    warn!(
                        page_index = index,
                        %error,
                        path = %self.path.display(),
                        "page text extraction failed, skipping"
                    );
                }
            }
        }
        result
    }

    fn text_remote(&self, pages: Option<&[usize]>) -> Result<BTreeMap<usize, String>, ProcessingError> {
        let config = self.remote_ocr.as_ref().ok_or_else(|| {
            ProcessingError::RemoteExtraction("remote ocr engine not configured".to_string())
        })?;

        let pdf = std::fs::read(&self.path)?;
        let payload = RemoteOcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: self.path.to_string_lossy().to_string(),
        };

        let mut request = reqwest::blocking::Client::new()
            .post(&config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);
        if let Some(api_key) = &config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .map_err(|error| ProcessingError::RemoteExtraction(error.to_string()))?;
        if !response.status().is_success() {
            return Err(ProcessingError::RemoteExtraction(format!(
                "ocr request to {} returned {}",
                config.endpoint,
                response.status()
            )));
        }

        let body: RemoteOcrResponse = response
            .json()
            .map_err(|error| ProcessingError::RemoteExtraction(error.to_string()))?;
        let all = normalize_remote_pages(&body, &self.path)?;

        Ok(match pages {
            Some(wanted) => all
                .into_iter()
                .filter(|(index, _)| wanted.contains(index))
                .collect(),
            None => all,
        })
    }

    /// Best-effort table surface: blocks of two or more consecutive lines
    /// whose cells are separated by runs of whitespace.
    pub fn tables(&self, pages: Option<&[usize]>) -> Result<Vec<TableRegion>, ProcessingError> {
        let texts = self.text(ExtractionEngine::Lopdf, pages)?;
        let mut regions = Vec::new();
        for (page_index, text) in texts {
            regions.extend(detect_table_regions(page_index, &text));
        }
        Ok(regions)
    }

    pub fn images(&self, pages: Option<&[usize]>) -> Vec<ImageRef> {
        let mut images = Vec::new();
        for (index, (_, page_id)) in self.page_ids.iter().enumerate() {
            if let Some(wanted) = pages {
                if !wanted.contains(&index) {
                    continue;
                }
            }
            images.extend(self.page_images(index, *page_id));
        }
        images
    }

    fn page_images(&self, page_index: usize, page_id: lopdf::ObjectId) -> Vec<ImageRef> {
        let mut found = Vec::new();
        let Ok(page_dict) = self.document.get_dictionary(page_id) else {
            return found;
        };
        let Some(resources) = self.resolve_dictionary(page_dict.get(b"Resources").ok()) else {
            return found;
        };
        let Some(xobjects) = self.resolve_dictionary(resources.get(b"XObject").ok()) else {
            return found;
        };

        for (name, value) in xobjects.iter() {
            let stream = match value {
                Object::Reference(id) => match self.document.get_object(*id) {
                    Ok(Object::Stream(stream)) => stream,
                    _ => continue,
                },
                Object::Stream(stream) => stream,
                _ => continue,
            };
            let is_image = matches!(
                stream.dict.get(b"Subtype"),
                Ok(Object::Name(subtype)) if subtype.as_slice() == b"Image".as_slice()
            );
            if !is_image {
                continue;
            }
            found.push(ImageRef {
                page_index,
                name: String::from_utf8_lossy(name).to_string(),
                width: integer_value(stream.dict.get(b"Width").ok()),
                height: integer_value(stream.dict.get(b"Height").ok()),
            });
        }
        found
    }

    pub fn page_dimensions(&self) -> Vec<PageDimensions> {
        self.page_ids
            .iter()
            .map(|(page_number, page_id)| {
                let (width, height) = self
                    .document
                    .get_dictionary(*page_id)
                    .ok()
                    .and_then(|dict| media_box(dict))
                    .unwrap_or(DEFAULT_PAGE_SIZE);
                PageDimensions {
                    page_number: *page_number,
                    width,
                    height,
                }
            })
            .collect()
    }

    fn info_dictionary(&self) -> Option<&Dictionary> {
        match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => match self.document.get_object(*id).ok()? {
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            },
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    fn resolve_dictionary<'a>(&'a self, object: Option<&'a Object>) -> Option<&'a Dictionary> {
        match object? {
            Object::Dictionary(dict) => Some(dict),
            Object::Reference(id) => match self.document.get_object(*id).ok()? {
                Object::Dictionary(dict) => Some(dict),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Page indexes whose extracted text is missing or whitespace-only.
pub fn degenerate_pages(texts: &BTreeMap<usize, String>, page_count: usize) -> Vec<usize> {
    (0..page_count)
        .filter(|index| {
            texts
                .get(index)
                .map(|text| text.trim().is_empty())
                .unwrap_or(true)
        })
        .collect()
}

fn normalize_remote_pages(
    response: &RemoteOcrResponse,
    path: &Path,
) -> Result<BTreeMap<usize, String>, ProcessingError> {
    if let Some(listed) = &response.pages {
        let mut pages = BTreeMap::new();
        for entry in listed {
            let Some(text) = entry.text.as_ref().map(|text| text.trim()) else {
                continue;
            };
            if text.is_empty() {
                continue;
            }
            let page_number = entry.page.unwrap_or(1).max(1);
            pages.insert(page_number as usize - 1, text.to_string());
        }
        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    if let Some(raw) = &response.text {
        let pages: BTreeMap<usize, String> = raw
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, chunk)| {
                let trimmed = chunk.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some((index, trimmed.to_string()))
                }
            })
            .collect();
        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(ProcessingError::RemoteExtraction(format!(
        "ocr response had no readable text for {}",
        path.display()
    )))
}

fn detect_table_regions(page_index: usize, text: &str) -> Vec<TableRegion> {
    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_len = 0usize;

    let close_run = |start: Option<usize>, len: usize, regions: &mut Vec<TableRegion>| {
        if let Some(first_line) = start {
            if len >= 2 {
                regions.push(TableRegion {
                    page_index,
                    first_line,
                    row_count: len,
                });
            }
        }
    };

    for (line_no, line) in text.lines().enumerate() {
        if looks_like_table_row(line) {
            if run_start.is_none() {
                run_start = Some(line_no);
                run_len = 0;
            }
            run_len += 1;
        } else {
            close_run(run_start.take(), run_len, &mut regions);
            run_len = 0;
        }
    }
    close_run(run_start, run_len, &mut regions);
    regions
}

fn looks_like_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    let mut separators = 0usize;
    let mut gap = 0usize;
    for ch in trimmed.chars() {
        if ch == '\t' {
            separators += 1;
            gap = 0;
        } else if ch == ' ' {
            gap += 1;
            if gap == 2 {
                separators += 1;
            }
        } else {
            gap = 0;
        }
    }
    separators >= 2
}

fn dictionary_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            let value = String::from_utf8_lossy(bytes).trim().to_string();
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }
        _ => None,
    }
}

fn integer_value(object: Option<&Object>) -> Option<i64> {
    match object? {
        Object::Integer(value) => Some(*value),
        _ => None,
    }
}

fn media_box(dict: &Dictionary) -> Option<(f32, f32)> {
    let Object::Array(values) = dict.get(b"MediaBox").ok()? else {
        return None;
    };
    if values.len() != 4 {
        return None;
    }
    let numbers: Vec<f32> = values.iter().filter_map(number_value).collect();
    if numbers.len() != 4 {
        return None;
    }
    Some(((numbers[2] - numbers[0]).abs(), (numbers[3] - numbers[1]).abs()))
}

fn number_value(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
