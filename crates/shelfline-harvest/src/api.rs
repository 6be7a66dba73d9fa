//! Open Library and Internet Archive clients

use serde::Deserialize;
use shelfline_core::http::{get_text, get_text_with_retry};
use shelfline_core::{
    AcquiredText, CatalogRecord, CatalogSearch, FetchError, ResourceResolver, SearchPage,
    TextFetcher, TextVariant,
};

/// Fields requested from the search endpoint
const SEARCH_FIELDS: &str = "key,title,author_name,first_publish_year,subject,ia";

/// Editions listed per work
const EDITIONS_LIMIT: u32 = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "numFound", default)]
    num_found: u64,
    #[serde(default)]
    start: u64,
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    key: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: Vec<String>,
    first_publish_year: Option<i32>,
    #[serde(default)]
    subject: Vec<String>,
    #[serde(default)]
    ia: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EditionsResponse {
    #[serde(default)]
    entries: Vec<Edition>,
}

#[derive(Debug, Deserialize)]
struct Edition {
    ocaid: Option<String>,
}

/// `/works/OL45804W` → `OL45804W`
fn work_id(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Parse a `search.json` body into a page of records
pub fn parse_search_page(body: &str) -> Result<SearchPage, FetchError> {
    let resp: SearchResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    let has_more = resp.start + (resp.docs.len() as u64) < resp.num_found;
    let records = resp
        .docs
        .into_iter()
        .filter(|d| !d.key.is_empty())
        .map(|d| {
            let record = CatalogRecord {
                id: work_id(&d.key).to_string(),
                title: d.title,
                author: d
                    .author_name
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "Unknown".to_string()),
                publication_year: d.first_publish_year,
                subjects: d.subject,
            };
            (record, d.ia)
        })
        .collect();
    Ok(SearchPage { records, has_more })
}

/// Parse an `editions.json` body into archival identifiers, in listing order
pub fn parse_editions(body: &str) -> Result<Vec<String>, FetchError> {
    let resp: EditionsResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;
    Ok(resp
        .entries
        .into_iter()
        .filter_map(|e| e.ocaid)
        .filter(|id| !id.is_empty())
        .collect())
}

/// Open Library catalog: search plus the editions indirection
#[derive(Debug, Clone)]
pub struct OpenLibrary {
    base_url: String,
    page_size: u32,
}

impl OpenLibrary {
    pub fn new(base_url: impl Into<String>, page_size: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size: page_size.max(1),
        }
    }
}

impl CatalogSearch for OpenLibrary {
    fn search(&self, query: &str, page: u32) -> Result<SearchPage, FetchError> {
        let url = format!("{}/search.json", self.base_url);
        // Search workers back off and retry pages themselves
        let resp = get_text(
            &url,
            &[
                ("q", query.to_string()),
                ("page", page.to_string()),
                ("limit", self.page_size.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
            ],
        )?;
        parse_search_page(&resp.body)
    }
}

impl ResourceResolver for OpenLibrary {
    fn resolve_resources(&self, catalog_id: &str) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/works/{catalog_id}/editions.json", self.base_url);
        let resp = get_text_with_retry(&url, &[("limit", EDITIONS_LIMIT.to_string())])?;
        parse_editions(&resp.body)
    }
}

/// Internet Archive full-text downloads
#[derive(Debug, Clone)]
pub struct InternetArchive {
    base_url: String,
}

impl InternetArchive {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl TextFetcher for InternetArchive {
    fn fetch_text(
        &self,
        archival_id: &str,
        variant: TextVariant,
    ) -> Result<AcquiredText, FetchError> {
        let url = variant.url(&self.base_url, archival_id);
        let resp = get_text_with_retry(&url, &[])?;
        Ok(AcquiredText {
            url: resp.url,
            content_type: resp.content_type,
            body: resp.body,
        })
    }
}
