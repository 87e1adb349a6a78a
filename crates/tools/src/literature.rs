//! Literature search capability and its PubMed (NCBI E-utilities) backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use crew_common::{CrewError, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const ABSTRACT_EXCERPT_CHARS: usize = 500;
const MIN_YEARS_BACK: u32 = 1;
const MAX_YEARS_BACK: u32 = 50;
const PUBLICATION_TYPE_FILTER: &str =
    "(Clinical Trial[PT] OR Meta-Analysis[PT] OR Systematic Review[PT] OR Review[PT])";
const LANGUAGE_FILTER: &str = "(English[LA] OR Spanish[LA])";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub pmid: String,
    pub title: String,
    pub authors: String,
    pub journal: String,
    pub year: String,
    pub abstract_text: Option<String>,
}

#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: u32, years_back: u32) -> Result<Vec<Article>>;
}

/// Render search results as the literature observation.
pub fn format_articles(query: &str, articles: &[Article]) -> String {
    if articles.is_empty() {
        return format!("No recent articles found for query: {query}");
    }

    let separator = "-".repeat(80);
    let body = articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let abstract_text = a.abstract_text.as_deref().unwrap_or("No abstract available");
            let excerpt: String = abstract_text.chars().take(ABSTRACT_EXCERPT_CHARS).collect();
            let ellipsis = if abstract_text.chars().count() > ABSTRACT_EXCERPT_CHARS {
                "..."
            } else {
                ""
            };
            format!(
                "[{}] {}\nAuthors: {}\nJournal: {} ({})\nPMID: {}\n\
                 URL: https://pubmed.ncbi.nlm.nih.gov/{}/\nAbstract: {excerpt}{ellipsis}\n{separator}\n",
                i + 1,
                a.title,
                a.authors,
                a.journal,
                a.year,
                a.pmid,
                a.pmid,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("PubMed Search Results for: {query}\n{}\n{body}", "=".repeat(80))
}

#[derive(Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Deserialize)]
struct ESummaryAuthor {
    name: String,
}

#[derive(Deserialize)]
struct ESummaryDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    fulljournalname: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    authors: Vec<ESummaryAuthor>,
}

/// Client for PubMed through the public E-utilities endpoints.
pub struct PubMedClient {
    api_key: Option<String>,
    email: Option<String>,
    http_client: reqwest::Client,
}

impl PubMedClient {
    pub fn new(api_key: Option<String>, email: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrewError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key,
            email,
            http_client,
        })
    }

    fn search_term(query: &str, years_back: u32, current_year: i32) -> String {
        let years_back = years_back.clamp(MIN_YEARS_BACK, MAX_YEARS_BACK);
        let min_year = current_year - years_back as i32;
        format!(
            "{query} AND ({min_year}/01/01:{current_year}/12/31[PDAT]) \
             AND {PUBLICATION_TYPE_FILTER} AND {LANGUAGE_FILTER}"
        )
    }

    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("tool", "clinical-research-crew".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
        }
        params
    }

    async fn get(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .get(format!("{EUTILS_BASE}/{endpoint}"))
            .query(&params)
            .send()
            .await
            .map_err(|e| CrewError::Literature(format!("PubMed request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrewError::Literature(format!(
                "PubMed {endpoint} returned {status}"
            )));
        }
        Ok(response)
    }

    async fn esearch(&self, term: &str, max_results: u32) -> Result<Vec<String>> {
        let mut params = self.common_params();
        params.extend([
            ("term", term.to_string()),
            ("retmax", max_results.to_string()),
            ("sort", "relevance".to_string()),
            ("retmode", "json".to_string()),
        ]);
        let parsed: ESearchResponse = self
            .get("esearch.fcgi", params)
            .await?
            .json()
            .await
            .map_err(|e| CrewError::Literature(format!("Invalid esearch response: {e}")))?;
        Ok(parsed.esearchresult.idlist)
    }

    async fn esummary(&self, ids: &[String]) -> Result<Vec<Article>> {
        let mut params = self.common_params();
        params.extend([("id", ids.join(",")), ("retmode", "json".to_string())]);
        let body: serde_json::Value = self
            .get("esummary.fcgi", params)
            .await?
            .json()
            .await
            .map_err(|e| CrewError::Literature(format!("Invalid esummary response: {e}")))?;

        let mut articles = Vec::with_capacity(ids.len());
        for pmid in ids {
            let Some(raw) = body.get("result").and_then(|r| r.get(pmid)) else {
                warn!(pmid = %pmid, "PubMed summary missing for id");
                continue;
            };
            let doc: ESummaryDoc = match serde_json::from_value(raw.clone()) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(pmid = %pmid, error = %e, "Skipping unparsable PubMed summary");
                    continue;
                }
            };
            articles.push(Article {
                pmid: pmid.clone(),
                title: non_empty(doc.title, "No title"),
                authors: format_authors(&doc.authors),
                journal: non_empty(doc.fulljournalname, "Unknown journal"),
                year: doc
                    .pubdate
                    .split_whitespace()
                    .next()
                    .map(str::to_string)
                    .unwrap_or_else(|| "Unknown year".to_string()),
                abstract_text: None,
            });
        }
        Ok(articles)
    }

    async fn abstract_text(&self, pmid: &str) -> Option<String> {
        let mut params = self.common_params();
        params.extend([
            ("id", pmid.to_string()),
            ("rettype", "abstract".to_string()),
            ("retmode", "text".to_string()),
        ]);
        let response = self.get("efetch.fcgi", params).await.ok()?;
        let text = response.text().await.ok()?;
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (!text.is_empty()).then_some(text)
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// First three authors, then `et al.`.
fn format_authors(authors: &[ESummaryAuthor]) -> String {
    if authors.is_empty() {
        return "Authors not listed".to_string();
    }
    let names = authors
        .iter()
        .take(3)
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    if authors.len() > 3 {
        format!("{names}, et al.")
    } else {
        names
    }
}

#[async_trait]
impl LiteratureSearch for PubMedClient {
    async fn search(&self, query: &str, max_results: u32, years_back: u32) -> Result<Vec<Article>> {
        let term = Self::search_term(query, years_back, chrono::Utc::now().year());
        debug!(query = %query, max_results, years_back, "Searching PubMed");

        let ids = self.esearch(&term, max_results).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut articles = self.esummary(&ids).await?;
        let abstracts = join_all(articles.iter().map(|a| self.abstract_text(&a.pmid))).await;
        for (article, abstract_text) in articles.iter_mut().zip(abstracts) {
            article.abstract_text = abstract_text;
        }
        Ok(articles)
    }
}
