//! Core data models for the legal document corpus.
//!
//! These types represent the documents, chunks, lifecycle states, and
//! search results that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a [`Document`].
///
/// ```text
/// pending ──begin──▶ processing ──success──▶ processed
///                         │
///                         └──failure──▶ error
///
/// any state ──reset──▶ pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Processed,
    Error,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::Processing,
        Status::Processed,
        Status::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Processed => "processed",
            Status::Error => "error",
        }
    }

    /// `processed` and `error` are terminal for a single pipeline pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Processed | Status::Error)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Status::Pending),
            "processing" => Ok(Status::Processing),
            "processed" => Ok(Status::Processed),
            "error" => Ok(Status::Error),
            other => Err(format!("unknown document status: '{}'", other)),
        }
    }
}

/// Fixed legal category taxonomy. Labels are opaque and matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    CivilLaw,
    TaxLaw,
    LaborLaw,
    AdministrativeLaw,
    CriminalLaw,
    FamilyLaw,
    LandLaw,
    EnvironmentalLaw,
    CustomsLaw,
    BankingLaw,
    CorporateLaw,
    IntellectualProperty,
    Other,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::CivilLaw,
        Category::TaxLaw,
        Category::LaborLaw,
        Category::AdministrativeLaw,
        Category::CriminalLaw,
        Category::FamilyLaw,
        Category::LandLaw,
        Category::EnvironmentalLaw,
        Category::CustomsLaw,
        Category::BankingLaw,
        Category::CorporateLaw,
        Category::IntellectualProperty,
        Category::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::CivilLaw => "Civil Law",
            Category::TaxLaw => "Tax Law",
            Category::LaborLaw => "Labor Law",
            Category::AdministrativeLaw => "Administrative Law",
            Category::CriminalLaw => "Criminal Law",
            Category::FamilyLaw => "Family Law",
            Category::LandLaw => "Land Law",
            Category::EnvironmentalLaw => "Environmental Law",
            Category::CustomsLaw => "Customs Law",
            Category::BankingLaw => "Banking Law",
            Category::CorporateLaw => "Corporate Law",
            Category::IntellectualProperty => "Intellectual Property",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.label() == s)
            .ok_or_else(|| format!("unknown category: '{}'", s))
    }
}

impl TryFrom<String> for Category {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.label().to_string()
    }
}

/// A unit of ingested legal text with lifecycle status.
///
/// Timestamps are Unix seconds. `embedding` is `None` until the pipeline
/// reaches `processed`; `chunks` is empty until then.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub source: String,
    pub filename: String,
    pub owner_id: String,
    pub status: Status,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<Chunk>,
}

/// A paragraph-bounded segment of a document's text.
///
/// `start_offset..end_offset` is a half-open character range into the
/// parent's content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub start_offset: i64,
    pub end_offset: i64,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Short form returned by `submit`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub title: String,
    pub category: Category,
    pub status: Status,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            title: doc.title.clone(),
            category: doc.category,
            status: doc.status,
        }
    }
}

/// A ranked retrieval hit. Produced fresh per query, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document_id: String,
    pub title: String,
    pub category: Category,
    pub source: String,
    pub created_at: i64,
    pub score: f64,
    pub excerpt: String,
}

/// Aggregate counts over the corpus.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub total: i64,
    pub by_status: Vec<(String, i64)>,
    pub by_category: Vec<(String, i64)>,
}
