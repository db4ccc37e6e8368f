use std::fmt;
use std::str::FromStr;

use chrono::SecondsFormat;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

pub const ABS_URL_PREFIX: &str = "http://arxiv.org/abs/";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperLink {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub published: String,
    pub updated: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub links: Vec<PaperLink>,
}

impl Paper {
    pub fn identity_key(&self) -> String {
        identity_key(&self.id, &self.title, &self.published)
    }

    pub fn pdf_url(&self) -> Option<String> {
        self.links
            .iter()
            .find(|link| link.link_type == "application/pdf" && !link.href.is_empty())
            .or_else(|| {
                self.links
                    .iter()
                    .find(|link| link.rel == "related" && !link.href.is_empty())
            })
            .map(|link| link.href.clone())
            .or_else(|| {
                (!self.id.is_empty()).then(|| format!("https://arxiv.org/pdf/{}", self.id))
            })
    }
}

pub fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn identity_key(id: &str, title: &str, published: &str) -> String {
    if !id.is_empty() {
        return id.to_string();
    }
    format!("{title}::{published}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    All,
    Ti,
    Au,
    Abs,
    Co,
    Jr,
    Cat,
    Rn,
    Id,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::All => "all",
            FieldType::Ti => "ti",
            FieldType::Au => "au",
            FieldType::Abs => "abs",
            FieldType::Co => "co",
            FieldType::Jr => "jr",
            FieldType::Cat => "cat",
            FieldType::Rn => "rn",
            FieldType::Id => "id",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(FieldType::All),
            "ti" => Ok(FieldType::Ti),
            "au" => Ok(FieldType::Au),
            "abs" => Ok(FieldType::Abs),
            "co" => Ok(FieldType::Co),
            "jr" => Ok(FieldType::Jr),
            "cat" => Ok(FieldType::Cat),
            "rn" => Ok(FieldType::Rn),
            "id" => Ok(FieldType::Id),
            _ => Err(HarvestError::InvalidInput(format!("unknown field type: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "ANDNOT")]
    AndNot,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::And => write!(f, "AND"),
            Operator::Or => write!(f, "OR"),
            Operator::AndNot => write!(f, "ANDNOT"),
        }
    }
}

impl FromStr for Operator {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Operator::And),
            "OR" => Ok(Operator::Or),
            "ANDNOT" | "NOT" => Ok(Operator::AndNot),
            _ => Err(HarvestError::InvalidInput(format!("unknown operator: {value}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub field: FieldType,
    pub keyword: String,
    #[serde(default)]
    pub operator: Option<Operator>,
}

impl Condition {
    pub fn new(field: FieldType, keyword: impl Into<String>) -> Self {
        Self {
            field,
            keyword: keyword.into(),
            operator: None,
        }
    }

    pub fn with_operator(mut self, operator: Operator) -> Self {
        self.operator = Some(operator);
        self
    }
}

impl FromStr for Condition {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let (operator, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, tail)) => match head.parse::<Operator>() {
                Ok(op) => (Some(op), tail.trim_start()),
                Err(_) => (None, trimmed),
            },
            None => (None, trimmed),
        };

        let (field, keyword) = match rest.split_once(':') {
            Some((prefix, keyword)) => match prefix.parse::<FieldType>() {
                Ok(field) => (field, keyword),
                Err(_) => (FieldType::All, rest),
            },
            None => (FieldType::All, rest),
        };

        if keyword.trim().is_empty() {
            return Err(HarvestError::InvalidInput(format!(
                "condition has no keyword: {value}"
            )));
        }

        Ok(Self {
            field,
            keyword: keyword.trim().to_string(),
            operator,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Simple,
    Advanced,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Simple => write!(f, "simple"),
            SearchType::Advanced => write!(f, "advanced"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryPayload {
    Simple {
        conditions: Vec<Condition>,
        #[serde(rename = "maxResults")]
        max_results: u32,
    },
    Advanced {
        query: String,
        #[serde(rename = "maxResults")]
        max_results: u32,
    },
}

impl QueryPayload {
    pub fn search_type(&self) -> SearchType {
        match self {
            QueryPayload::Simple { .. } => SearchType::Simple,
            QueryPayload::Advanced { .. } => SearchType::Advanced,
        }
    }

    pub fn max_results(&self) -> u32 {
        match self {
            QueryPayload::Simple { max_results, .. } | QueryPayload::Advanced { max_results, .. } => {
                *max_results
            }
        }
    }
}
