//! Inbound lead parser.
//!
//! Turns the semi-structured field list of a lead message (embed fields from
//! the chat feed, or the answers of a web form submission) into a
//! [`LeadDraft`]. Parsing is total: a missing or malformed field degrades to
//! its default instead of failing, so one bad message never aborts a scan.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Sentinel stored for string fields the source did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

/// One name/value pair as delivered by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadField {
    pub name: String,
    pub value: String,
}

impl LeadField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Provenance tag fixed at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeadType {
    #[default]
    Warm,
    Hot,
    QuotePhish,
}

impl LeadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadType::Warm => "warm",
            LeadType::Hot => "hot",
            LeadType::QuotePhish => "quote-phish",
        }
    }

    /// Classify a message title. Anything unrecognized is a warm lead.
    pub fn from_title(title: Option<&str>) -> Self {
        let Some(title) = title else {
            return LeadType::Warm;
        };
        let normalized = normalize_key(title);
        if normalized == "hot lead" {
            LeadType::Hot
        } else if normalized.contains("phish") {
            LeadType::QuotePhish
        } else {
            LeadType::Warm
        }
    }
}

impl fmt::Display for LeadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_key(s).as_str() {
            "warm" => Ok(LeadType::Warm),
            "hot" => Ok(LeadType::Hot),
            "quote phish" | "quotephish" => Ok(LeadType::QuotePhish),
            _ => Err(format!("Unknown lead type: {}", s)),
        }
    }
}

/// Normalized lead fields ready for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadDraft {
    pub name: String,
    pub phone: String,
    pub gender: String,
    pub age: Option<i64>,
    pub zip_code: String,
    pub lead_type: LeadType,
}

impl Default for LeadDraft {
    fn default() -> Self {
        Self {
            name: NOT_AVAILABLE.to_string(),
            phone: NOT_AVAILABLE.to_string(),
            gender: NOT_AVAILABLE.to_string(),
            age: None,
            zip_code: NOT_AVAILABLE.to_string(),
            lead_type: LeadType::Warm,
        }
    }
}

// Accepted labels per field, in normalized form. Form providers disagree on
// casing and separators, so labels are compared after `normalize_key`.
const NAME_KEYS: &[&str] = &["name", "full name", "fullname", "lead name"];
const FIRST_NAME_KEYS: &[&str] = &["first name", "firstname", "first"];
const LAST_NAME_KEYS: &[&str] = &["last name", "lastname", "last", "surname"];
const PHONE_KEYS: &[&str] = &["phone", "phone number", "phonenumber", "mobile", "cell"];
const GENDER_KEYS: &[&str] = &["gender", "sex"];
const AGE_KEYS: &[&str] = &["age"];
const ZIP_KEYS: &[&str] = &["zip", "zip code", "zipcode", "postal code", "postcode"];

fn re_separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s_\-]+").unwrap())
}

fn normalize_key(raw: &str) -> String {
    re_separators()
        .replace_all(raw.trim(), " ")
        .trim()
        .to_lowercase()
}

/// Case-insensitive lookup; the first field whose label matches any alias wins.
/// Blank values count as missing.
fn lookup<'a>(fields: &'a [LeadField], aliases: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .find(|f| aliases.contains(&normalize_key(&f.name).as_str()))
        .map(|f| f.value.trim())
        .filter(|v| !v.is_empty())
}

fn text_or_default(value: Option<&str>) -> String {
    value.unwrap_or(NOT_AVAILABLE).to_string()
}

/// Parse an age value. Only purely numeric input yields a number;
/// anything else (including out-of-range digits) becomes `None`.
pub fn parse_age(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<i64>() {
        Ok(age) => Some(age),
        Err(e) => {
            log::debug!("Discarding age {:?}: {}", raw, e);
            None
        }
    }
}

fn resolve_name(fields: &[LeadField]) -> String {
    if let Some(name) = lookup(fields, NAME_KEYS) {
        return name.to_string();
    }
    let first = lookup(fields, FIRST_NAME_KEYS);
    let last = lookup(fields, LAST_NAME_KEYS);
    if first.is_none() && last.is_none() {
        return NOT_AVAILABLE.to_string();
    }
    // A missing side leaves a dangling space; callers treat that as fine.
    format!("{} {}", first.unwrap_or(""), last.unwrap_or(""))
}

/// Parse a field list plus optional title into a draft record.
pub fn parse_lead(fields: &[LeadField], title: Option<&str>) -> LeadDraft {
    LeadDraft {
        name: resolve_name(fields),
        phone: text_or_default(lookup(fields, PHONE_KEYS)),
        gender: text_or_default(lookup(fields, GENDER_KEYS)),
        age: lookup(fields, AGE_KEYS).and_then(parse_age),
        zip_code: text_or_default(lookup(fields, ZIP_KEYS)),
        lead_type: LeadType::from_title(title),
    }
}

/// A form submission handed over by the webhook layer.
///
/// Providers send either a `title` or a `formName`; either classifies the lead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubmission {
    #[serde(default, alias = "formName")]
    pub title: Option<String>,
    #[serde(default, alias = "answers")]
    pub fields: Vec<LeadField>,
}

/// Parse a raw JSON webhook body.
///
/// Accepts either `{title, fields:[{name,value}]}` or a flat
/// `{"First Name": "...", ...}` object. A body that is neither still yields
/// the defaulted draft.
pub fn parse_webhook_body(body: &str) -> LeadDraft {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Webhook body is not JSON, defaulting lead: {}", e);
            return LeadDraft::default();
        }
    };

    if value.get("fields").is_some() || value.get("answers").is_some() {
        match serde_json::from_value::<WebhookSubmission>(value) {
            Ok(sub) => return parse_lead(&sub.fields, sub.title.as_deref()),
            Err(e) => {
                log::warn!("Malformed webhook submission, defaulting lead: {}", e);
                return LeadDraft::default();
            }
        }
    }

    let Some(obj) = value.as_object() else {
        log::warn!("Webhook body is not an object, defaulting lead");
        return LeadDraft::default();
    };
    let title = obj
        .get("title")
        .or_else(|| obj.get("formName"))
        .and_then(|v| v.as_str());
    // Body order, so the first alias present wins (serde_json `preserve_order`).
    let fields: Vec<LeadField> = obj
        .iter()
        .filter_map(|(k, v)| {
            let value = match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(LeadField::new(k.clone(), value))
        })
        .collect();
    parse_lead(&fields, title)
}
