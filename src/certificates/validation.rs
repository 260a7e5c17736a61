// Input validation for issuance and updates. All problems are collected so a
// caller can fix a request in one round trip.
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use super::types::{NewCertificate, UpdateCertificate, UploadedFile};
use crate::artifact::ArtifactFormat;
use crate::db::{Certificate, CertificateStatus, CertificateType};
use crate::error::{CertError, FieldError};
use crate::raster::{parse_hex_color, CertificateDesign, MAX_FONT_SIZE, MIN_FONT_SIZE};

const MAX_TITLE: usize = 200;
const MAX_NAME: usize = 200;
const MAX_EMAIL: usize = 254;
const MAX_DESCRIPTION: usize = 2000;
const ACCEPTED_UPLOADS: &[&str] = &["application/pdf", "image/png", "image/jpeg"];

static EMAIL: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap())
}

/// Issuance input after validation.
#[derive(Debug, Clone)]
pub struct ValidCertificate {
    pub institution_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub recipient_name: String,
    pub recipient_email: String,
    pub certificate_type: CertificateType,
    pub issue_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
    pub status: CertificateStatus,
    pub format: Option<ArtifactFormat>,
    pub design: CertificateDesign,
}

#[derive(Default)]
struct Problems(Vec<FieldError>);

impl Problems {
    fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    fn required_text(&mut self, field: &str, value: &str, max: usize) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, "is required");
        } else if value.chars().count() > max {
            self.add(field, format!("must be at most {} characters", max));
        }
        value.to_string()
    }

    fn email(&mut self, field: &str, value: &str) -> String {
        let value = self.required_text(field, value, MAX_EMAIL);
        if !value.is_empty() && !email_regex().is_match(&value) {
            self.add(field, "is not a valid email address");
        }
        value
    }

    fn date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        if value.is_empty() {
            self.add(field, "is required");
            return None;
        }
        match parse_date(value) {
            Some(date) => Some(date),
            None => {
                self.add(field, "must be a date in YYYY-MM-DD format");
                None
            }
        }
    }

    fn date_order(&mut self, issue: Option<NaiveDate>, expiry: Option<NaiveDate>) {
        if let (Some(issue), Some(expiry)) = (issue, expiry) {
            if expiry < issue {
                self.add("expiry_date", "must not be before issue_date");
            }
        }
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, CertError> {
        if self.0.is_empty() {
            Ok(value())
        } else {
            Err(CertError::Validation(self.0))
        }
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn validate_new(
    input: &NewCertificate,
    upload: Option<&UploadedFile>,
    max_upload_bytes: usize,
) -> Result<ValidCertificate, CertError> {
    let mut problems = Problems::default();

    if input.institution_id.is_none() {
        problems.add("institution_id", "is required");
    }
    let title = problems.required_text("title", &input.title, MAX_TITLE);
    let recipient_name = problems.required_text("recipient_name", &input.recipient_name, MAX_NAME);
    let recipient_email = problems.email("recipient_email", &input.recipient_email);

    let description = optional_text(input.description.as_deref());
    if description
        .as_ref()
        .map_or(false, |d| d.chars().count() > MAX_DESCRIPTION)
    {
        problems.add(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION),
        );
    }

    let issue_date = problems.date("issue_date", &input.issue_date);
    let expiry_date = match optional_text(input.expiry_date.as_deref()) {
        Some(value) => problems.date("expiry_date", &value),
        None => None,
    };
    problems.date_order(issue_date, expiry_date);

    let status = input.status.unwrap_or(CertificateStatus::Issued);
    if !matches!(status, CertificateStatus::Pending | CertificateStatus::Issued) {
        problems.add("status", "new certificates must be pending or issued");
    }

    let design = input.design.clone().unwrap_or_default();
    validate_design(&mut problems, &design);

    if let Some(file) = upload {
        if file.bytes.is_empty() {
            problems.add("file", "is empty");
        } else if file.bytes.len() > max_upload_bytes {
            problems.add("file", format!("exceeds {} bytes", max_upload_bytes));
        }
        if !ACCEPTED_UPLOADS.contains(&file.content_type.as_str()) {
            problems.add("file", "must be a PDF, PNG or JPEG");
        }
    }

    problems.finish(|| ValidCertificate {
        institution_id: input.institution_id.unwrap_or_default(),
        title,
        description,
        recipient_name,
        recipient_email,
        certificate_type: input.certificate_type,
        issue_date: issue_date.unwrap_or_default(),
        expiry_date,
        status,
        format: input.format,
        design,
    })
}

fn validate_design(problems: &mut Problems, design: &CertificateDesign) {
    for (field, value) in [
        ("design.background_color", &design.background_color),
        ("design.text_color", &design.text_color),
        ("design.accent_color", &design.accent_color),
        ("design.border_color", &design.border_color),
    ] {
        if parse_hex_color(value).is_none() {
            problems.add(field, "must be a hex color like #1f2937");
        }
    }
    if !(MIN_FONT_SIZE..=MAX_FONT_SIZE).contains(&design.font_size) {
        problems.add(
            "design.font_size",
            format!("must be between {} and {}", MIN_FONT_SIZE, MAX_FONT_SIZE),
        );
    }
    if design.show_logo && design.logo_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
        problems.add("design.logo_url", "is required when show_logo is set");
    }
}

/// Apply `patch` to a copy of `existing`. Identity, hash, institution and
/// artifact are carried over untouched.
pub fn apply_update(
    existing: &Certificate,
    patch: &UpdateCertificate,
) -> Result<Certificate, CertError> {
    let mut problems = Problems::default();
    let mut updated = existing.clone();

    if let Some(title) = &patch.title {
        updated.title = problems.required_text("title", title, MAX_TITLE);
    }
    if let Some(description) = &patch.description {
        updated.description = optional_text(Some(description.as_str()));
        if updated
            .description
            .as_ref()
            .map_or(false, |d| d.chars().count() > MAX_DESCRIPTION)
        {
            problems.add(
                "description",
                format!("must be at most {} characters", MAX_DESCRIPTION),
            );
        }
    }
    if let Some(name) = &patch.recipient_name {
        updated.recipient_name = problems.required_text("recipient_name", name, MAX_NAME);
    }
    if let Some(email) = &patch.recipient_email {
        updated.recipient_email = problems.email("recipient_email", email);
    }
    if let Some(kind) = patch.certificate_type {
        updated.certificate_type = kind;
    }

    let mut issue = Some(existing.issue_date);
    if let Some(value) = &patch.issue_date {
        issue = problems.date("issue_date", value);
    }
    let mut expiry = existing.expiry_date;
    if let Some(value) = &patch.expiry_date {
        expiry = match optional_text(Some(value.as_str())) {
            Some(v) => problems.date("expiry_date", &v),
            None => None,
        };
    }
    problems.date_order(issue, expiry);
    updated.issue_date = issue.unwrap_or(existing.issue_date);
    updated.expiry_date = expiry;

    if let Some(next) = patch.status {
        if !existing.status.can_transition_to(next) {
            problems.add(
                "status",
                format!("cannot change from {} to {}", existing.status, next),
            );
        }
        updated.status = next;
    }

    problems.finish(|| updated)
}
