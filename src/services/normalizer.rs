use std::collections::HashMap;
use std::path::Path;

use crate::domain::contact::EnrichedContact;
use crate::domain::email::{clean_email, find_candidate_emails, is_valid_email, SeenEmails};
use crate::domain::enrich::{parse_address, parse_amenities, parse_owner, strip_link_params};

use super::RunError;

/// Counters reported after a normalization run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct NormalizeReport {
    pub rows_processed: u64,
    pub emails_found: u64,
    pub emails_rejected: u64,
}

/// Reads the raw scraping export and writes one enriched row per valid,
/// previously unseen e-mail address.
pub fn normalize_csv(input: &Path, output: &Path) -> Result<NormalizeReport, RunError> {
    if !input.exists() {
        return Err(RunError::InputNotFound(input.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(input)?;
    let mut writer = csv::Writer::from_path(output)?;

    let mut report = NormalizeReport::default();
    let mut seen = SeenEmails::new();

    for row in reader.deserialize::<HashMap<String, String>>() {
        let row = row?;
        report.rows_processed += 1;

        let emails_str = row.get("emails").map(String::as_str).unwrap_or("");
        if emails_str.is_empty() {
            if report.rows_processed <= 5 {
                log::warn!("Empty emails column at row {}", report.rows_processed);
            }
            continue;
        }

        let candidates = find_candidate_emails(emails_str);
        if candidates.is_empty() {
            if report.rows_processed <= 5 {
                log::warn!("No email found at row {}", report.rows_processed);
            }
            continue;
        }

        for candidate in candidates {
            let email = clean_email(&candidate);

            match !is_valid_email(&email) || !seen.insert(&email) {
                true => report.emails_rejected += 1,
                false => {
                    report.emails_found += 1;
                    let contact = build_contact(email, &row, report.rows_processed);
                    writer.serialize(contact)?;
                }
            }
        }
    }

    writer.flush()?;

    Ok(report)
}

fn field<'a>(row: &'a HashMap<String, String>, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or("")
}

fn build_contact(email: String, row: &HashMap<String, String>, row_number: u64) -> EnrichedContact {
    let owner = match parse_owner(field(row, "owner")) {
        Ok(owner) => owner,
        Err(e) => {
            if row_number <= 2 {
                log::warn!("Failed to decode owner at row {}: {}", row_number, e);
            }
            Default::default()
        }
    };

    let address = match parse_address(field(row, "complete_address")) {
        Ok(address) => address,
        Err(e) => {
            if row_number <= 2 {
                log::warn!(
                    "Failed to decode complete_address at row {}: {}",
                    row_number,
                    e
                );
            }
            Default::default()
        }
    };

    let link = field(row, "link");

    EnrichedContact {
        email,
        title: field(row, "title").to_string(),
        category: field(row, "category").to_string(),
        owner_id: owner.id,
        owner_name: owner.name,
        street: address.street,
        city: address.city,
        postal_code: address.postal_code,
        country: address.country,
        has_wheelchair_accessible_parking: parse_amenities(field(row, "about")).to_string(),
        address: field(row, "address").to_string(),
        website: field(row, "website").to_string(),
        phone: field(row, "phone").to_string(),
        link: link.to_string(),
        clean_link: strip_link_params(link),
    }
}
