use std::borrow::Cow;
use std::collections::HashSet;

use percent_encoding::percent_decode_str;
use regex::Regex;

const INVALID_EXTENSIONS: [&str; 9] = [
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".tiff", ".webp", ".svg", ".ico",
];

const GENERIC_EMAILS: [&str; 15] = [
    "example@",
    "exemple@",
    "sample@",
    "test@",
    "demo@",
    "@example.",
    "@exemple.",
    "@sample.",
    "@test.",
    "@demo.",
    "john.doe@",
    "jane.doe@",
    "user@",
    "info@example",
    "contact@example",
];

/// Scans free-form text for anything shaped like an e-mail address. The
/// pattern is deliberately permissive, strict validation happens afterwards
/// in [`is_valid_email`].
pub fn find_candidate_emails(text: &str) -> Vec<String> {
    let email_regex =
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z0-9]{2,}").unwrap();

    email_regex
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Undoes URL-encoding and strips every space from a raw candidate.
pub fn clean_email(email: &str) -> String {
    let decoded: Cow<str> = match email.contains('%') {
        true => percent_decode_str(email).decode_utf8_lossy(),
        false => Cow::Borrowed(email),
    };

    decoded.trim().replace(' ', "")
}

pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 {
        return false;
    }

    let email_lower = email.to_lowercase();
    if INVALID_EXTENSIONS
        .iter()
        .any(|ext| email_lower.ends_with(ext))
    {
        return false;
    }

    let strict_regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap();
    if !strict_regex.is_match(email) {
        return false;
    }

    let parts: Vec<&str> = email.split('@').collect();
    let [local, domain] = parts.as_slice() else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }

    let domain_parts: Vec<&str> = domain.split('.').collect();
    let Some(tld) = domain_parts.last() else {
        return false;
    };
    if domain_parts.len() < 2 || tld.len() < 2 {
        return false;
    }
    if tld.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    if GENERIC_EMAILS.iter().any(|g| email_lower.contains(g)) {
        return false;
    }

    if email_lower.contains("sentry") {
        return false;
    }

    true
}

/// Case-insensitive set of addresses already emitted during a run.
#[derive(Default)]
pub struct SeenEmails {
    seen: HashSet<String>,
}

impl SeenEmails {
    pub fn new() -> Self {
        SeenEmails {
            seen: HashSet::new(),
        }
    }

    /// Returns true if the address was not seen before.
    pub fn insert(&mut self, email: &str) -> bool {
        self.seen.insert(email.to_lowercase())
    }

    pub fn contains(&self, email: &str) -> bool {
        self.seen.contains(&email.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_multiple_candidates_in_noisy_text() {
        let text = "Contact: mailto:jean.dupont@exemple-entreprise.fr ou \
                    commercial@atelier-bois.com (devis), logo%20final@site.png";
        let candidates = find_candidate_emails(text);

        assert!(candidates.contains(&"jean.dupont@exemple-entreprise.fr".to_string()));
        assert!(candidates.contains(&"commercial@atelier-bois.com".to_string()));
    }

    #[test]
    fn cleans_url_encoded_address() {
        assert_eq!(
            clean_email("john%40doe @ example.com"),
            "john@doe@example.com"
        );
        assert_eq!(clean_email("  plain@mail.fr  "), "plain@mail.fr");
    }

    #[test]
    fn minimal_address_is_valid() {
        assert!(is_valid_email("a@b.co"));
    }

    #[test]
    fn rejects_image_paths() {
        assert!(!is_valid_email("logo@site.png"));
        assert!(!is_valid_email("header@assets.SVG"));
    }

    #[test]
    fn rejects_generic_placeholders() {
        assert!(!is_valid_email("test@example.com"));
        assert!(!is_valid_email("john.doe@societe.fr"));
        assert!(!is_valid_email("USER@company.fr"));
    }

    #[test]
    fn rejects_numeric_tld() {
        assert!(!is_valid_email("x@y.123"));
    }

    #[test]
    fn rejects_too_short_and_double_at() {
        assert!(!is_valid_email("ab"));
        assert!(!is_valid_email("john@doe@example.com"));
    }

    #[test]
    fn rejects_error_tracker_addresses() {
        assert!(!is_valid_email("a1b2c3@ingest.sentry.io"));
    }

    #[test]
    fn seen_set_is_case_insensitive() {
        let mut seen = SeenEmails::new();
        assert!(seen.insert("Contact@Entreprise.fr"));
        assert!(!seen.insert("contact@entreprise.fr"));
        assert!(seen.contains("CONTACT@ENTREPRISE.FR"));
    }
}
