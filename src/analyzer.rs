//! Pure page analysis: derive a category label and a title from a response
//! body. No I/O, no shared state.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Page category derived from body keywords.
///
/// Matching is first-match-wins in the declaration order below; a body that
/// looks like both a login page and an admin panel is a login page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageCategory {
    Login,
    AdminPanel,
    Api,
    Upload,
}

impl PageCategory {
    pub fn label(&self) -> &'static str {
        match self {
            PageCategory::Login => "login page",
            PageCategory::AdminPanel => "admin panel",
            PageCategory::Api => "API endpoint",
            PageCategory::Upload => "upload page",
        }
    }
}

impl fmt::Display for PageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const LOGIN_KEYWORDS: &[&str] = &[
    "sign in",
    "signin",
    "log in",
    "login",
    "username",
    "password",
    "login_form",
    "type=\"password\"",
];

const ADMIN_KEYWORDS: &[&str] = &[
    "admin",
    "manage",
    "dashboard",
    "console",
    "control panel",
    "cpanel",
];

const API_KEYWORDS: &[&str] = &["api", "swagger", "graphql", "endpoint"];

const UPLOAD_KEYWORDS: &[&str] = &["upload", "type=\"file\"", "multipart/form-data"];

/// Classify a body and extract its title in one pass.
pub fn analyze(body: &str) -> (Option<PageCategory>, String) {
    (detect_category(body), extract_title(body))
}

/// First-match-priority category detection over fixed keyword lists.
pub fn detect_category(body: &str) -> Option<PageCategory> {
    let lower = body.to_lowercase();

    if contains_any(&lower, LOGIN_KEYWORDS) {
        return Some(PageCategory::Login);
    }
    if contains_any(&lower, ADMIN_KEYWORDS) {
        return Some(PageCategory::AdminPanel);
    }
    let trimmed = body.trim_start();
    if contains_any(&lower, API_KEYWORDS) || trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(PageCategory::Api);
    }
    if contains_any(&lower, UPLOAD_KEYWORDS) {
        return Some(PageCategory::Upload);
    }

    None
}

/// Trimmed text of the first `<title>` element, or empty.
pub fn extract_title(body: &str) -> String {
    static TITLE: OnceLock<Regex> = OnceLock::new();
    let re = TITLE.get_or_init(|| {
        Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern is valid")
    });

    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}
