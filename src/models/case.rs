//! Case-level metadata scraped from the page header.

use serde::{Deserialize, Serialize};

use crate::utils::sanitize_filename;

/// Case number and protected person name, used only to name the output root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseMetadata {
    pub case_number: String,
    pub person_name: String,
}

impl CaseMetadata {
    pub fn new(case_number: impl Into<String>, person_name: impl Into<String>) -> Self {
        Self {
            case_number: case_number.into(),
            person_name: person_name.into(),
        }
    }

    /// Root output directory: `{site_prefix}-cases/{case_number}-{person_name}`.
    pub fn root_dir(&self, site_prefix: &str) -> String {
        format!(
            "{}-cases/{}-{}",
            site_prefix,
            sanitize_filename(&self.case_number),
            sanitize_filename(&self.person_name)
        )
    }
}
