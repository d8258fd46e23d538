//! File-type classification
//!
//! Rules are checked in order and the first rule with any matching keyword
//! decides the type, so a file type mentioning both "executable" and "zip"
//! is an executable.

use crate::models::SampleType;

/// A sample type and the file-type keywords that select it
#[derive(Debug, Clone, Copy)]
pub struct ClassificationRule {
    pub sample_type: SampleType,
    /// Lower-case substrings
    pub keywords: &'static [&'static str],
}

/// Default rule table
pub const CLASSIFICATION_RULES: &[ClassificationRule] = &[
    ClassificationRule {
        sample_type: SampleType::Executable,
        keywords: &["pe32", "elf", "mach-o", "ms-dos", "executable"],
    },
    ClassificationRule {
        sample_type: SampleType::Document,
        keywords: &[
            "pdf",
            "doc",
            "rtf",
            "microsoft office",
            "microsoft excel",
            "microsoft powerpoint",
        ],
    },
    ClassificationRule {
        sample_type: SampleType::Archive,
        keywords: &["zip", "archive", "rar", "gzip", "7-zip", "tar"],
    },
];

/// Classify with [`CLASSIFICATION_RULES`]
pub fn classify(file_type: Option<&str>) -> SampleType {
    classify_with(CLASSIFICATION_RULES, file_type)
}

/// Classify with a caller-supplied rule table
pub fn classify_with(rules: &[ClassificationRule], file_type: Option<&str>) -> SampleType {
    let Some(file_type) = file_type else {
        return SampleType::Unknown;
    };
    let file_type = file_type.to_lowercase();

    rules
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| file_type.contains(kw)))
        .map(|rule| rule.sample_type)
        .unwrap_or(SampleType::Unknown)
}
