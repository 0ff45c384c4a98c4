//! Keyword intent classification for partner replies.

use crate::model::ReplyClassification;

/// Ordered classification rules. The first rule with a keyword present wins.
///
/// Matching is a plain case-insensitive substring test, so "incorrect"
/// also contains "correct" and classifies as confirmed.
const RULES: &[(ReplyClassification, &[&str])] = &[
    (
        ReplyClassification::Confirmed,
        &[
            "confirm", "agree", "accept", "correct", "ok", "da", "acord", "corect", "confirmăm",
            "de acord",
        ],
    ),
    (
        ReplyClassification::Disputed,
        &[
            "dispute", "disagree", "incorrect", "wrong", "nu", "contest", "incorect", "greșit",
            "gresit",
        ],
    ),
    (
        ReplyClassification::Corrections,
        &[
            "correction",
            "modify",
            "change",
            "update",
            "corecție",
            "corectie",
            "modificare",
            "schimbare",
        ],
    ),
];

/// Classifies a reply from its subject and body.
pub fn classify(subject: &str, body: &str) -> ReplyClassification {
    let haystack = format!("{} {}", subject, body).to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| haystack.contains(k)))
        .map(|(classification, _)| *classification)
        .unwrap_or(ReplyClassification::GeneralResponse)
}
