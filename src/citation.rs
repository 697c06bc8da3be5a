//! Collating model answers with their highlight regions
//!
//! A model answers a fixed list of questions and, for each one, quotes the
//! line it relied on. Each quoted line is located in the document so a
//! viewer can highlight it next to the answer.

use crate::extractor::{extract_pages_mem, Page};
use crate::locator::{locate_with_config, LocatorConfig, MatchResult};
use crate::PdfError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A question put to the model, identified by a stable key (e.g. `q_1`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub key: String,
    pub text: String,
}

impl Question {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// The model's answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAnswer {
    pub answer: String,
    /// Snippet quoted from the document in support of the answer
    pub line: String,
}

/// Model answers keyed by question key
///
/// Serialized as a plain JSON object: `{"q_1": {"answer": .., "line": ..}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSheet {
    pub answers: BTreeMap<String, ModelAnswer>,
}

impl AnswerSheet {
    pub fn from_json(json: &str) -> Result<Self, PdfError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn get(&self, key: &str) -> Option<&ModelAnswer> {
        self.answers.get(key)
    }
}

/// A question, the model's answer and where its quote sits in the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedAnswer {
    pub question: String,
    pub answer: String,
    pub pdf_highlight: MatchResult,
}

/// Locate every answer's quoted line in already extracted pages
///
/// Output follows the order of `questions`. Fails if the sheet has no
/// answer for one of the questions.
pub fn collate_answers(
    pages: &[Page],
    questions: &[Question],
    sheet: &AnswerSheet,
    config: &LocatorConfig,
) -> Result<Vec<CitedAnswer>, PdfError> {
    let answered = questions
        .iter()
        .map(|q| {
            sheet
                .get(&q.key)
                .map(|a| (q, a))
                .ok_or_else(|| PdfError::MissingAnswer(q.key.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!("collating {} answers", answered.len());

    Ok(answered
        .into_par_iter()
        .map(|(question, answer)| CitedAnswer {
            question: question.text.clone(),
            answer: answer.answer.clone(),
            pdf_highlight: locate_with_config(pages, &answer.line, config),
        })
        .collect())
}

/// Extract the document once, then collate every answer against it
pub fn collate_answers_mem(
    buffer: &[u8],
    questions: &[Question],
    sheet: &AnswerSheet,
    config: &LocatorConfig,
) -> Result<Vec<CitedAnswer>, PdfError> {
    let pages = extract_pages_mem(buffer)?;
    collate_answers(&pages, questions, sheet, config)
}
