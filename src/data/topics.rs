use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::error::{DataLoadError, SchemaError};
use super::loader::guess_value_type;
use super::model::Value;

/// Smallest and largest font size of the rescaled word weights.
pub const MIN_FONT_SIZE: f64 = 18.0;
pub const MAX_FONT_SIZE: f64 = 45.0;

/// Common Arabic stopwords the topic model left behind.
pub const STOPWORDS: [&str; 13] = [
    "ها", "نا", "ال", "وا", "عن", "في", "من", "الى", "على", "و", "هو", "هي", "ذلك",
];

const TOPIC_LABELS: [&str; 10] = [
    "Airstrikes / Military",
    "Lebanese Legal Affairs",
    "Security / Surveillance",
    "Judicial Proceedings",
    "Home Raids / Arrests",
    "Military / Clashes",
    "Torture / Abuse",
    "Jordan / Political / Media",
    "Threats / Harassment",
    "Detainment Sites / Testimonies",
];

/// Human label of a topic number, if it has one.
pub fn topic_label(topic: i64) -> Option<&'static str> {
    usize::try_from(topic)
        .ok()
        .and_then(|i| TOPIC_LABELS.get(i))
        .copied()
}

#[derive(Debug, Deserialize)]
struct TopicWordRow {
    #[serde(rename = "Topic")]
    topic: String,
    #[serde(rename = "Word")]
    word: String,
    #[serde(rename = "Weight")]
    weight: String,
}

/// A labelled topic word with its display size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicWord {
    pub topic: i64,
    pub label: &'static str,
    pub word: String,
    pub weight: f64,
    pub font_size: f64,
}

/// The cleaned topic lexicon. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct TopicLexicon {
    words: Vec<TopicWord>,
}

impl TopicLexicon {
    /// Load `Topic,Word,Weight` rows from a CSV file.
    pub fn load(path: &Path) -> Result<Self, DataLoadError> {
        std::fs::metadata(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let malformed = |err: anyhow::Error| DataLoadError::Malformed {
            path: path.to_path_buf(),
            reason: format!("{err:#}"),
        };

        let mut reader = csv::Reader::from_path(path)
            .context("opening topic CSV")
            .map_err(malformed)?;
        let headers = reader
            .headers()
            .context("reading topic CSV headers")
            .map_err(malformed)?
            .clone();
        for required in ["Topic", "Word", "Weight"] {
            if !headers.iter().any(|h| h == required) {
                return Err(SchemaError::MissingColumn {
                    column: required.to_string(),
                    source_name: path.display().to_string(),
                }
                .into());
            }
        }

        let mut entries = Vec::new();
        for (row_no, result) in reader.deserialize::<TopicWordRow>().enumerate() {
            let row = result
                .with_context(|| format!("topic CSV row {row_no}"))
                .map_err(malformed)?;
            let topic = match guess_value_type(&row.topic) {
                Value::Integer(i) => Some(i),
                Value::Float(f) if f.fract() == 0.0 => Some(f as i64),
                _ => None,
            };
            let weight = row.weight.trim().parse::<f64>().ok().filter(|w| w.is_finite());
            match (topic, weight) {
                (Some(topic), Some(weight)) => entries.push((topic, row.word, weight)),
                _ => log::debug!("{}: skipping topic row {row_no}", path.display()),
            }
        }

        let lexicon = Self::from_entries(entries);
        log::info!(
            "loaded {} topic words across {} labels from {}",
            lexicon.len(),
            lexicon.labels().len(),
            path.display()
        );
        Ok(lexicon)
    }

    /// Build from `(topic, word, weight)` entries.
    ///
    /// Stopwords and unlabelled topics are dropped before font sizes are
    /// computed, so the size range spans exactly the kept words.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (i64, String, f64)>,
    {
        let stopwords: HashSet<&str> = STOPWORDS.into_iter().collect();
        let kept: Vec<(i64, &'static str, String, f64)> = entries
            .into_iter()
            .filter(|(_, word, _)| !stopwords.contains(word.as_str()))
            .filter_map(|(topic, word, weight)| {
                topic_label(topic).map(|label| (topic, label, word, weight))
            })
            .collect();

        let min = kept.iter().map(|e| e.3).fold(f64::INFINITY, f64::min);
        let max = kept.iter().map(|e| e.3).fold(f64::NEG_INFINITY, f64::max);
        let span = max - min;

        let words = kept
            .into_iter()
            .map(|(topic, label, word, weight)| {
                let font_size = if span > 0.0 {
                    (weight - min) / span * (MAX_FONT_SIZE - MIN_FONT_SIZE) + MIN_FONT_SIZE
                } else {
                    MIN_FONT_SIZE
                };
                TopicWord {
                    topic,
                    label,
                    word,
                    weight,
                    font_size,
                }
            })
            .collect();

        TopicLexicon { words }
    }

    /// Distinct labels in order of first appearance.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut seen = Vec::new();
        for w in &self.words {
            if !seen.contains(&w.label) {
                seen.push(w.label);
            }
        }
        seen
    }

    /// Words of one label, or every word when `label` is `None`.
    pub fn select(&self, label: Option<&str>) -> Vec<&TopicWord> {
        self.words
            .iter()
            .filter(|w| label.map_or(true, |l| w.label == l))
            .collect()
    }

    pub fn words(&self) -> &[TopicWord] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(topic: i64, word: &str, weight: f64) -> (i64, String, f64) {
        (topic, word.to_string(), weight)
    }

    #[test]
    fn drops_stopwords_and_unlabelled_topics() {
        let lex = TopicLexicon::from_entries(vec![
            entry(0, "غارة", 0.5),
            entry(0, "في", 0.9),
            entry(12, "orphan", 0.7),
            entry(-1, "noise", 0.7),
            entry(6, "تعذيب", 0.1),
        ]);
        let words: Vec<&str> = lex.words().iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["غارة", "تعذيب"]);
        assert_eq!(lex.labels(), vec!["Airstrikes / Military", "Torture / Abuse"]);
    }

    #[test]
    fn font_size_spans_the_kept_weights() {
        let lex = TopicLexicon::from_entries(vec![
            entry(1, "a", 0.2),
            entry(1, "b", 0.6),
            entry(2, "c", 1.0),
            // stopword weight must not widen the range
            entry(2, "من", 5.0),
        ]);
        let sizes: Vec<f64> = lex.words().iter().map(|w| w.font_size).collect();
        assert_eq!(sizes[0], MIN_FONT_SIZE);
        assert!((sizes[1] - 31.5).abs() < 1e-9);
        assert_eq!(sizes[2], MAX_FONT_SIZE);
    }

    #[test]
    fn equal_weights_fall_back_to_minimum_size() {
        let lex = TopicLexicon::from_entries(vec![entry(3, "a", 0.4), entry(4, "b", 0.4)]);
        assert!(lex.words().iter().all(|w| w.font_size == MIN_FONT_SIZE));
    }

    #[test]
    fn select_restricts_to_label_without_rescaling() {
        let lex = TopicLexicon::from_entries(vec![
            entry(8, "a", 0.0),
            entry(9, "b", 1.0),
            entry(9, "c", 0.5),
        ]);
        let picked = lex.select(Some("Detainment Sites / Testimonies"));
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].font_size, MAX_FONT_SIZE);
        assert_eq!(lex.select(None).len(), 3);
        assert!(lex.select(Some("Nope")).is_empty());
    }

    #[test]
    fn labels_cover_topics_zero_to_nine() {
        assert_eq!(topic_label(0), Some("Airstrikes / Military"));
        assert_eq!(topic_label(9), Some("Detainment Sites / Testimonies"));
        assert_eq!(topic_label(10), None);
    }
}
