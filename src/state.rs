use anyhow::{Context, Result};

use crate::config::DashboardConfig;
use crate::data::filter::{FilterOptions, Selection, filter_options, filter_records};
use crate::data::loader::load_records;
use crate::data::model::RecordSet;
use crate::data::topics::TopicLexicon;
use crate::table::ResultTable;
use crate::views::{self, Section, ViewOptions};

// ---------------------------------------------------------------------------
// Session context
// ---------------------------------------------------------------------------

/// Everything loaded for a session. Built once and never mutated; every view
/// is recomputed from it on each request.
#[derive(Debug, Clone)]
pub struct Dashboard {
    records: RecordSet,
    topics: Option<TopicLexicon>,
}

impl Dashboard {
    pub fn new(records: RecordSet, topics: Option<TopicLexicon>) -> Self {
        Dashboard { records, topics }
    }

    /// Load the incident dataset, and the topic lexicon when the requested
    /// section needs it.
    pub fn load(config: &DashboardConfig) -> Result<Self> {
        let records = load_records(&config.data)
            .with_context(|| format!("loading incidents from {}", config.data.display()))?;
        let topics = if config.section == Section::Topics {
            let lexicon = TopicLexicon::load(&config.topics).with_context(|| {
                format!("loading topic words from {}", config.topics.display())
            })?;
            Some(lexicon)
        } else {
            None
        };
        Ok(Dashboard::new(records, topics))
    }

    /// The full, unfiltered record set.
    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    pub fn topics(&self) -> Option<&TopicLexicon> {
        self.topics.as_ref()
    }

    /// Selector choices, with months narrowed by the selected years.
    pub fn filter_options(&self, selection: &Selection) -> FilterOptions {
        filter_options(&self.records, &selection.years)
    }

    /// Drop requested months that the selected years cannot offer.
    pub fn constrain(&self, selection: &Selection) -> Selection {
        let options = self.filter_options(selection);
        let mut constrained = selection.clone();
        constrained.months.retain(|m| {
            let available = options.months.contains(&m.as_str());
            if !available {
                log::warn!("month '{m}' has no records in the selected years; ignoring it");
            }
            available
        });
        constrained
    }

    /// Records passing the (constrained) selection.
    pub fn filtered(&self, selection: &Selection) -> RecordSet {
        filter_records(&self.records, &self.constrain(selection))
    }

    /// Compute the tables of one section.
    pub fn render(
        &self,
        section: Section,
        selection: &Selection,
        options: &ViewOptions,
    ) -> Result<Vec<ResultTable>> {
        let records = self.filtered(selection);
        log::info!(
            "rendering {section:?} over {} of {} records ({})",
            records.len(),
            self.records.len(),
            views::describe_selection(selection)
        );
        match section {
            Section::Overview => views::overview(&records),
            Section::Trends => Ok(vec![views::trends(
                &records,
                options.metric,
                options.granularity,
            )?]),
            Section::ViolationPatterns => views::violation_patterns(&records),
            Section::CrossAnalysis => views::cross_analysis(&records),
            Section::Governance => views::governance(&records),
            Section::Topics => {
                let lexicon = self
                    .topics
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("topic lexicon not loaded"))?;
                Ok(vec![views::topics(lexicon, options.topic.as_deref())])
            }
            Section::RawData => Ok(vec![views::raw_data(&records, options.export)]),
        }
    }
}
