use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::data::export::ExportOptions;
use crate::data::filter::Selection;
use crate::views::{Section, TrendGranularity, TrendMetric, ViewOptions};

/// How result tables are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Command line configuration. Input locations may also come from the
/// environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "skf-dashboard", version, about = "SKF violations dashboard tables")]
pub struct DashboardConfig {
    /// Incident dataset (.csv, .json or .parquet).
    #[arg(long, env = "SKF_DATA_PATH", default_value = "Cleaned_SKF_data.csv")]
    pub data: PathBuf,

    /// Topic word table (Topic, Word, Weight).
    #[arg(long, env = "SKF_TOPICS_PATH", default_value = "Topic_TopWords.csv")]
    pub topics: PathBuf,

    #[arg(long, value_enum, default_value_t = Section::Overview)]
    pub section: Section,

    /// Countries to keep; none keeps all.
    #[arg(long = "country", value_delimiter = ',')]
    pub countries: Vec<String>,

    /// Years to keep; none keeps all.
    #[arg(long = "year", value_delimiter = ',')]
    pub years: Vec<i32>,

    /// Month names to keep; none keeps all.
    #[arg(long = "month", value_delimiter = ',')]
    pub months: Vec<String>,

    #[arg(long, value_enum, default_value_t = TrendMetric::Violations)]
    pub metric: TrendMetric,

    #[arg(long, value_enum, default_value_t = TrendGranularity::Yearly)]
    pub granularity: TrendGranularity,

    /// Topic label for the topics section.
    #[arg(long)]
    pub topic: Option<String>,

    /// Write the filtered records to this CSV file.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Include the Month_Num helper column in exports.
    #[arg(long)]
    pub include_helpers: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl DashboardConfig {
    pub fn selection(&self) -> Selection {
        Selection::new()
            .with_countries(self.countries.iter().map(|c| c.trim().to_string()))
            .with_years(self.years.iter().copied())
            .with_months(self.months.iter().map(|m| m.trim().to_string()))
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            metric: self.metric,
            granularity: self.granularity,
            topic: self.topic.clone(),
            export: self.export_options(),
        }
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            include_helpers: self.include_helpers,
        }
    }
}
