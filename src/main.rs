use anyhow::{Context, Result};
use clap::Parser;

use skf_dashboard::config::{DashboardConfig, OutputFormat};
use skf_dashboard::data::export::export_csv;
use skf_dashboard::state::Dashboard;

fn main() -> Result<()> {
    env_logger::init();
    let config = DashboardConfig::parse();

    let dashboard = Dashboard::load(&config)?;
    let selection = config.selection();
    let options = config.view_options();

    let tables = dashboard.render(config.section, &selection, &options)?;
    match config.format {
        OutputFormat::Table => {
            for table in &tables {
                println!("{}\n", table.pretty()?);
            }
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&tables).context("serializing tables")?;
            println!("{json}");
        }
    }

    if let Some(path) = &config.export {
        let filtered = dashboard.filtered(&selection);
        export_csv(&filtered, path, config.export_options())?;
        eprintln!("Exported {} records to {}", filtered.len(), path.display());
    }

    Ok(())
}
