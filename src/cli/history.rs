use std::path::Path;

use chrono::Utc;

use crate::audit::{ViolationFilter, ViolationStore};
use crate::config::load_config;
use crate::errors::FrameworkError;

use super::commands::{parse_kind, parse_level, HistoryArgs};

pub async fn handle_history(args: HistoryArgs) -> Result<u8, FrameworkError> {
    let config = load_config(Path::new(&args.config)).await?;
    let store = ViolationStore::new(&config.settings.audit_dir.join("violations.db"))?;

    let filter = ViolationFilter {
        min_severity: args.severity.as_deref().map(parse_level).transpose()?,
        kind: args.kind.as_deref().map(parse_kind).transpose()?,
        since: args.days.map(|d| Utc::now() - chrono::Duration::days(d)),
    };
    let results = store.query(&filter)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if results.is_empty() {
        println!("No recorded violations match the filter");
    } else {
        for stored in &results {
            let v = &stored.violation;
            println!(
                "{}  {}  [{}] {} ({}): {}",
                v.timestamp.to_rfc3339(),
                stored.execution_id,
                v.severity,
                v.kind,
                v.source_location,
                v.description
            );
        }
        println!("{} violation(s)", results.len());
    }

    Ok(0)
}
