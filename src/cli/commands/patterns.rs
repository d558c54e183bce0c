//! Pattern detection commands.

use crate::cli::output;
use crate::domain::error::Result;
use crate::services::PatternDetector;

use super::AppContext;

pub fn handle_analyze(ctx: &AppContext, window_hours: i64, json: bool) -> Result<()> {
    let detector = PatternDetector::new(&ctx.store, &ctx.clock);
    let report = detector.analyze(window_hours)?;
    if json {
        output::print_json(&report);
    } else {
        println!(
            "{} events in window: {} patterns created, {} updated",
            report.events_in_window, report.patterns_created, report.patterns_updated
        );
        for pattern in &report.patterns {
            println!(
                "  {}  {}  n={}  confidence={:.2}  severity={}",
                pattern.pattern_id,
                pattern.category_type(),
                pattern.frequency.total_occurrences,
                pattern.confidence,
                pattern.severity.as_str()
            );
        }
    }
    Ok(())
}

pub fn handle_list(ctx: &AppContext, json: bool) -> Result<()> {
    let detector = PatternDetector::new(&ctx.store, &ctx.clock);
    let patterns = detector.current_patterns()?;
    if json {
        output::print_json(&patterns);
    } else {
        output::print_table(
            &["id", "pattern", "worker type", "count", "confidence", "severity"],
            patterns
                .iter()
                .map(|p| {
                    vec![
                        p.pattern_id.clone(),
                        p.category_type(),
                        p.signature.worker_type.clone(),
                        p.frequency.total_occurrences.to_string(),
                        format!("{:.2}", p.confidence),
                        p.severity.as_str().to_string(),
                    ]
                })
                .collect(),
        );
    }
    Ok(())
}
