use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::metrics::NO_ACTIVITY_DAYS;
use crate::models::{DateRange, FocusSeverity, MetricsBundle, OpenItemSource};
use crate::view::Dashboard;

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn recency_label(days: i64) -> String {
    match days {
        NO_ACTIVITY_DAYS => "no submissions on record".to_string(),
        0 => "today".to_string(),
        1 => "1 day ago".to_string(),
        _ => format!("{days} days ago"),
    }
}

fn score_row(output: &mut String, label: &str, value: impl std::fmt::Display) {
    let _ = writeln!(
        output,
        "<tr><td>{}</td><td style=\"text-align:right\"><strong>{}</strong></td></tr>",
        escape(label),
        value
    );
}

fn write_sections(output: &mut String, bundle: &MetricsBundle) {
    let _ = writeln!(output, "<h2>Scores</h2>");
    let _ = writeln!(output, "<table>");
    score_row(output, "Safety Culture Index", bundle.safety_culture_index);
    score_row(output, "Predictive Risk Score", bundle.predictive_risk_score);
    score_row(output, "30-Day Risk Forecast", bundle.forecast_30_day);
    score_row(output, "Control Hierarchy Score", bundle.control_hierarchy_score);
    score_row(output, "Lead/Lag Ratio", format!("{:.1}", bundle.lead_lag_ratio));
    let _ = writeln!(output, "</table>");

    let _ = writeln!(output, "<h2>Observations</h2>");
    let _ = writeln!(output, "<table>");
    score_row(output, "BBS observations", bundle.total_bbs);
    score_row(output, "Safe / At-Risk", format!("{} / {}", bundle.safe_obs, bundle.at_risk_obs));
    score_row(output, "Safe:At-Risk ratio", format!("{:.1}", bundle.safe_at_risk_ratio));
    score_row(output, "Job stops", format!("{} ({}%)", bundle.job_stops, bundle.job_stop_rate));
    score_row(output, "SIF potential rate", format!("{}%", bundle.sif_rate));
    score_row(
        output,
        "Near misses (high / medium / low)",
        format!(
            "{} ({} / {} / {})",
            bundle.near_miss_total, bundle.near_miss_high, bundle.near_miss_med, bundle.near_miss_low
        ),
    );
    let _ = writeln!(output, "</table>");

    let leading = &bundle.leading;
    let lagging = &bundle.lagging;
    let _ = writeln!(output, "<h2>Leading vs Lagging</h2>");
    let _ = writeln!(output, "<table>");
    score_row(output, "THAs", leading.thas);
    score_row(output, "Safety meetings", leading.safety_meetings);
    score_row(output, "Toolbox meetings", leading.toolbox_meetings);
    score_row(output, "HSE contacts", leading.hse_contacts);
    score_row(output, "Hazard IDs", leading.hazard_ids);
    score_row(output, "Good catches", leading.good_catches);
    score_row(output, "LSR audits", leading.lsr_audits);
    score_row(output, "Total leading", leading.total_leading);
    score_row(
        output,
        "Incidents (open / closed)",
        format!(
            "{} ({} / {})",
            lagging.total_incidents, lagging.open_incidents, lagging.closed_incidents
        ),
    );
    score_row(output, "Property damage", lagging.property_damage);
    score_row(output, "Open SAIL items", lagging.open_sail);
    score_row(output, "Total lagging", lagging.total_lagging);
    let _ = writeln!(output, "</table>");

    let _ = writeln!(output, "<h2>Engagement</h2>");
    let _ = writeln!(output, "<p>{} unique submitters", bundle.unique_submitters);
    if let Some(rate) = bundle.participation_rate {
        let _ = write!(output, " ({rate}% participation)");
    }
    let _ = writeln!(
        output,
        ". Last submission {}.</p>",
        recency_label(bundle.days_since_last_submission)
    );

    if !bundle.energy_sources.is_empty() {
        let _ = writeln!(output, "<h2>Energy Sources</h2>");
        let _ = writeln!(output, "<ul>");
        for (source, count) in &bundle.energy_sources {
            let _ = writeln!(output, "<li>{}: {}</li>", escape(source), count);
        }
        let _ = writeln!(output, "</ul>");
    }

    let _ = writeln!(output, "<h2>Areas Needing Focus</h2>");
    if bundle.focus_areas.is_empty() {
        let _ = writeln!(output, "<p>No issues flagged for this period.</p>");
    } else {
        let _ = writeln!(output, "<ul>");
        for area in &bundle.focus_areas {
            let tag = match area.severity {
                FocusSeverity::High => "HIGH",
                FocusSeverity::Medium => "MEDIUM",
            };
            let _ = writeln!(
                output,
                "<li><strong>[{tag}] {}</strong> ({}): {}</li>",
                escape(&area.category),
                escape(&area.source),
                escape(&area.issue)
            );
        }
        let _ = writeln!(output, "</ul>");
    }

    let _ = writeln!(output, "<h2>Oldest Open Items</h2>");
    if bundle.open_items.is_empty() {
        let _ = writeln!(output, "<p>No open incidents or action items.</p>");
    } else {
        let _ = writeln!(output, "<ul>");
        for item in &bundle.open_items {
            let source = match item.source {
                OpenItemSource::Incident => "Incident",
                OpenItemSource::Sail => "SAIL",
            };
            let _ = writeln!(
                output,
                "<li>{source}: {} ({}), open {} days</li>",
                escape(&item.title),
                escape(&item.status),
                item.days_open
            );
        }
        let _ = writeln!(output, "</ul>");
    }
}

pub fn render_digest_html(bundle: &MetricsBundle, range: DateRange) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "<html><body style=\"font-family:sans-serif\">");
    let _ = writeln!(output, "<h1>Weekly Safety Scorecard: {}</h1>", escape(&bundle.company));
    let _ = writeln!(output, "<p>Activity from {} to {}.</p>", range.from, range.to);
    write_sections(&mut output, bundle);
    let _ = writeln!(output, "</body></html>");
    output
}

pub fn render_dashboard_html(dashboard: &Dashboard) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "<!doctype html>");
    let _ = writeln!(output, "<html><head><meta charset=\"utf-8\">");
    let _ = writeln!(output, "<title>{} Safety Scorecard</title></head>", escape(&dashboard.company));
    let _ = writeln!(output, "<body>");
    let _ = writeln!(output, "<h1>{} Safety Scorecard</h1>", escape(&dashboard.company));
    let _ = writeln!(
        output,
        "<p>Showing {} to {}, generated {}.</p>",
        dashboard.range.from,
        dashboard.range.to,
        dashboard.metrics.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    write_sections(&mut output, &dashboard.metrics);

    if !dashboard.metrics.lsr_issues.is_empty() {
        let _ = writeln!(output, "<h2>LSR Audit Findings</h2>");
        let _ = writeln!(output, "<ul>");
        for issue in &dashboard.metrics.lsr_issues {
            let _ = writeln!(
                output,
                "<li>{}: {} = {}</li>",
                issue.category.label(),
                escape(&issue.field),
                escape(&issue.value)
            );
        }
        let _ = writeln!(output, "</ul>");
    }

    let _ = writeln!(output, "</body></html>");
    output
}

#[derive(Serialize)]
struct MetricRow<'a> {
    metric: &'a str,
    value: String,
}

fn metric_rows(bundle: &MetricsBundle) -> Vec<MetricRow<'static>> {
    let row = |metric, value: String| MetricRow { metric, value };
    vec![
        row("total_bbs", bundle.total_bbs.to_string()),
        row("safe_obs", bundle.safe_obs.to_string()),
        row("at_risk_obs", bundle.at_risk_obs.to_string()),
        row("job_stops", bundle.job_stops.to_string()),
        row("safe_at_risk_ratio", format!("{:.1}", bundle.safe_at_risk_ratio)),
        row("job_stop_rate", bundle.job_stop_rate.to_string()),
        row("sif_rate", bundle.sif_rate.to_string()),
        row("control_hierarchy_score", bundle.control_hierarchy_score.to_string()),
        row("lsr_issues", bundle.lsr_issues.len().to_string()),
        row("total_leading", bundle.leading.total_leading.to_string()),
        row("total_lagging", bundle.lagging.total_lagging.to_string()),
        row("open_incidents", bundle.lagging.open_incidents.to_string()),
        row("open_sail", bundle.lagging.open_sail.to_string()),
        row("lead_lag_ratio", format!("{:.1}", bundle.lead_lag_ratio)),
        row("near_miss_total", bundle.near_miss_total.to_string()),
        row("unique_submitters", bundle.unique_submitters.to_string()),
        row(
            "participation_rate",
            bundle
                .participation_rate
                .map(|rate| rate.to_string())
                .unwrap_or_default(),
        ),
        row(
            "days_since_last_submission",
            bundle.days_since_last_submission.to_string(),
        ),
        row("safety_culture_index", bundle.safety_culture_index.to_string()),
        row("predictive_risk_score", bundle.predictive_risk_score.to_string()),
        row("forecast_30_day", bundle.forecast_30_day.to_string()),
    ]
}

pub fn write_metrics_csv(bundle: &MetricsBundle, path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in metric_rows(bundle) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
