use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::fields;
use crate::models::{
    CompanyRecords, ControlTiers, FocusArea, FocusSeverity, LaggingIndicators, LeadingIndicators,
    LsrIssue, MetricsBundle, OpenItem, OpenItemSource, Record,
};
use crate::risk::{self, ScoreInputs};

/// Incident statuses that count as closed. Anything else, including a
/// missing or unrecognised status, is open.
pub const CLOSED_INCIDENT_STATUSES: &[&str] = &["Closed", "Approved"];

pub const OPEN_SAIL_STATUSES: &[&str] = &["Open", "In Progress", "Pending"];

/// Reported when no engagement record carries a usable timestamp.
pub const NO_ACTIVITY_DAYS: i64 = 999;

pub const OPEN_ITEMS_LIMIT: usize = 5;

const LSR_METADATA_FIELDS: &[&str] = &[
    "id",
    "created_at",
    "updated_at",
    "date",
    "audit_date",
    "auditor",
    "auditor_name",
    "company",
    "company_name",
    "client_company",
    "client",
    "location",
    "site",
    "photo_url",
    "improvement_notes",
    "areas_for_improvement",
];

const LSR_FLAGGED_VALUES: &[&str] = &["Needs Improvement", "No"];

/// Employee headcount per company, injected from configuration.
#[derive(Debug, Clone, Default)]
pub struct EmployeeCensus {
    headcounts: HashMap<String, u32>,
}

impl EmployeeCensus {
    pub fn new(headcounts: HashMap<String, u32>) -> Self {
        Self { headcounts }
    }

    pub fn headcount(&self, company: &str) -> Option<u32> {
        self.headcounts.get(company).copied().filter(|count| *count > 0)
    }
}

pub fn compute_metrics(
    company: &str,
    records: &CompanyRecords,
    census: &EmployeeCensus,
    now: DateTime<Utc>,
) -> MetricsBundle {
    let total_bbs = records.bbs_observations.len();
    let safe_obs = count_where(&records.bbs_observations, |r| {
        fields::equals(r, "observation_type", "Safe")
    });
    let at_risk_obs = count_where(&records.bbs_observations, |r| {
        fields::equals(r, "observation_type", "At-Risk")
    });
    let job_stops = count_where(&records.bbs_observations, |r| fields::is_yes(r, "job_stop"));

    let safe_at_risk_ratio = safe_at_risk_ratio(safe_obs, at_risk_obs);
    let job_stop_rate = percent(job_stops, total_bbs);

    let hazard_pool: Vec<&Record> = records
        .bbs_observations
        .iter()
        .chain(&records.near_misses)
        .chain(&records.hazard_ids)
        .collect();
    let sif_total = hazard_pool.len();
    let sif_flagged = hazard_pool.iter().filter(|r| is_sif_relevant(r)).count();
    let sif_rate = percent(sif_flagged, sif_total);
    let energy_sources = energy_tally(&hazard_pool);
    let control_tiers = classify_controls(&hazard_pool);
    let control_hierarchy_score = control_hierarchy_score(&control_tiers);

    let lsr_issues = lsr_issues(records);
    let leading = leading_indicators(records);
    let lagging = lagging_indicators(records);
    let lead_lag_ratio = lead_lag_ratio(leading.total_leading, lagging.total_lagging);

    let near_miss_total = records.near_misses.len();
    let (near_miss_high, near_miss_med, near_miss_low) = near_miss_split(&records.near_misses);

    let engagement: Vec<&Record> = records
        .bbs_observations
        .iter()
        .chain(&records.thas)
        .chain(&records.safety_meetings)
        .chain(&records.hazard_ids)
        .chain(&records.near_misses)
        .collect();
    let unique_submitters = unique_submitters(&engagement);
    let participation_rate = census
        .headcount(company)
        .map(|employees| percent(unique_submitters, employees as usize));
    let days_since_last_submission = days_since_last_submission(&engagement, now);

    let inputs = ScoreInputs {
        safe_at_risk_ratio,
        job_stop_rate,
        near_miss_total,
        incidents: lagging.total_incidents,
        sif_rate,
        open_sail: lagging.open_sail,
        safe_obs,
        at_risk_obs,
        days_since_last_submission,
        total_leading: leading.total_leading,
    };

    MetricsBundle {
        company: company.to_string(),
        generated_at: now,
        total_bbs,
        safe_obs,
        at_risk_obs,
        job_stops,
        safe_at_risk_ratio,
        job_stop_rate,
        sif_total,
        sif_flagged,
        sif_rate,
        energy_sources,
        control_tiers,
        control_hierarchy_score,
        focus_areas: focus_areas(records, lsr_issues.len()),
        lsr_issues,
        leading,
        lagging,
        lead_lag_ratio,
        near_miss_total,
        near_miss_high,
        near_miss_med,
        near_miss_low,
        unique_submitters,
        participation_rate,
        days_since_last_submission,
        safety_culture_index: risk::SAFETY_CULTURE.score(&inputs),
        predictive_risk_score: risk::PREDICTIVE_RISK.score(&inputs),
        forecast_30_day: risk::FORECAST_30_DAY.score(&inputs),
        open_items: open_items(records, now),
    }
}

fn count_where(records: &[Record], predicate: impl Fn(&Record) -> bool) -> usize {
    records.iter().filter(|&record| predicate(record)).count()
}

/// `round(part / whole * 100)`, zero when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Falls back to the safe count when there are no at-risk observations.
pub fn safe_at_risk_ratio(safe_obs: usize, at_risk_obs: usize) -> f64 {
    if at_risk_obs == 0 {
        return safe_obs as f64;
    }
    round_tenth(safe_obs as f64 / at_risk_obs as f64)
}

/// Falls back to the leading count when nothing lagging was recorded.
pub fn lead_lag_ratio(total_leading: usize, total_lagging: usize) -> f64 {
    if total_lagging == 0 {
        return total_leading as f64;
    }
    round_tenth(total_leading as f64 / total_lagging as f64)
}

pub fn is_sif_relevant(record: &Record) -> bool {
    fields::equals(record, "stky_event", "Yes") || fields::is_yes(record, "sif_potential")
}

pub fn energy_tally(records: &[&Record]) -> BTreeMap<String, usize> {
    let mut tally = BTreeMap::new();
    for record in records {
        if let Some(source) = fields::first_text(record, fields::ENERGY) {
            *tally.entry(source.to_string()).or_insert(0) += 1;
        }
    }
    tally
}

pub fn classify_controls(records: &[&Record]) -> ControlTiers {
    let mut tiers = ControlTiers::default();
    for record in records {
        let Some(control) = fields::first_text(record, fields::CONTROL) else {
            continue;
        };
        if ["Elimination", "Substitution", "Engineering"]
            .iter()
            .any(|needle| control.contains(needle))
        {
            tiers.tier1 += 1;
        } else if ["Guard", "LOTO", "Barrier", "Administrative"]
            .iter()
            .any(|needle| control.contains(needle))
        {
            tiers.tier2 += 1;
        } else {
            tiers.tier3 += 1;
        }
    }
    tiers
}

/// 50 when nothing carried a control value.
pub fn control_hierarchy_score(tiers: &ControlTiers) -> u32 {
    let classified = tiers.classified();
    if classified == 0 {
        return 50;
    }
    let weighted = tiers.tier1 * 100 + tiers.tier2 * 60 + tiers.tier3 * 30;
    (weighted as f64 / classified as f64).round() as u32
}

pub fn lsr_issues(records: &CompanyRecords) -> Vec<LsrIssue> {
    let mut issues = Vec::new();
    for (category, audits) in &records.lsr_audits {
        for audit in audits {
            for (field, value) in audit.fields() {
                if LSR_METADATA_FIELDS.contains(&field.as_str()) {
                    continue;
                }
                let Value::String(value) = value else {
                    continue;
                };
                if LSR_FLAGGED_VALUES.contains(&value.as_str()) {
                    issues.push(LsrIssue {
                        category: *category,
                        audit_id: fields::id_of(audit),
                        field: field.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
    }
    issues
}

pub fn leading_indicators(records: &CompanyRecords) -> LeadingIndicators {
    let mut leading = LeadingIndicators {
        bbs_observations: records.bbs_observations.len(),
        thas: records.thas.len(),
        safety_meetings: records.safety_meetings.len(),
        toolbox_meetings: records.toolbox_meetings.len(),
        hse_contacts: records.hse_contacts.len(),
        hazard_ids: records.hazard_ids.len(),
        good_catches: records.near_misses.len(),
        lsr_audits: records.lsr_total(),
        total_leading: 0,
    };
    leading.total_leading = leading.bbs_observations
        + leading.thas
        + leading.safety_meetings
        + leading.toolbox_meetings
        + leading.hse_contacts
        + leading.hazard_ids
        + leading.good_catches
        + leading.lsr_audits;
    leading
}

pub fn is_open_incident(record: &Record) -> bool {
    match fields::str_field(record, "status") {
        Some(status) => !CLOSED_INCIDENT_STATUSES.contains(&status),
        None => true,
    }
}

pub fn is_open_sail(record: &Record) -> bool {
    fields::str_field(record, "status").is_some_and(|status| OPEN_SAIL_STATUSES.contains(&status))
}

/// Totals come from the window; the open count comes from the backlog so
/// old incidents that are still open are not lost.
pub fn lagging_indicators(records: &CompanyRecords) -> LaggingIndicators {
    let total_incidents = records.incidents.len();
    let open_incidents = count_where(records.open_incident_pool(), is_open_incident);
    let closed_incidents = count_where(&records.incidents, |r| !is_open_incident(r));
    let property_damage = records.property_damage.len();
    LaggingIndicators {
        total_incidents,
        open_incidents,
        closed_incidents,
        open_sail: count_where(&records.sail_items, is_open_sail),
        property_damage,
        total_lagging: total_incidents + property_damage,
    }
}

/// `(high, medium, low)`; low is the clamped remainder.
pub fn near_miss_split(near_misses: &[Record]) -> (usize, usize, usize) {
    let high = count_where(near_misses, |r| {
        fields::is_yes(r, "sif_potential") || fields::equals(r, "severity", "High")
    });
    let medium = count_where(near_misses, |r| fields::equals(r, "severity", "Medium"));
    let remainder = near_misses.len() as i64 - high as i64 - medium as i64;
    if remainder < 0 {
        tracing::debug!(
            total = near_misses.len(),
            high,
            medium,
            "near-miss severity labels overlap SIF flags; clamping low count to zero"
        );
    }
    (high, medium, remainder.max(0) as usize)
}

pub fn unique_submitters(records: &[&Record]) -> usize {
    records
        .iter()
        .filter_map(|record| fields::first_text(record, fields::SUBMITTER))
        .map(str::to_lowercase)
        .collect::<HashSet<_>>()
        .len()
}

pub fn days_since_last_submission(records: &[&Record], now: DateTime<Utc>) -> i64 {
    records
        .iter()
        .filter_map(|record| fields::timestamp(record, fields::SUBMITTED_AT))
        .max()
        .map(|latest| fields::days_between(latest, now).max(0))
        .unwrap_or(NO_ACTIVITY_DAYS)
}

/// The oldest open incidents and SAIL items, oldest first.
pub fn open_items(records: &CompanyRecords, now: DateTime<Utc>) -> Vec<OpenItem> {
    let incidents = records
        .open_incident_pool()
        .iter()
        .filter(|r| is_open_incident(r))
        .filter_map(|r| open_item(r, OpenItemSource::Incident, fields::INCIDENT_OPENED, now));
    let sail = records
        .sail_items
        .iter()
        .filter(|r| is_open_sail(r))
        .filter_map(|r| open_item(r, OpenItemSource::Sail, fields::SAIL_OPENED, now));

    let mut items: Vec<OpenItem> = incidents.chain(sail).collect();
    items.sort_by(|a, b| b.days_open.cmp(&a.days_open));
    items.truncate(OPEN_ITEMS_LIMIT);
    items
}

fn open_item(
    record: &Record,
    source: OpenItemSource,
    date_aliases: &[&str],
    now: DateTime<Utc>,
) -> Option<OpenItem> {
    let opened_at = fields::timestamp(record, date_aliases)?;
    Some(OpenItem {
        source,
        id: fields::id_of(record),
        title: fields::first_text(record, fields::TITLE)
            .unwrap_or("Untitled")
            .to_string(),
        status: fields::str_field(record, "status").unwrap_or("Unknown").to_string(),
        opened_at,
        days_open: fields::days_between(opened_at, now),
    })
}

pub fn focus_areas(records: &CompanyRecords, lsr_issue_count: usize) -> Vec<FocusArea> {
    let mut areas = Vec::new();

    let urgent_sail = count_where(&records.sail_items, |r| {
        is_open_sail(r)
            && fields::str_field(r, "priority").is_some_and(|priority| {
                priority.eq_ignore_ascii_case("critical") || priority.eq_ignore_ascii_case("high")
            })
    });
    if urgent_sail > 0 {
        areas.push(FocusArea {
            source: "SAIL".to_string(),
            category: "Corrective Actions".to_string(),
            issue: format!("{urgent_sail} critical/high priority action items still open"),
            count: urgent_sail,
            severity: FocusSeverity::High,
        });
    }

    let sif_near_misses = count_where(&records.near_misses, is_sif_relevant);
    if sif_near_misses > 0 {
        areas.push(FocusArea {
            source: "Near Miss".to_string(),
            category: "SIF Potential".to_string(),
            issue: format!("{sif_near_misses} near misses with serious injury potential"),
            count: sif_near_misses,
            severity: FocusSeverity::High,
        });
    }

    if lsr_issue_count > 0 {
        areas.push(FocusArea {
            source: "LSR Audit".to_string(),
            category: "Life Saving Rules".to_string(),
            issue: format!("{lsr_issue_count} audit findings marked No or Needs Improvement"),
            count: lsr_issue_count,
            severity: if lsr_issue_count > 3 {
                FocusSeverity::High
            } else {
                FocusSeverity::Medium
            },
        });
    }

    let high_risk_hazards = count_where(&records.hazard_ids, is_high_risk_hazard);
    if high_risk_hazards > 0 {
        areas.push(FocusArea {
            source: "Hazard ID".to_string(),
            category: "High-Risk Hazards".to_string(),
            issue: format!("{high_risk_hazards} hazards reported as high risk"),
            count: high_risk_hazards,
            severity: FocusSeverity::Medium,
        });
    }

    areas
}

/// Any risk alias reading high, critical or extreme.
pub fn is_high_risk_hazard(record: &Record) -> bool {
    fields::HAZARD_RISK
        .iter()
        .filter_map(|key| fields::str_field(record, key))
        .map(str::trim)
        .any(|level| {
            ["high", "critical", "extreme"]
                .iter()
                .any(|tier| level.eq_ignore_ascii_case(tier))
        })
}
