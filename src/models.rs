use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// One row from the record store, kept as a field map because every table
/// names its company, timestamp and submitter columns differently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Returns `None` for anything that is not a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self::from_value(value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LsrCategory {
    ConfinedSpace,
    Driving,
    EnergyIsolation,
    HotWork,
    LineOfFire,
    MechanicalLifting,
    WorkingAtHeight,
}

impl LsrCategory {
    pub const ALL: [LsrCategory; 7] = [
        LsrCategory::ConfinedSpace,
        LsrCategory::Driving,
        LsrCategory::EnergyIsolation,
        LsrCategory::HotWork,
        LsrCategory::LineOfFire,
        LsrCategory::MechanicalLifting,
        LsrCategory::WorkingAtHeight,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LsrCategory::ConfinedSpace => "Confined Space",
            LsrCategory::Driving => "Driving",
            LsrCategory::EnergyIsolation => "Energy Isolation",
            LsrCategory::HotWork => "Hot Work",
            LsrCategory::LineOfFire => "Line of Fire",
            LsrCategory::MechanicalLifting => "Mechanical Lifting",
            LsrCategory::WorkingAtHeight => "Working at Height",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordCategory {
    Incident,
    BbsObservation,
    NearMiss,
    HazardId,
    Tha,
    SafetyMeeting,
    ToolboxMeeting,
    HseContact,
    LsrAudit(LsrCategory),
    PropertyDamage,
    SailItem,
}

impl RecordCategory {
    /// Every category fetched for a company window, SAIL items included.
    pub fn all() -> Vec<RecordCategory> {
        let mut categories = vec![
            RecordCategory::Incident,
            RecordCategory::BbsObservation,
            RecordCategory::NearMiss,
            RecordCategory::HazardId,
            RecordCategory::Tha,
            RecordCategory::SafetyMeeting,
            RecordCategory::ToolboxMeeting,
            RecordCategory::HseContact,
            RecordCategory::PropertyDamage,
            RecordCategory::SailItem,
        ];
        categories.extend(LsrCategory::ALL.into_iter().map(RecordCategory::LsrAudit));
        categories
    }

    pub fn table(&self) -> &'static str {
        match self {
            RecordCategory::Incident => "incidents",
            RecordCategory::BbsObservation => "bbs_observations",
            RecordCategory::NearMiss => "good_catch_near_miss",
            RecordCategory::HazardId => "hazard_id_reports",
            RecordCategory::Tha => "tha_submissions",
            RecordCategory::SafetyMeeting => "safety_meetings",
            RecordCategory::ToolboxMeeting => "toolbox_meetings",
            RecordCategory::HseContact => "hse_contacts",
            RecordCategory::PropertyDamage => "property_damage_reports",
            RecordCategory::SailItem => "sail_log",
            RecordCategory::LsrAudit(lsr) => match lsr {
                LsrCategory::ConfinedSpace => "lsr_audits_confined_space",
                LsrCategory::Driving => "lsr_audits_driving",
                LsrCategory::EnergyIsolation => "lsr_audits_energy_isolation",
                LsrCategory::HotWork => "lsr_audits_hot_work",
                LsrCategory::LineOfFire => "lsr_audits_line_of_fire",
                LsrCategory::MechanicalLifting => "lsr_audits_mechanical_lifting",
                LsrCategory::WorkingAtHeight => "lsr_audits_working_at_height",
            },
        }
    }

    /// Column the date-range filter applies to.
    pub fn date_column(&self) -> &'static str {
        match self {
            RecordCategory::Incident | RecordCategory::PropertyDamage => "incident_date",
            RecordCategory::BbsObservation => "observation_date",
            RecordCategory::NearMiss => "event_date",
            RecordCategory::SafetyMeeting | RecordCategory::ToolboxMeeting => "meeting_date",
            RecordCategory::HseContact => "contact_date",
            RecordCategory::LsrAudit(_) => "audit_date",
            RecordCategory::SailItem => "date_identified",
            RecordCategory::HazardId | RecordCategory::Tha => "created_at",
        }
    }
}

/// Raw input for one company, one window.
#[derive(Debug, Clone, Default)]
pub struct CompanyRecords {
    pub incidents: Vec<Record>,
    pub bbs_observations: Vec<Record>,
    pub near_misses: Vec<Record>,
    pub hazard_ids: Vec<Record>,
    pub thas: Vec<Record>,
    pub safety_meetings: Vec<Record>,
    pub toolbox_meetings: Vec<Record>,
    pub hse_contacts: Vec<Record>,
    pub lsr_audits: BTreeMap<LsrCategory, Vec<Record>>,
    pub property_damage: Vec<Record>,
    pub sail_items: Vec<Record>,
    /// Open incidents of any age. `None` when they were not fetched, in
    /// which case the window's incidents stand in.
    pub open_incident_backlog: Option<Vec<Record>>,
}

impl CompanyRecords {
    pub fn slot_mut(&mut self, category: RecordCategory) -> &mut Vec<Record> {
        match category {
            RecordCategory::Incident => &mut self.incidents,
            RecordCategory::BbsObservation => &mut self.bbs_observations,
            RecordCategory::NearMiss => &mut self.near_misses,
            RecordCategory::HazardId => &mut self.hazard_ids,
            RecordCategory::Tha => &mut self.thas,
            RecordCategory::SafetyMeeting => &mut self.safety_meetings,
            RecordCategory::ToolboxMeeting => &mut self.toolbox_meetings,
            RecordCategory::HseContact => &mut self.hse_contacts,
            RecordCategory::LsrAudit(lsr) => self.lsr_audits.entry(lsr).or_default(),
            RecordCategory::PropertyDamage => &mut self.property_damage,
            RecordCategory::SailItem => &mut self.sail_items,
        }
    }

    /// Incidents still open, from the backlog when one was fetched.
    pub fn open_incident_pool(&self) -> &[Record] {
        self.open_incident_backlog.as_deref().unwrap_or(&self.incidents)
    }

    pub fn lsr_total(&self) -> usize {
        self.lsr_audits.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlTiers {
    pub tier1: usize,
    pub tier2: usize,
    pub tier3: usize,
}

impl ControlTiers {
    pub fn classified(&self) -> usize {
        self.tier1 + self.tier2 + self.tier3
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LsrIssue {
    pub category: LsrCategory,
    pub audit_id: Option<String>,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadingIndicators {
    pub bbs_observations: usize,
    pub thas: usize,
    pub safety_meetings: usize,
    pub toolbox_meetings: usize,
    pub hse_contacts: usize,
    pub hazard_ids: usize,
    pub good_catches: usize,
    pub lsr_audits: usize,
    pub total_leading: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaggingIndicators {
    pub total_incidents: usize,
    pub open_incidents: usize,
    pub closed_incidents: usize,
    pub open_sail: usize,
    pub property_damage: usize,
    pub total_lagging: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenItemSource {
    Incident,
    Sail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenItem {
    pub source: OpenItemSource,
    pub id: Option<String>,
    pub title: String,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub days_open: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusSeverity {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusArea {
    pub source: String,
    pub category: String,
    pub issue: String,
    pub count: usize,
    pub severity: FocusSeverity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBundle {
    pub company: String,
    pub generated_at: DateTime<Utc>,
    pub total_bbs: usize,
    pub safe_obs: usize,
    pub at_risk_obs: usize,
    pub job_stops: usize,
    pub safe_at_risk_ratio: f64,
    pub job_stop_rate: u32,
    pub sif_total: usize,
    pub sif_flagged: usize,
    pub sif_rate: u32,
    pub energy_sources: BTreeMap<String, usize>,
    pub control_tiers: ControlTiers,
    pub control_hierarchy_score: u32,
    pub lsr_issues: Vec<LsrIssue>,
    pub leading: LeadingIndicators,
    pub lagging: LaggingIndicators,
    pub lead_lag_ratio: f64,
    pub near_miss_total: usize,
    pub near_miss_high: usize,
    pub near_miss_med: usize,
    pub near_miss_low: usize,
    pub unique_submitters: usize,
    pub participation_rate: Option<u32>,
    pub days_since_last_submission: i64,
    pub safety_culture_index: u32,
    pub predictive_risk_score: u32,
    pub forecast_30_day: u32,
    pub open_items: Vec<OpenItem>,
    pub focus_areas: Vec<FocusArea>,
}
