use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::fields;
use crate::metrics::{self, EmployeeCensus, CLOSED_INCIDENT_STATUSES, OPEN_SAIL_STATUSES};
use crate::models::{CompanyRecords, DateRange, MetricsBundle, Record, RecordCategory};
use crate::notify::NotificationSender;
use crate::report;
use crate::store::{RecipientDirectory, RecipientList, RecordStore, StatusMode};
use crate::throttle::Throttle;

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub window_days: i64,
    pub company_delay: Duration,
    pub subject_prefix: String,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            window_days: 7,
            company_delay: Duration::from_secs(1),
            subject_prefix: "Weekly Safety Scorecard".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyOutcome {
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSummary {
    pub success: bool,
    pub run_id: Uuid,
    pub date_range: DateRange,
    pub companies_processed: usize,
    pub results: Vec<CompanyOutcome>,
}

pub struct DigestRunner<'a> {
    pub records: &'a dyn RecordStore,
    pub directory: &'a dyn RecipientDirectory,
    pub sender: &'a dyn NotificationSender,
    pub census: &'a EmployeeCensus,
    pub settings: DigestSettings,
}

impl DigestRunner<'_> {
    /// Sends every active company its report for the window ending at `now`.
    ///
    /// Only a failure to load the recipient directory is returned as an
    /// error; per-company problems land in the summary.
    pub async fn run(&self, now: DateTime<Utc>) -> anyhow::Result<DigestSummary> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("digest", %run_id);
        self.run_inner(run_id, now).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<DigestSummary> {
        let date_range = DateRange {
            from: (now - chrono::Duration::days(self.settings.window_days)).date_naive(),
            to: now.date_naive(),
        };
        let recipients = self.directory.active_recipients().await?;
        tracing::info!(
            companies = recipients.len(),
            from = %date_range.from,
            to = %date_range.to,
            "starting weekly digest"
        );

        let mut queue: VecDeque<RecipientList> = recipients.into();
        let mut throttle = Throttle::new(self.settings.company_delay);
        let mut results = Vec::with_capacity(queue.len());

        while let Some(list) = queue.pop_front() {
            throttle.ready().await;
            results.push(self.process_company(list, date_range, now).await);
        }

        Ok(DigestSummary {
            success: true,
            run_id,
            date_range,
            companies_processed: results.len(),
            results,
        })
    }

    async fn process_company(
        &self,
        list: RecipientList,
        range: DateRange,
        now: DateTime<Utc>,
    ) -> CompanyOutcome {
        let records = gather_company_records(self.records, &list.company, range).await;
        let bundle = metrics::compute_metrics(&list.company, &records, self.census, now);
        let subject = format!("{} - {}", self.settings.subject_prefix, list.company);
        let html = report::render_digest_html(&bundle, range);

        match self.sender.send(&list.emails, &subject, &html).await {
            Ok(delivery_id) => {
                tracing::info!(company = %list.company, %delivery_id, "digest sent");
                CompanyOutcome {
                    company: list.company,
                    recipients: Some(list.emails),
                    delivery_id: Some(delivery_id),
                    error: None,
                    status: OutcomeStatus::Sent,
                }
            }
            Err(err) => {
                tracing::warn!(company = %list.company, error = %err, "digest delivery failed");
                CompanyOutcome {
                    company: list.company,
                    recipients: None,
                    delivery_id: None,
                    error: Some(err.to_string()),
                    status: OutcomeStatus::Failed,
                }
            }
        }
    }
}

/// Fetches every category concurrently. A failed category is logged and
/// treated as empty so the rest of the report still goes out.
///
/// Open SAIL items and open incidents are fetched regardless of date; the
/// windowed incidents still drive the incident totals.
pub async fn gather_company_records(
    store: &dyn RecordStore,
    company: &str,
    range: DateRange,
) -> CompanyRecords {
    let windowed: Vec<RecordCategory> = RecordCategory::all()
        .into_iter()
        .filter(|category| *category != RecordCategory::SailItem)
        .collect();

    let window_fetches = join_all(windowed.iter().map(|category| async move {
        let result = store
            .fetch_records(*category, company, range.from, range.to)
            .await;
        (*category, result)
    }));
    let open_sail = store.fetch_open_records(
        RecordCategory::SailItem,
        OPEN_SAIL_STATUSES,
        StatusMode::Include,
    );
    let open_incidents = store.fetch_open_records(
        RecordCategory::Incident,
        CLOSED_INCIDENT_STATUSES,
        StatusMode::Exclude,
    );
    let (fetched, open_sail, open_incidents) =
        tokio::join!(window_fetches, open_sail, open_incidents);

    let mut records = CompanyRecords::default();
    for (category, result) in fetched {
        *records.slot_mut(category) = or_empty(company, category, result);
    }
    records.sail_items = or_empty(company, RecordCategory::SailItem, open_sail)
        .into_iter()
        .filter(|record| fields::matches_company(record, company))
        .collect();
    records.open_incident_backlog = match open_incidents {
        Ok(rows) => Some(
            rows.into_iter()
                .filter(|record| fields::matches_company(record, company))
                .collect(),
        ),
        Err(err) => {
            tracing::warn!(
                company,
                table = RecordCategory::Incident.table(),
                error = %format!("{err:#}"),
                "open incident fetch failed; using the window's incidents"
            );
            None
        }
    };
    records
}

fn or_empty(
    company: &str,
    category: RecordCategory,
    result: anyhow::Result<Vec<Record>>,
) -> Vec<Record> {
    result.unwrap_or_else(|err| {
        tracing::warn!(
            company,
            table = category.table(),
            error = %format!("{err:#}"),
            "record fetch failed; continuing without it"
        );
        Vec::new()
    })
}

/// Bundle for one company, degraded the same way as the digest.
pub async fn company_metrics(
    store: &dyn RecordStore,
    census: &EmployeeCensus,
    company: &str,
    range: DateRange,
    now: DateTime<Utc>,
) -> MetricsBundle {
    let records = gather_company_records(store, company, range).await;
    metrics::compute_metrics(company, &records, census, now)
}
