use chrono::{DateTime, Duration, Utc};
use futures::future::try_join_all;

use crate::error::AccessDenied;
use crate::metrics::{self, EmployeeCensus};
use crate::models::{CompanyRecords, DateRange, MetricsBundle, RecordCategory};
use crate::store::{AccessTokenStore, RecordStore};

/// What the scorecard page shows for a validated token.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub company: String,
    pub range: DateRange,
    pub metrics: MetricsBundle,
}

/// Resolves `token` and loads its company's scorecard for the last
/// `window_days`. Unlike the digest, any failed fetch refuses the page.
pub async fn open_dashboard(
    tokens: &dyn AccessTokenStore,
    store: &dyn RecordStore,
    census: &EmployeeCensus,
    token: &str,
    window_days: i64,
    now: DateTime<Utc>,
) -> Result<Dashboard, AccessDenied> {
    let access = tokens
        .lookup(token.trim())
        .await
        .map_err(|err| AccessDenied::DataLoad(format!("{err:#}")))?
        .ok_or(AccessDenied::TokenNotFound)?;
    if !access.is_active {
        return Err(AccessDenied::TokenInactive);
    }

    if let Err(err) = tokens.touch(token.trim()).await {
        tracing::debug!(error = %err, "failed to record token access");
    }

    let range = DateRange {
        from: (now - Duration::days(window_days.max(1))).date_naive(),
        to: now.date_naive(),
    };
    let company = access.company_name;
    let fetched = try_join_all(RecordCategory::all().into_iter().map(|category| {
        let company = company.as_str();
        async move {
            store
                .fetch_records(category, company, range.from, range.to)
                .await
                .map(|rows| (category, rows))
        }
    }))
    .await
    .map_err(|err| {
        tracing::warn!(company = %company, error = %format!("{err:#}"), "scorecard load failed");
        AccessDenied::DataLoad(format!("{err:#}"))
    })?;

    let mut records = CompanyRecords::default();
    for (category, rows) in fetched {
        *records.slot_mut(category) = rows;
    }

    let metrics = metrics::compute_metrics(&company, &records, census, now);
    tracing::info!(company = %company, "scorecard served");
    Ok(Dashboard {
        company,
        range,
        metrics,
    })
}
