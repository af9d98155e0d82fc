use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::fields;
use crate::models::{Record, RecordCategory};
use crate::store::{
    AccessToken, AccessTokenStore, RecipientDirectory, RecipientList, RecordStore, StatusMode,
};

/// The hosted Postgres backend, reading every table row as JSON.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }
}

fn company_filter(param: usize) -> String {
    fields::COMPANY
        .iter()
        .map(|key| format!("to_jsonb(t)->>'{key}' = ${param}"))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn records_query(category: RecordCategory) -> String {
    let date = format!(
        "(to_jsonb(t)->>'{}')::timestamptz",
        category.date_column()
    );
    format!(
        "SELECT to_jsonb(t) AS record FROM {table} t \
         WHERE ({company}) AND {date} >= $2 AND {date} < $3",
        table = category.table(),
        company = company_filter(1),
    )
}

fn open_records_query(category: RecordCategory, mode: StatusMode) -> String {
    let condition = match mode {
        StatusMode::Include => "to_jsonb(t)->>'status' = ANY($1)",
        StatusMode::Exclude => {
            "(to_jsonb(t)->>'status' IS NULL OR NOT (to_jsonb(t)->>'status' = ANY($1)))"
        }
    };
    format!(
        "SELECT to_jsonb(t) AS record FROM {} t WHERE {condition}",
        category.table()
    )
}

/// `[from 00:00, to + 1 day 00:00)` in UTC.
pub(crate) fn day_bounds(date_from: NaiveDate, date_to: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date_from.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = (date_to + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();
    (start, end)
}

fn decode_records(rows: Vec<sqlx::postgres::PgRow>) -> anyhow::Result<Vec<Record>> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let value: serde_json::Value = row.try_get("record")?;
        if let Some(record) = Record::from_value(value) {
            records.push(record);
        }
    }
    Ok(records)
}

#[async_trait]
impl RecordStore for PgStore {
    async fn fetch_records(
        &self,
        category: RecordCategory,
        company: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> anyhow::Result<Vec<Record>> {
        let (start, end) = day_bounds(date_from, date_to);
        let rows = sqlx::query(&records_query(category))
            .bind(company)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to fetch {}", category.table()))?;
        decode_records(rows)
    }

    async fn fetch_open_records(
        &self,
        category: RecordCategory,
        statuses: &[&str],
        mode: StatusMode,
    ) -> anyhow::Result<Vec<Record>> {
        let statuses: Vec<String> = statuses.iter().map(|status| status.to_string()).collect();
        let rows = sqlx::query(&open_records_query(category, mode))
            .bind(statuses)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("failed to fetch open {}", category.table()))?;
        decode_records(rows)
    }
}

#[async_trait]
impl AccessTokenStore for PgStore {
    async fn lookup(&self, token: &str) -> anyhow::Result<Option<AccessToken>> {
        let row = sqlx::query(
            "SELECT company_name, is_active FROM client_access_tokens WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up access token")?;

        Ok(row.map(|row| AccessToken {
            company_name: row.get("company_name"),
            is_active: row.get("is_active"),
        }))
    }

    async fn touch(&self, token: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE client_access_tokens SET last_accessed_at = now() WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .context("failed to record token access")?;
        Ok(())
    }
}

#[async_trait]
impl RecipientDirectory for PgStore {
    async fn active_recipients(&self) -> anyhow::Result<Vec<RecipientList>> {
        let rows = sqlx::query(
            "SELECT company_name, emails FROM report_recipients \
             WHERE is_active ORDER BY company_name",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load report recipients")?;

        let mut lists = Vec::with_capacity(rows.len());
        for row in rows {
            lists.push(RecipientList {
                company: row.try_get("company_name")?,
                emails: row.try_get("emails")?,
            });
        }
        Ok(lists)
    }
}
