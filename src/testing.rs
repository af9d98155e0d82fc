//! In-memory stand-ins for the backend, shared by the async tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::db;
use crate::error::DeliveryError;
use crate::fields;
use crate::models::{Record, RecordCategory};
use crate::notify::NotificationSender;
use crate::store::{
    AccessToken, AccessTokenStore, RecipientDirectory, RecipientList, RecordStore, StatusMode,
};

#[derive(Default)]
pub struct FakeStore {
    tables: HashMap<&'static str, Vec<Record>>,
    failing: HashSet<&'static str>,
}

impl FakeStore {
    pub fn with(mut self, category: RecordCategory, rows: Vec<Value>) -> Self {
        self.tables
            .entry(category.table())
            .or_default()
            .extend(rows.into_iter().map(Record::from));
        self
    }

    pub fn failing(mut self, category: RecordCategory) -> Self {
        self.failing.insert(category.table());
        self
    }

    fn table(&self, category: RecordCategory) -> anyhow::Result<&[Record]> {
        if self.failing.contains(category.table()) {
            anyhow::bail!("{} unavailable", category.table());
        }
        Ok(self
            .tables
            .get(category.table())
            .map(Vec::as_slice)
            .unwrap_or_default())
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn fetch_records(
        &self,
        category: RecordCategory,
        company: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> anyhow::Result<Vec<Record>> {
        let (start, end) = db::day_bounds(date_from, date_to);
        Ok(self
            .table(category)?
            .iter()
            .filter(|record| fields::matches_company(record, company))
            .filter(|record| {
                fields::str_field(record, category.date_column())
                    .and_then(fields::parse_timestamp)
                    .is_some_and(|at| at >= start && at < end)
            })
            .cloned()
            .collect())
    }

    async fn fetch_open_records(
        &self,
        category: RecordCategory,
        statuses: &[&str],
        mode: StatusMode,
    ) -> anyhow::Result<Vec<Record>> {
        Ok(self
            .table(category)?
            .iter()
            .filter(|record| {
                let listed = fields::str_field(record, "status")
                    .is_some_and(|status| statuses.contains(&status));
                match mode {
                    StatusMode::Include => listed,
                    StatusMode::Exclude => !listed,
                }
            })
            .cloned()
            .collect())
    }
}

pub struct FakeDirectory {
    lists: Option<Vec<RecipientList>>,
}

impl FakeDirectory {
    pub fn new(lists: Vec<(&str, Vec<&str>)>) -> Self {
        Self {
            lists: Some(
                lists
                    .into_iter()
                    .map(|(company, emails)| RecipientList {
                        company: company.to_string(),
                        emails: emails.into_iter().map(str::to_string).collect(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn unavailable() -> Self {
        Self { lists: None }
    }
}

#[async_trait]
impl RecipientDirectory for FakeDirectory {
    async fn active_recipients(&self) -> anyhow::Result<Vec<RecipientList>> {
        self.lists
            .clone()
            .ok_or_else(|| anyhow::anyhow!("report_recipients unavailable"))
    }
}

#[derive(Default)]
pub struct FakeSender {
    reject: Vec<String>,
    sent: Mutex<Vec<String>>,
}

impl FakeSender {
    pub fn failing_for(recipients: &[&str]) -> Self {
        Self {
            reject: recipients.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn sent_subjects(&self) -> Vec<String> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSender for FakeSender {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        _html_body: &str,
    ) -> Result<String, DeliveryError> {
        if recipients.iter().any(|r| self.reject.contains(r)) {
            return Err(DeliveryError::Rejected {
                status: 422,
                body: "invalid recipient".to_string(),
            });
        }
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push(subject.to_string());
        Ok(format!("msg_{}", sent.len()))
    }
}

#[derive(Default)]
pub struct FakeTokens {
    tokens: HashMap<String, AccessToken>,
    touched: Mutex<Vec<String>>,
}

impl FakeTokens {
    pub fn with(mut self, token: &str, company: &str, is_active: bool) -> Self {
        self.tokens.insert(
            token.to_string(),
            AccessToken {
                company_name: company.to_string(),
                is_active,
            },
        );
        self
    }

    pub fn touched(&self) -> Vec<String> {
        self.touched.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccessTokenStore for FakeTokens {
    async fn lookup(&self, token: &str) -> anyhow::Result<Option<AccessToken>> {
        Ok(self.tokens.get(token).cloned())
    }

    async fn touch(&self, token: &str) -> anyhow::Result<()> {
        self.touched.lock().expect("touched lock").push(token.to_string());
        Ok(())
    }
}
