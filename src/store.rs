use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{Record, RecordCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub company_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientList {
    pub company: String,
    pub emails: Vec<String>,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Records for `company` (matched on any company alias) dated from the
    /// start of `date_from` through the end of `date_to`.
    async fn fetch_records(
        &self,
        category: RecordCategory,
        company: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> anyhow::Result<Vec<Record>>;

    /// Records of any company and date whose status is in (or not in) `statuses`.
    async fn fetch_open_records(
        &self,
        category: RecordCategory,
        statuses: &[&str],
        mode: StatusMode,
    ) -> anyhow::Result<Vec<Record>>;
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn lookup(&self, token: &str) -> anyhow::Result<Option<AccessToken>>;

    async fn touch(&self, token: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn active_recipients(&self) -> anyhow::Result<Vec<RecipientList>>;
}
