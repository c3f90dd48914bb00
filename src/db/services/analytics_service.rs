use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{ColumnTrait, PaginatorTrait, QueryFilter, QuerySelect};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::entities::{bot, conversation, document, faq, message};
use crate::db::enums::BotStatus;
use crate::db::TenantDb;
use crate::web::error::AppError;

pub const DEFAULT_WINDOW_DAYS: i64 = 30;
pub const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Totals {
    pub bots: u64,
    pub active_bots: u64,
    pub conversations: u64,
    pub messages: u64,
    pub documents: u64,
    pub faqs: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub conversations: u64,
    pub messages: u64,
}

#[derive(Debug, Serialize)]
pub struct AnalyticsOverview {
    pub days: i64,
    pub totals: Totals,
    pub daily: Vec<DailyActivity>,
}

pub fn resolve_window(days: Option<i64>) -> Result<i64, AppError> {
    let days = days.unwrap_or(DEFAULT_WINDOW_DAYS);
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(AppError::InvalidInput(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}."
        )));
    }
    Ok(days)
}

/// One entry per day from `first` to `last` inclusive, every day present.
fn bucket(
    first: NaiveDate,
    last: NaiveDate,
    conversations: &[DateTime<Utc>],
    messages: &[DateTime<Utc>],
) -> Vec<DailyActivity> {
    let mut days: BTreeMap<NaiveDate, (u64, u64)> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .map(|d| (d, (0, 0)))
        .collect();
    for at in conversations {
        if let Some(entry) = days.get_mut(&at.date_naive()) {
            entry.0 += 1;
        }
    }
    for at in messages {
        if let Some(entry) = days.get_mut(&at.date_naive()) {
            entry.1 += 1;
        }
    }
    days.into_iter()
        .map(|(date, (conversations, messages))| DailyActivity {
            date,
            conversations,
            messages,
        })
        .collect()
}

pub async fn overview(tdb: &TenantDb, days: i64, now: DateTime<Utc>) -> Result<AnalyticsOverview, AppError> {
    let last = now.date_naive();
    let first = last - Duration::days(days - 1);
    let since = first.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();

    let totals = Totals {
        bots: tdb.count::<bot::Entity>().await?,
        active_bots: tdb
            .find::<bot::Entity>()
            .filter(bot::Column::Status.eq(BotStatus::Active))
            .count(tdb.conn())
            .await?,
        conversations: tdb.count::<conversation::Entity>().await?,
        messages: tdb.count::<message::Entity>().await?,
        documents: tdb.count::<document::Entity>().await?,
        faqs: tdb.count::<faq::Entity>().await?,
    };

    let conversation_times: Vec<DateTime<Utc>> = tdb
        .find::<conversation::Entity>()
        .select_only()
        .column(conversation::Column::CreatedAt)
        .filter(conversation::Column::CreatedAt.gte(since))
        .into_tuple()
        .all(tdb.conn())
        .await?;
    let message_times: Vec<DateTime<Utc>> = tdb
        .find::<message::Entity>()
        .select_only()
        .column(message::Column::CreatedAt)
        .filter(message::Column::CreatedAt.gte(since))
        .into_tuple()
        .all(tdb.conn())
        .await?;

    Ok(AnalyticsOverview {
        days,
        totals,
        daily: bucket(first, last, &conversation_times, &message_times),
    })
}
