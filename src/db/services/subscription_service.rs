//! Subscription state, plan quotas and the trial lifecycle sweep.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, sea_query::Expr,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::db::entities::{bot, document, message, subscription, tenant, widget};
use crate::db::enums::{MessageRole, NotificationKind, Plan, SubscriptionStatus};
use crate::db::services::notification_service::{create_notification, has_notification_of_kind};
use crate::db::TenantDb;
use crate::services::trial::{self, BillingEventKind, PlanLimits};
use crate::web::error::AppError;
use crate::web::models::{BillingOverview, Usage};

/// Length of a billing period when the provider does not send one.
pub const DEFAULT_PERIOD_DAYS: i64 = 30;
/// Trials ending within this window get a reminder.
pub const TRIAL_REMINDER_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Bots,
    Widgets,
    Documents,
}

impl Quota {
    fn limit(self, limits: &PlanLimits) -> u64 {
        match self {
            Quota::Bots => limits.max_bots,
            Quota::Widgets => limits.max_widgets,
            Quota::Documents => limits.max_documents,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Quota::Bots => "bots",
            Quota::Widgets => "widgets",
            Quota::Documents => "documents",
        }
    }
}

pub async fn get_subscription(tdb: &TenantDb) -> Result<Option<subscription::Model>, AppError> {
    Ok(tdb.find::<subscription::Entity>().one(tdb.conn()).await?)
}

/// Loads the subscription and fails with the denial reason unless paid actions are allowed.
pub async fn ensure_paid_access(
    tdb: &TenantDb,
    now: DateTime<Utc>,
) -> Result<subscription::Model, AppError> {
    let sub = get_subscription(tdb).await?;
    trial::can_perform_paid_action(sub.as_ref(), now)?;
    // can_perform_paid_action rejects a missing row.
    sub.ok_or(AppError::PaidAccessDenied(trial::AccessDenial::NoSubscription))
}

async fn quota_usage(tdb: &TenantDb, quota: Quota) -> Result<u64, AppError> {
    let used = match quota {
        Quota::Bots => tdb.count::<bot::Entity>().await?,
        Quota::Widgets => tdb.count::<widget::Entity>().await?,
        Quota::Documents => tdb.count::<document::Entity>().await?,
    };
    Ok(used)
}

/// Gate in front of creating a plan-limited resource.
pub async fn ensure_can_create(
    tdb: &TenantDb,
    quota: Quota,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let sub = ensure_paid_access(tdb, now).await?;
    let limit = quota.limit(&sub.plan.limits());
    let used = quota_usage(tdb, quota).await?;
    if used >= limit {
        return Err(AppError::PlanLimitReached(format!(
            "The {} plan allows at most {limit} {}.",
            sub.plan,
            quota.label()
        )));
    }
    Ok(())
}

pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Visitor messages received since the start of the calendar month.
pub async fn messages_this_month(tdb: &TenantDb, now: DateTime<Utc>) -> Result<u64, AppError> {
    Ok(tdb
        .find::<message::Entity>()
        .filter(message::Column::Role.eq(MessageRole::User))
        .filter(message::Column::CreatedAt.gte(month_start(now)))
        .count(tdb.conn())
        .await?)
}

pub async fn ensure_message_quota(
    tdb: &TenantDb,
    sub: &subscription::Model,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let limit = sub.plan.limits().max_messages_per_month;
    if messages_this_month(tdb, now).await? >= limit {
        return Err(AppError::PlanLimitReached(format!(
            "The monthly limit of {limit} messages has been reached."
        )));
    }
    Ok(())
}

pub async fn usage(tdb: &TenantDb, now: DateTime<Utc>) -> Result<Usage, AppError> {
    Ok(Usage {
        bots: quota_usage(tdb, Quota::Bots).await?,
        widgets: quota_usage(tdb, Quota::Widgets).await?,
        documents: quota_usage(tdb, Quota::Documents).await?,
        messages_this_month: messages_this_month(tdb, now).await?,
    })
}

pub async fn billing_overview(tdb: &TenantDb, now: DateTime<Utc>) -> Result<BillingOverview, AppError> {
    let sub = get_subscription(tdb).await?;
    let gate = trial::can_perform_paid_action(sub.as_ref(), now);
    Ok(BillingOverview {
        trial: sub.as_ref().map(|s| trial::trial_status(s, now)),
        limits: sub.as_ref().map(|s| s.plan.limits()),
        can_perform_paid_action: gate.is_ok(),
        denial_reason: gate.err().map(|d| d.code()),
        subscription: sub,
        usage: usage(tdb, now).await?,
    })
}

/// Cancels at period end. A canceled trial keeps working until the trial would have ended.
pub async fn cancel_subscription(
    tdb: &TenantDb,
    now: DateTime<Utc>,
) -> Result<subscription::Model, AppError> {
    let sub = get_subscription(tdb)
        .await?
        .ok_or_else(|| AppError::NotFound("No subscription exists for this workspace.".to_string()))?;
    let status = trial::apply_billing_event(sub.status, BillingEventKind::Canceled)
        .map_err(|e| AppError::Conflict(e.to_string()))?;

    let period_end = match sub.status {
        SubscriptionStatus::Trialing => sub.trial_ends_at,
        _ => sub.current_period_end,
    };

    let mut active: subscription::ActiveModel = sub.into();
    active.status = Set(status);
    active.current_period_end = Set(period_end);
    active.updated_at = Set(now);
    let updated = tdb.update(active).await?;
    info!(tenant_id = tdb.tenant_id(), "Subscription canceled by the customer.");
    Ok(updated)
}

/// Event posted by the billing provider integration.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingEvent {
    pub tenant_id: i32,
    pub event: BillingEventKind,
    pub plan: Option<Plan>,
    pub external_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
}

pub async fn apply_webhook_event(
    db: &DatabaseConnection,
    event: BillingEvent,
    now: DateTime<Utc>,
) -> Result<subscription::Model, AppError> {
    tenant::Entity::find_by_id(event.tenant_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Tenant {} not found.", event.tenant_id)))?;

    let tdb = TenantDb::new(db.clone(), event.tenant_id);
    let sub = get_subscription(&tdb)
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant has no subscription.".to_string()))?;

    let from = sub.status;
    let status = trial::apply_billing_event(from, event.event).map_err(|e| {
        warn!(tenant_id = event.tenant_id, error = %e, "Rejected billing event.");
        AppError::Conflict(e.to_string())
    })?;

    let next_period_end = |current: Option<DateTime<Utc>>| {
        event.current_period_end.unwrap_or_else(|| {
            let base = current.filter(|end| *end > now).unwrap_or(now);
            base + Duration::days(DEFAULT_PERIOD_DAYS)
        })
    };

    let mut active: subscription::ActiveModel = sub.clone().into();
    active.status = Set(status);
    active.updated_at = Set(now);
    match event.event {
        BillingEventKind::Activated => {
            if let Some(plan) = event.plan {
                active.plan = Set(plan);
            }
            active.current_period_end = Set(Some(event.current_period_end.unwrap_or(now + Duration::days(DEFAULT_PERIOD_DAYS))));
        }
        BillingEventKind::Renewed => {
            if let Some(plan) = event.plan {
                active.plan = Set(plan);
            }
            active.current_period_end = Set(Some(next_period_end(sub.current_period_end)));
        }
        BillingEventKind::PaymentFailed => {}
        BillingEventKind::Canceled => {
            if let Some(end) = event.current_period_end {
                active.current_period_end = Set(Some(end));
            }
        }
    }
    if let Some(external_id) = event.external_id.clone().filter(|id| !id.is_empty()) {
        active.external_id = Set(Some(external_id));
    }
    let updated = tdb.update(active).await?;

    let (kind, title, body) = match event.event {
        BillingEventKind::Activated => (
            NotificationKind::SubscriptionActivated,
            "Subscription activated",
            format!("Your {} plan is now active.", updated.plan),
        ),
        BillingEventKind::Renewed => (
            NotificationKind::SubscriptionActivated,
            "Subscription renewed",
            format!("Your {} plan has been renewed.", updated.plan),
        ),
        BillingEventKind::PaymentFailed => (
            NotificationKind::PaymentFailed,
            "Payment failed",
            "We could not charge your payment method. Paid features are paused until the payment succeeds."
                .to_string(),
        ),
        BillingEventKind::Canceled => (
            NotificationKind::SubscriptionCanceled,
            "Subscription canceled",
            "Your subscription has been canceled.".to_string(),
        ),
    };
    create_notification(&tdb, None, kind, title, &body, now).await?;

    info!(
        tenant_id = event.tenant_id,
        from = %from,
        to = %updated.status,
        "Applied billing event."
    );
    Ok(updated)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub reminded: usize,
}

/// Moves a subscription from Trialing to Expired. Returns false when the row
/// is no longer Trialing, e.g. a billing event activated it meanwhile.
async fn expire_trial(db: &DatabaseConnection, id: i32, now: DateTime<Utc>) -> Result<bool, AppError> {
    let result = subscription::Entity::update_many()
        .col_expr(subscription::Column::Status, Expr::value(SubscriptionStatus::Expired))
        .col_expr(subscription::Column::UpdatedAt, Expr::value(now))
        .filter(subscription::Column::Id.eq(id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Trialing))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Expires finished trials and reminds tenants whose trial ends soon.
pub async fn run_trial_sweep(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError> {
    let trialing = subscription::Entity::find()
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Trialing))
        .all(db)
        .await?;

    let mut report = SweepReport::default();
    let window = Duration::days(TRIAL_REMINDER_WINDOW_DAYS);

    for sub in trialing {
        let tdb = TenantDb::new(db.clone(), sub.tenant_id);

        if trial::needs_expiry(&sub, now) {
            if !expire_trial(db, sub.id, now).await? {
                // The subscription left Trialing after it was loaded.
                continue;
            }
            create_notification(
                &tdb,
                None,
                NotificationKind::TrialExpired,
                "Your trial has ended",
                "Choose a plan to keep your bots answering visitors.",
                now,
            )
            .await?;
            report.expired += 1;
            info!(tenant_id = tdb.tenant_id(), "Trial expired.");
        } else if trial::ends_soon(&sub, now, window)
            && !has_notification_of_kind(&tdb, NotificationKind::TrialEndingSoon).await?
        {
            let days = trial::trial_status(&sub, now).days_remaining;
            create_notification(
                &tdb,
                None,
                NotificationKind::TrialEndingSoon,
                "Your trial ends soon",
                &format!("Your free trial ends in {days} day(s). Choose a plan to avoid interruption."),
                now,
            )
            .await?;
            report.reminded += 1;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::notification;
    use crate::db::services::notification_service::list_notifications;
    use crate::services::trial::AccessDenial;
    use sea_orm::ActiveValue::NotSet;

    async fn setup(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>) -> (DatabaseConnection, TenantDb) {
        let db = crate::db::connect_and_prepare("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let t = tenant::ActiveModel {
            id: NotSet,
            name: Set("Acme".to_string()),
            subdomain: Set("acme".to_string()),
            custom_domain: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&db)
        .await
        .unwrap();
        let tdb = TenantDb::new(db.clone(), t.id);
        tdb.insert(subscription::ActiveModel {
            id: NotSet,
            tenant_id: Set(t.id),
            plan: Set(Plan::Starter),
            status: Set(status),
            trial_ends_at: Set(trial_ends_at),
            current_period_end: Set(None),
            external_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .await
        .unwrap();
        (db, tdb)
    }

    fn event(tenant_id: i32, kind: BillingEventKind) -> BillingEvent {
        BillingEvent {
            tenant_id,
            event: kind,
            plan: None,
            external_id: None,
            current_period_end: None,
        }
    }

    #[test]
    fn month_start_is_first_of_month_utc() {
        let now = Utc.with_ymd_and_hms(2026, 3, 17, 8, 30, 0).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn expired_trial_blocks_creation() {
        let now = Utc::now();
        let (_db, tdb) = setup(SubscriptionStatus::Trialing, Some(now - Duration::minutes(1))).await;
        let err = ensure_can_create(&tdb, Quota::Bots, now).await.unwrap_err();
        assert!(matches!(err, AppError::PaidAccessDenied(AccessDenial::TrialExpired)));
    }

    #[tokio::test]
    async fn webhook_activation_upgrades_plan_and_notifies() {
        let now = Utc::now();
        let (db, tdb) = setup(SubscriptionStatus::Trialing, Some(now + Duration::days(2))).await;

        let mut ev = event(tdb.tenant_id(), BillingEventKind::Activated);
        ev.plan = Some(Plan::Pro);
        ev.external_id = Some("sub_123".to_string());
        let sub = apply_webhook_event(&db, ev, now).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.plan, Plan::Pro);
        assert_eq!(sub.external_id.as_deref(), Some("sub_123"));
        assert!(sub.current_period_end.unwrap() > now);

        let notes = list_notifications(&tdb, 1, false).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].kind, NotificationKind::SubscriptionActivated);

        // Renewing a canceled subscription is not a valid transition.
        apply_webhook_event(&db, event(tdb.tenant_id(), BillingEventKind::Canceled), now)
            .await
            .unwrap();
        let err = apply_webhook_event(&db, event(tdb.tenant_id(), BillingEventKind::Renewed), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn canceling_a_trial_keeps_access_until_trial_end() {
        let now = Utc::now();
        let ends = now + Duration::days(5);
        let (_db, tdb) = setup(SubscriptionStatus::Trialing, Some(ends)).await;

        let sub = cancel_subscription(&tdb, now).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert!(ensure_paid_access(&tdb, now).await.is_ok());
        assert!(matches!(
            ensure_paid_access(&tdb, ends + Duration::seconds(1)).await,
            Err(AppError::PaidAccessDenied(AccessDenial::SubscriptionCanceled))
        ));
        assert!(matches!(cancel_subscription(&tdb, now).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn sweep_expires_and_reminds_once() {
        let now = Utc::now();
        let (db, tdb) = setup(SubscriptionStatus::Trialing, Some(now + Duration::days(2))).await;

        let first = run_trial_sweep(&db, now).await.unwrap();
        assert_eq!(first, SweepReport { expired: 0, reminded: 1 });
        let second = run_trial_sweep(&db, now + Duration::hours(1)).await.unwrap();
        assert_eq!(second, SweepReport { expired: 0, reminded: 0 });

        let later = now + Duration::days(3);
        let third = run_trial_sweep(&db, later).await.unwrap();
        assert_eq!(third, SweepReport { expired: 1, reminded: 0 });

        let sub = get_subscription(&tdb).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Expired);
        let kinds: Vec<_> = tdb
            .find::<notification::Entity>()
            .all(&db)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.kind)
            .collect();
        assert!(kinds.contains(&NotificationKind::TrialEndingSoon));
        assert!(kinds.contains(&NotificationKind::TrialExpired));
    }

    #[tokio::test]
    async fn expiry_does_not_overwrite_a_concurrent_activation() {
        let now = Utc::now();
        let (db, tdb) = setup(SubscriptionStatus::Trialing, Some(now - Duration::hours(1))).await;
        let loaded = get_subscription(&tdb).await.unwrap().unwrap();
        assert!(trial::needs_expiry(&loaded, now));

        // A payment lands between the sweep's read and its write.
        apply_webhook_event(&db, event(tdb.tenant_id(), BillingEventKind::Activated), now)
            .await
            .unwrap();

        assert!(!expire_trial(&db, loaded.id, now).await.unwrap());
        let sub = get_subscription(&tdb).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(!has_notification_of_kind(&tdb, NotificationKind::TrialExpired).await.unwrap());
    }
}
