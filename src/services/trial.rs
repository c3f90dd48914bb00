//! Trial and subscription lifecycle: who may perform paid actions, and how
//! billing events move a subscription between states.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::entities::subscription;
use crate::db::enums::{Plan, SubscriptionStatus};

/// Why a tenant may not perform a paid action right now.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenial {
    #[error("The free trial has ended. Upgrade to continue.")]
    TrialExpired,
    #[error("The last payment failed. Update the payment method to continue.")]
    PaymentOverdue,
    #[error("The subscription was canceled.")]
    SubscriptionCanceled,
    #[error("No subscription exists for this workspace.")]
    NoSubscription,
}

impl AccessDenial {
    pub fn code(&self) -> &'static str {
        match self {
            AccessDenial::TrialExpired => "TRIAL_EXPIRED",
            AccessDenial::PaymentOverdue => "PAYMENT_OVERDUE",
            AccessDenial::SubscriptionCanceled => "SUBSCRIPTION_CANCELED",
            AccessDenial::NoSubscription => "NO_SUBSCRIPTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrialStatus {
    pub is_trial: bool,
    pub expired: bool,
    pub days_remaining: i64,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

pub fn trial_ends_at(started_at: DateTime<Utc>, trial_days: i64) -> DateTime<Utc> {
    started_at + Duration::days(trial_days)
}

pub fn trial_status(sub: &subscription::Model, now: DateTime<Utc>) -> TrialStatus {
    let is_trial = matches!(
        sub.status,
        SubscriptionStatus::Trialing | SubscriptionStatus::Expired
    ) && sub.external_id.is_none();

    match (sub.status, sub.trial_ends_at) {
        (SubscriptionStatus::Trialing, Some(ends_at)) if now < ends_at => {
            let remaining = ends_at - now;
            let whole_days = remaining.num_days();
            let days_remaining = if remaining > Duration::days(whole_days) {
                whole_days + 1
            } else {
                whole_days
            };
            TrialStatus {
                is_trial: true,
                expired: false,
                days_remaining,
                trial_ends_at: Some(ends_at),
            }
        }
        (SubscriptionStatus::Trialing, ends_at) | (SubscriptionStatus::Expired, ends_at) => {
            TrialStatus {
                is_trial,
                expired: true,
                days_remaining: 0,
                trial_ends_at: ends_at,
            }
        }
        (_, ends_at) => TrialStatus {
            is_trial: false,
            expired: false,
            days_remaining: 0,
            trial_ends_at: ends_at,
        },
    }
}

/// The gate in front of every paid action.
pub fn can_perform_paid_action(
    sub: Option<&subscription::Model>,
    now: DateTime<Utc>,
) -> Result<(), AccessDenial> {
    let Some(sub) = sub else {
        return Err(AccessDenial::NoSubscription);
    };

    match sub.status {
        SubscriptionStatus::Active => Ok(()),
        SubscriptionStatus::Trialing => match sub.trial_ends_at {
            Some(ends_at) if now < ends_at => Ok(()),
            // A trial without an end date is treated as over.
            _ => Err(AccessDenial::TrialExpired),
        },
        SubscriptionStatus::Expired => Err(AccessDenial::TrialExpired),
        SubscriptionStatus::PastDue => Err(AccessDenial::PaymentOverdue),
        SubscriptionStatus::Canceled => match sub.current_period_end {
            Some(period_end) if now < period_end => Ok(()),
            _ => Err(AccessDenial::SubscriptionCanceled),
        },
    }
}

/// Trials needing attention from the lifecycle sweep.
pub fn needs_expiry(sub: &subscription::Model, now: DateTime<Utc>) -> bool {
    sub.status == SubscriptionStatus::Trialing && sub.trial_ends_at.map_or(true, |ends| ends <= now)
}

pub fn ends_soon(sub: &subscription::Model, now: DateTime<Utc>, window: Duration) -> bool {
    sub.status == SubscriptionStatus::Trialing
        && sub
            .trial_ends_at
            .is_some_and(|ends| ends > now && ends - now <= window)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub max_bots: u64,
    pub max_widgets: u64,
    pub max_documents: u64,
    pub max_messages_per_month: u64,
}

impl Plan {
    pub fn limits(self) -> PlanLimits {
        match self {
            Plan::Starter => PlanLimits {
                max_bots: 3,
                max_widgets: 3,
                max_documents: 50,
                max_messages_per_month: 2_000,
            },
            Plan::Pro => PlanLimits {
                max_bots: 20,
                max_widgets: 20,
                max_documents: 1_000,
                max_messages_per_month: 50_000,
            },
            Plan::Enterprise => PlanLimits {
                max_bots: 500,
                max_widgets: 500,
                max_documents: 100_000,
                max_messages_per_month: 5_000_000,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingEventKind {
    Activated,
    Renewed,
    PaymentFailed,
    Canceled,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot apply {event:?} to a {from} subscription")]
pub struct TransitionError {
    pub from: SubscriptionStatus,
    pub event: BillingEventKind,
}

pub fn apply_billing_event(
    from: SubscriptionStatus,
    event: BillingEventKind,
) -> Result<SubscriptionStatus, TransitionError> {
    use BillingEventKind as E;
    use SubscriptionStatus as S;

    match (from, event) {
        (S::Trialing | S::Expired | S::PastDue | S::Canceled, E::Activated) => Ok(S::Active),
        (S::Active | S::PastDue, E::Renewed) => Ok(S::Active),
        (S::Active, E::PaymentFailed) => Ok(S::PastDue),
        (S::Trialing | S::Active | S::PastDue, E::Canceled) => Ok(S::Canceled),
        _ => Err(TransitionError { from, event }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn sub(status: SubscriptionStatus, trial_ends_at: Option<DateTime<Utc>>) -> subscription::Model {
        subscription::Model {
            id: 1,
            tenant_id: 1,
            plan: Plan::Starter,
            status,
            trial_ends_at,
            current_period_end: None,
            external_id: None,
            created_at: now() - Duration::days(10),
            updated_at: now() - Duration::days(10),
        }
    }

    #[test]
    fn active_trial_allows_paid_actions() {
        let s = sub(SubscriptionStatus::Trialing, Some(now() + Duration::hours(1)));
        assert_eq!(can_perform_paid_action(Some(&s), now()), Ok(()));
    }

    #[test]
    fn trial_past_end_is_denied_before_the_sweep_runs() {
        let s = sub(SubscriptionStatus::Trialing, Some(now() - Duration::seconds(1)));
        assert_eq!(
            can_perform_paid_action(Some(&s), now()),
            Err(AccessDenial::TrialExpired)
        );
    }

    #[test]
    fn trial_end_boundary_is_exclusive() {
        let s = sub(SubscriptionStatus::Trialing, Some(now()));
        assert_eq!(
            can_perform_paid_action(Some(&s), now()),
            Err(AccessDenial::TrialExpired)
        );
        assert!(needs_expiry(&s, now()));
    }

    #[test]
    fn trial_without_end_date_fails_closed() {
        let s = sub(SubscriptionStatus::Trialing, None);
        assert_eq!(
            can_perform_paid_action(Some(&s), now()),
            Err(AccessDenial::TrialExpired)
        );
    }

    #[test]
    fn other_statuses() {
        assert_eq!(can_perform_paid_action(None, now()), Err(AccessDenial::NoSubscription));

        let active = sub(SubscriptionStatus::Active, None);
        assert_eq!(can_perform_paid_action(Some(&active), now()), Ok(()));

        let expired = sub(SubscriptionStatus::Expired, Some(now() - Duration::days(1)));
        assert_eq!(
            can_perform_paid_action(Some(&expired), now()),
            Err(AccessDenial::TrialExpired)
        );

        let past_due = sub(SubscriptionStatus::PastDue, None);
        assert_eq!(
            can_perform_paid_action(Some(&past_due), now()),
            Err(AccessDenial::PaymentOverdue)
        );

        let mut canceled = sub(SubscriptionStatus::Canceled, None);
        canceled.current_period_end = Some(now() + Duration::days(3));
        assert_eq!(can_perform_paid_action(Some(&canceled), now()), Ok(()));
        canceled.current_period_end = Some(now() - Duration::days(3));
        assert_eq!(
            can_perform_paid_action(Some(&canceled), now()),
            Err(AccessDenial::SubscriptionCanceled)
        );
    }

    #[test]
    fn days_remaining_rounds_partial_days_up() {
        let s = sub(
            SubscriptionStatus::Trialing,
            Some(now() + Duration::days(2) + Duration::hours(1)),
        );
        let status = trial_status(&s, now());
        assert!(status.is_trial);
        assert!(!status.expired);
        assert_eq!(status.days_remaining, 3);

        let exact = sub(SubscriptionStatus::Trialing, Some(now() + Duration::days(2)));
        assert_eq!(trial_status(&exact, now()).days_remaining, 2);

        let over = sub(SubscriptionStatus::Trialing, Some(now() - Duration::minutes(5)));
        let status = trial_status(&over, now());
        assert!(status.expired);
        assert_eq!(status.days_remaining, 0);
    }

    #[test]
    fn ends_soon_window() {
        let s = sub(SubscriptionStatus::Trialing, Some(now() + Duration::days(2)));
        assert!(ends_soon(&s, now(), Duration::days(3)));
        assert!(!ends_soon(&s, now(), Duration::days(1)));
        assert!(!needs_expiry(&s, now()));

        let active = sub(SubscriptionStatus::Active, Some(now() + Duration::days(2)));
        assert!(!ends_soon(&active, now(), Duration::days(3)));
    }

    #[test]
    fn billing_transitions() {
        use BillingEventKind as E;
        use SubscriptionStatus as S;

        assert_eq!(apply_billing_event(S::Trialing, E::Activated), Ok(S::Active));
        assert_eq!(apply_billing_event(S::Expired, E::Activated), Ok(S::Active));
        assert_eq!(apply_billing_event(S::Active, E::PaymentFailed), Ok(S::PastDue));
        assert_eq!(apply_billing_event(S::PastDue, E::Renewed), Ok(S::Active));
        assert_eq!(apply_billing_event(S::Active, E::Canceled), Ok(S::Canceled));

        assert!(apply_billing_event(S::Expired, E::Renewed).is_err());
        assert!(apply_billing_event(S::Canceled, E::Canceled).is_err());
        assert!(apply_billing_event(S::Trialing, E::PaymentFailed).is_err());
    }

    #[test]
    fn plan_limits_grow_with_the_plan() {
        assert!(Plan::Starter.limits().max_bots < Plan::Pro.limits().max_bots);
        assert!(Plan::Pro.limits().max_bots < Plan::Enterprise.limits().max_bots);
    }
}
