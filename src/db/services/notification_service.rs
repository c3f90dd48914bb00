use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, Condition, PaginatorTrait, QueryFilter,
    QueryOrder, Set, sea_query::Expr,
};
use tracing::debug;

use crate::db::entities::notification;
use crate::db::enums::NotificationKind;
use crate::db::TenantDb;
use crate::web::error::AppError;

/// Notifications addressed to the user or to everyone in the tenant.
fn visible_to(user_id: i32) -> Condition {
    Condition::any()
        .add(notification::Column::UserId.is_null())
        .add(notification::Column::UserId.eq(user_id))
}

pub async fn create_notification(
    tdb: &TenantDb,
    user_id: Option<i32>,
    kind: NotificationKind,
    title: &str,
    body: &str,
    now: DateTime<Utc>,
) -> Result<notification::Model, AppError> {
    let created = tdb
        .insert(notification::ActiveModel {
            id: NotSet,
            tenant_id: NotSet,
            user_id: Set(user_id),
            kind: Set(kind),
            title: Set(title.to_string()),
            body: Set(body.to_string()),
            read_at: Set(None),
            created_at: Set(now),
        })
        .await?;
    debug!(tenant_id = tdb.tenant_id(), notification_id = created.id, kind = ?kind, "Notification created.");
    Ok(created)
}

pub async fn has_notification_of_kind(tdb: &TenantDb, kind: NotificationKind) -> Result<bool, AppError> {
    let count = tdb
        .find::<notification::Entity>()
        .filter(notification::Column::Kind.eq(kind))
        .count(tdb.conn())
        .await?;
    Ok(count > 0)
}

pub async fn list_notifications(
    tdb: &TenantDb,
    user_id: i32,
    unread_only: bool,
) -> Result<Vec<notification::Model>, AppError> {
    let mut query = tdb.find::<notification::Entity>().filter(visible_to(user_id));
    if unread_only {
        query = query.filter(notification::Column::ReadAt.is_null());
    }
    Ok(query
        .order_by_desc(notification::Column::CreatedAt)
        .order_by_desc(notification::Column::Id)
        .all(tdb.conn())
        .await?)
}

pub async fn count_unread_notifications(tdb: &TenantDb, user_id: i32) -> Result<u64, AppError> {
    Ok(tdb
        .find::<notification::Entity>()
        .filter(visible_to(user_id))
        .filter(notification::Column::ReadAt.is_null())
        .count(tdb.conn())
        .await?)
}

async fn get_visible(tdb: &TenantDb, user_id: i32, id: i32) -> Result<notification::Model, AppError> {
    tdb.find::<notification::Entity>()
        .filter(notification::Column::Id.eq(id))
        .filter(visible_to(user_id))
        .one(tdb.conn())
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found.".to_string()))
}

pub async fn mark_notification_read(
    tdb: &TenantDb,
    user_id: i32,
    id: i32,
    now: DateTime<Utc>,
) -> Result<notification::Model, AppError> {
    let existing = get_visible(tdb, user_id, id).await?;
    if existing.read_at.is_some() {
        return Ok(existing);
    }
    let mut active: notification::ActiveModel = existing.into();
    active.read_at = Set(Some(now));
    Ok(tdb.update(active).await?)
}

pub async fn mark_all_notifications_read(
    tdb: &TenantDb,
    user_id: i32,
    now: DateTime<Utc>,
) -> Result<u64, AppError> {
    let result = tdb
        .update_many::<notification::Entity>()
        .col_expr(notification::Column::ReadAt, Expr::value(now))
        .filter(visible_to(user_id))
        .filter(notification::Column::ReadAt.is_null())
        .exec(tdb.conn())
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete_notification(tdb: &TenantDb, user_id: i32, id: i32) -> Result<(), AppError> {
    let existing = get_visible(tdb, user_id, id).await?;
    tdb.delete::<notification::Entity>(existing.id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::tenant;
    use sea_orm::ActiveModelTrait;

    async fn setup() -> (TenantDb, TenantDb) {
        let db = crate::db::connect_and_prepare("sqlite::memory:").await.unwrap();
        let now = Utc::now();
        let mut scoped = Vec::new();
        for sub in ["acme", "globex"] {
            let t = tenant::ActiveModel {
                id: NotSet,
                name: Set(sub.to_string()),
                subdomain: Set(sub.to_string()),
                custom_domain: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&db)
            .await
            .unwrap();
            scoped.push(TenantDb::new(db.clone(), t.id));
        }
        let globex = scoped.pop().unwrap();
        let acme = scoped.pop().unwrap();
        (acme, globex)
    }

    #[tokio::test]
    async fn visibility_is_broadcast_or_own() {
        let (acme, globex) = setup().await;
        let now = Utc::now();
        create_notification(&acme, None, NotificationKind::System, "all", "for everyone", now)
            .await
            .unwrap();
        create_notification(&acme, Some(1), NotificationKind::System, "one", "for user 1", now)
            .await
            .unwrap();
        create_notification(&acme, Some(2), NotificationKind::System, "two", "for user 2", now)
            .await
            .unwrap();
        create_notification(&globex, None, NotificationKind::System, "other", "other tenant", now)
            .await
            .unwrap();

        let titles: Vec<String> = list_notifications(&acme, 1, false)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles.len(), 2);
        assert!(titles.contains(&"all".to_string()));
        assert!(titles.contains(&"one".to_string()));
    }

    #[tokio::test]
    async fn read_state_and_deletion() {
        let (acme, _) = setup().await;
        let now = Utc::now();
        let mine = create_notification(&acme, Some(1), NotificationKind::System, "mine", "x", now)
            .await
            .unwrap();
        let theirs = create_notification(&acme, Some(2), NotificationKind::System, "theirs", "x", now)
            .await
            .unwrap();
        create_notification(&acme, None, NotificationKind::System, "all", "x", now)
            .await
            .unwrap();

        assert!(matches!(
            mark_notification_read(&acme, 1, theirs.id, now).await,
            Err(AppError::NotFound(_))
        ));
        let read = mark_notification_read(&acme, 1, mine.id, now).await.unwrap();
        assert!(read.read_at.is_some());
        assert_eq!(count_unread_notifications(&acme, 1).await.unwrap(), 1);

        assert_eq!(mark_all_notifications_read(&acme, 1, now).await.unwrap(), 1);
        assert!(list_notifications(&acme, 1, true).await.unwrap().is_empty());
        // User 2's own notification is untouched.
        assert_eq!(count_unread_notifications(&acme, 2).await.unwrap(), 1);

        assert!(matches!(
            delete_notification(&acme, 1, theirs.id).await,
            Err(AppError::NotFound(_))
        ));
        delete_notification(&acme, 1, mine.id).await.unwrap();
        assert_eq!(list_notifications(&acme, 1, false).await.unwrap().len(), 1);
    }
}
