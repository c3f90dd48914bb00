use axum::{
    Json, Router,
    extract::{Extension, Query},
    routing::get,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::TenantDb;
use crate::db::services::{self, AnalyticsOverview};
use crate::services::access::{Permission, require};
use crate::web::models::AuthenticatedUser;
use crate::web::{AppError, AppState};

pub fn create_analytics_router() -> Router<Arc<AppState>> {
    Router::new().route("/overview", get(overview))
}

#[derive(Debug, Deserialize)]
pub struct OverviewQuery {
    pub days: Option<i64>,
}

async fn overview(
    Extension(auth_user): Extension<AuthenticatedUser>,
    tdb: TenantDb,
    Query(query): Query<OverviewQuery>,
) -> Result<Json<AnalyticsOverview>, AppError> {
    require(&auth_user, Permission::AnalyticsRead)?;
    let days = services::resolve_window(query.days)?;
    Ok(Json(services::overview(&tdb, days, Utc::now()).await?))
}
