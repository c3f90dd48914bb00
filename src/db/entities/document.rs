use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::DocumentStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub tenant_id: i32,
    pub knowledge_base_id: i32,
    pub title: String,
    pub source_url: Option<String>,
    pub content_type: String,
    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub content: String,
    pub status: DocumentStatus,
    pub chunk_count: i32,
    pub char_count: i32,
    pub error: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::tenant::Entity",
        from = "Column::TenantId",
        to = "super::tenant::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    Tenant,

    #[sea_orm(
        belongs_to = "super::knowledge_base::Entity",
        from = "Column::KnowledgeBaseId",
        to = "super::knowledge_base::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    KnowledgeBase,
}

impl Related<super::tenant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tenant.def()
    }
}

impl Related<super::knowledge_base::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::KnowledgeBase.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
