//! Tenant-scoped data access.
//!
//! A [`TenantDb`] is built once per request from the authenticated user and
//! is the only way route handlers reach tenant data. Every query it hands out
//! already carries `tenant_id = <tenant>`; rows owned by another tenant behave
//! exactly like rows that do not exist.

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, DeleteMany,
    EntityName, EntityTrait, IntoActiveModel, PaginatorTrait, QueryFilter, Select, UpdateMany,
    Value,
};

use crate::db::entities;

/// Entities whose rows belong to exactly one tenant.
pub trait TenantOwned: EntityTrait {
    fn tenant_column() -> Self::Column;
    fn id_column() -> Self::Column;
}

macro_rules! tenant_owned {
    ($($module:ident),+ $(,)?) => {
        $(
            impl TenantOwned for entities::$module::Entity {
                fn tenant_column() -> Self::Column {
                    entities::$module::Column::TenantId
                }
                fn id_column() -> Self::Column {
                    entities::$module::Column::Id
                }
            }
        )+
    };
}

tenant_owned!(
    user,
    subscription,
    bot,
    knowledge_base,
    document,
    document_chunk,
    faq,
    widget,
    conversation,
    message,
    notification,
);

#[derive(Clone, Debug)]
pub struct TenantDb {
    db: DatabaseConnection,
    tenant_id: i32,
}

impl TenantDb {
    pub fn new(db: DatabaseConnection, tenant_id: i32) -> Self {
        Self { db, tenant_id }
    }

    pub fn tenant_id(&self) -> i32 {
        self.tenant_id
    }

    pub fn conn(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn find<E: TenantOwned>(&self) -> Select<E> {
        E::find().filter(E::tenant_column().eq(self.tenant_id))
    }

    pub async fn find_by_id<E: TenantOwned>(&self, id: i32) -> Result<Option<E::Model>, DbErr> {
        self.find::<E>()
            .filter(E::id_column().eq(id))
            .one(&self.db)
            .await
    }

    /// Like [`find_by_id`](Self::find_by_id) but a missing row is `DbErr::RecordNotFound`.
    pub async fn get<E: TenantOwned>(&self, id: i32) -> Result<E::Model, DbErr> {
        self.find_by_id::<E>(id)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("{} {id}", E::default().table_name())))
    }

    pub async fn count<E: TenantOwned>(&self) -> Result<u64, DbErr>
    where
        E::Model: Sync,
    {
        self.find::<E>().count(&self.db).await
    }

    /// Inserts a row for this tenant. Any tenant id set by the caller is overwritten.
    pub async fn insert<A>(&self, mut model: A) -> Result<<A::Entity as EntityTrait>::Model, DbErr>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantOwned,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        model.set(
            <A::Entity as TenantOwned>::tenant_column(),
            Value::from(self.tenant_id),
        );
        model.insert(&self.db).await
    }

    /// Updates a row of this tenant. The row must already belong to the tenant
    /// in the database; a row of another tenant is `DbErr::RecordNotFound` and
    /// is left untouched whatever tenant id the caller put on the model.
    pub async fn update<A>(&self, mut model: A) -> Result<<A::Entity as EntityTrait>::Model, DbErr>
    where
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: TenantOwned,
        <A::Entity as EntityTrait>::Model: IntoActiveModel<A>,
    {
        let tenant_column = <A::Entity as TenantOwned>::tenant_column();
        model.set(tenant_column, Value::from(self.tenant_id));
        <A::Entity as EntityTrait>::update(model)
            .filter(tenant_column.eq(self.tenant_id))
            .exec(&self.db)
            .await
            .map_err(|err| match err {
                DbErr::RecordNotUpdated => DbErr::RecordNotFound(format!(
                    "{} outside tenant {}",
                    A::Entity::default().table_name(),
                    self.tenant_id
                )),
                other => other,
            })
    }

    /// Deletes by id within the tenant and returns the affected row count.
    pub async fn delete<E: TenantOwned>(&self, id: i32) -> Result<u64, DbErr> {
        let result = self
            .delete_many::<E>()
            .filter(E::id_column().eq(id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub fn update_many<E: TenantOwned>(&self) -> UpdateMany<E> {
        E::update_many().filter(E::tenant_column().eq(self.tenant_id))
    }

    pub fn delete_many<E: TenantOwned>(&self) -> DeleteMany<E> {
        E::delete_many().filter(E::tenant_column().eq(self.tenant_id))
    }
}
