//! Service and precedence repository.

use crate::error::{StoreError, StoreResult};
use crate::models::{ServiceId, ServiceRecord, ServiceRow};
use crate::registry::PrecedenceOrder;
use async_trait::async_trait;
use sqlx::SqliteConnection;
use tagbase_core::{ServiceKey, ServiceType};
use time::OffsetDateTime;

/// Name of the `store_options` row holding the precedence version.
const PRECEDENCE_VERSION_OPTION: &str = "precedence_version";

/// Repository for service records and the tag service precedence order.
#[async_trait]
pub trait ServiceRepo: Send {
    /// Insert a service record.
    async fn insert_service(
        &mut self,
        service_key: ServiceKey,
        service_type: ServiceType,
        name: &str,
        created_at: OffsetDateTime,
    ) -> StoreResult<ServiceRecord>;

    /// Delete a service record; dependent rows cascade.
    async fn delete_service(&mut self, service_id: ServiceId) -> StoreResult<()>;

    /// List all services ordered by id.
    async fn list_services(&mut self) -> StoreResult<Vec<ServiceRecord>>;

    /// Get a service by key.
    async fn get_service_by_key(
        &mut self,
        service_key: ServiceKey,
    ) -> StoreResult<Option<ServiceRecord>>;

    /// Load the current precedence order, most trusted first.
    async fn load_precedence(&mut self) -> StoreResult<PrecedenceOrder>;

    /// Replace the precedence order and bump its version.
    async fn write_precedence(&mut self, services: &[ServiceId]) -> StoreResult<PrecedenceOrder>;
}

#[async_trait]
impl ServiceRepo for SqliteConnection {
    async fn insert_service(
        &mut self,
        service_key: ServiceKey,
        service_type: ServiceType,
        name: &str,
        created_at: OffsetDateTime,
    ) -> StoreResult<ServiceRecord> {
        let result = sqlx::query(
            "INSERT INTO services (service_key, service_type, name, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(*service_key.as_uuid())
        .bind(service_type.as_str())
        .bind(name)
        .bind(created_at)
        .execute(&mut *self)
        .await?;

        Ok(ServiceRecord {
            service_id: result.last_insert_rowid(),
            service_key,
            service_type,
            name: name.to_string(),
            created_at,
        })
    }

    async fn delete_service(&mut self, service_id: ServiceId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM services WHERE service_id = ?")
            .bind(service_id)
            .execute(&mut *self)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!(
                "service_id {} not found",
                service_id
            )));
        }
        Ok(())
    }

    async fn list_services(&mut self) -> StoreResult<Vec<ServiceRecord>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services ORDER BY service_id")
            .fetch_all(&mut *self)
            .await?;
        let records = rows
            .into_iter()
            .map(ServiceRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn get_service_by_key(
        &mut self,
        service_key: ServiceKey,
    ) -> StoreResult<Option<ServiceRecord>> {
        let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE service_key = ?")
            .bind(*service_key.as_uuid())
            .fetch_optional(&mut *self)
            .await?;
        Ok(row.map(ServiceRecord::try_from).transpose()?)
    }

    async fn load_precedence(&mut self) -> StoreResult<PrecedenceOrder> {
        let version: i64 = sqlx::query_scalar("SELECT value FROM store_options WHERE name = ?")
            .bind(PRECEDENCE_VERSION_OPTION)
            .fetch_optional(&mut *self)
            .await?
            .unwrap_or(0);
        let services: Vec<ServiceId> = sqlx::query_scalar(
            "SELECT service_id FROM tag_service_precedence ORDER BY precedence",
        )
        .fetch_all(&mut *self)
        .await?;
        Ok(PrecedenceOrder::new(version, services))
    }

    async fn write_precedence(&mut self, services: &[ServiceId]) -> StoreResult<PrecedenceOrder> {
        sqlx::query("DELETE FROM tag_service_precedence")
            .execute(&mut *self)
            .await?;
        for (precedence, service_id) in services.iter().enumerate() {
            sqlx::query("INSERT INTO tag_service_precedence (service_id, precedence) VALUES (?, ?)")
                .bind(*service_id)
                .bind(precedence as i64)
                .execute(&mut *self)
                .await?;
        }
        sqlx::query(
            r#"
            INSERT INTO store_options (name, value) VALUES (?, 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            "#,
        )
        .bind(PRECEDENCE_VERSION_OPTION)
        .execute(&mut *self)
        .await?;
        self.load_precedence().await
    }
}
