use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Uuid;
use sqlx::PgExecutor;

use crate::error::CoreError;
use crate::refs::HasId;

/// Minimal listing record. Bookings reference one of these; full listing
/// management lives outside this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl HasId for Service {
    fn record_id(&self) -> Uuid {
        self.id
    }
}

impl Service {
    pub fn new(provider_id: Uuid, title: String, description: String, price_cents: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            title,
            description,
            price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create<'e, E: PgExecutor<'e>>(self, executor: E) -> Result<Service, CoreError> {
        let service = sqlx::query_as::<_, Service>(
            r#"
            INSERT INTO services (id, provider_id, title, description, price_cents, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.provider_id)
        .bind(&self.title)
        .bind(&self.description)
        .bind(self.price_cents)
        .bind(self.is_active)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(service)
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
    ) -> Result<Option<Service>, CoreError> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(service)
    }

    pub async fn list_active<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<Service>, CoreError> {
        let services = sqlx::query_as::<_, Service>(
            "SELECT * FROM services WHERE is_active = TRUE ORDER BY created_at DESC",
        )
        .fetch_all(executor)
        .await?;
        Ok(services)
    }
}
