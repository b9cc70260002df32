use sqlx::PgPool;

use crate::models::activity_log::ActivityEvent;

pub async fn insert_activity_event(
    pool: &PgPool,
    event: &ActivityEvent,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity_log
            (id, occurred_at, actor_id, event_type, target_id, metadata, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&event.id)
    .bind(event.occurred_at)
    .bind(&event.actor_id)
    .bind(&event.event_type)
    .bind(&event.target_id)
    .bind(&event.metadata)
    .bind(&event.ip_address)
    .bind(&event.user_agent)
    .execute(pool)
    .await
    .map(|_| ())
}
