use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::PaymentStatus;
use tracing::warn;
use uuid::Uuid;

use super::{CallbackOutcome, PaymentStore, StoreError};
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn write_error(what: &str, e: DieselError) -> StoreError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Integrity(format!("{}: {}", what, info.message()))
        }
        other => StoreError::Database(other),
    }
}

fn check_status(intent: &PaymentIntent) -> Result<(), StoreError> {
    intent
        .status()
        .map(|_| ())
        .map_err(|e| StoreError::Corrupt(format!("intent {}: {}", intent.id, e)))
}

impl PaymentStore for PgStore {
    async fn create_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent, StoreError> {
        let mut conn = self.conn().await?;

        let created = diesel::insert_into(payment_intents::table)
            .values(&intent)
            .returning(PaymentIntent::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| write_error("payment intent", e))?;

        Ok(created)
    }

    async fn create_acknowledgment(
        &self,
        acknowledgment: NewGatewayAcknowledgment,
    ) -> Result<GatewayAcknowledgment, StoreError> {
        let mut conn = self.conn().await?;

        let created = diesel::insert_into(gateway_acknowledgments::table)
            .values(&acknowledgment)
            .returning(GatewayAcknowledgment::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(|e| write_error("gateway acknowledgment", e))?;

        Ok(created)
    }

    async fn find_acknowledgments(
        &self,
        checkout_request_id: &str,
    ) -> Result<Vec<GatewayAcknowledgment>, StoreError> {
        let mut conn = self.conn().await?;

        let found = gateway_acknowledgments::table
            .filter(gateway_acknowledgments::checkout_request_id.eq(checkout_request_id))
            .order(gateway_acknowledgments::created_at.asc())
            .limit(2)
            .select(GatewayAcknowledgment::as_select())
            .load(&mut conn)
            .await?;

        Ok(found)
    }

    async fn record_callback(
        &self,
        intent_id: Uuid,
        record: NewCallbackRecord,
        status: PaymentStatus,
    ) -> Result<CallbackOutcome, StoreError> {
        let mut pooled = self.conn().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                // Concurrent deliveries block on the unique acknowledgment_id
                // until the winner commits, then fall through to DO NOTHING.
                let inserted = diesel::insert_into(callback_records::table)
                    .values(&record)
                    .on_conflict(callback_records::acknowledgment_id)
                    .do_nothing()
                    .returning(CallbackRecord::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?;

                let Some(inserted) = inserted else {
                    return Ok(CallbackOutcome::AlreadyRecorded);
                };

                let updated = diesel::update(
                    payment_intents::table
                        .filter(payment_intents::id.eq(intent_id))
                        .filter(payment_intents::status.eq(PaymentStatus::Pending.as_str())),
                )
                .set(payment_intents::status.eq(status.as_str()))
                .execute(conn)
                .await?;

                if updated != 1 {
                    warn!(%intent_id, "First callback found intent outside PENDING");
                    return Err(StoreError::Integrity(format!(
                        "intent {} is not PENDING",
                        intent_id
                    )));
                }

                Ok(CallbackOutcome::Recorded(inserted))
            })
        })
        .await
    }

    async fn intent_detail(&self, intent_id: Uuid) -> Result<Option<PaymentIntentDetail>, StoreError> {
        let mut conn = self.conn().await?;

        let intent = payment_intents::table
            .find(intent_id)
            .select(PaymentIntent::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let Some(intent) = intent else {
            return Ok(None);
        };
        check_status(&intent)?;

        let acknowledgment = GatewayAcknowledgment::belonging_to(&intent)
            .select(GatewayAcknowledgment::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        let acknowledgment = match acknowledgment {
            Some(acknowledgment) => {
                let callback = CallbackRecord::belonging_to(&acknowledgment)
                    .select(CallbackRecord::as_select())
                    .first(&mut conn)
                    .await
                    .optional()?;
                Some(AcknowledgmentDetail { acknowledgment, callback })
            }
            None => None,
        };

        Ok(Some(PaymentIntentDetail { intent, acknowledgment }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::scenario_request;
    use chrono::Utc;
    use diesel::{Connection, PgConnection};
    use diesel_async::pooled_connection::AsyncDieselConnectionManager;
    use diesel_migrations::MigrationHarness;
    use futures::future::join_all;
    use shared::StkPushResponse;

    /// Needs a scratch database: `DATABASE_URL=postgres://... cargo test -- --ignored`.
    async fn store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");

        let migrate_url = url.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = PgConnection::establish(&migrate_url).unwrap();
            conn.run_pending_migrations(crate::MIGRATIONS).unwrap();
        })
        .await
        .unwrap();

        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(url);
        PgStore::new(Pool::builder().max_size(8).build(manager).await.unwrap())
    }

    async fn acknowledged(store: &PgStore) -> GatewayAcknowledgment {
        let intent = store
            .create_intent(NewPaymentIntent::pending(scenario_request()))
            .await
            .unwrap();
        let response = StkPushResponse {
            checkout_request_id: format!("ws_CO_{}", Uuid::new_v4().simple()),
            response_code: "0".to_string(),
            ..Default::default()
        };
        store
            .create_acknowledgment(NewGatewayAcknowledgment::from_response(intent.id, response))
            .await
            .unwrap()
    }

    fn record(acknowledgment_id: Uuid, result_code: Option<i64>) -> NewCallbackRecord {
        NewCallbackRecord {
            id: Uuid::new_v4(),
            acknowledgment_id,
            result_code,
            result_description: String::new(),
            receipt_number: Some("RCPT1".to_string()),
            transaction_date: None,
            phone_number: None,
            amount: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn concurrent_callbacks_record_once_and_settle_once() {
        let store = store().await;
        let acknowledgment = acknowledged(&store).await;
        let intent_id = acknowledgment.intent_id;

        let outcomes = join_all((0..8).map(|_| {
            store.record_callback(intent_id, record(acknowledgment.id, Some(0)), PaymentStatus::Success)
        }))
        .await;

        let recorded = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(CallbackOutcome::Recorded(_))))
            .count();
        let already = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(CallbackOutcome::AlreadyRecorded)))
            .count();
        assert_eq!((recorded, already), (1, 7));

        let detail = store.intent_detail(intent_id).await.unwrap().unwrap();
        assert_eq!(detail.intent.status(), Ok(PaymentStatus::Success));
        assert!(detail.acknowledgment.unwrap().callback.is_some());
    }

    #[tokio::test]
    #[ignore]
    async fn later_callback_cannot_flip_settled_intent() {
        let store = store().await;
        let acknowledgment = acknowledged(&store).await;
        let intent_id = acknowledgment.intent_id;

        let first = store
            .record_callback(intent_id, record(acknowledgment.id, None), PaymentStatus::Failed)
            .await
            .unwrap();
        let second = store
            .record_callback(intent_id, record(acknowledgment.id, Some(0)), PaymentStatus::Success)
            .await
            .unwrap();

        assert!(matches!(first, CallbackOutcome::Recorded(ref r) if r.result_code.is_none()));
        assert!(matches!(second, CallbackOutcome::AlreadyRecorded));
        let detail = store.intent_detail(intent_id).await.unwrap().unwrap();
        assert_eq!(detail.intent.status(), Ok(PaymentStatus::Failed));
    }
}
