use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, query_as};
use tracing::{Instrument, info_span};

use super::{INSERT_CHUNK, Store, Tx};
use crate::model::{LineId, StopEstimate};

const SELECT_ESTIMATES: &str = "SELECT
        line_id,
        trip_id,
        start_date,
        start_time,
        direction_id,
        direction,
        stop_id,
        stop_name,
        arrival_time,
        departure_time,
        observed_at
    FROM stop_estimates";

pub(super) async fn insert_estimates(estimates: &[StopEstimate], tx: &mut Tx<'_>) -> Result<()> {
    for chunk in estimates.chunks(INSERT_CHUNK) {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO stop_estimates (
                line_id,
                trip_id,
                start_date,
                start_time,
                direction_id,
                direction,
                stop_id,
                stop_name,
                arrival_time,
                departure_time,
                observed_at
            )",
        );

        query_builder.push_values(chunk, |mut b, estimate| {
            b.push_bind(&estimate.line_id)
                .push_bind(&estimate.trip_id)
                .push_bind(estimate.start_date)
                .push_bind(&estimate.start_time)
                .push_bind(estimate.direction_id)
                .push_bind(estimate.direction)
                .push_bind(&estimate.stop_id)
                .push_bind(&estimate.stop_name)
                .push_bind(estimate.arrival_time)
                .push_bind(estimate.departure_time)
                .push_bind(estimate.observed_at);
        });

        query_builder
            .build()
            .execute(&mut **tx)
            .instrument(info_span!("Inserting stop estimates"))
            .await?;
    }
    Ok(())
}

impl Store {
    /// The live board for `line`: estimates from the latest cycle that
    /// observed it, grouped by direction and trip, earliest arrival first.
    #[tracing::instrument(skip(self), err)]
    pub async fn latest_estimates(&self, line: &LineId) -> Result<Vec<StopEstimate>> {
        let estimates = query_as::<_, StopEstimate>(&format!(
            "{SELECT_ESTIMATES}
            WHERE line_id = ?1
              AND observed_at = (SELECT MAX(observed_at) FROM stop_estimates WHERE line_id = ?1)
            ORDER BY direction, trip_id, arrival_time"
        ))
        .bind(line)
        .fetch_all(&self.pool)
        .await?;
        Ok(estimates)
    }

    /// Estimates observed in `[from, to)`, optionally for one line, oldest
    /// first.
    #[tracing::instrument(skip(self), err)]
    pub async fn estimates_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        line: Option<&LineId>,
    ) -> Result<Vec<StopEstimate>> {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_ESTIMATES);
        query_builder
            .push(" WHERE observed_at >= ")
            .push_bind(from)
            .push(" AND observed_at < ")
            .push_bind(to);
        if let Some(line) = line {
            query_builder.push(" AND line_id = ").push_bind(line);
        }
        query_builder.push(" ORDER BY observed_at, id");

        let estimates = query_builder
            .build_query_as::<StopEstimate>()
            .fetch_all(&self.pool)
            .await?;
        Ok(estimates)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::LineId;
    use crate::store::Store;
    use crate::store::test_support::*;

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let store = Store::in_memory().await.unwrap();
        let mut written = estimate("A", "006650_A..S", "A02S", 1_000, 900);
        written.start_time = Some("01:06:30".to_string());
        written.direction_id = Some(1);
        written.stop_name = "Inwood-207 St".to_string();
        store.append(&[], &[written.clone()]).await.unwrap();

        let read = store.latest_estimates(&LineId::from("A")).await.unwrap();
        assert_eq!(read, vec![written]);
    }

    #[tokio::test]
    async fn test_latest_estimates_sorted_by_trip_and_arrival() {
        let store = Store::in_memory().await.unwrap();
        store
            .append(&[], &[estimate("A", "t1", "A02S", 500, 100)])
            .await
            .unwrap();
        store
            .append(
                &[],
                &[
                    estimate("A", "t2", "A05S", 900, 200),
                    estimate("A", "t1", "A05S", 800, 200),
                    estimate("A", "t1", "A03S", 600, 200),
                    estimate("C", "t9", "A03S", 600, 200),
                ],
            )
            .await
            .unwrap();

        let board = store.latest_estimates(&LineId::from("A")).await.unwrap();
        let rows: Vec<_> = board
            .iter()
            .map(|e| (e.trip_id.as_str(), e.stop_id.as_str()))
            .collect();
        assert_eq!(rows, vec![("t1", "A03S"), ("t1", "A05S"), ("t2", "A05S")]);
    }

    #[tokio::test]
    async fn test_estimates_between() {
        let store = Store::in_memory().await.unwrap();
        store
            .append(
                &[],
                &[
                    estimate("A", "t1", "A02S", 500, 100),
                    estimate("A", "t1", "A02S", 510, 200),
                    estimate("C", "t2", "A09S", 520, 200),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.estimates_between(at(0), at(1_000), None).await.unwrap().len(), 3);
        assert_eq!(
            store
                .estimates_between(at(150), at(1_000), Some(&LineId::from("A")))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(store.estimates_between(at(300), at(400), None).await.unwrap().is_empty());
    }
}
