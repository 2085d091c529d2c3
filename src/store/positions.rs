use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, query_as};
use tracing::{Instrument, info_span};

use super::{INSERT_CHUNK, Store, Tx};
use crate::model::{LineId, VehiclePosition};

const SELECT_POSITIONS: &str = "SELECT
        line_id,
        trip_id,
        start_date,
        direction,
        stop_id,
        status,
        timestamp,
        observed_at
    FROM vehicle_positions";

pub(super) async fn insert_positions(positions: &[VehiclePosition], tx: &mut Tx<'_>) -> Result<()> {
    for chunk in positions.chunks(INSERT_CHUNK) {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO vehicle_positions (
                line_id,
                trip_id,
                start_date,
                direction,
                stop_id,
                status,
                timestamp,
                observed_at
            )",
        );

        query_builder.push_values(chunk, |mut b, position| {
            b.push_bind(&position.line_id)
                .push_bind(&position.trip_id)
                .push_bind(position.start_date)
                .push_bind(position.direction)
                .push_bind(&position.stop_id)
                .push_bind(position.status)
                .push_bind(position.timestamp)
                .push_bind(position.observed_at);
        });

        query_builder
            .build()
            .execute(&mut **tx)
            .instrument(info_span!("Inserting vehicle positions"))
            .await?;
    }
    Ok(())
}

impl Store {
    /// Positions written by the latest cycle that observed `line`.
    #[tracing::instrument(skip(self), err)]
    pub async fn latest_positions(&self, line: &LineId) -> Result<Vec<VehiclePosition>> {
        let positions = query_as::<_, VehiclePosition>(&format!(
            "{SELECT_POSITIONS}
            WHERE line_id = ?1
              AND observed_at = (SELECT MAX(observed_at) FROM vehicle_positions WHERE line_id = ?1)
            ORDER BY direction, trip_id"
        ))
        .bind(line)
        .fetch_all(&self.pool)
        .await?;
        Ok(positions)
    }

    /// Positions observed in `[from, to)`, optionally for one line, oldest
    /// first.
    #[tracing::instrument(skip(self), err)]
    pub async fn positions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        line: Option<&LineId>,
    ) -> Result<Vec<VehiclePosition>> {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_POSITIONS);
        query_builder
            .push(" WHERE observed_at >= ")
            .push_bind(from)
            .push(" AND observed_at < ")
            .push_bind(to);
        if let Some(line) = line {
            query_builder.push(" AND line_id = ").push_bind(line);
        }
        query_builder.push(" ORDER BY observed_at, id");

        let positions = query_builder
            .build_query_as::<VehiclePosition>()
            .fetch_all(&self.pool)
            .await?;
        Ok(positions)
    }
}
