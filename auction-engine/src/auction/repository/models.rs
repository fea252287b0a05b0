#[cfg(test)]
use mockall::automock;
use {
    crate::{
        auction::entities::{
            AuctionError,
            AuctionLot,
            Bid,
            LotState,
        },
        kernel::{
            db::DB,
            entities::LotId,
        },
    },
    axum::async_trait,
    sqlx::{
        postgres::types::PgInterval,
        types::BigDecimal,
        Executor,
        FromRow,
        Postgres,
    },
    std::time::Duration,
    time::OffsetDateTime,
    uuid::Uuid,
};

#[derive(Clone, FromRow, Debug)]
pub struct LotRow {
    pub id:             Uuid,
    pub title:          String,
    pub description:    String,
    pub initial_price:  BigDecimal,
    pub current_price:  BigDecimal,
    pub end_time:       OffsetDateTime,
    pub state:          String,
    pub last_bid_time:  Option<OffsetDateTime>,
    pub time_extension: PgInterval,
    pub created_at:     OffsetDateTime,
    pub updated_at:     OffsetDateTime,
}

impl TryFrom<LotRow> for AuctionLot {
    type Error = anyhow::Error;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        // The engine only ever writes microsecond-valued intervals; day
        // components can appear when lots are seeded by hand.
        if row.time_extension.months != 0 {
            anyhow::bail!(
                "month-valued time_extension is not supported for lot {}",
                row.id
            );
        }
        let days = u64::try_from(row.time_extension.days)?;
        let micros = u64::try_from(row.time_extension.microseconds)?;
        let time_extension = Duration::from_secs(days * 86_400) + Duration::from_micros(micros);

        Ok(AuctionLot {
            id: row.id,
            title: row.title,
            description: row.description,
            initial_price: row.initial_price,
            current_price: row.current_price,
            end_time: row.end_time,
            state: row.state.parse::<LotState>()?,
            last_bid_time: row.last_bid_time,
            time_extension,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn interval_from_duration(duration: Duration) -> anyhow::Result<PgInterval> {
    Ok(PgInterval {
        months:       0,
        days:         0,
        microseconds: i64::try_from(duration.as_micros())?,
    })
}

#[derive(Clone, FromRow, Debug)]
#[allow(dead_code)]
pub struct BidRow {
    pub id:         Uuid,
    pub lot_id:     Uuid,
    pub user_id:    Uuid,
    pub amount:     BigDecimal,
    pub timestamp:  OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        Bid {
            id:        row.id,
            lot_id:    row.lot_id,
            user_id:   row.user_id,
            amount:    row.amount,
            timestamp: row.timestamp,
        }
    }
}

const UPSERT_LOT_SQL: &str = "
    INSERT INTO auction_lots (id, title, description, initial_price, current_price, end_time, state, last_bid_time, time_extension)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
    ON CONFLICT (id) DO UPDATE
    SET
        title = EXCLUDED.title,
        description = EXCLUDED.description,
        initial_price = EXCLUDED.initial_price,
        current_price = EXCLUDED.current_price,
        end_time = EXCLUDED.end_time,
        state = EXCLUDED.state,
        last_bid_time = EXCLUDED.last_bid_time,
        time_extension = EXCLUDED.time_extension,
        updated_at = NOW()
";

const INSERT_BID_SQL: &str = "
    INSERT INTO bids (id, lot_id, user_id, amount, timestamp)
    VALUES ($1, $2, $3, $4, $5)
";

async fn upsert_lot<'a, E>(executor: E, lot: &AuctionLot) -> anyhow::Result<()>
where
    E: Executor<'a, Database = Postgres>,
{
    sqlx::query(UPSERT_LOT_SQL)
        .bind(lot.id)
        .bind(&lot.title)
        .bind(&lot.description)
        .bind(&lot.initial_price)
        .bind(&lot.current_price)
        .bind(lot.end_time)
        .bind(lot.state.as_str())
        .bind(lot.last_bid_time)
        .bind(interval_from_duration(lot.time_extension)?)
        .execute(executor)
        .await?;
    Ok(())
}

async fn insert_bid<'a, E>(executor: E, bid: &Bid) -> anyhow::Result<()>
where
    E: Executor<'a, Database = Postgres>,
{
    sqlx::query(INSERT_BID_SQL)
        .bind(bid.id)
        .bind(bid.lot_id)
        .bind(bid.user_id)
        .bind(&bid.amount)
        .bind(bid.timestamp)
        .execute(executor)
        .await?;
    Ok(())
}

/// Storage seam of the engine. Implemented for the live pool below and
/// mocked in service tests.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn get_lot(&self, lot_id: LotId) -> Result<AuctionLot, AuctionError>;
    async fn save_lot(&self, lot: &AuctionLot) -> Result<(), AuctionError>;
    /// Appends the bid and upserts the lot in one transaction. Either both
    /// rows land or neither does.
    async fn commit_bid(&self, bid: &Bid, lot: &AuctionLot) -> Result<(), AuctionError>;
    async fn get_bids_by_lot(&self, lot_id: LotId) -> Result<Vec<Bid>, AuctionError>;
    async fn get_latest_bid(&self, lot_id: LotId) -> Result<Option<Bid>, AuctionError>;
    async fn get_active_lots(&self) -> Result<Vec<AuctionLot>, AuctionError>;
    async fn get_lots_ending_within(&self, horizon: Duration)
        -> Result<Vec<AuctionLot>, AuctionError>;
}

#[async_trait]
impl Database for DB {
    #[tracing::instrument(skip_all, fields(lot_id = %lot_id))]
    async fn get_lot(&self, lot_id: LotId) -> Result<AuctionLot, AuctionError> {
        let row: LotRow = sqlx::query_as("SELECT * FROM auction_lots WHERE id = $1")
            .bind(lot_id)
            .fetch_one(self)
            .await
            .map_err(|e| match e {
                sqlx::Error::RowNotFound => AuctionError::LotNotFound,
                _ => {
                    tracing::error!(error = %e, lot_id = %lot_id, "DB: failed to fetch auction lot");
                    AuctionError::TemporarilyUnavailable
                }
            })?;
        row.try_into().map_err(|e: anyhow::Error| {
            tracing::error!(error = %e, lot_id = %lot_id, "DB: invalid auction lot row");
            AuctionError::TemporarilyUnavailable
        })
    }

    #[tracing::instrument(skip_all, fields(lot_id = %lot.id))]
    async fn save_lot(&self, lot: &AuctionLot) -> Result<(), AuctionError> {
        upsert_lot(self, lot).await.map_err(|e| {
            tracing::error!(error = %e, lot_id = %lot.id, "DB: failed to upsert auction lot");
            AuctionError::TemporarilyUnavailable
        })
    }

    #[tracing::instrument(skip_all, fields(bid_id = %bid.id, lot_id = %lot.id))]
    async fn commit_bid(&self, bid: &Bid, lot: &AuctionLot) -> Result<(), AuctionError> {
        let result: anyhow::Result<()> = async {
            let mut tx = self.begin().await?;
            insert_bid(&mut *tx, bid).await?;
            upsert_lot(&mut *tx, lot).await?;
            tx.commit().await?;
            Ok(())
        }
        .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bid_id = %bid.id,
                lot_id = %lot.id,
                "DB: failed to commit bid transaction"
            );
            AuctionError::TemporarilyUnavailable
        })
    }

    async fn get_bids_by_lot(&self, lot_id: LotId) -> Result<Vec<Bid>, AuctionError> {
        let rows: Vec<BidRow> =
            sqlx::query_as("SELECT * FROM bids WHERE lot_id = $1 ORDER BY timestamp ASC")
                .bind(lot_id)
                .fetch_all(self)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, lot_id = %lot_id, "DB: failed to fetch bids");
                    AuctionError::TemporarilyUnavailable
                })?;
        Ok(rows.into_iter().map(Bid::from).collect())
    }

    async fn get_latest_bid(&self, lot_id: LotId) -> Result<Option<Bid>, AuctionError> {
        let row: Option<BidRow> = sqlx::query_as(
            "SELECT * FROM bids WHERE lot_id = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(lot_id)
        .fetch_optional(self)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, lot_id = %lot_id, "DB: failed to fetch latest bid");
            AuctionError::TemporarilyUnavailable
        })?;
        Ok(row.map(Bid::from))
    }

    async fn get_active_lots(&self) -> Result<Vec<AuctionLot>, AuctionError> {
        let rows: Vec<LotRow> = sqlx::query_as("SELECT * FROM auction_lots WHERE state = $1")
            .bind(LotState::Active.as_str())
            .fetch_all(self)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "DB: failed to fetch active lots");
                AuctionError::TemporarilyUnavailable
            })?;
        collect_lots(rows)
    }

    #[tracing::instrument(skip_all)]
    async fn get_lots_ending_within(
        &self,
        horizon: Duration,
    ) -> Result<Vec<AuctionLot>, AuctionError> {
        let cutoff = OffsetDateTime::now_utc() + horizon;
        let rows: Vec<LotRow> =
            sqlx::query_as("SELECT * FROM auction_lots WHERE state = $1 AND end_time <= $2")
                .bind(LotState::Active.as_str())
                .bind(cutoff)
                .fetch_all(self)
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "DB: failed to fetch lots ending soon");
                    AuctionError::TemporarilyUnavailable
                })?;
        collect_lots(rows)
    }
}

fn collect_lots(rows: Vec<LotRow>) -> Result<Vec<AuctionLot>, AuctionError> {
    rows.into_iter()
        .map(|row| {
            AuctionLot::try_from(row).map_err(|e| {
                tracing::error!(error = %e, "DB: invalid auction lot row");
                AuctionError::TemporarilyUnavailable
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        time::macros::datetime,
    };

    fn lot_row(time_extension: PgInterval) -> LotRow {
        LotRow {
            id: Uuid::new_v4(),
            title: "Amber brooch".to_string(),
            description: "circa 1900".to_string(),
            initial_price: BigDecimal::from(5000),
            current_price: BigDecimal::from(5100),
            end_time: datetime!(2026-03-01 12:10:00 UTC),
            state: "active".to_string(),
            last_bid_time: Some(datetime!(2026-03-01 12:00:00 UTC)),
            time_extension,
            created_at: datetime!(2026-03-01 11:00:00 UTC),
            updated_at: datetime!(2026-03-01 12:00:00 UTC),
        }
    }

    #[test]
    fn lot_row_converts_with_microsecond_interval() {
        let row = lot_row(PgInterval {
            months:       0,
            days:         0,
            microseconds: 30_000_000,
        });
        let lot = AuctionLot::try_from(row).unwrap();
        assert_eq!(lot.time_extension, Duration::from_secs(30));
        assert_eq!(lot.state, LotState::Active);
    }

    #[test]
    fn lot_row_converts_with_day_interval() {
        let row = lot_row(PgInterval {
            months:       0,
            days:         1,
            microseconds: 500_000,
        });
        let lot = AuctionLot::try_from(row).unwrap();
        assert_eq!(
            lot.time_extension,
            Duration::from_secs(86_400) + Duration::from_millis(500)
        );
    }

    #[test]
    fn month_valued_interval_is_rejected() {
        let row = lot_row(PgInterval {
            months:       1,
            days:         0,
            microseconds: 0,
        });
        assert!(AuctionLot::try_from(row).is_err());
    }

    #[test]
    fn unknown_state_is_rejected() {
        let mut row = lot_row(PgInterval {
            months:       0,
            days:         0,
            microseconds: 0,
        });
        row.state = "paused".to_string();
        assert!(AuctionLot::try_from(row).is_err());
    }

    #[test]
    fn duration_round_trips_through_interval() {
        let interval = interval_from_duration(Duration::from_secs(30)).unwrap();
        assert_eq!(interval.microseconds, 30_000_000);
        assert_eq!(interval.days, 0);
        assert_eq!(interval.months, 0);
    }
}
