//! Trade store on TimescaleDB.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

use crate::messages::TradeRow;

/// Kline aggregation interval, one materialized view per interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineInterval {
    OneMinute,
    OneHour,
    OneWeek,
}

impl KlineInterval {
    pub const ALL: [KlineInterval; 3] = [
        KlineInterval::OneMinute,
        KlineInterval::OneHour,
        KlineInterval::OneWeek,
    ];

    pub fn view_name(&self) -> &'static str {
        match self {
            KlineInterval::OneMinute => "klines_1m",
            KlineInterval::OneHour => "klines_1h",
            KlineInterval::OneWeek => "klines_1w",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(KlineInterval::OneMinute),
            "1h" => Some(KlineInterval::OneHour),
            "1w" => Some(KlineInterval::OneWeek),
            _ => None,
        }
    }
}

/// A persisted trade, as served by the history endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub id: String,
    pub price: Decimal,
    pub volume: Decimal,
    #[sqlx(rename = "time")]
    pub timestamp: DateTime<Utc>,
    pub market: String,
    pub is_buyer_maker: bool,
}

/// One kline bucket from a materialized view.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Kline {
    pub bucket: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Clone)]
pub struct TradeStore {
    pool: PgPool,
}

impl TradeStore {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert one trade. The `(id, time)` key makes redelivered queue
    /// items idempotent.
    pub async fn insert_trade(&self, row: &TradeRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO trades (id, time, market, price, volume, quote_volume, is_buyer_maker)
            VALUES ($1, to_timestamp($2::double precision), $3, $4, $5, $6, $7)
            ON CONFLICT (id, time) DO NOTHING
            "#,
        )
        .bind(&row.id)
        .bind(row.timestamp as f64)
        .bind(&row.market)
        .bind(row.price)
        .bind(row.quantity)
        .bind(row.quote_quantity)
        .bind(row.is_buyer_maker)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_trades(
        &self,
        limit: i64,
        market: Option<&str>,
    ) -> Result<Vec<TradeRecord>, sqlx::Error> {
        match market {
            Some(market) => {
                sqlx::query_as::<_, TradeRecord>(
                    r#"
                    SELECT id, price, volume, time, market, is_buyer_maker
                    FROM trades
                    WHERE market = $1
                    ORDER BY time DESC
                    LIMIT $2
                    "#,
                )
                .bind(market)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, TradeRecord>(
                    r#"
                    SELECT id, price, volume, time, market, is_buyer_maker
                    FROM trades
                    ORDER BY time DESC
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
    }

    pub async fn get_klines(&self, interval: KlineInterval) -> Result<Vec<Kline>, sqlx::Error> {
        // View name comes from the closed enum, never from user input.
        let query = format!(
            r#"
            SELECT bucket, open, high, low, close, volume
            FROM {}
            ORDER BY bucket DESC
            LIMIT 100
            "#,
            interval.view_name()
        );
        sqlx::query_as::<_, Kline>(&query).fetch_all(&self.pool).await
    }

    pub async fn latest_price(&self) -> Result<Option<Decimal>, sqlx::Error> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT price FROM trades ORDER BY time DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// Refresh every kline view; failures are logged per view and the
    /// rest still refresh.
    pub async fn refresh_kline_views(&self) {
        for interval in KlineInterval::ALL {
            let query = format!("REFRESH MATERIALIZED VIEW {}", interval.view_name());
            if let Err(e) = sqlx::query(&query).execute(&self.pool).await {
                warn!(view = interval.view_name(), error = %e, "view refresh failed");
            }
        }
    }
}
