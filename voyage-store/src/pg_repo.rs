use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use voyage_core::model::{Booking, BookingId, BookingStatus, BookingSummary, NewBooking, Trip, TripId, UserId, WaitingEntryId, WaitingListEntry};
use voyage_core::payment::{NewPayment, PaymentRecord};
use voyage_core::repository::{InventoryStore, StoreError, StoreResult, StoreTx};

const TRIP_COLUMNS: &str = "id, package_name, destination, country, start_date, end_date, price_cents, available_rooms, min_age, cancellation_window_days";
const BOOKING_COLUMNS: &str = "id, user_id, trip_id, quantity, status, is_paid, paid_at, group_min_age, booked_at";
const WAITING_COLUMNS: &str = "id, trip_id, user_id, join_date, notified_at, expiration_at";
const SUMMARY_SELECT: &str = r#"
    SELECT b.id, b.user_id, b.trip_id, b.quantity, b.status, b.is_paid, b.paid_at, b.group_min_age, b.booked_at,
           t.package_name, t.destination, t.country, t.start_date, t.end_date, t.price_cents,
           t.available_rooms, t.min_age, t.cancellation_window_days
    FROM bookings b
    JOIN trips t ON t.id = b.trip_id
"#;

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct TripRow {
    id: i64,
    package_name: String,
    destination: String,
    country: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price_cents: i64,
    available_rooms: i32,
    min_age: Option<i32>,
    cancellation_window_days: i32,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    user_id: i64,
    trip_id: i64,
    quantity: i32,
    status: String,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    group_min_age: Option<i32>,
    booked_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    package_name: String,
    destination: String,
    country: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price_cents: i64,
    available_rooms: i32,
    min_age: Option<i32>,
    cancellation_window_days: i32,
}

#[derive(sqlx::FromRow)]
struct WaitingRow {
    id: i64,
    trip_id: i64,
    user_id: i64,
    join_date: DateTime<Utc>,
    notified_at: Option<DateTime<Utc>>,
    expiration_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    booking_id: i64,
    amount_cents: i64,
    status: String,
    recorded_at: DateTime<Utc>,
}

fn non_negative(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {}: {}", column, value)))
}

fn optional_age(value: Option<i32>, column: &str) -> StoreResult<Option<u32>> {
    value.map(|v| non_negative(v, column)).transpose()
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> StoreResult<Self> {
        Ok(Trip {
            id: TripId(row.id),
            package_name: row.package_name,
            destination: row.destination,
            country: row.country,
            start_date: row.start_date,
            end_date: row.end_date,
            price_cents: row.price_cents,
            available_rooms: row.available_rooms,
            min_age: optional_age(row.min_age, "min_age")?,
            cancellation_window_days: non_negative(row.cancellation_window_days, "cancellation_window_days")?,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> StoreResult<Self> {
        Ok(Booking {
            id: BookingId(row.id),
            user_id: UserId(row.user_id),
            trip_id: TripId(row.trip_id),
            quantity: non_negative(row.quantity, "quantity")?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            is_paid: row.is_paid,
            paid_at: row.paid_at,
            group_min_age: optional_age(row.group_min_age, "group_min_age")?,
            booked_at: row.booked_at,
        })
    }
}

impl TryFrom<SummaryRow> for BookingSummary {
    type Error = StoreError;

    fn try_from(row: SummaryRow) -> StoreResult<Self> {
        let trip = Trip::try_from(TripRow {
            id: row.booking.trip_id,
            package_name: row.package_name,
            destination: row.destination,
            country: row.country,
            start_date: row.start_date,
            end_date: row.end_date,
            price_cents: row.price_cents,
            available_rooms: row.available_rooms,
            min_age: row.min_age,
            cancellation_window_days: row.cancellation_window_days,
        })?;
        Ok(BookingSummary {
            booking: Booking::try_from(row.booking)?,
            trip,
        })
    }
}

impl From<WaitingRow> for WaitingListEntry {
    fn from(row: WaitingRow) -> Self {
        WaitingListEntry {
            id: WaitingEntryId(row.id),
            trip_id: TripId(row.trip_id),
            user_id: UserId(row.user_id),
            join_date: row.join_date,
            notified_at: row.notified_at,
            expiration_at: row.expiration_at,
        }
    }
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> StoreResult<Self> {
        Ok(PaymentRecord {
            id: row.id,
            booking_id: BookingId(row.booking_id),
            amount_cents: row.amount_cents,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            recorded_at: row.recorded_at,
        })
    }
}

fn to_i32(value: u32, column: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} out of range: {}", column, value)))
}

fn summaries(rows: Vec<SummaryRow>) -> StoreResult<Vec<BookingSummary>> {
    rows.into_iter().map(BookingSummary::try_from).collect()
}

pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(PgTx { tx, locked: None }))
    }

    async fn get_trip(&self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(trip_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.map(Trip::try_from).transpose()
    }

    async fn get_booking(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(booking_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_active_bookings(&self, user_id: UserId) -> StoreResult<Vec<BookingSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            "{} WHERE b.user_id = $1 AND b.status = 'ACTIVE' ORDER BY t.start_date, b.id",
            SUMMARY_SELECT
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        summaries(rows)
    }

    async fn list_waiting_entries(&self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>> {
        let rows: Vec<WaitingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM waiting_list WHERE trip_id = $1 ORDER BY join_date, id",
            WAITING_COLUMNS
        ))
        .bind(trip_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(WaitingListEntry::from).collect())
    }

    async fn trips_with_expired_offers(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT trip_id FROM waiting_list WHERE expiration_at IS NOT NULL AND expiration_at <= $1 ORDER BY trip_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(ids.into_iter().map(TripId).collect())
    }

    async fn trips_awaiting_promotion(&self, now: DateTime<Utc>) -> StoreResult<Vec<TripId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT t.id FROM trips t \
             WHERE EXISTS (SELECT 1 FROM waiting_list w WHERE w.trip_id = t.id AND w.notified_at IS NULL) \
             AND t.available_rooms > (SELECT COUNT(*) FROM waiting_list w WHERE w.trip_id = t.id AND w.expiration_at > $1) \
             ORDER BY t.id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        Ok(ids.into_iter().map(TripId).collect())
    }

    async fn bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<BookingSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(&format!(
            "{} WHERE b.status = 'ACTIVE' AND t.start_date >= $1 AND t.start_date < $2 ORDER BY t.start_date, b.id",
            SUMMARY_SELECT
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;
        summaries(rows)
    }

    async fn contact_address(&self, user_id: UserId) -> StoreResult<Option<String>> {
        sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::backend)
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
    locked: Option<TripId>,
}

impl PgTx {
    fn require(&self, trip_id: TripId) -> StoreResult<()> {
        match self.locked {
            Some(held) if held == trip_id => Ok(()),
            _ => Err(StoreError::TripNotLocked(trip_id)),
        }
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_user(&mut self, user_id: UserId) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn count_upcoming_trips(
        &mut self,
        user_id: UserId,
        excluding: TripId,
        now: DateTime<Utc>,
    ) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT b.trip_id)
            FROM bookings b
            JOIN trips t ON t.id = b.trip_id
            WHERE b.user_id = $1 AND b.status = 'ACTIVE' AND b.trip_id <> $2 AND t.start_date > $3
            "#,
        )
        .bind(user_id.0)
        .bind(excluding.0)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(count.max(0) as u32)
    }

    async fn lock_trip(&mut self, trip_id: TripId) -> StoreResult<Option<Trip>> {
        if let Some(held) = self.locked {
            if held != trip_id {
                return Err(StoreError::LockConflict { held, requested: trip_id });
            }
        }

        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1 FOR UPDATE", TRIP_COLUMNS))
            .bind(trip_id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;

        match row {
            Some(row) => {
                self.locked = Some(trip_id);
                Ok(Some(Trip::try_from(row)?))
            }
            None => Ok(None),
        }
    }

    async fn adjust_rooms(&mut self, trip_id: TripId, delta: i32) -> StoreResult<()> {
        self.require(trip_id)?;
        sqlx::query("UPDATE trips SET available_rooms = available_rooms + $2 WHERE id = $1")
            .bind(trip_id.0)
            .bind(delta)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn set_available_rooms(&mut self, trip_id: TripId, rooms: i32) -> StoreResult<()> {
        self.require(trip_id)?;
        sqlx::query("UPDATE trips SET available_rooms = $2 WHERE id = $1")
            .bind(trip_id.0)
            .bind(rooms)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn find_active_booking(&mut self, user_id: UserId, trip_id: TripId) -> StoreResult<Option<Booking>> {
        self.require(trip_id)?;
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 AND trip_id = $2 AND status = 'ACTIVE'",
            BOOKING_COLUMNS
        ))
        .bind(user_id.0)
        .bind(trip_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn get_booking(&mut self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        let Some(trip_id) = self.locked else {
            return Ok(None);
        };
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND trip_id = $2",
            BOOKING_COLUMNS
        ))
        .bind(booking_id.0)
        .bind(trip_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn insert_booking(&mut self, booking: NewBooking) -> StoreResult<Booking> {
        self.require(booking.trip_id)?;
        let group_min_age = booking
            .group_min_age
            .map(|age| to_i32(age, "group_min_age"))
            .transpose()?;
        let row: BookingRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO bookings (user_id, trip_id, quantity, status, is_paid, group_min_age, booked_at)
            VALUES ($1, $2, $3, $4, FALSE, $5, $6)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(booking.user_id.0)
        .bind(booking.trip_id.0)
        .bind(to_i32(booking.quantity, "quantity")?)
        .bind(BookingStatus::Active.as_str())
        .bind(group_min_age)
        .bind(booking.booked_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Booking::try_from(row)
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.require(booking.trip_id)?;
        let group_min_age = booking
            .group_min_age
            .map(|age| to_i32(age, "group_min_age"))
            .transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET quantity = $3, status = $4, is_paid = $5, paid_at = $6, group_min_age = $7
            WHERE id = $1 AND trip_id = $2
            "#,
        )
        .bind(booking.id.0)
        .bind(booking.trip_id.0)
        .bind(to_i32(booking.quantity, "quantity")?)
        .bind(booking.status.as_str())
        .bind(booking.is_paid)
        .bind(booking.paid_at)
        .bind(group_min_age)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!(
                "booking {} missing from trip {}",
                booking.id, booking.trip_id
            )));
        }
        Ok(())
    }

    async fn record_payment(&mut self, payment: NewPayment) -> StoreResult<PaymentRecord> {
        let Some(trip_id) = self.locked else {
            return Err(StoreError::Corrupt("payment recorded outside a trip lock".to_string()));
        };
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            INSERT INTO payments (booking_id, amount_cents, status, recorded_at)
            SELECT b.id, $2, $3, $4 FROM bookings b WHERE b.id = $1 AND b.trip_id = $5
            RETURNING id, booking_id, amount_cents, status, recorded_at
            "#,
        )
        .bind(payment.booking_id.0)
        .bind(payment.amount_cents)
        .bind(payment.status.as_str())
        .bind(payment.recorded_at)
        .bind(trip_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some(row) => PaymentRecord::try_from(row),
            None => Err(StoreError::Corrupt(format!("payment for unknown booking {}", payment.booking_id))),
        }
    }

    async fn waiting_entries(&mut self, trip_id: TripId) -> StoreResult<Vec<WaitingListEntry>> {
        self.require(trip_id)?;
        let rows: Vec<WaitingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM waiting_list WHERE trip_id = $1 ORDER BY join_date, id",
            WAITING_COLUMNS
        ))
        .bind(trip_id.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(rows.into_iter().map(WaitingListEntry::from).collect())
    }

    async fn insert_waiting_entry(
        &mut self,
        trip_id: TripId,
        user_id: UserId,
        join_date: DateTime<Utc>,
    ) -> StoreResult<WaitingListEntry> {
        self.require(trip_id)?;
        let row: WaitingRow = sqlx::query_as(&format!(
            "INSERT INTO waiting_list (trip_id, user_id, join_date) VALUES ($1, $2, $3) RETURNING {}",
            WAITING_COLUMNS
        ))
        .bind(trip_id.0)
        .bind(user_id.0)
        .bind(join_date)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.into())
    }

    async fn mark_notified(
        &mut self,
        trip_id: TripId,
        entry_id: WaitingEntryId,
        notified_at: DateTime<Utc>,
        expiration_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.require(trip_id)?;
        sqlx::query("UPDATE waiting_list SET notified_at = $3, expiration_at = $4 WHERE id = $1 AND trip_id = $2")
            .bind(entry_id.0)
            .bind(trip_id.0)
            .bind(notified_at)
            .bind(expiration_at)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn delete_waiting_entry(&mut self, trip_id: TripId, user_id: UserId) -> StoreResult<bool> {
        self.require(trip_id)?;
        let result = sqlx::query("DELETE FROM waiting_list WHERE trip_id = $1 AND user_id = $2")
            .bind(trip_id.0)
            .bind(user_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_waiting_entries(&mut self, trip_id: TripId, ids: &[WaitingEntryId]) -> StoreResult<u64> {
        self.require(trip_id)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let result = sqlx::query("DELETE FROM waiting_list WHERE trip_id = $1 AND id = ANY($2)")
            .bind(trip_id.0)
            .bind(raw)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn clear_waiting_list(&mut self, trip_id: TripId) -> StoreResult<u64> {
        self.require(trip_id)?;
        let result = sqlx::query("DELETE FROM waiting_list WHERE trip_id = $1")
            .bind(trip_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(StoreError::backend)
    }
}
