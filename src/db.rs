use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use uuid::Uuid;

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    Exclusion,
    ForeignKey,
}

/// Classify a Postgres constraint violation by SQLSTATE.
pub fn constraint_violation(e: &sqlx::Error) -> Option<ConstraintViolation> {
    let code = e.as_database_error()?.code()?;
    match code.as_ref() {
        "23505" => Some(ConstraintViolation::Unique),
        "23P01" => Some(ConstraintViolation::Exclusion),
        "23503" => Some(ConstraintViolation::ForeignKey),
        _ => None,
    }
}

/// How many times a writer re-reads a row that moved to another doctor/day
/// while it was waiting for the advisory locks.
pub const LOCK_ATTEMPTS: usize = 3;

/// Serialise every writer touching one doctor's calendar day until the
/// surrounding transaction ends.
pub async fn lock_doctor_day(
    tx: &mut Transaction<'_, Postgres>,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        SELECT pg_advisory_xact_lock(hashtext($1::text), ($2::date - DATE '2000-01-01'))
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Sorted, de-duplicated doctor/day keys. Every writer that needs more than
/// one day acquires them in this order.
pub fn lock_order(days: impl IntoIterator<Item = (Uuid, NaiveDate)>) -> Vec<(Uuid, NaiveDate)> {
    let mut days: Vec<_> = days.into_iter().collect();
    days.sort();
    days.dedup();
    days
}

/// Advisory locks come before any row lock, so a writer that later touches
/// appointment or window rows never waits on a day lock while holding one.
pub async fn lock_doctor_days(
    tx: &mut Transaction<'_, Postgres>,
    days: impl IntoIterator<Item = (Uuid, NaiveDate)>,
) -> Result<(), sqlx::Error> {
    for (doctor_id, date) in lock_order(days) {
        lock_doctor_day(tx, doctor_id, date).await?;
    }
    Ok(())
}


#[cfg(test)]
pub(crate) mod fixtures {
    //! Rows the scheduling tests build on.

    use sqlx::PgPool;
    use uuid::Uuid;

    async fn user(pool: &PgPool, role: i16) -> Uuid {
        sqlx::query_scalar("INSERT INTO app_user (email, role) VALUES ($1, $2) RETURNING user_id")
            .bind(format!("{}@clinic.test", Uuid::new_v4()))
            .bind(role)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    pub async fn doctor(pool: &PgPool) -> Uuid {
        let user_id = user(pool, 3).await;
        sqlx::query_scalar(
            "INSERT INTO doctor (user_id, display_name) VALUES ($1, 'Dr. Test') RETURNING doctor_id",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn patient(pool: &PgPool) -> Uuid {
        let user_id = user(pool, 0).await;
        sqlx::query_scalar(
            "INSERT INTO patient (user_id, display_name) VALUES ($1, 'Test Patient') RETURNING patient_id",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn service(pool: &PgPool, doctor_id: Uuid) -> Uuid {
        sqlx::query_scalar(
            r#"
            INSERT INTO service (doctor_id, name, price_cents, duration_min)
            VALUES ($1, 'Checkup', 5000, 30)
            RETURNING service_id
            "#,
        )
        .bind(doctor_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }
}
