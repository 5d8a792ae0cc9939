//! Publication of doctor availability windows.
//!
//! For a fixed doctor and calendar day no two windows may overlap. Every
//! write re-checks that rule inside a transaction holding the doctor/day
//! advisory lock; the `availability_window_no_overlap` exclusion constraint
//! backs it up at the storage layer.

use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::config::WindowRemovalPolicy;
use crate::db::{LOCK_ATTEMPTS, lock_doctor_day, lock_doctor_days};
use crate::error::{ScheduleError, db_internal};
use crate::models::{AppointmentRow, AppointmentStatus, AvailabilityWindowRow};
use crate::time_range::TimeRange;

const WINDOW_COLUMNS: &str =
    "window_id, doctor_id, date, start_time, end_time, created_at, updated_at";

/// First window that overlaps `range`, skipping `exclude`.
pub fn find_overlap<'w>(
    windows: &'w [AvailabilityWindowRow],
    range: &TimeRange,
    exclude: Option<Uuid>,
) -> Option<&'w AvailabilityWindowRow> {
    windows
        .iter()
        .filter(|w| Some(w.window_id) != exclude)
        .find(|w| w.range().overlaps(range))
}

pub fn require_range(start: NaiveTime, end: NaiveTime) -> Result<TimeRange, ScheduleError> {
    TimeRange::new(start, end)
        .ok_or_else(|| ScheduleError::InvalidInput("startTime must be before endTime".into()))
}

/// Fields accepted when replacing a window. All four must be present.
#[derive(Debug, Clone, Default)]
pub struct WindowUpdate {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSlot {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub range: TimeRange,
}

impl WindowUpdate {
    pub fn validate(&self) -> Result<WindowSlot, ScheduleError> {
        let (Some(doctor_id), Some(date), Some(start), Some(end)) =
            (self.doctor_id, self.date, self.start_time, self.end_time)
        else {
            return Err(ScheduleError::InvalidInput(
                "missing required fields for updating availability".into(),
            ));
        };
        if doctor_id.is_nil() {
            return Err(ScheduleError::InvalidInput("doctorId is required".into()));
        }
        Ok(WindowSlot {
            doctor_id,
            date,
            range: require_range(start, end)?,
        })
    }
}

/// Appointments still relying on `window`.
pub fn dependents<'a>(
    window: &AvailabilityWindowRow,
    appointments: &'a [AppointmentRow],
) -> Vec<&'a AppointmentRow> {
    appointments
        .iter()
        .filter(|a| a.doctor_id == window.doctor_id && a.date == window.date)
        .filter(|a| matches!(a.status, AppointmentStatus::Pending | AppointmentStatus::Confirmed))
        .filter(|a| window.range().contains(&a.range()))
        .collect()
}

/// Live appointments inside `current` that `slot` would no longer cover.
pub fn stranded<'a>(
    current: &AvailabilityWindowRow,
    slot: &WindowSlot,
    appointments: &'a [AppointmentRow],
) -> Vec<&'a AppointmentRow> {
    dependents(current, appointments)
        .into_iter()
        .filter(|a| {
            !(a.doctor_id == slot.doctor_id
                && a.date == slot.date
                && slot.range.contains(&a.range()))
        })
        .collect()
}

/// What to do with the appointments a window change leaves uncovered.
#[derive(Debug, PartialEq, Eq)]
pub enum RemovalPlan {
    Proceed,
    CancelFirst(Vec<Uuid>),
}

pub fn plan_removal(
    policy: WindowRemovalPolicy,
    dependents: &[&AppointmentRow],
) -> Result<RemovalPlan, ScheduleError> {
    if dependents.is_empty() {
        return Ok(RemovalPlan::Proceed);
    }
    match policy {
        WindowRemovalPolicy::Block => Err(ScheduleError::Conflict(format!(
            "availability window has {} booked appointment(s)",
            dependents.len()
        ))),
        WindowRemovalPolicy::Cascade => Ok(RemovalPlan::CancelFirst(
            dependents.iter().map(|a| a.appointment_id).collect(),
        )),
        WindowRemovalPolicy::Orphan => Ok(RemovalPlan::Proceed),
    }
}

pub struct AvailabilityManager<'a> {
    db: &'a PgPool,
    removal_policy: WindowRemovalPolicy,
}

impl<'a> AvailabilityManager<'a> {
    pub fn new(db: &'a PgPool, removal_policy: WindowRemovalPolicy) -> Self {
        Self { db, removal_policy }
    }

    pub async fn get(&self, window_id: Uuid) -> Result<AvailabilityWindowRow, ScheduleError> {
        sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM availability_window WHERE window_id = $1"
        ))
        .bind(window_id)
        .fetch_optional(self.db)
        .await
        .map_err(db_internal)?
        .ok_or_else(window_not_found)
    }

    pub async fn publish(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<AvailabilityWindowRow, ScheduleError> {
        let range = require_range(start_time, end_time)?;

        let mut tx = self.db.begin().await.map_err(db_internal)?;
        lock_doctor_day(&mut tx, doctor_id, date).await.map_err(db_internal)?;

        let existing = windows_for_day(&mut tx, doctor_id, date).await?;
        if let Some(hit) = find_overlap(&existing, &range, None) {
            tracing::debug!(%doctor_id, %date, overlapping = %hit.window_id, "publish rejected");
            return Err(ScheduleError::window_overlap());
        }

        let row = sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
            r#"
            INSERT INTO availability_window (doctor_id, date, start_time, end_time)
            VALUES ($1, $2, $3, $4)
            RETURNING {WINDOW_COLUMNS}
            "#
        ))
        .bind(doctor_id)
        .bind(date)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ScheduleError::from_db(e, ScheduleError::window_overlap))?;

        tx.commit().await.map_err(db_internal)?;

        tracing::info!(window_id = %row.window_id, %doctor_id, %date, "availability published");
        Ok(row)
    }

    pub async fn list(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityWindowRow>, ScheduleError> {
        sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
            r#"
            SELECT {WINDOW_COLUMNS}
            FROM availability_window
            WHERE doctor_id = $1 AND date = $2
            ORDER BY start_time ASC
            "#
        ))
        .bind(doctor_id)
        .bind(date)
        .fetch_all(self.db)
        .await
        .map_err(db_internal)
    }

    /// Take the day locks for the window (plus `also`), then the row lock.
    /// `None` means the window moved to another day in between.
    async fn lock_window(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        window_id: Uuid,
        also: Option<(Uuid, NaiveDate)>,
    ) -> Result<Option<AvailabilityWindowRow>, ScheduleError> {
        let seen = self.get(window_id).await?;

        lock_doctor_days(tx, std::iter::once((seen.doctor_id, seen.date)).chain(also))
            .await
            .map_err(db_internal)?;

        let locked = sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
            "SELECT {WINDOW_COLUMNS} FROM availability_window WHERE window_id = $1 FOR UPDATE"
        ))
        .bind(window_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_internal)?
        .ok_or_else(window_not_found)?;

        let same_day = locked.doctor_id == seen.doctor_id && locked.date == seen.date;
        Ok(same_day.then_some(locked))
    }

    /// Replace a window. Appointments the new slot no longer covers are
    /// handled like those of a removed window.
    pub async fn update(
        &self,
        window_id: Uuid,
        fields: &WindowUpdate,
    ) -> Result<AvailabilityWindowRow, ScheduleError> {
        let slot = fields.validate()?;

        for _ in 0..LOCK_ATTEMPTS {
            let mut tx = self.db.begin().await.map_err(db_internal)?;

            let Some(current) = self
                .lock_window(&mut tx, window_id, Some((slot.doctor_id, slot.date)))
                .await?
            else {
                tracing::debug!(%window_id, "window moved while locking, retrying");
                continue;
            };

            let existing = windows_for_day(&mut tx, slot.doctor_id, slot.date).await?;
            if find_overlap(&existing, &slot.range, Some(window_id)).is_some() {
                return Err(ScheduleError::window_overlap());
            }

            let booked = appointments_for_day(&mut tx, current.doctor_id, current.date).await?;
            let plan = plan_removal(self.removal_policy, &stranded(&current, &slot, &booked))?;
            cancel_for_plan(&mut tx, window_id, &plan).await?;

            let row = sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
                r#"
                UPDATE availability_window
                SET doctor_id = $2, date = $3, start_time = $4, end_time = $5, updated_at = now()
                WHERE window_id = $1
                RETURNING {WINDOW_COLUMNS}
                "#
            ))
            .bind(window_id)
            .bind(slot.doctor_id)
            .bind(slot.date)
            .bind(slot.range.start)
            .bind(slot.range.end)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| ScheduleError::from_db(e, ScheduleError::window_overlap))?;

            tx.commit().await.map_err(db_internal)?;

            tracing::info!(%window_id, doctor_id = %row.doctor_id, date = %row.date, "availability updated");
            return Ok(row);
        }

        Err(busy_window())
    }

    pub async fn remove(&self, window_id: Uuid) -> Result<AvailabilityWindowRow, ScheduleError> {
        for _ in 0..LOCK_ATTEMPTS {
            let mut tx = self.db.begin().await.map_err(db_internal)?;

            let Some(window) = self.lock_window(&mut tx, window_id, None).await? else {
                tracing::debug!(%window_id, "window moved while locking, retrying");
                continue;
            };

            let booked = appointments_for_day(&mut tx, window.doctor_id, window.date).await?;
            let plan = plan_removal(self.removal_policy, &dependents(&window, &booked))?;
            cancel_for_plan(&mut tx, window_id, &plan).await?;

            sqlx::query(r#"DELETE FROM availability_window WHERE window_id = $1"#)
                .bind(window_id)
                .execute(&mut *tx)
                .await
                .map_err(db_internal)?;

            tx.commit().await.map_err(db_internal)?;

            tracing::info!(%window_id, "availability removed");
            return Ok(window);
        }

        Err(busy_window())
    }
}

fn window_not_found() -> ScheduleError {
    ScheduleError::NotFound("availability window not found".into())
}

fn busy_window() -> ScheduleError {
    ScheduleError::Conflict("availability window is being modified concurrently".into())
}

async fn cancel_for_plan(
    tx: &mut Transaction<'_, Postgres>,
    window_id: Uuid,
    plan: &RemovalPlan,
) -> Result<(), ScheduleError> {
    let RemovalPlan::CancelFirst(ids) = plan else {
        return Ok(());
    };

    sqlx::query(
        r#"
        UPDATE appointment
        SET status = $2, updated_at = now()
        WHERE appointment_id = ANY($1)
        "#,
    )
    .bind(ids.as_slice())
    .bind(AppointmentStatus::Cancelled)
    .execute(&mut **tx)
    .await
    .map_err(db_internal)?;

    tracing::info!(%window_id, cancelled = ids.len(), "cancelled appointments left without a window");
    Ok(())
}

async fn appointments_for_day(
    tx: &mut Transaction<'_, Postgres>,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AppointmentRow>, ScheduleError> {
    sqlx::query_as::<_, AppointmentRow>(
        r#"
        SELECT appointment_id, doctor_id, patient_id, service_id, date,
               start_time, end_time, status, created_at, updated_at
        FROM appointment
        WHERE doctor_id = $1 AND date = $2
        "#,
    )
    .bind(doctor_id)
    .bind(date)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_internal)
}

pub(crate) async fn windows_for_day(
    tx: &mut Transaction<'_, Postgres>,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<AvailabilityWindowRow>, ScheduleError> {
    sqlx::query_as::<_, AvailabilityWindowRow>(&format!(
        r#"
        SELECT {WINDOW_COLUMNS}
        FROM availability_window
        WHERE doctor_id = $1 AND date = $2
        ORDER BY start_time ASC
        "#
    ))
    .bind(doctor_id)
    .bind(date)
    .fetch_all(&mut **tx)
    .await
    .map_err(db_internal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn window(doctor_id: Uuid, start: NaiveTime, end: NaiveTime) -> AvailabilityWindowRow {
        AvailabilityWindowRow {
            window_id: Uuid::new_v4(),
            doctor_id,
            date: day(),
            start_time: start,
            end_time: end,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn appointment(
        doctor_id: Uuid,
        start: NaiveTime,
        end: NaiveTime,
        status: AppointmentStatus,
    ) -> AppointmentRow {
        AppointmentRow {
            appointment_id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            date: day(),
            start_time: start,
            end_time: end,
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn second_window_overlapping_first_is_found() {
        let d1 = Uuid::new_v4();
        let published = vec![window(d1, t(9, 0), t(10, 0))];
        let late = TimeRange::new(t(9, 30), t(10, 30)).unwrap();
        let next = TimeRange::new(t(10, 0), t(11, 0)).unwrap();

        assert!(find_overlap(&published, &late, None).is_some());
        assert!(find_overlap(&published, &next, None).is_none());
    }

    #[test]
    fn update_scan_skips_the_window_itself() {
        let d1 = Uuid::new_v4();
        let w = window(d1, t(9, 0), t(10, 0));
        let other = window(d1, t(11, 0), t(12, 0));
        let published = vec![w.clone(), other.clone()];

        let stretched = TimeRange::new(t(9, 0), t(10, 30)).unwrap();
        assert!(find_overlap(&published, &stretched, Some(w.window_id)).is_none());

        let too_far = TimeRange::new(t(9, 0), t(11, 30)).unwrap();
        let hit = find_overlap(&published, &too_far, Some(w.window_id)).unwrap();
        assert_eq!(hit.window_id, other.window_id);
    }

    #[test]
    fn sequential_publishes_never_leave_overlaps() {
        let d1 = Uuid::new_v4();
        let requests = [
            (t(9, 0), t(10, 0)),
            (t(9, 30), t(10, 30)),
            (t(10, 0), t(11, 0)),
            (t(8, 0), t(9, 1)),
            (t(7, 0), t(8, 0)),
            (t(6, 0), t(12, 0)),
        ];

        let mut published: Vec<AvailabilityWindowRow> = vec![];
        for (start, end) in requests {
            let range = TimeRange::new(start, end).unwrap();
            if find_overlap(&published, &range, None).is_none() {
                published.push(window(d1, start, end));
            }
        }

        assert_eq!(published.len(), 3);
        for (i, a) in published.iter().enumerate() {
            for b in published.iter().skip(i + 1) {
                assert!(!a.range().overlaps(&b.range()));
            }
        }
    }

    #[test]
    fn update_requires_all_fields() {
        let partial = WindowUpdate {
            doctor_id: Some(Uuid::new_v4()),
            date: Some(day()),
            start_time: Some(t(9, 0)),
            end_time: None,
        };
        assert_eq!(
            partial.validate(),
            Err(ScheduleError::InvalidInput(
                "missing required fields for updating availability".into()
            ))
        );

        let inverted = WindowUpdate {
            end_time: Some(t(8, 0)),
            ..partial.clone()
        };
        assert!(matches!(inverted.validate(), Err(ScheduleError::InvalidInput(_))));

        let full = WindowUpdate {
            end_time: Some(t(10, 0)),
            ..partial
        };
        assert_eq!(full.validate().unwrap().range.end, t(10, 0));
    }

    #[test]
    fn dependents_are_live_appointments_inside_the_window() {
        let d1 = Uuid::new_v4();
        let w = window(d1, t(9, 0), t(10, 0));
        let booked = vec![
            appointment(d1, t(9, 0), t(10, 0), AppointmentStatus::Pending),
            appointment(d1, t(9, 30), t(10, 0), AppointmentStatus::Confirmed),
            appointment(d1, t(9, 0), t(9, 30), AppointmentStatus::Cancelled),
            appointment(d1, t(10, 0), t(11, 0), AppointmentStatus::Pending),
            appointment(Uuid::new_v4(), t(9, 0), t(10, 0), AppointmentStatus::Pending),
        ];

        let deps = dependents(&w, &booked);
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].appointment_id, booked[0].appointment_id);
        assert_eq!(deps[1].appointment_id, booked[1].appointment_id);
    }

    #[test]
    fn removal_policy_decides_fate_of_dependents() {
        let d1 = Uuid::new_v4();
        let booked = appointment(d1, t(9, 0), t(10, 0), AppointmentStatus::Pending);
        let deps = vec![&booked];

        assert!(matches!(
            plan_removal(WindowRemovalPolicy::Block, &deps),
            Err(ScheduleError::Conflict(_))
        ));
        assert_eq!(
            plan_removal(WindowRemovalPolicy::Cascade, &deps).unwrap(),
            RemovalPlan::CancelFirst(vec![booked.appointment_id])
        );
        assert_eq!(
            plan_removal(WindowRemovalPolicy::Orphan, &deps).unwrap(),
            RemovalPlan::Proceed
        );
    }

    #[test]
    fn window_without_dependents_is_always_deletable() {
        for policy in [
            WindowRemovalPolicy::Block,
            WindowRemovalPolicy::Cascade,
            WindowRemovalPolicy::Orphan,
        ] {
            assert_eq!(plan_removal(policy, &[]).unwrap(), RemovalPlan::Proceed);
        }
    }
    #[test]
    fn stranded_only_counts_bookings_the_new_slot_drops() {
        let d1 = Uuid::new_v4();
        let w = window(d1, t(9, 0), t(11, 0));
        let booked = vec![
            appointment(d1, t(9, 0), t(9, 30), AppointmentStatus::Pending),
            appointment(d1, t(10, 0), t(11, 0), AppointmentStatus::Confirmed),
            appointment(d1, t(9, 30), t(10, 0), AppointmentStatus::Cancelled),
        ];

        let shrunk = WindowSlot {
            doctor_id: d1,
            date: day(),
            range: TimeRange::new(t(9, 0), t(10, 0)).unwrap(),
        };
        let left = stranded(&w, &shrunk, &booked);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].appointment_id, booked[1].appointment_id);

        let widened = WindowSlot {
            range: TimeRange::new(t(8, 0), t(12, 0)).unwrap(),
            ..shrunk
        };
        assert!(stranded(&w, &widened, &booked).is_empty());

        let other_day = WindowSlot {
            date: day().succ_opt().unwrap(),
            range: w.range(),
            ..shrunk
        };
        assert_eq!(stranded(&w, &other_day, &booked).len(), 2);
    }

    mod with_db {
        use super::*;
        use crate::booking::{BookingManager, BookingRequest};
        use crate::config::AvailabilityMatch;
        use crate::db::fixtures;

        struct Booked {
            doctor_id: Uuid,
            window_id: Uuid,
            appointment_id: Uuid,
        }

        /// One 09:00-10:00 window with a PENDING 09:00-10:00 appointment.
        async fn booked_window(pool: &PgPool) -> Booked {
            let doctor_id = fixtures::doctor(pool).await;
            let patient_id = fixtures::patient(pool).await;
            let service_id = fixtures::service(pool, doctor_id).await;

            let w = AvailabilityManager::new(pool, WindowRemovalPolicy::Block)
                .publish(doctor_id, day(), t(9, 0), t(10, 0))
                .await
                .unwrap();
            let a = BookingManager::new(pool, AvailabilityMatch::Containment)
                .book(BookingRequest {
                    doctor_id,
                    patient_id,
                    service_id,
                    date: day(),
                    start_time: t(9, 0),
                    end_time: t(10, 0),
                })
                .await
                .unwrap();

            Booked {
                doctor_id,
                window_id: w.window_id,
                appointment_id: a.appointment_id,
            }
        }

        fn moved_to(b: &Booked, start: NaiveTime, end: NaiveTime) -> WindowUpdate {
            WindowUpdate {
                doctor_id: Some(b.doctor_id),
                date: Some(day()),
                start_time: Some(start),
                end_time: Some(end),
            }
        }

        async fn status_of(pool: &PgPool, appointment_id: Uuid) -> AppointmentStatus {
            sqlx::query_scalar("SELECT status FROM appointment WHERE appointment_id = $1")
                .bind(appointment_id)
                .fetch_one(pool)
                .await
                .unwrap()
        }

        async fn covering_windows(pool: &PgPool, b: &Booked) -> i64 {
            sqlx::query_scalar(
                r#"
                SELECT count(*) FROM availability_window w
                JOIN appointment a ON a.doctor_id = w.doctor_id AND a.date = w.date
                WHERE a.appointment_id = $1
                  AND w.start_time <= a.start_time AND a.end_time <= w.end_time
                "#,
            )
            .bind(b.appointment_id)
            .fetch_one(pool)
            .await
            .unwrap()
        }

        #[sqlx::test]
        async fn publish_rejects_overlap_and_allows_adjacent(pool: PgPool) {
            let doctor_id = fixtures::doctor(&pool).await;
            let mgr = AvailabilityManager::new(&pool, WindowRemovalPolicy::Block);

            mgr.publish(doctor_id, day(), t(9, 0), t(10, 0)).await.unwrap();
            assert_eq!(
                mgr.publish(doctor_id, day(), t(9, 30), t(10, 30)).await.unwrap_err(),
                ScheduleError::window_overlap()
            );
            mgr.publish(doctor_id, day(), t(10, 0), t(11, 0)).await.unwrap();

            assert_eq!(mgr.list(doctor_id, day()).await.unwrap().len(), 2);
        }

        #[sqlx::test]
        async fn update_may_stretch_over_its_own_slot(pool: PgPool) {
            let b = booked_window(&pool).await;
            let mgr = AvailabilityManager::new(&pool, WindowRemovalPolicy::Block);

            let row = mgr.update(b.window_id, &moved_to(&b, t(8, 30), t(10, 30))).await.unwrap();
            assert_eq!(row.range(), TimeRange::new(t(8, 30), t(10, 30)).unwrap());
            assert_eq!(covering_windows(&pool, &b).await, 1);
        }

        #[sqlx::test]
        async fn blocked_update_keeps_booked_window(pool: PgPool) {
            let b = booked_window(&pool).await;
            let mgr = AvailabilityManager::new(&pool, WindowRemovalPolicy::Block);

            let err = mgr.update(b.window_id, &moved_to(&b, t(11, 0), t(12, 0))).await.unwrap_err();
            assert!(matches!(err, ScheduleError::Conflict(_)));

            let w = mgr.get(b.window_id).await.unwrap();
            assert_eq!(w.range(), TimeRange::new(t(9, 0), t(10, 0)).unwrap());
            assert_eq!(covering_windows(&pool, &b).await, 1);
        }

        #[sqlx::test]
        async fn cascading_update_cancels_stranded_booking(pool: PgPool) {
            let b = booked_window(&pool).await;
            let mgr = AvailabilityManager::new(&pool, WindowRemovalPolicy::Cascade);

            mgr.update(b.window_id, &moved_to(&b, t(11, 0), t(12, 0))).await.unwrap();
            assert_eq!(status_of(&pool, b.appointment_id).await, AppointmentStatus::Cancelled);
        }

        #[sqlx::test]
        async fn orphaning_update_leaves_booking_alone(pool: PgPool) {
            let b = booked_window(&pool).await;
            let mgr = AvailabilityManager::new(&pool, WindowRemovalPolicy::Orphan);

            mgr.update(b.window_id, &moved_to(&b, t(11, 0), t(12, 0))).await.unwrap();
            assert_eq!(status_of(&pool, b.appointment_id).await, AppointmentStatus::Pending);
            assert_eq!(covering_windows(&pool, &b).await, 0);
        }

        #[sqlx::test]
        async fn removal_follows_policy(pool: PgPool) {
            let b = booked_window(&pool).await;

            let blocked = AvailabilityManager::new(&pool, WindowRemovalPolicy::Block)
                .remove(b.window_id)
                .await
                .unwrap_err();
            assert!(matches!(blocked, ScheduleError::Conflict(_)));

            AvailabilityManager::new(&pool, WindowRemovalPolicy::Cascade)
                .remove(b.window_id)
                .await
                .unwrap();
            assert_eq!(status_of(&pool, b.appointment_id).await, AppointmentStatus::Cancelled);

            let gone = AvailabilityManager::new(&pool, WindowRemovalPolicy::Cascade)
                .remove(b.window_id)
                .await
                .unwrap_err();
            assert!(matches!(gone, ScheduleError::NotFound(_)));
        }
    }
}
