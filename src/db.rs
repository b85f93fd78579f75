use std::io::Read;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Period, PeriodAttendanceAggregate};

/// Filters for an aggregate read. Period bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateQuery {
    pub class_id: Option<Uuid>,
    pub from: Option<Period>,
    pub to: Option<Period>,
}

impl AggregateQuery {
    fn matches(&self, aggregate: &PeriodAttendanceAggregate) -> bool {
        self.class_id.map_or(true, |id| aggregate.class_id == id)
            && self.from.map_or(true, |from| aggregate.period >= from)
            && self.to.map_or(true, |to| aggregate.period <= to)
    }
}

/// Months since year zero, matching `period_year * 12 + period_month` in SQL.
fn period_index(period: Period) -> i64 {
    period.year as i64 * 12 + period.month as i64
}

/// Read-only access to period attendance aggregates.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    async fn fetch_aggregates(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<PeriodAttendanceAggregate>, StoreError>;
}

pub struct PgAggregateStore {
    pool: PgPool,
}

impl PgAggregateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AggregateStore for PgAggregateStore {
    async fn fetch_aggregates(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<PeriodAttendanceAggregate>, StoreError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT a.student_id, s.full_name, a.class_id, c.name AS class_name, a.activity, \
             a.period_year, a.period_month, a.convocations, a.presences, a.absences, \
             a.deficiencies, a.volunteer_presences, a.volunteer_absences \
             FROM attendance.period_aggregates a \
             JOIN attendance.students s ON s.id = a.student_id \
             JOIN attendance.classes c ON c.id = a.class_id \
             WHERE TRUE",
        );

        if let Some(class_id) = query.class_id {
            builder.push(" AND a.class_id = ").push_bind(class_id);
        }
        if let Some(from) = query.from {
            builder
                .push(" AND (a.period_year::BIGINT * 12 + a.period_month) >= ")
                .push_bind(period_index(from));
        }
        if let Some(to) = query.to {
            builder
                .push(" AND (a.period_year::BIGINT * 12 + a.period_month) <= ")
                .push_bind(period_index(to));
        }
        builder.push(
            " ORDER BY s.full_name, a.student_id, a.period_year, a.period_month, \
             c.name, a.activity",
        );

        let records = builder.build().fetch_all(&self.pool).await?;
        let mut aggregates = Vec::with_capacity(records.len());

        for row in records {
            let student_id: Uuid = row.try_get("student_id")?;
            let year: i32 = row.try_get("period_year")?;
            let month: i32 = row.try_get("period_month")?;
            let period = u32::try_from(month)
                .ok()
                .and_then(|month| Period::new(year, month))
                .ok_or_else(|| StoreError::Malformed {
                    student_id,
                    period: Period { year, month: 1 },
                    reason: format!("invalid period month {month}"),
                })?;

            aggregates.push(PeriodAttendanceAggregate {
                student_id,
                student_name: row.try_get("full_name")?,
                class_id: row.try_get("class_id")?,
                class_name: row.try_get("class_name")?,
                activity: row.try_get("activity")?,
                period,
                convocations: row.try_get("convocations")?,
                presences: row.try_get("presences")?,
                absences: row.try_get("absences")?,
                deficiencies: row.try_get("deficiencies")?,
                volunteer_presences: row.try_get("volunteer_presences")?,
                volunteer_absences: row.try_get("volunteer_absences")?,
            });
        }

        Ok(aggregates)
    }
}

/// Aggregates held in memory, in load order. Backs offline analysis of an
/// exported aggregate file.
#[derive(Debug, Clone, Default)]
pub struct MemoryAggregateStore {
    aggregates: Vec<PeriodAttendanceAggregate>,
}

impl MemoryAggregateStore {
    pub fn new(aggregates: Vec<PeriodAttendanceAggregate>) -> Self {
        Self { aggregates }
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, StoreError> {
        let file = std::fs::File::open(path).map_err(csv::Error::from)?;
        Self::from_csv_reader(file)
    }

    pub fn from_csv_reader<R: Read>(input: R) -> Result<Self, StoreError> {
        Ok(Self::new(read_rows(csv::Reader::from_reader(input))?))
    }
}

#[async_trait]
impl AggregateStore for MemoryAggregateStore {
    async fn fetch_aggregates(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<PeriodAttendanceAggregate>, StoreError> {
        Ok(self
            .aggregates
            .iter()
            .filter(|aggregate| query.matches(aggregate))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct AggregateCsvRow {
    student_id: Uuid,
    student_name: String,
    class_id: Uuid,
    class_name: String,
    activity: String,
    year: i32,
    month: u32,
    convocations: i32,
    presences: i32,
    absences: i32,
    #[serde(default)]
    deficiencies: i32,
    #[serde(default)]
    volunteer_presences: i32,
    #[serde(default)]
    volunteer_absences: i32,
}

impl AggregateCsvRow {
    fn into_aggregate(self) -> Result<PeriodAttendanceAggregate, StoreError> {
        let period = Period::new(self.year, self.month).ok_or_else(|| StoreError::Malformed {
            student_id: self.student_id,
            period: Period {
                year: self.year,
                month: 1,
            },
            reason: format!("invalid period month {}", self.month),
        })?;

        Ok(PeriodAttendanceAggregate {
            student_id: self.student_id,
            student_name: self.student_name,
            class_id: self.class_id,
            class_name: self.class_name,
            activity: self.activity,
            period,
            convocations: self.convocations,
            presences: self.presences,
            absences: self.absences,
            deficiencies: self.deficiencies,
            volunteer_presences: self.volunteer_presences,
            volunteer_absences: self.volunteer_absences,
        })
    }
}

fn read_rows<R: Read>(
    mut reader: csv::Reader<R>,
) -> Result<Vec<PeriodAttendanceAggregate>, StoreError> {
    let mut aggregates = Vec::new();
    for result in reader.deserialize::<AggregateCsvRow>() {
        aggregates.push(result?.into_aggregate()?);
    }
    Ok(aggregates)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_aggregate(
    pool: &PgPool,
    aggregate: &PeriodAttendanceAggregate,
) -> anyhow::Result<u64> {
    sqlx::query(
        r#"
        INSERT INTO attendance.students (id, full_name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(aggregate.student_id)
    .bind(&aggregate.student_name)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO attendance.classes (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(aggregate.class_id)
    .bind(&aggregate.class_name)
    .execute(pool)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO attendance.period_aggregates
        (student_id, class_id, activity, period_year, period_month, convocations,
         presences, absences, deficiencies, volunteer_presences, volunteer_absences)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        ON CONFLICT (student_id, class_id, activity, period_year, period_month) DO UPDATE
        SET convocations = EXCLUDED.convocations,
            presences = EXCLUDED.presences,
            absences = EXCLUDED.absences,
            deficiencies = EXCLUDED.deficiencies,
            volunteer_presences = EXCLUDED.volunteer_presences,
            volunteer_absences = EXCLUDED.volunteer_absences,
            refreshed_at = now()
        "#,
    )
    .bind(aggregate.student_id)
    .bind(aggregate.class_id)
    .bind(&aggregate.activity)
    .bind(aggregate.period.year)
    .bind(aggregate.period.month as i32)
    .bind(aggregate.convocations)
    .bind(aggregate.presences)
    .bind(aggregate.absences)
    .bind(aggregate.deficiencies)
    .bind(aggregate.volunteer_presences)
    .bind(aggregate.volunteer_absences)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Loads a demo cohort covering the six months up to the current period.
pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let class_id = Uuid::parse_str("6a1f3c2e-8d4b-4f7a-9e21-5c0b7d3a9f10")?;
    let students = [
        (
            Uuid::parse_str("3d7f5d6f-24f7-4e8e-8b4b-3e7e44b4a7b2")?,
            "Avery Lee",
            [8, 8, 7, 8, 8, 8],
        ),
        (
            Uuid::parse_str("0c22f1f1-9184-4fd4-9b21-28c68a6a89dc")?,
            "Jules Moreno",
            [8, 7, 5, 4, 2, 1],
        ),
        (
            Uuid::parse_str("d5a0a1a2-2a3c-44c2-8f73-60b7897a9dd2")?,
            "Kiara Patel",
            [5, 6, 4, 5, 3, 4],
        ),
    ];

    let current = Period::current();
    let mut written = 0usize;

    for (student_id, name, presences_by_month) in students {
        for (offset, presences) in presences_by_month.into_iter().enumerate() {
            let period = current.months_back((presences_by_month.len() - 1 - offset) as u32);
            let aggregate = PeriodAttendanceAggregate {
                student_id,
                student_name: name.to_string(),
                class_id,
                class_name: "Strings Ensemble".to_string(),
                activity: "rehearsal".to_string(),
                period,
                convocations: 8,
                presences,
                absences: 8 - presences,
                deficiencies: i32::from(presences < 6),
                volunteer_presences: 0,
                volunteer_absences: 0,
            };
            written += upsert_aggregate(pool, &aggregate)
                .await
                .with_context(|| format!("failed to seed {name} for {period}"))?
                as usize;
        }
    }

    Ok(written)
}

pub async fn import_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let store = MemoryAggregateStore::from_csv_path(csv_path)
        .with_context(|| format!("failed to parse {}", csv_path.display()))?;
    let mut imported = 0usize;

    for aggregate in &store.aggregates {
        aggregate.validate()?;
        if upsert_aggregate(pool, aggregate).await? > 0 {
            imported += 1;
        }
    }

    Ok(imported)
}
