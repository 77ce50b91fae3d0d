//! 数据库查询操作

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medtrack_core::{DoseTaken, MedError, Medication, MedicationSchedule, NewDoseTaken, Result};
use medtrack_doses::{MedicationLookup, ScheduleLookup, TakenMap, TakenStore};
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;

/// 删除与重新写入并发时的最大重试次数
const MARK_TAKEN_ATTEMPTS: usize = 3;

const SCHEDULE_COLUMNS: &str = r#"
    s.id, s.medication_id, s.recurrence, s.time_of_day, s.timezone,
    s.days_of_week, s.start_date, s.end_date, s.dosage_notes
"#;

const MEDICATION_COLUMNS: &str = r#"
    m.id, m.recipient_id, m.name, m.instructions, m.is_active, m.inactive_at
"#;

fn database_error(e: sqlx::Error) -> MedError {
    MedError::Database(e.to_string())
}

/// 数据库查询操作接口
#[derive(Debug, Clone)]
pub struct DatabaseQueries {
    pool: DatabasePool,
}

impl DatabaseQueries {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 授权表：用户可访问的被照护人
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS recipient_access (
                user_id TEXT NOT NULL,
                recipient_id TEXT NOT NULL,
                PRIMARY KEY (user_id, recipient_id)
            )
        "#).execute(pool).await.map_err(database_error)?;

        // 药品表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medications (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                name VARCHAR(255) NOT NULL,
                instructions TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                inactive_at TIMESTAMP WITH TIME ZONE,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CHECK (is_active = (inactive_at IS NULL))
            )
        "#).execute(pool).await.map_err(database_error)?;

        // 用药计划表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS medication_schedules (
                id TEXT PRIMARY KEY,
                medication_id TEXT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
                recurrence VARCHAR(10) NOT NULL CHECK (recurrence IN ('daily', 'weekly')),
                time_of_day CHAR(5) NOT NULL,
                timezone TEXT NOT NULL DEFAULT '',
                days_of_week INTEGER[],
                start_date DATE NOT NULL,
                end_date DATE,
                dosage_notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                CHECK (end_date IS NULL OR end_date >= start_date),
                CHECK (
                    (recurrence = 'daily' AND days_of_week IS NULL)
                    OR (recurrence = 'weekly' AND cardinality(days_of_week) > 0)
                )
            )
        "#).execute(pool).await.map_err(database_error)?;

        // 已服用记录表，(schedule_id, scheduled_for) 唯一
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS dose_taken (
                id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL,
                medication_id TEXT NOT NULL REFERENCES medications(id) ON DELETE CASCADE,
                schedule_id TEXT NOT NULL REFERENCES medication_schedules(id) ON DELETE CASCADE,
                scheduled_for TIMESTAMP WITH TIME ZONE NOT NULL,
                taken_at TIMESTAMP WITH TIME ZONE NOT NULL,
                taken_by_user_id TEXT NOT NULL,
                CONSTRAINT dose_taken_schedule_instant_key UNIQUE (schedule_id, scheduled_for)
            )
        "#).execute(pool).await.map_err(database_error)?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_recipient_access_recipient ON recipient_access(recipient_id)",
            "CREATE INDEX IF NOT EXISTS idx_medications_recipient_id ON medications(recipient_id)",
            "CREATE INDEX IF NOT EXISTS idx_schedules_medication_id ON medication_schedules(medication_id)",
            "CREATE INDEX IF NOT EXISTS idx_dose_taken_recipient_id ON dose_taken(recipient_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(database_error)?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    async fn find_taken(&self, schedule_id: &str, scheduled_for: DateTime<Utc>) -> Result<Option<DoseTaken>> {
        let result = sqlx::query_as::<_, DbDoseTaken>(
            "SELECT * FROM dose_taken WHERE schedule_id = $1 AND scheduled_for = $2",
        )
        .bind(schedule_id)
        .bind(scheduled_for)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(database_error)?;

        Ok(result.map(DoseTaken::from))
    }
}

#[async_trait]
impl ScheduleLookup for DatabaseQueries {
    async fn find_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<MedicationSchedule>> {
        let sql = format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM medication_schedules s
            JOIN medications m ON m.id = s.medication_id
            JOIN recipient_access a ON a.recipient_id = m.recipient_id
            WHERE a.user_id = $1 AND s.id = $2
            "#
        );

        let result = sqlx::query_as::<_, DbSchedule>(&sql)
            .bind(user_id)
            .bind(schedule_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(database_error)?;

        result.map(MedicationSchedule::try_from).transpose()
    }

    async fn list_schedules(&self, user_id: &str, recipient_id: &str) -> Result<Vec<MedicationSchedule>> {
        let sql = format!(
            r#"
            SELECT {SCHEDULE_COLUMNS}
            FROM medication_schedules s
            JOIN medications m ON m.id = s.medication_id
            JOIN recipient_access a ON a.recipient_id = m.recipient_id
            WHERE a.user_id = $1 AND m.recipient_id = $2
            ORDER BY s.id
            "#
        );

        let results = sqlx::query_as::<_, DbSchedule>(&sql)
            .bind(user_id)
            .bind(recipient_id)
            .fetch_all(self.pool.pool())
            .await
            .map_err(database_error)?;

        results.into_iter().map(MedicationSchedule::try_from).collect()
    }
}

#[async_trait]
impl MedicationLookup for DatabaseQueries {
    async fn find_medication(&self, user_id: &str, medication_id: &str) -> Result<Option<Medication>> {
        let sql = format!(
            r#"
            SELECT {MEDICATION_COLUMNS}
            FROM medications m
            JOIN recipient_access a ON a.recipient_id = m.recipient_id
            WHERE a.user_id = $1 AND m.id = $2
            "#
        );

        let result = sqlx::query_as::<_, DbMedication>(&sql)
            .bind(user_id)
            .bind(medication_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(database_error)?;

        Ok(result.map(Medication::from))
    }

    async fn list_medications(
        &self,
        user_id: &str,
        recipient_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<Medication>> {
        let sql = format!(
            r#"
            SELECT {MEDICATION_COLUMNS}
            FROM medications m
            JOIN recipient_access a ON a.recipient_id = m.recipient_id
            WHERE a.user_id = $1 AND m.recipient_id = $2 AND ($3 OR m.is_active)
            ORDER BY m.name
            "#
        );

        let results = sqlx::query_as::<_, DbMedication>(&sql)
            .bind(user_id)
            .bind(recipient_id)
            .bind(include_inactive)
            .fetch_all(self.pool.pool())
            .await
            .map_err(database_error)?;

        Ok(results.into_iter().map(Medication::from).collect())
    }
}

#[async_trait]
impl TakenStore for DatabaseQueries {
    async fn mark_taken(&self, user_id: &str, record: NewDoseTaken) -> Result<DoseTaken> {
        let pool = self.pool.pool();

        // 冲突时不报错也不返回行；随后的查询使用新快照，能看到并发胜出的那一行
        for _ in 0..MARK_TAKEN_ATTEMPTS {
            let inserted = sqlx::query_as::<_, DbDoseTaken>(r#"
                INSERT INTO dose_taken (id, recipient_id, medication_id, schedule_id, scheduled_for, taken_at, taken_by_user_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (schedule_id, scheduled_for) DO NOTHING
                RETURNING *
            "#)
            .bind(Uuid::new_v4().to_string())
            .bind(&record.recipient_id)
            .bind(&record.medication_id)
            .bind(&record.schedule_id)
            .bind(record.scheduled_for)
            .bind(record.taken_at)
            .bind(user_id)
            .fetch_optional(pool)
            .await
            .map_err(database_error)?;

            if let Some(row) = inserted {
                return Ok(DoseTaken::from(row));
            }

            if let Some(existing) = self.find_taken(&record.schedule_id, record.scheduled_for).await? {
                tracing::debug!(
                    "Dose of schedule {} at {} already taken, returning existing record",
                    record.schedule_id,
                    record.scheduled_for
                );
                return Ok(existing);
            }
        }

        Err(MedError::Database(format!(
            "could not record dose of schedule {} at {}",
            record.schedule_id, record.scheduled_for
        )))
    }

    async fn unmark_taken(
        &self,
        user_id: &str,
        schedule_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dose_taken WHERE schedule_id = $1 AND scheduled_for = $2")
            .bind(schedule_id)
            .bind(scheduled_for)
            .execute(self.pool.pool())
            .await
            .map_err(database_error)?;

        tracing::debug!(
            "User {} removed {} taken record(s) for schedule {}",
            user_id,
            result.rows_affected(),
            schedule_id
        );
        Ok(result.rows_affected() > 0)
    }

    async fn get_taken_map(
        &self,
        _user_id: &str,
        schedule_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TakenMap> {
        let results = sqlx::query_as::<_, DbTakenEntry>(r#"
            SELECT schedule_id, scheduled_for, taken_at, taken_by_user_id
            FROM dose_taken
            WHERE schedule_id = ANY($1) AND scheduled_for >= $2 AND scheduled_for < $3
        "#)
        .bind(schedule_ids)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool.pool())
        .await
        .map_err(database_error)?;

        Ok(results.into_iter().map(DbTakenEntry::into_entry).collect())
    }
}
