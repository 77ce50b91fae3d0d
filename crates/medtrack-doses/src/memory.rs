//! 内存实现的协作接口
//!
//! 用于测试和演示，语义与数据库实现一致：按用户授权过滤计划/药品，
//! 已服用记录以 (schedule_id, scheduled_for) 唯一。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medtrack_core::{
    DoseTaken, MedError, Medication, MedicationSchedule, NewDoseTaken, Result, TakenInfo, TakenKey,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::{MedicationLookup, ScheduleLookup, TakenMap, TakenStore};
use crate::validation::validate_schedule;

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    access: HashMap<String, HashSet<String>>, // user_id -> recipient_ids
    medications: HashMap<String, Medication>,
    schedules: HashMap<String, StoredSchedule>,
    taken: HashMap<String, BTreeMap<DateTime<Utc>, DoseTaken>>, // schedule_id -> scheduled_for -> 记录
}

#[derive(Debug, Clone)]
struct StoredSchedule {
    recipient_id: String,
    schedule: MedicationSchedule,
}

impl StoreState {
    fn can_access(&self, user_id: &str, recipient_id: &str) -> bool {
        self.access
            .get(user_id)
            .map(|recipients| recipients.contains(recipient_id))
            .unwrap_or(false)
    }
}

impl InMemoryStore {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 授予用户访问被照护人的权限
    pub async fn grant_access(&self, user_id: &str, recipient_id: &str) {
        let mut state = self.state.write().await;
        state
            .access
            .entry(user_id.to_string())
            .or_insert_with(HashSet::new)
            .insert(recipient_id.to_string());
    }

    /// 保存药品
    pub async fn insert_medication(&self, medication: Medication) {
        let mut state = self.state.write().await;
        state.medications.insert(medication.id.clone(), medication);
    }

    /// 保存用药计划，所属药品必须已存在
    pub async fn insert_schedule(&self, schedule: MedicationSchedule) -> Result<()> {
        validate_schedule(&schedule)?;

        let mut state = self.state.write().await;
        let recipient_id = state
            .medications
            .get(&schedule.medication_id)
            .map(|medication| medication.recipient_id.clone())
            .ok_or(MedError::MedicationNotFound)?;

        state.schedules.insert(
            schedule.id.clone(),
            StoredSchedule {
                recipient_id,
                schedule,
            },
        );
        Ok(())
    }

    /// 停用药品
    pub async fn deactivate_medication(&self, medication_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let medication = state
            .medications
            .get_mut(medication_id)
            .ok_or(MedError::MedicationNotFound)?;

        medication.is_active = false;
        medication.inactive_at = Some(at);
        Ok(())
    }

    /// 重新启用药品
    pub async fn reactivate_medication(&self, medication_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let medication = state
            .medications
            .get_mut(medication_id)
            .ok_or(MedError::MedicationNotFound)?;

        medication.is_active = true;
        medication.inactive_at = None;
        Ok(())
    }

    /// 只删除药品本身，保留其计划（模拟删除与查询之间的竞争）
    pub async fn remove_medication(&self, medication_id: &str) -> Option<Medication> {
        let mut state = self.state.write().await;
        state.medications.remove(medication_id)
    }

    /// 已服用记录数量
    pub async fn taken_count(&self) -> usize {
        self.state.read().await.taken.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl ScheduleLookup for InMemoryStore {
    async fn find_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Option<MedicationSchedule>> {
        let state = self.state.read().await;
        Ok(state
            .schedules
            .get(schedule_id)
            .filter(|stored| state.can_access(user_id, &stored.recipient_id))
            .map(|stored| stored.schedule.clone()))
    }

    async fn list_schedules(&self, user_id: &str, recipient_id: &str) -> Result<Vec<MedicationSchedule>> {
        let state = self.state.read().await;
        if !state.can_access(user_id, recipient_id) {
            return Ok(Vec::new());
        }

        let mut schedules: Vec<MedicationSchedule> = state
            .schedules
            .values()
            .filter(|stored| stored.recipient_id == recipient_id)
            .map(|stored| stored.schedule.clone())
            .collect();
        schedules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(schedules)
    }
}

#[async_trait]
impl MedicationLookup for InMemoryStore {
    async fn find_medication(&self, user_id: &str, medication_id: &str) -> Result<Option<Medication>> {
        let state = self.state.read().await;
        Ok(state
            .medications
            .get(medication_id)
            .filter(|medication| state.can_access(user_id, &medication.recipient_id))
            .cloned())
    }

    async fn list_medications(
        &self,
        user_id: &str,
        recipient_id: &str,
        include_inactive: bool,
    ) -> Result<Vec<Medication>> {
        let state = self.state.read().await;
        if !state.can_access(user_id, recipient_id) {
            return Ok(Vec::new());
        }

        Ok(state
            .medications
            .values()
            .filter(|medication| medication.recipient_id == recipient_id)
            .filter(|medication| include_inactive || medication.is_active)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TakenStore for InMemoryStore {
    async fn mark_taken(&self, user_id: &str, record: NewDoseTaken) -> Result<DoseTaken> {
        let mut state = self.state.write().await;

        let taken = state
            .taken
            .entry(record.schedule_id.clone())
            .or_default()
            .entry(record.scheduled_for)
            .or_insert_with(|| DoseTaken {
                id: Uuid::new_v4().to_string(),
                recipient_id: record.recipient_id,
                medication_id: record.medication_id,
                schedule_id: record.schedule_id,
                scheduled_for: record.scheduled_for,
                taken_at: record.taken_at,
                taken_by_user_id: user_id.to_string(),
            });

        Ok(taken.clone())
    }

    async fn unmark_taken(
        &self,
        _user_id: &str,
        schedule_id: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .taken
            .get_mut(schedule_id)
            .and_then(|records| records.remove(&scheduled_for))
            .is_some())
    }

    async fn get_taken_map(
        &self,
        _user_id: &str,
        schedule_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<TakenMap> {
        if from >= to {
            return Ok(TakenMap::new());
        }

        let state = self.state.read().await;
        Ok(schedule_ids
            .iter()
            .filter_map(|schedule_id| state.taken.get(schedule_id))
            .flat_map(|records| records.range(from..to))
            .map(|(scheduled_for, taken)| {
                (
                    TakenKey::new(taken.schedule_id.clone(), *scheduled_for),
                    TakenInfo::from(taken),
                )
            })
            .collect())
    }
}
