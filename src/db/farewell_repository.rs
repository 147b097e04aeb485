use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::db::kv_store::KeyValueStore;
use crate::errors::AppError;
use crate::models::FarewellRecord;

pub const FAREWELLS_KEY: &str = "farewells";
pub const FLOWERS_KEY: &str = "farewell_flowers";

/// The "inner cemetery": completed farewells plus their flower tallies.
///
/// Records are append-only and immutable; flower counts live in their own slot
/// so offering a flower never rewrites a record.
#[derive(Clone)]
pub struct FarewellRepository {
    store: Arc<dyn KeyValueStore>,
}

impl FarewellRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All records in insertion order. A missing or unreadable slot reads as empty.
    pub async fn find_all(&self) -> Result<Vec<FarewellRecord>, AppError> {
        let Some(raw) = self.store.get(FAREWELLS_KEY).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("Stored farewells are corrupt, treating as empty: {e}");
                Ok(Vec::new())
            }
        }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<FarewellRecord>, AppError> {
        Ok(self.find_all().await?.into_iter().find(|r| r.id == id))
    }

    pub async fn save_all(&self, records: &[FarewellRecord]) -> Result<(), AppError> {
        let raw = serde_json::to_string(records)
            .map_err(|e| AppError::Unexpected(format!("Failed to encode farewells: {e}")))?;
        self.store.set(FAREWELLS_KEY, &raw).await
    }

    pub async fn append(&self, record: FarewellRecord) -> Result<(), AppError> {
        let mut records = self.find_all().await?;
        info!("Saving farewell {} ({})", record.id, record.name);
        records.push(record);
        self.save_all(&records).await
    }

    /// Removes the record and its flowers. Returns whether a record was removed.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool, AppError> {
        let mut records = self.find_all().await?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Ok(false);
        }
        self.save_all(&records).await?;

        let mut flowers = self.flowers().await?;
        if flowers.remove(id).is_some() {
            self.save_flowers(&flowers).await?;
        }
        info!("Deleted farewell {id}");
        Ok(true)
    }

    /// Adds one flower to a record and returns the new tally.
    pub async fn offer_flower(&self, id: &str) -> Result<u32, AppError> {
        if self.find_by_id(id).await?.is_none() {
            return Err(AppError::RecordNotFound {
                entity_type: "FarewellRecord".to_string(),
                id: id.to_string(),
            });
        }
        let mut flowers = self.flowers().await?;
        let count = flowers.entry(id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;
        self.save_flowers(&flowers).await?;
        Ok(count)
    }

    pub async fn flower_count(&self, id: &str) -> Result<u32, AppError> {
        Ok(self.flowers().await?.get(id).copied().unwrap_or(0))
    }

    async fn flowers(&self) -> Result<HashMap<String, u32>, AppError> {
        let Some(raw) = self.store.get(FLOWERS_KEY).await? else {
            return Ok(HashMap::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Stored flower tallies are corrupt, resetting: {e}");
            HashMap::new()
        }))
    }

    async fn save_flowers(&self, flowers: &HashMap<String, u32>) -> Result<(), AppError> {
        let raw = serde_json::to_string(flowers).map_err(|e| {
            error!("Failed to encode flower tallies: {e}");
            AppError::Unexpected(format!("Failed to encode flower tallies: {e}"))
        })?;
        self.store.set(FLOWERS_KEY, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::kv_store::MemoryKvStore;

    fn record(id: &str, name: &str) -> FarewellRecord {
        FarewellRecord {
            id: id.into(),
            name: name.into(),
            date: "2023-11-10".into(),
            image: "style1".into(),
            goodbye_text: "谢谢你曾经的陪伴，我会带着祝福继续前行。".into(),
        }
    }

    fn repo() -> (Arc<MemoryKvStore>, FarewellRepository) {
        let store = Arc::new(MemoryKvStore::new());
        (store.clone(), FarewellRepository::new(store))
    }

    #[tokio::test]
    async fn corrupt_slot_reads_as_empty() {
        let (store, repo) = repo();
        store.set(FAREWELLS_KEY, "{not json").await.unwrap();
        assert!(repo.find_all().await.unwrap().is_empty());

        // and can be overwritten by the next append
        repo.append(record("1", "曾经的友谊")).await.unwrap();
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn append_keeps_insertion_order() {
        let (_, repo) = repo();
        repo.append(record("1", "曾经的友谊")).await.unwrap();
        repo.append(record("2", "逝去的青春")).await.unwrap();
        let names: Vec<_> = repo.find_all().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["曾经的友谊", "逝去的青春"]);
    }

    #[tokio::test]
    async fn delete_removes_record_and_its_flowers() {
        let (_, repo) = repo();
        repo.append(record("1", "曾经的友谊")).await.unwrap();
        repo.append(record("2", "逝去的青春")).await.unwrap();
        repo.offer_flower("1").await.unwrap();

        assert!(repo.delete_by_id("1").await.unwrap());
        assert!(!repo.delete_by_id("1").await.unwrap());
        assert_eq!(repo.flower_count("1").await.unwrap(), 0);
        assert_eq!(repo.find_all().await.unwrap(), vec![record("2", "逝去的青春")]);
    }

    #[tokio::test]
    async fn flowers_accumulate_without_touching_records() {
        let (_, repo) = repo();
        repo.append(record("3", "过去的工作")).await.unwrap();

        assert_eq!(repo.offer_flower("3").await.unwrap(), 1);
        assert_eq!(repo.offer_flower("3").await.unwrap(), 2);
        assert_eq!(repo.flower_count("3").await.unwrap(), 2);
        assert_eq!(repo.find_by_id("3").await.unwrap(), Some(record("3", "过去的工作")));
    }

    #[tokio::test]
    async fn flower_tally_saturates_instead_of_overflowing() {
        let (store, repo) = repo();
        repo.append(record("4", "那座城市")).await.unwrap();
        store.set(FLOWERS_KEY, &format!(r#"{{"4":{}}}"#, u32::MAX)).await.unwrap();

        assert_eq!(repo.offer_flower("4").await.unwrap(), u32::MAX);
        assert_eq!(repo.flower_count("4").await.unwrap(), u32::MAX);
    }

    #[tokio::test]
    async fn flower_for_unknown_record_is_an_error() {
        let (_, repo) = repo();
        let err = repo.offer_flower("missing").await.unwrap_err();
        assert!(matches!(err, AppError::RecordNotFound { .. }));
    }
}
