use sqlx::Row;

use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
use gemba_core::domain::scope::UnitScope;

use super::{GrantRepository, RepositoryError};
use crate::DbPool;

pub struct SqlGrantRepository {
    pool: DbPool,
}

impl SqlGrantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_grant(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalGrant, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let person_id: String =
        row.try_get("person_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let level_raw: i64 =
        row.try_get("level").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let plant: String =
        row.try_get("plant").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let area: Option<String> =
        row.try_get("area").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let line: Option<String> =
        row.try_get("line").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let machine: Option<String> =
        row.try_get("machine").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let level = u8::try_from(level_raw)
        .ok()
        .and_then(ApprovalLevel::from_rank)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown approval level `{level_raw}`")))?;

    Ok(ApprovalGrant {
        id: GrantId(id),
        person_id: PersonId(person_id),
        level,
        scope: UnitScope::new(plant, area, line, machine),
    })
}

#[async_trait::async_trait]
impl GrantRepository for SqlGrantRepository {
    async fn grants_for_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, person_id, level, plant, area, line, machine
             FROM approval_grant WHERE person_id = ? ORDER BY id ASC",
        )
        .bind(&person_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_grant).collect()
    }

    async fn grants_at_level(
        &self,
        level: ApprovalLevel,
    ) -> Result<Vec<ApprovalGrant>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, person_id, level, plant, area, line, machine
             FROM approval_grant WHERE level = ? ORDER BY id ASC",
        )
        .bind(i64::from(level.rank()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_grant).collect()
    }

    async fn save(&self, grant: ApprovalGrant) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO approval_grant (id, person_id, level, plant, area, line, machine)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 person_id = excluded.person_id,
                 level = excluded.level,
                 plant = excluded.plant,
                 area = excluded.area,
                 line = excluded.line,
                 machine = excluded.machine",
        )
        .bind(&grant.id.0)
        .bind(&grant.person_id.0)
        .bind(i64::from(grant.level.rank()))
        .bind(&grant.scope.plant)
        .bind(&grant.scope.area)
        .bind(&grant.scope.line)
        .bind(&grant.scope.machine)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &GrantId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM approval_grant WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gemba_core::domain::grant::{ApprovalGrant, ApprovalLevel, GrantId, PersonId};
    use gemba_core::domain::scope::UnitScope;

    use super::SqlGrantRepository;
    use crate::repositories::GrantRepository;
    use crate::{connect_with_settings, migrations};

    fn grant(id: &str, person: &str, level: ApprovalLevel, scope: UnitScope) -> ApprovalGrant {
        ApprovalGrant {
            id: GrantId(id.to_string()),
            person_id: PersonId(person.to_string()),
            level,
            scope,
        }
    }

    #[tokio::test]
    async fn grants_round_trip_by_person_and_level() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repo = SqlGrantRepository::new(pool);

        repo.save(grant("g1", "u-kim", ApprovalLevel::L2, UnitScope::plant("DJ")))
            .await
            .expect("save g1");
        repo.save(grant(
            "g2",
            "u-kim",
            ApprovalLevel::L3,
            UnitScope::new("DJ", Some("DMH".to_string()), None, None),
        ))
        .await
        .expect("save g2");
        repo.save(grant("g3", "u-lee", ApprovalLevel::L2, UnitScope::plant("KR")))
            .await
            .expect("save g3");

        let kim = repo.grants_for_person(&PersonId("u-kim".to_string())).await.expect("for kim");
        assert_eq!(kim.len(), 2);
        assert_eq!(kim[0].level, ApprovalLevel::L2);
        assert_eq!(kim[1].scope.area.as_deref(), Some("DMH"));

        let l2 = repo.grants_at_level(ApprovalLevel::L2).await.expect("at l2");
        assert_eq!(l2.len(), 2);
        assert!(l2.iter().all(|g| g.level == ApprovalLevel::L2));
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repo = SqlGrantRepository::new(pool);

        repo.save(grant("g1", "u-kim", ApprovalLevel::L2, UnitScope::plant("DJ")))
            .await
            .expect("save");
        repo.save(grant("g1", "u-kim", ApprovalLevel::L4, UnitScope::plant("DJ")))
            .await
            .expect("re-save");

        let kim = repo.grants_for_person(&PersonId("u-kim".to_string())).await.expect("for kim");
        assert_eq!(kim.len(), 1);
        assert_eq!(kim[0].level, ApprovalLevel::L4);
    }

    #[tokio::test]
    async fn revoked_grants_are_deleted() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repo = SqlGrantRepository::new(pool);

        repo.save(grant("g1", "u-kim", ApprovalLevel::L2, UnitScope::plant("DJ")))
            .await
            .expect("save");
        repo.delete(&GrantId("g1".to_string())).await.expect("delete");
        // Deleting again is a no-op, not an error.
        repo.delete(&GrantId("g1".to_string())).await.expect("repeat delete");

        let kim = repo.grants_for_person(&PersonId("u-kim".to_string())).await.expect("for kim");
        assert!(kim.is_empty());
    }
}
