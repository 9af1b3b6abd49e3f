use sqlx::Row;

use gemba_core::domain::contact::ContactCard;
use gemba_core::domain::grant::PersonId;

use super::{ContactRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_contact(row: &sqlx::sqlite::SqliteRow) -> Result<ContactCard, RepositoryError> {
    let person_id: String =
        row.try_get("person_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let chat_id: Option<String> =
        row.try_get("chat_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let avatar_url: Option<String> =
        row.try_get("avatar_url").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ContactCard { person_id: PersonId(person_id), name, email, chat_id, avatar_url })
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn find_by_person(
        &self,
        person_id: &PersonId,
    ) -> Result<Option<ContactCard>, RepositoryError> {
        let row = sqlx::query(
            "SELECT person_id, name, email, chat_id, avatar_url FROM contact WHERE person_id = ?",
        )
        .bind(&person_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_contact(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, contact: ContactCard) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contact (person_id, name, email, chat_id, avatar_url)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(person_id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 chat_id = excluded.chat_id,
                 avatar_url = excluded.avatar_url",
        )
        .bind(&contact.person_id.0)
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.chat_id)
        .bind(&contact.avatar_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use gemba_core::domain::contact::ContactCard;
    use gemba_core::domain::grant::PersonId;

    use super::SqlContactRepository;
    use crate::repositories::ContactRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn contact_round_trip() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        let repo = SqlContactRepository::new(pool);

        let contact = ContactCard {
            person_id: PersonId("u-kim".to_string()),
            name: "Kim Jiho".to_string(),
            email: Some("jiho.kim@example.com".to_string()),
            chat_id: Some("chat-kim".to_string()),
            avatar_url: None,
        };

        repo.save(contact.clone()).await.expect("save contact");
        let found =
            repo.find_by_person(&contact.person_id).await.expect("find contact").expect("found");
        assert_eq!(found, contact);

        let missing =
            repo.find_by_person(&PersonId("u-nobody".to_string())).await.expect("find missing");
        assert!(missing.is_none());
    }
}
