//! Bonus scheme administration.

use incentive_core::scheme::{BonusScheme, SchemeDefinition, SchemeDraft, SchemeStatus};
use incentive_core::SchemeId;

use super::Engine;
use crate::error::AppError;

fn scheme_not_found() -> AppError {
    AppError::NotFound("Bonus scheme not found".to_string())
}

impl Engine {
    pub async fn list_schemes(&self) -> Result<Vec<BonusScheme>, AppError> {
        let mut uow = self.store.begin().await?;
        uow.list_schemes().await
    }

    pub async fn get_scheme(&self, id: SchemeId) -> Result<BonusScheme, AppError> {
        let mut uow = self.store.begin().await?;
        uow.get_scheme(id).await?.ok_or_else(scheme_not_found)
    }

    pub async fn create_scheme(&self, draft: SchemeDraft) -> Result<BonusScheme, AppError> {
        let definition = SchemeDefinition::try_from(draft)?;
        let mut uow = self.store.begin().await?;
        let scheme = uow.insert_scheme(&definition).await?;
        uow.commit().await?;

        tracing::info!(
            scheme_id = %scheme.id,
            name = %scheme.name(),
            bonus_type = %definition.kind.bonus_type(),
            "Created bonus scheme"
        );
        Ok(scheme)
    }

    /// Replaces a scheme's definition. Archived schemes are frozen.
    pub async fn update_scheme(
        &self,
        id: SchemeId,
        draft: SchemeDraft,
    ) -> Result<BonusScheme, AppError> {
        let definition = SchemeDefinition::try_from(draft)?;
        let mut uow = self.store.begin().await?;

        let current = uow.get_scheme(id).await?.ok_or_else(scheme_not_found)?;
        if current.definition.status == SchemeStatus::Archived {
            return Err(AppError::BadRequest(
                "Archived bonus schemes cannot be modified".to_string(),
            ));
        }

        let scheme = uow
            .update_scheme(id, &definition)
            .await?
            .ok_or_else(scheme_not_found)?;
        uow.commit().await?;

        tracing::info!(scheme_id = %id, status = %scheme.definition.status, "Updated bonus scheme");
        Ok(scheme)
    }

    /// Sets the status to `ARCHIVED`. The row itself is kept.
    pub async fn archive_scheme(&self, id: SchemeId) -> Result<(), AppError> {
        let mut uow = self.store.begin().await?;
        if !uow.set_scheme_status(id, SchemeStatus::Archived).await? {
            return Err(scheme_not_found());
        }
        uow.commit().await?;

        tracing::info!(scheme_id = %id, "Archived bonus scheme");
        Ok(())
    }
}
