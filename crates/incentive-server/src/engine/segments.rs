//! User segment administration and live membership evaluation.

use chrono::{DateTime, Utc};
use incentive_core::segment::{SegmentDraft, UserSegment};
use incentive_core::SegmentId;

use super::Engine;
use crate::error::AppError;
use crate::store::UnitOfWork;

/// True if the user currently matches at least one of `segment_ids`.
///
/// Membership is recomputed from the activity feed on every call. Ids that
/// no longer resolve to a segment never match.
pub(super) async fn user_in_any(
    uow: &mut dyn UnitOfWork,
    user_id: &str,
    segment_ids: &[SegmentId],
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    for &segment_id in segment_ids {
        let Some(segment) = uow.get_segment(segment_id).await? else {
            tracing::debug!(segment_id = %segment_id, "Eligibility references a missing segment");
            continue;
        };
        let criteria = &segment.criteria;

        if criteria.has_signup_bounds() {
            let registered_at = uow.registered_at(user_id).await?;
            if !criteria.signup_matches(registered_at) {
                continue;
            }
        }

        let stats = uow
            .transaction_stats(user_id, criteria.window_start(now), criteria.currency.as_deref())
            .await?;
        if criteria.stats_match(&stats) {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Engine {
    pub async fn list_segments(&self) -> Result<Vec<UserSegment>, AppError> {
        let mut uow = self.store.begin().await?;
        uow.list_segments().await
    }

    pub async fn create_segment(&self, draft: SegmentDraft) -> Result<UserSegment, AppError> {
        draft.validate()?;
        let mut uow = self.store.begin().await?;
        let segment = uow.insert_segment(&draft).await?;
        uow.commit().await?;

        tracing::info!(segment_id = %segment.id, name = %segment.name, "Created user segment");
        Ok(segment)
    }

    pub async fn update_segment(
        &self,
        id: SegmentId,
        draft: SegmentDraft,
    ) -> Result<UserSegment, AppError> {
        draft.validate()?;
        let mut uow = self.store.begin().await?;
        let segment = uow
            .update_segment(id, &draft)
            .await?
            .ok_or_else(|| AppError::NotFound("Segment not found".to_string()))?;
        uow.commit().await?;
        Ok(segment)
    }

    pub async fn delete_segment(&self, id: SegmentId) -> Result<(), AppError> {
        let mut uow = self.store.begin().await?;
        if !uow.delete_segment(id).await? {
            return Err(AppError::NotFound("Segment not found".to_string()));
        }
        uow.commit().await?;

        tracing::info!(segment_id = %id, "Deleted user segment");
        Ok(())
    }
}
