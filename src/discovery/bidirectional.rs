//! Bidirectional entity relationships.

use tracing::debug;

use crate::model::EntityRelationship;
use crate::store::{EntityRelationshipRepository, StoreResult};

/// Persists entity relationships together with their navigation mirror.
pub struct BidirectionalBuilder<'a, R: ?Sized> {
    repository: &'a R,
}

impl<'a, R> BidirectionalBuilder<'a, R>
where
    R: EntityRelationshipRepository + ?Sized,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// Persist `relationship` and its reverse, returning the reverse.
    ///
    /// The reverse swaps both endpoints and inverts cardinality; its
    /// description and association are left for enrichment. Either both rows
    /// are stored or neither is.
    pub async fn create_bidirectional(
        &self,
        relationship: &EntityRelationship,
    ) -> StoreResult<EntityRelationship> {
        let reverse = relationship.reversed();
        self.repository.create_pair(relationship, &reverse).await?;

        debug!(
            forward = %relationship.id,
            reverse = %reverse.id,
            cardinality = %relationship.cardinality,
            "created bidirectional relationship"
        );
        Ok(reverse)
    }
}
