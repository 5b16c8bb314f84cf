//! Static mapping from entity type to adapter and sync policy.

use std::str::FromStr;
use std::sync::Arc;

use search_sync_repository::opensearch::IndexConfig;
use search_sync_shared::EntityType;

use crate::adapters::{ArticleAdapter, Indexable, ReactionAdapter, TagAdapter, UserAdapter};
use crate::errors::SyncError;

/// Per-type behavior the workers consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// A delete that finds no document counts as success.
    pub tolerate_missing_on_delete: bool,
    /// The type may be named in generic `index` and `bulk_index` jobs.
    pub generic_indexing: bool,
}

/// An adapter together with its policy.
#[derive(Clone)]
pub struct RegisteredAdapter {
    pub adapter: Arc<dyn Indexable>,
    pub policy: SyncPolicy,
}

impl RegisteredAdapter {
    pub fn new(adapter: Arc<dyn Indexable>, policy: SyncPolicy) -> Self {
        Self { adapter, policy }
    }

    pub fn entity_type(&self) -> EntityType {
        self.adapter.entity_type()
    }
}

/// Every indexed entity type, one field each.
pub struct AdapterRegistry {
    article: RegisteredAdapter,
    user: RegisteredAdapter,
    tag: RegisteredAdapter,
    reaction: RegisteredAdapter,
}

impl AdapterRegistry {
    /// The production adapters and policies.
    ///
    /// Article drafts and non-reading-list reactions are never indexed, so
    /// deleting them finds nothing; those types tolerate a missing document.
    pub fn standard(index_config: &IndexConfig) -> Self {
        Self {
            article: RegisteredAdapter::new(
                Arc::new(ArticleAdapter::new(index_config)),
                SyncPolicy {
                    tolerate_missing_on_delete: true,
                    generic_indexing: true,
                },
            ),
            user: RegisteredAdapter::new(
                Arc::new(UserAdapter::new(index_config)),
                SyncPolicy {
                    tolerate_missing_on_delete: false,
                    generic_indexing: true,
                },
            ),
            tag: RegisteredAdapter::new(
                Arc::new(TagAdapter::new(index_config)),
                SyncPolicy {
                    tolerate_missing_on_delete: false,
                    generic_indexing: false,
                },
            ),
            reaction: RegisteredAdapter::new(
                Arc::new(ReactionAdapter::new(index_config)),
                SyncPolicy {
                    tolerate_missing_on_delete: true,
                    generic_indexing: false,
                },
            ),
        }
    }

    /// Replace the policy for one type.
    pub fn with_policy(mut self, entity_type: EntityType, policy: SyncPolicy) -> Self {
        self.slot_mut(entity_type).policy = policy;
        self
    }

    pub fn get(&self, entity_type: EntityType) -> &RegisteredAdapter {
        match entity_type {
            EntityType::Article => &self.article,
            EntityType::User => &self.user,
            EntityType::Tag => &self.tag,
            EntityType::Reaction => &self.reaction,
        }
    }

    fn slot_mut(&mut self, entity_type: EntityType) -> &mut RegisteredAdapter {
        match entity_type {
            EntityType::Article => &mut self.article,
            EntityType::User => &mut self.user,
            EntityType::Tag => &mut self.tag,
            EntityType::Reaction => &mut self.reaction,
        }
    }

    /// Look up a type by the name carried in a job.
    pub fn resolve(&self, name: &str) -> Result<&RegisteredAdapter, SyncError> {
        let entity_type =
            EntityType::from_str(name).map_err(|_| SyncError::invalid_entity_type(name))?;
        Ok(self.get(entity_type))
    }

    /// Like `resolve`, but only for types on the generic allow-list.
    pub fn resolve_generic(&self, name: &str) -> Result<&RegisteredAdapter, SyncError> {
        let registered = self.resolve(name)?;
        if !registered.policy.generic_indexing {
            return Err(SyncError::invalid_entity_type(name));
        }
        Ok(registered)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredAdapter> {
        EntityType::ALL.iter().map(move |t| self.get(*t))
    }

    /// Every index alias the workers write to.
    pub fn aliases(&self) -> Vec<String> {
        self.iter()
            .map(|r| r.adapter.index_name().to_string())
            .collect()
    }
}
