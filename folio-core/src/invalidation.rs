//! Invalidation rules: which keys a domain mutation makes stale.
//!
//! Every rule is a pure function from the changed identifiers to an ordered
//! list of patterns (exact keys or `prefix:*` wildcards). Rules err on the
//! wide side: if a mutation might touch a cached view, its prefix is listed.
//!
//! Key shapes referenced here:
//!
//! | Key                                   | Content                        |
//! |---------------------------------------|--------------------------------|
//! | `user:{user}`                         | user profile                   |
//! | `user:{user}:projects`                | projects owned by the user     |
//! | `session:{user}:{session}`            | session state                  |
//! | `project:{project}[:...]`             | project and its sub-views      |
//! | `character:{character}[:...]`         | character and its sub-views    |
//! | `asset:{asset}[:...]`                 | asset metadata and renditions  |
//! | `ai:{category}:{id}:...`              | generated output for an entity |
//! | `dashboard:...`, `analytics:...`      | aggregated operational views   |
//! | `static:...`                          | published static content       |

use serde::{Deserialize, Serialize};

use crate::key::{build_key, build_prefix_pattern, CacheCategory};

const NO_IDS: [&str; 0] = [];

/// Patterns to purge after a user profile update.
pub fn user_updated(user_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::User, [user_id]),
        build_key(CacheCategory::User, [user_id, "projects"]),
    ]
}

/// Patterns to purge after a user is deleted.
pub fn user_deleted(user_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::User, [user_id]),
        build_prefix_pattern(CacheCategory::User, [user_id]),
        build_prefix_pattern(CacheCategory::Session, [user_id]),
        build_prefix_pattern(CacheCategory::Dashboard, NO_IDS),
    ]
}

/// Patterns to purge when a session ends.
pub fn session_ended(user_id: &str, session_id: &str) -> Vec<String> {
    vec![build_key(CacheCategory::Session, [user_id, session_id])]
}

/// Patterns to purge after a project update.
pub fn project_updated(project_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::Project, [project_id]),
        build_prefix_pattern(CacheCategory::Project, [project_id]),
        build_prefix_pattern(CacheCategory::Dashboard, NO_IDS),
    ]
}

/// Patterns to purge after a project is deleted.
pub fn project_deleted(project_id: &str, owner_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::Project, [project_id]),
        build_prefix_pattern(CacheCategory::Project, [project_id]),
        build_key(CacheCategory::User, [owner_id, "projects"]),
        build_prefix_pattern(CacheCategory::AiGeneration, ["project", project_id]),
        build_prefix_pattern(CacheCategory::Dashboard, NO_IDS),
        build_prefix_pattern(CacheCategory::Analytics, NO_IDS),
    ]
}

/// Patterns to purge after a character changes.
///
/// Generated output for the character was derived from the old state, so
/// it goes too.
pub fn character_updated(character_id: &str, project_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::Character, [character_id]),
        build_prefix_pattern(CacheCategory::Character, [character_id]),
        build_key(CacheCategory::Project, [project_id, "characters"]),
        build_prefix_pattern(CacheCategory::AiGeneration, ["character", character_id]),
    ]
}

/// Patterns to purge after an asset changes.
pub fn asset_updated(asset_id: &str, project_id: &str) -> Vec<String> {
    vec![
        build_key(CacheCategory::Asset, [asset_id]),
        build_prefix_pattern(CacheCategory::Asset, [asset_id]),
        build_key(CacheCategory::Project, [project_id, "assets"]),
    ]
}

/// Patterns to purge when generated output for an entity is regenerated.
pub fn ai_output_regenerated(category: CacheCategory, entity_id: &str) -> Vec<String> {
    vec![build_prefix_pattern(
        CacheCategory::AiGeneration,
        [category.as_str(), entity_id],
    )]
}

/// Patterns to purge after static content is republished.
///
/// Static paths share layouts and navigation, so the whole category goes.
pub fn static_content_published() -> Vec<String> {
    vec![build_prefix_pattern(CacheCategory::StaticContent, NO_IDS)]
}

/// A domain mutation reported by an event handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainChange {
    UserUpdated { user_id: String },
    UserDeleted { user_id: String },
    SessionEnded { user_id: String, session_id: String },
    ProjectUpdated { project_id: String },
    ProjectDeleted { project_id: String, owner_id: String },
    CharacterUpdated { character_id: String, project_id: String },
    AssetUpdated { asset_id: String, project_id: String },
    AiOutputRegenerated { category: CacheCategory, entity_id: String },
    StaticContentPublished,
}

impl DomainChange {
    /// Patterns the change invalidates, in purge order.
    pub fn patterns(&self) -> Vec<String> {
        match self {
            DomainChange::UserUpdated { user_id } => user_updated(user_id),
            DomainChange::UserDeleted { user_id } => user_deleted(user_id),
            DomainChange::SessionEnded {
                user_id,
                session_id,
            } => session_ended(user_id, session_id),
            DomainChange::ProjectUpdated { project_id } => project_updated(project_id),
            DomainChange::ProjectDeleted {
                project_id,
                owner_id,
            } => project_deleted(project_id, owner_id),
            DomainChange::CharacterUpdated {
                character_id,
                project_id,
            } => character_updated(character_id, project_id),
            DomainChange::AssetUpdated {
                asset_id,
                project_id,
            } => asset_updated(asset_id, project_id),
            DomainChange::AiOutputRegenerated {
                category,
                entity_id,
            } => ai_output_regenerated(*category, entity_id),
            DomainChange::StaticContentPublished => static_content_published(),
        }
    }
}
