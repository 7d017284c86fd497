//! # URL Service
//!
//! Slug generation, validation and persistence, plus the process-wide URL
//! prefix and slug router registries.
//!
//! ## Slug Lifecycle
//! ```text
//! "Größe & Farbe"  (or the entity's display name when empty)
//!        │
//!        ▼
//! slugify() ──► "groesse-and-farbe"
//!        │
//!        ▼
//! reserved or used by another entity? ──► "groesse-and-farbe-2", -3, …
//!        │
//!        ▼
//! save_slug() ──► one active UrlRecord per (entity, language)
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use mercato_core::seo::{
    combine_segments, slug_candidates, slugify, RouterRegistry, SeoSettings, UrlPrefixRegistry,
};
use mercato_core::validation::validate_slug_format;
use mercato_core::{UrlRecord, MAX_SLUG_LENGTH};

use crate::config::UrlPrefixSettings;
use crate::error::ServiceResult;
use crate::store::UrlRecordStore;

/// Builds the prefix registry from the `[[url_prefixes]]` config entries.
pub fn url_prefixes_from_config(entries: &[UrlPrefixSettings]) -> UrlPrefixRegistry {
    let mut registry = UrlPrefixRegistry::new();
    for entry in entries {
        registry.register_url_prefix(&entry.prefix, entry.entity_names.iter().cloned());
    }
    registry
}

/// Slugs of storefront entities.
pub struct UrlService {
    store: Arc<dyn UrlRecordStore>,
    settings: SeoSettings,
    prefixes: Arc<UrlPrefixRegistry>,
    routers: Arc<RouterRegistry>,
}

impl UrlService {
    pub fn new(
        store: Arc<dyn UrlRecordStore>,
        settings: SeoSettings,
        prefixes: Arc<UrlPrefixRegistry>,
        routers: Arc<RouterRegistry>,
    ) -> Self {
        UrlService {
            store,
            settings,
            prefixes,
            routers,
        }
    }

    pub fn prefixes(&self) -> &Arc<UrlPrefixRegistry> {
        &self.prefixes
    }

    pub fn routers(&self) -> &Arc<RouterRegistry> {
        &self.routers
    }

    /// URL prefix registered for an entity type.
    pub fn url_prefix_for(&self, entity_name: &str) -> Option<&str> {
        self.prefixes.url_prefix_for(entity_name)
    }

    /// The active slug of an entity in a language.
    pub async fn get_active_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> ServiceResult<Option<String>> {
        Ok(self
            .store
            .get_active_slug(entity_id, entity_name, language_id)
            .await?)
    }

    /// Relative URL of an entity: its URL prefix (if any) and active slug.
    pub async fn get_entity_path(
        &self,
        entity_id: i64,
        entity_name: &str,
        language_id: i64,
    ) -> ServiceResult<Option<String>> {
        let slug = self.get_active_slug(entity_id, entity_name, language_id).await?;
        Ok(slug.map(|slug| combine_segments(self.url_prefix_for(entity_name), &slug)))
    }

    /// URL-safe slug for arbitrary text.
    pub fn slugify(&self, text: &str) -> String {
        slugify(text, self.settings.allow_unicode_chars_in_urls)
    }

    /// Turns a requested slug into one that can be saved for the entity.
    ///
    /// ## Rules
    /// 1. Empty `se_name` → slug of `display_name`
    /// 2. Still empty → `"<entity>-<id>"`
    /// 3. Reserved or used by another entity → `-2`, `-3`, … appended
    /// 4. Every candidate is cut to the maximum slug length, suffix included
    pub async fn validate_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        se_name: &str,
        display_name: Option<&str>,
    ) -> ServiceResult<String> {
        let source = if se_name.trim().is_empty() {
            display_name.unwrap_or_default()
        } else {
            se_name
        };

        let mut base = self.slugify(source);
        if base.is_empty() {
            base = format!("{}-{}", entity_name.to_lowercase(), entity_id);
        }

        for candidate in slug_candidates(&base, MAX_SLUG_LENGTH) {
            if self.settings.is_reserved(&candidate) {
                continue;
            }
            if self
                .store
                .is_slug_taken(&candidate, entity_id, entity_name)
                .await?
            {
                continue;
            }

            if candidate != base {
                debug!(base = %base, slug = %candidate, entity = %entity_name, "Slug made unique");
            }
            return Ok(candidate);
        }

        // slug_candidates never ends
        Ok(base)
    }

    /// Makes `slug` the active slug of the entity in the language.
    ///
    /// ## Errors
    /// `Validation` for malformed slugs; `Database` (`UniqueViolation`) if
    /// another entity already uses the slug.
    pub async fn save_slug(
        &self,
        entity_id: i64,
        entity_name: &str,
        slug: &str,
        language_id: i64,
    ) -> ServiceResult<UrlRecord> {
        validate_slug_format(slug)?;

        let record = self
            .store
            .save_slug(entity_id, entity_name, slug, language_id)
            .await?;

        info!(
            entity = %entity_name,
            entity_id = entity_id,
            language_id = language_id,
            slug = %record.slug,
            "Slug saved"
        );
        Ok(record)
    }
}
