//! # Slug Route Transformer
//!
//! Resolves an inbound path to route values, a redirect, or nothing.
//!
//! ## Resolution Flow
//! ```text
//! "shop/old-table"  (culture: "de")
//!        │
//!        ▼
//! static resource / empty? ──────────────────────────► NoMatch
//!        │
//!        ▼
//! URL prefix "shop" stripped ──► slug "old-table"
//!        │
//!        ▼
//! UrlRecord by slug ── none ─────────────────────────► NoMatch
//!        │
//!        ├── inactive ──► active slug of entity/language
//!        │                  ├── found ──► Redirect (permanent)
//!        │                  └── none ───► NoMatch
//!        ▼
//! SEO language URLs on?
//!        ├── no culture + PrependSeoCodeAndRedirect ─► Redirect "en/..."
//!        └── ambient ≠ slug culture, ambient published
//!              └── other active slug ──► Redirect (strip or set culture)
//!        ▼
//! prefix entity names contain record entity? ── no ──► NoMatch
//!        ▼
//! RouterRegistry (first non-empty) ── none ──────────► NoMatch
//!        ▼
//! Matched { values + slug, url_record }
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use mercato_core::seo::{
    combine_segments, is_static_resource, CultureChange, DefaultLanguageRedirectBehaviour,
    LocalizationSettings, RouteValues, RouterRegistry, SlugOutcome, UrlPrefixRegistry,
    SLUG_ROUTE_KEY,
};
use mercato_core::UrlRecord;

use crate::error::ServiceResult;
use crate::store::{LanguageStore, UrlRecordStore};

/// An inbound request, already split into culture and path.
#[derive(Debug, Clone, Default)]
pub struct SlugRequest {
    /// Path without leading slash and without the culture segment.
    pub path: String,
    /// Culture segment of the URL ("de"), if any.
    pub culture: Option<String>,
    /// Route values matched so far.
    pub values: RouteValues,
}

impl SlugRequest {
    pub fn new(path: impl Into<String>) -> Self {
        SlugRequest {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = Some(culture.into());
        self
    }
}

/// Maps slugs to entities.
pub struct SlugRouteTransformer {
    url_records: Arc<dyn UrlRecordStore>,
    languages: Arc<dyn LanguageStore>,
    prefixes: Arc<UrlPrefixRegistry>,
    routers: Arc<RouterRegistry>,
    settings: LocalizationSettings,
}

impl SlugRouteTransformer {
    pub fn new(
        url_records: Arc<dyn UrlRecordStore>,
        languages: Arc<dyn LanguageStore>,
        prefixes: Arc<UrlPrefixRegistry>,
        routers: Arc<RouterRegistry>,
        settings: LocalizationSettings,
    ) -> Self {
        SlugRouteTransformer {
            url_records,
            languages,
            prefixes,
            routers,
            settings,
        }
    }

    /// Resolves a request.
    ///
    /// Unknown slugs give [`SlugOutcome::NoMatch`]; only storage failures
    /// are errors.
    pub async fn transform(&self, request: &SlugRequest) -> ServiceResult<SlugOutcome> {
        let path = request.path.trim_matches('/');
        if path.is_empty() || is_static_resource(path) {
            return Ok(SlugOutcome::NoMatch);
        }

        let (url_prefix, slug, entity_names) = match self.prefixes.try_resolve(path) {
            Some(resolved) => (Some(resolved.prefix), resolved.slug, Some(resolved.entity_names)),
            None => (None, path, None),
        };

        let Some(record) = self.url_records.find_by_slug(slug).await? else {
            return Ok(SlugOutcome::NoMatch);
        };

        if !record.is_active {
            return self.redirect_to_active_slug(&record, url_prefix).await;
        }

        if self.settings.seo_friendly_urls_for_languages_enabled {
            if let Some(redirect) = self
                .language_redirect(request, &record, url_prefix, slug)
                .await?
            {
                return Ok(redirect);
            }
        }

        if let Some(names) = entity_names {
            if !names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&record.entity_name))
            {
                debug!(
                    slug = %slug,
                    entity = %record.entity_name,
                    "Slug does not belong to the URL prefix"
                );
                return Ok(SlugOutcome::NoMatch);
            }
        }

        let Some(mut values) = self.routers.get_route_values(&record, &request.values) else {
            return Ok(SlugOutcome::NoMatch);
        };
        values.insert(SLUG_ROUTE_KEY.into(), Value::String(slug.to_string()));

        Ok(SlugOutcome::Matched {
            values,
            url_record: record,
        })
    }

    async fn redirect_to_active_slug(
        &self,
        record: &UrlRecord,
        url_prefix: Option<&str>,
    ) -> ServiceResult<SlugOutcome> {
        let active = self
            .url_records
            .get_active_slug(record.entity_id, &record.entity_name, record.language_id)
            .await?;

        let Some(active) = active.filter(|s| !s.is_empty()) else {
            return Ok(SlugOutcome::NoMatch);
        };

        debug!(
            from = %record.slug,
            to = %active,
            entity = %record.entity_name,
            "Outdated slug, redirecting to active slug"
        );

        let culture = match self.slug_culture(record).await? {
            Some(culture) => CultureChange::Set(culture),
            None => CultureChange::Keep,
        };

        Ok(SlugOutcome::Redirect {
            culture,
            path: combine_segments(url_prefix, &active),
            permanent: true,
        })
    }

    async fn language_redirect(
        &self,
        request: &SlugRequest,
        record: &UrlRecord,
        url_prefix: Option<&str>,
        slug: &str,
    ) -> ServiceResult<Option<SlugOutcome>> {
        let default_culture = self.languages.default_language().await?.unique_seo_code;
        let behaviour = self.settings.default_language_redirect_behaviour;

        let Some(request_culture) = request.culture.as_deref().filter(|c| !c.is_empty()) else {
            if behaviour == DefaultLanguageRedirectBehaviour::PrependSeoCodeAndRedirect {
                return Ok(Some(SlugOutcome::Redirect {
                    culture: CultureChange::Set(default_culture),
                    path: combine_segments(url_prefix, slug),
                    permanent: false,
                }));
            }
            return self
                .ambient_language_redirect(&default_culture, &default_culture, record, url_prefix, slug)
                .await;
        };

        self.ambient_language_redirect(request_culture, &default_culture, record, url_prefix, slug)
            .await
    }

    async fn ambient_language_redirect(
        &self,
        ambient_culture: &str,
        default_culture: &str,
        record: &UrlRecord,
        url_prefix: Option<&str>,
        slug: &str,
    ) -> ServiceResult<Option<SlugOutcome>> {
        let slug_culture = self.slug_culture(record).await?;
        if slug_culture
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(ambient_culture))
        {
            return Ok(None);
        }

        let Some(ambient_language) = self
            .languages
            .find_by_seo_code(ambient_culture)
            .await?
            .filter(|l| l.published)
        else {
            return Ok(None);
        };

        let ambient_slug = self
            .url_records
            .get_active_slug(record.entity_id, &record.entity_name, ambient_language.id)
            .await?;

        let Some(ambient_slug) = ambient_slug.filter(|s| !s.is_empty() && s != slug) else {
            return Ok(None);
        };

        let strip = ambient_culture.eq_ignore_ascii_case(default_culture)
            && self.settings.default_language_redirect_behaviour
                == DefaultLanguageRedirectBehaviour::StripSeoCode;

        debug!(
            from = %slug,
            to = %ambient_slug,
            culture = %ambient_culture,
            "Slug belongs to another language, redirecting"
        );

        Ok(Some(SlugOutcome::Redirect {
            culture: if strip {
                CultureChange::Strip
            } else {
                CultureChange::Set(ambient_culture.to_string())
            },
            path: combine_segments(url_prefix, &ambient_slug),
            permanent: false,
        }))
    }

    /// Two-letter language of the record, `None` for language-neutral slugs.
    async fn slug_culture(&self, record: &UrlRecord) -> ServiceResult<Option<String>> {
        let language = self.languages.get_language(record.language_id).await?;
        Ok(language
            .map(|l| l.two_letter_iso_name())
            .filter(|c| !c.is_empty()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mercato_core::seo::EntitySlugRouter;
    use mercato_core::Language;
    use mercato_db::{Database, DbConfig};

    struct Fixture {
        db: Database,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let en = db
            .languages()
            .insert(&language("English", "en-US", "en", 1))
            .await
            .unwrap()
            .id;
        let de = db
            .languages()
            .insert(&language("Deutsch", "de-DE", "de", 2))
            .await
            .unwrap()
            .id;

        let urls = db.url_records();
        urls.save_slug(1, "Product", "old-table", en).await.unwrap();
        urls.save_slug(1, "Product", "table", en).await.unwrap();
        urls.save_slug(1, "Product", "tisch", de).await.unwrap();
        urls.save_slug(5, "Category", "furniture", en).await.unwrap();

        Fixture { db }
    }

    fn language(name: &str, culture: &str, seo_code: &str, order: i32) -> Language {
        Language {
            id: 0,
            name: name.into(),
            language_culture: culture.into(),
            unique_seo_code: seo_code.into(),
            published: true,
            display_order: order,
        }
    }

    fn transformer(db: &Database, settings: LocalizationSettings, prefixes: UrlPrefixRegistry) -> SlugRouteTransformer {
        let db = Arc::new(db.clone());
        SlugRouteTransformer::new(
            db.clone(),
            db,
            Arc::new(prefixes),
            Arc::new(RouterRegistry::default()),
            settings,
        )
    }

    fn no_language_urls() -> LocalizationSettings {
        LocalizationSettings {
            seo_friendly_urls_for_languages_enabled: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_and_empty_paths() {
        let f = fixture().await;
        let t = transformer(&f.db, LocalizationSettings::default(), UrlPrefixRegistry::new());

        assert_eq!(t.transform(&SlugRequest::new("")).await.unwrap(), SlugOutcome::NoMatch);
        assert_eq!(
            t.transform(&SlugRequest::new("css/site.css")).await.unwrap(),
            SlugOutcome::NoMatch
        );
        assert_eq!(
            t.transform(&SlugRequest::new("no-such-slug")).await.unwrap(),
            SlugOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_active_slug_matches() {
        let f = fixture().await;
        let t = transformer(&f.db, no_language_urls(), UrlPrefixRegistry::new());

        let outcome = t.transform(&SlugRequest::new("TABLE")).await.unwrap();
        let SlugOutcome::Matched { values, url_record } = outcome else {
            panic!("expected a match, got {outcome:?}");
        };
        assert_eq!(url_record.entity_id, 1);
        assert_eq!(values["controller"], "Product");
        assert_eq!(values["productId"], 1);
        assert_eq!(values[SLUG_ROUTE_KEY], "TABLE");
    }

    #[tokio::test]
    async fn test_inactive_slug_redirects_permanently() {
        let f = fixture().await;
        let mut prefixes = UrlPrefixRegistry::new();
        prefixes.register_url_prefix("shop", ["Product"]);
        let t = transformer(&f.db, LocalizationSettings::default(), prefixes);

        let outcome = t.transform(&SlugRequest::new("shop/old-table")).await.unwrap();
        assert_eq!(
            outcome,
            SlugOutcome::Redirect {
                culture: CultureChange::Set("en".into()),
                path: "shop/table".into(),
                permanent: true,
            }
        );
    }

    #[tokio::test]
    async fn test_inactive_slug_without_active_is_no_match() {
        let f = fixture().await;
        f.db.url_records()
            .insert(&UrlRecord {
                id: 0,
                entity_id: 9,
                entity_name: "Topic".into(),
                slug: "gone".into(),
                is_active: false,
                language_id: 0,
            })
            .await
            .unwrap();
        let t = transformer(&f.db, LocalizationSettings::default(), UrlPrefixRegistry::new());

        assert_eq!(t.transform(&SlugRequest::new("gone")).await.unwrap(), SlugOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_prepend_default_culture() {
        let f = fixture().await;
        let settings = LocalizationSettings {
            default_language_redirect_behaviour: DefaultLanguageRedirectBehaviour::PrependSeoCodeAndRedirect,
            ..Default::default()
        };
        let t = transformer(&f.db, settings, UrlPrefixRegistry::new());

        let outcome = t.transform(&SlugRequest::new("table")).await.unwrap();
        assert_eq!(
            outcome,
            SlugOutcome::Redirect {
                culture: CultureChange::Set("en".into()),
                path: "table".into(),
                permanent: false,
            }
        );

        let outcome = t
            .transform(&SlugRequest::new("table").with_culture("en"))
            .await
            .unwrap();
        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_language_switch_redirects() {
        let f = fixture().await;
        let t = transformer(&f.db, LocalizationSettings::default(), UrlPrefixRegistry::new());

        // en/tisch > table, default culture stripped
        let outcome = t
            .transform(&SlugRequest::new("tisch").with_culture("en"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SlugOutcome::Redirect {
                culture: CultureChange::Strip,
                path: "table".into(),
                permanent: false,
            }
        );

        let outcome = t
            .transform(&SlugRequest::new("table").with_culture("de"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SlugOutcome::Redirect {
                culture: CultureChange::Set("de".into()),
                path: "tisch".into(),
                permanent: false,
            }
        );

        let outcome = t
            .transform(&SlugRequest::new("tisch").with_culture("de"))
            .await
            .unwrap();
        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_unpublished_ambient_language_is_ignored() {
        let f = fixture().await;
        let mut french = language("Français", "fr-FR", "fr", 3);
        french.published = false;
        let fr = f.db.languages().insert(&french).await.unwrap().id;
        f.db.url_records().save_slug(1, "Product", "table-fr", fr).await.unwrap();
        let t = transformer(&f.db, LocalizationSettings::default(), UrlPrefixRegistry::new());

        let outcome = t
            .transform(&SlugRequest::new("table").with_culture("fr"))
            .await
            .unwrap();
        assert!(outcome.is_match());
    }

    #[tokio::test]
    async fn test_prefix_must_match_entity() {
        let f = fixture().await;
        let mut prefixes = UrlPrefixRegistry::new();
        prefixes.register_url_prefix("shop", ["Product"]);
        let t = transformer(&f.db, no_language_urls(), prefixes);

        assert!(t.transform(&SlugRequest::new("shop/table")).await.unwrap().is_match());
        assert_eq!(
            t.transform(&SlugRequest::new("shop/furniture")).await.unwrap(),
            SlugOutcome::NoMatch
        );
    }

    #[tokio::test]
    async fn test_no_router_for_entity() {
        let f = fixture().await;
        let mut routers = RouterRegistry::empty();
        routers.register_router(EntitySlugRouter::new("Category", "Catalog", "Category", "categoryId"));
        let db = Arc::new(f.db.clone());
        let t = SlugRouteTransformer::new(
            db.clone(),
            db,
            Arc::new(UrlPrefixRegistry::new()),
            Arc::new(routers),
            no_language_urls(),
        );

        assert_eq!(t.transform(&SlugRequest::new("table")).await.unwrap(), SlugOutcome::NoMatch);
        assert!(t.transform(&SlugRequest::new("furniture")).await.unwrap().is_match());
    }
}
