//! # SEO Slugs & Routing Primitives
//!
//! Pure building blocks for slug routing: URL prefixes, slug routers,
//! slug text helpers and the outcome type of a slug lookup.
//!
//! ## Path Anatomy
//! ```text
//!   /de/shop/espresso-maschine
//!    ──  ──── ─────────────────
//!    │    │          │
//!    │    │          └─ slug       → UrlRecord (entity_name = "Product")
//!    │    └─ url prefix            → entity names ["Product"]
//!    └─ culture (SEO code)         → handled by the caller, not part of path
//! ```
//!
//! Registries are plain values built at startup and shared behind an `Arc`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::UrlRecord;

/// Route value key carrying the matched slug.
pub const SLUG_ROUTE_KEY: &str = "slug";

/// Route values produced by a [`SlugRouter`].
pub type RouteValues = Map<String, Value>;

// =============================================================================
// Settings
// =============================================================================

/// What happens to requests for the default language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultLanguageRedirectBehaviour {
    /// `/table` → `/en/table`
    PrependSeoCodeAndRedirect,
    /// Serve both forms.
    DoNotRedirect,
    /// `/en/table` → `/table`
    #[default]
    StripSeoCode,
}

/// The `[localization]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizationSettings {
    pub seo_friendly_urls_for_languages_enabled: bool,
    pub default_language_redirect_behaviour: DefaultLanguageRedirectBehaviour,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        LocalizationSettings {
            seo_friendly_urls_for_languages_enabled: true,
            default_language_redirect_behaviour: DefaultLanguageRedirectBehaviour::StripSeoCode,
        }
    }
}

/// Slug generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoSettings {
    /// Keep non-ASCII letters in generated slugs.
    pub allow_unicode_chars_in_urls: bool,
    /// Slugs that collide with system routes.
    pub reserved_slugs: Vec<String>,
}

impl Default for SeoSettings {
    fn default() -> Self {
        SeoSettings {
            allow_unicode_chars_in_urls: false,
            reserved_slugs: ["admin", "cart", "checkout", "login", "logout", "search", "media"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl SeoSettings {
    pub fn is_reserved(&self, slug: &str) -> bool {
        self.reserved_slugs.iter().any(|r| r.eq_ignore_ascii_case(slug))
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// How a redirect changes the culture segment of the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CultureChange {
    /// Leave the culture segment as requested.
    Keep,
    /// Put this culture code in front of the path.
    Set(String),
    /// Remove the culture segment.
    Strip,
}

/// Result of transforming an inbound path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SlugOutcome {
    /// Not a slug we know: let other routes handle the request.
    NoMatch,
    /// Send the client elsewhere.
    Redirect {
        culture: CultureChange,
        /// New path, prefix included, without the culture segment.
        path: String,
        permanent: bool,
    },
    /// The slug resolved to an entity.
    Matched {
        values: RouteValues,
        url_record: UrlRecord,
    },
}

impl SlugOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, SlugOutcome::Matched { .. })
    }
}

// =============================================================================
// URL Prefixes
// =============================================================================

/// Case-insensitive multimap from URL prefix to entity names.
///
/// Registering `"shop"` for `"Product"` makes product URLs look like
/// `shop/any-product-slug`.
#[derive(Debug, Clone, Default)]
pub struct UrlPrefixRegistry {
    entries: Vec<(String, Vec<String>)>,
}

/// A prefix found at the start of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrefix<'a> {
    /// Prefix as it appeared in the path.
    pub prefix: &'a str,
    /// Path after `prefix/`.
    pub slug: &'a str,
    pub entity_names: &'a [String],
}

impl UrlPrefixRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds entity names to a prefix. Empty prefixes are ignored.
    pub fn register_url_prefix<I, S>(&mut self, prefix: &str, entity_names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            return;
        }

        let names = entity_names.into_iter().map(Into::into);
        match self
            .entries
            .iter_mut()
            .find(|(p, _)| p.eq_ignore_ascii_case(prefix))
        {
            Some((_, existing)) => existing.extend(names),
            None => self.entries.push((prefix.to_string(), names.collect())),
        }
    }

    /// First prefix registered for `entity_name` (case-insensitive).
    pub fn url_prefix_for(&self, entity_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(entity_name)))
            .map(|(prefix, _)| prefix.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splits a registered prefix off `path`.
    ///
    /// Only the first segment is considered, and only when something follows it.
    pub fn try_resolve<'a>(&'a self, path: &'a str) -> Option<ResolvedPrefix<'a>> {
        if self.entries.is_empty() {
            return None;
        }

        let sep = path.find('/').filter(|i| *i > 0)?;
        let prefix = &path[..sep];

        self.entries
            .iter()
            .find(|(p, _)| p.eq_ignore_ascii_case(prefix))
            .map(|(_, names)| ResolvedPrefix {
                prefix,
                slug: &path[sep + 1..],
                entity_names: names.as_slice(),
            })
    }
}

// =============================================================================
// Slug Routers
// =============================================================================

/// Turns a matched [`UrlRecord`] into route values.
pub trait SlugRouter: Send + Sync {
    /// Lower runs first.
    fn order(&self) -> i32 {
        0
    }

    /// `None` when this router does not handle the record's entity type.
    fn get_route_values(&self, url_record: &UrlRecord, values: &RouteValues) -> Option<RouteValues>;
}

/// Routes one entity type to a fixed controller action.
#[derive(Debug, Clone)]
pub struct EntitySlugRouter {
    entity_name: String,
    controller: String,
    action: String,
    id_key: String,
    order: i32,
}

impl EntitySlugRouter {
    pub fn new(entity_name: &str, controller: &str, action: &str, id_key: &str) -> Self {
        EntitySlugRouter {
            entity_name: entity_name.to_string(),
            controller: controller.to_string(),
            action: action.to_string(),
            id_key: id_key.to_string(),
            order: 0,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }
}

impl SlugRouter for EntitySlugRouter {
    fn order(&self) -> i32 {
        self.order
    }

    fn get_route_values(&self, url_record: &UrlRecord, _values: &RouteValues) -> Option<RouteValues> {
        if !url_record.entity_name.eq_ignore_ascii_case(&self.entity_name) {
            return None;
        }

        let mut values = RouteValues::new();
        values.insert("area".into(), Value::String(String::new()));
        values.insert("controller".into(), Value::String(self.controller.clone()));
        values.insert("action".into(), Value::String(self.action.clone()));
        values.insert(self.id_key.clone(), Value::from(url_record.entity_id));
        Some(values)
    }
}

/// Routes the built-in catalog entities.
#[derive(Debug, Clone)]
pub struct DefaultSlugRouter {
    routes: Vec<EntitySlugRouter>,
}

impl Default for DefaultSlugRouter {
    fn default() -> Self {
        DefaultSlugRouter {
            routes: vec![
                EntitySlugRouter::new("Product", "Product", "ProductDetails", "productId"),
                EntitySlugRouter::new("Category", "Catalog", "Category", "categoryId"),
                EntitySlugRouter::new("Manufacturer", "Catalog", "Manufacturer", "manufacturerId"),
                EntitySlugRouter::new("Topic", "Topic", "TopicDetails", "topicId"),
                EntitySlugRouter::new("NewsItem", "News", "NewsItem", "newsItemId"),
            ],
        }
    }
}

impl SlugRouter for DefaultSlugRouter {
    fn get_route_values(&self, url_record: &UrlRecord, values: &RouteValues) -> Option<RouteValues> {
        self.routes
            .iter()
            .find_map(|r| r.get_route_values(url_record, values))
    }
}

/// Ordered set of slug routers.
pub struct RouterRegistry {
    routers: Vec<Box<dyn SlugRouter>>,
}

impl Default for RouterRegistry {
    /// A registry holding only [`DefaultSlugRouter`].
    fn default() -> Self {
        let mut registry = RouterRegistry::empty();
        registry.register_router(DefaultSlugRouter::default());
        registry
    }
}

impl RouterRegistry {
    pub fn empty() -> Self {
        RouterRegistry { routers: Vec::new() }
    }

    /// Adds a router, keeping the list sorted by `order` (stable).
    pub fn register_router(&mut self, router: impl SlugRouter + 'static) {
        let order = router.order();
        let index = self.routers.partition_point(|r| r.order() <= order);
        self.routers.insert(index, Box::new(router));
    }

    pub fn len(&self) -> usize {
        self.routers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routers.is_empty()
    }

    /// First non-empty result of the ordered routers.
    pub fn get_route_values(&self, url_record: &UrlRecord, values: &RouteValues) -> Option<RouteValues> {
        self.routers
            .iter()
            .find_map(|r| r.get_route_values(url_record, values))
    }
}

// =============================================================================
// Path & Slug Helpers
// =============================================================================

/// Joins an optional prefix and a slug with `/`.
pub fn combine_segments(prefix: Option<&str>, slug: &str) -> String {
    match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), slug.trim_start_matches('/')),
        None => slug.to_string(),
    }
}

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "map", "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "woff", "woff2",
    "ttf", "eot", "otf", "mp4", "webm", "pdf", "zip",
];

/// True for paths whose last segment has a static file extension.
pub fn is_static_resource(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => STATIC_EXTENSIONS
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext)),
        _ => false,
    }
}

fn transliterate(c: char) -> Option<&'static str> {
    Some(match c {
        'ä' | 'Ä' => "ae",
        'ö' | 'Ö' => "oe",
        'ü' | 'Ü' => "ue",
        'ß' => "ss",
        'à' | 'á' | 'â' | 'ã' | 'å' | 'À' | 'Á' | 'Â' | 'Ã' | 'Å' => "a",
        'ç' | 'Ç' => "c",
        'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => "i",
        'ñ' | 'Ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ø' => "o",
        'ù' | 'ú' | 'û' | 'Ù' | 'Ú' | 'Û' => "u",
        'ý' | 'ÿ' | 'Ý' => "y",
        '&' => "-and-",
        _ => return None,
    })
}

/// Generates a URL-safe slug from arbitrary text.
///
/// Lower-cases, transliterates common Latin letters, turns every other
/// separator into `-` and collapses repeated dashes.
///
/// ## Example
/// ```rust
/// use mercato_core::seo::slugify;
///
/// assert_eq!(slugify("Größe & Farbe!", false), "groesse-and-farbe");
/// assert_eq!(slugify("  Apple iPhone 15 Pro ", false), "apple-iphone-15-pro");
/// ```
pub fn slugify(text: &str, allow_unicode: bool) -> String {
    fn push(s: &str, out: &mut String) {
        for ch in s.chars() {
            if ch == '-' {
                if !out.is_empty() && !out.ends_with('-') {
                    out.push('-');
                }
            } else {
                out.push(ch);
            }
        }
    }

    let mut out = String::with_capacity(text.len());

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if let Some(t) = transliterate(c) {
            push(t, &mut out);
        } else if allow_unicode && c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else if c.is_whitespace() || matches!(c, '-' | '_' | '.' | '/' | '\\' | ',' | '+' | ':') {
            push("-", &mut out);
        }
    }

    out.trim_end_matches('-').to_string()
}

/// `base`, then `base-2`, `base-3`, …, none longer than `max_len` chars.
///
/// The base is shortened before the suffix is appended. Callers take the
/// first candidate that is free.
pub fn slug_candidates(base: &str, max_len: usize) -> impl Iterator<Item = String> + '_ {
    (1u64..).map(move |n| {
        let suffix = if n == 1 { String::new() } else { format!("-{n}") };
        let stem: String = base.chars().take(max_len.saturating_sub(suffix.len())).collect();
        format!("{}{}", stem.trim_end_matches('-'), suffix)
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
