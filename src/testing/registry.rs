//! Static test case registry
//!
//! Cases run in the order they appear here. Later cases may depend on ids
//! captured by earlier ones through the [`RunContext`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration as ChronoDuration, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::client::{ApiBase, HttpMethod};

/// Signature of a payload builder
pub type PayloadFn = fn(&RunContext) -> Value;

/// Functional area of the API a case exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Authentication,
    Artists,
    SmartLinks,
    Campaigns,
    ActionPages,
    Releases,
    Analytics,
    Tracking,
    Webhooks,
    Partners,
    Publisher,
    Conversion,
}

impl Category {
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Authentication => "Authentication",
            Category::Artists => "Artists",
            Category::SmartLinks => "Smart Links",
            Category::Campaigns => "Campaigns",
            Category::ActionPages => "Action Pages",
            Category::Releases => "Releases",
            Category::Analytics => "Analytics",
            Category::Tracking => "Tracking",
            Category::Webhooks => "Webhooks",
            Category::Partners => "Partners",
            Category::Publisher => "Publisher",
            Category::Conversion => "Conversion",
        }
    }
}

impl Category {
    /// API product the category belongs to
    pub fn family(&self) -> ApiFamily {
        match self {
            Category::Publisher => ApiFamily::Publisher,
            Category::Conversion => ApiFamily::Conversion,
            _ => ApiFamily::Marketing,
        }
    }
}

/// Feature.fm API products, reported separately in the availability summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    Marketing,
    Publisher,
    Conversion,
}

impl ApiFamily {
    pub const ALL: [ApiFamily; 3] = [ApiFamily::Marketing, ApiFamily::Publisher, ApiFamily::Conversion];

    pub fn display_name(&self) -> &'static str {
        match self {
            ApiFamily::Marketing => "Marketing API",
            ApiFamily::Publisher => "Publisher API",
            ApiFamily::Conversion => "Conversion API",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// Values captured during a run and consumed by later cases
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKey {
    ArtistId,
    SmartlinkId,
    /// Generated at run start for publisher event tracking
    SongPlayId,
}

impl ContextKey {
    pub const ALL: [ContextKey; 3] = [ContextKey::ArtistId, ContextKey::SmartlinkId, ContextKey::SongPlayId];

    pub fn placeholder(&self) -> &'static str {
        match self {
            ContextKey::ArtistId => "{artist_id}",
            ContextKey::SmartlinkId => "{smartlink_id}",
            ContextKey::SongPlayId => "{song_play_id}",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ContextKey::ArtistId => "artist ID",
            ContextKey::SmartlinkId => "smart link ID",
            ContextKey::SongPlayId => "song play ID",
        }
    }
}

/// Where in a response body an id is found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFrom {
    /// `data.id`
    Object,
    /// `data[0].id`
    FirstOfList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub key: ContextKey,
    pub from: CaptureFrom,
}

impl Capture {
    /// Pull the id out of a response body
    pub fn extract(&self, data: &Value) -> Option<String> {
        let item = match self.from {
            CaptureFrom::Object => Some(data),
            CaptureFrom::FirstOfList => data.as_array().and_then(|items| items.first()),
        }?;
        match item.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// How a failed response is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fail,
    /// Any HTTP failure is a warning
    Warn,
    /// Only these status codes are warnings
    WarnOn(&'static [u16]),
}

impl FailurePolicy {
    pub fn is_warning(&self, status_code: u16) -> bool {
        match self {
            FailurePolicy::Fail => false,
            FailurePolicy::Warn => true,
            FailurePolicy::WarnOn(codes) => codes.contains(&status_code),
        }
    }
}

/// Resource created by a write case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedResource {
    pub test: String,
    pub id: String,
}

/// Per-run mutable data shared between cases
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunContext {
    pub values: BTreeMap<ContextKey, String>,
    pub created: Vec<CreatedResource>,
}

impl RunContext {
    /// Fresh context with the generated values every run starts with
    pub fn seeded() -> Self {
        let mut ctx = Self::default();
        ctx.set_if_absent(
            ContextKey::SongPlayId,
            format!("test_play_{}", Utc::now().timestamp()),
        );
        ctx
    }

    pub fn get(&self, key: ContextKey) -> Option<&str> {
        self.values.get(&key).map(String::as_str)
    }

    /// First capture wins, later ones are ignored
    pub fn set_if_absent(&mut self, key: ContextKey, value: String) {
        self.values.entry(key).or_insert(value);
    }

    /// Replace placeholders; `None` when a referenced value is missing
    pub fn fill(&self, template: &str) -> Option<String> {
        let mut out = template.to_string();
        for key in ContextKey::ALL {
            if out.contains(key.placeholder()) {
                out = out.replace(key.placeholder(), self.get(key)?);
            }
        }
        Some(out)
    }
}

/// A single immutable test definition
#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: Category,
    pub endpoint: &'static str,
    pub base: ApiBase,
    pub method: HttpMethod,
    pub payload: Option<PayloadFn>,
    pub query: &'static [(&'static str, &'static str)],
    pub use_jwt: bool,
    pub use_hmac: bool,
    pub requires: Option<ContextKey>,
    pub captures: Option<Capture>,
    pub on_failure: FailurePolicy,
    /// Endpoints tried in order when the primary one fails
    pub alternates: &'static [&'static str],
}

impl TestCase {
    fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        category: Category,
        method: HttpMethod,
        endpoint: &'static str,
    ) -> Self {
        Self {
            id,
            name,
            description,
            category,
            endpoint,
            base: ApiBase::Root,
            method,
            payload: None,
            query: &[],
            use_jwt: false,
            use_hmac: false,
            requires: None,
            captures: None,
            on_failure: FailurePolicy::Fail,
            alternates: &[],
        }
    }

    fn get(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        category: Category,
        endpoint: &'static str,
    ) -> Self {
        Self::new(id, name, description, category, HttpMethod::Get, endpoint)
    }

    fn post(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        category: Category,
        endpoint: &'static str,
    ) -> Self {
        Self::new(id, name, description, category, HttpMethod::Post, endpoint)
    }

    fn payload(mut self, payload: PayloadFn) -> Self {
        self.payload = Some(payload);
        self
    }

    fn query(mut self, query: &'static [(&'static str, &'static str)]) -> Self {
        self.query = query;
        self
    }

    /// Resolve against the management API instead of the bare base URL
    fn manage(mut self) -> Self {
        self.base = ApiBase::Manage;
        self
    }

    fn jwt(mut self) -> Self {
        self.use_jwt = true;
        self
    }

    fn hmac(mut self) -> Self {
        self.use_hmac = true;
        self
    }

    fn requires(mut self, key: ContextKey) -> Self {
        self.requires = Some(key);
        self
    }

    fn captures(mut self, key: ContextKey, from: CaptureFrom) -> Self {
        self.captures = Some(Capture { key, from });
        self
    }

    fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    fn alternates(mut self, alternates: &'static [&'static str]) -> Self {
        self.alternates = alternates;
        self
    }

    pub fn is_write(&self) -> bool {
        self.method.is_write()
    }

    /// Primary endpoint followed by alternates
    pub fn endpoints(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.endpoint).chain(self.alternates.iter().copied())
    }
}

/// Which cases to run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Ids(Vec<String>),
}

impl<'de> Deserialize<'de> for Selection {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Anything that is not a list of strings means "all"
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Array(items) => Selection::Ids(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => Selection::All,
        })
    }
}

// === Payload builders ===

fn stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn days_from_now(days: i64) -> String {
    (Local::now() + ChronoDuration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn dashboard_link(_: &RunContext) -> Value {
    json!({
        "url": "https://open.spotify.com/track/4PTG3Z6ehGkBFwjybzWkR8",
        "title": format!("Test Link {}", Local::now().format("%Y%m%d%H%M%S")),
        "artist": "Test Artist",
        "custom_domain": null,
    })
}

fn artist(_: &RunContext) -> Value {
    json!({
        "artistName": format!("Sandbox Test Artist {}", stamp()),
        "type": "artist",
        "countryCode": "US",
        "shortBio": "Created by automated sandbox test suite",
        "artistImage": "https://via.placeholder.com/500",
        "tags": ["test", "sandbox", "automated"],
    })
}

fn smartlink(ctx: &RunContext) -> Value {
    let ts = Utc::now().timestamp();
    json!({
        "artistId": ctx.get(ContextKey::ArtistId),
        "shortId": format!("test-{}", ts),
        "domain": "https://ffm.to",
        "title": format!("Sandbox Test Link {}", ts),
        "image": "https://via.placeholder.com/500",
        "description": "Test smartlink created by automated sandbox tests",
        "stores": [
            {"storeId": "spotify", "url": "https://open.spotify.com/track/3n3Ppam7vgaVa1iaRUc9Lp"},
            {"storeId": "apple", "url": "https://music.apple.com/us/album/test/123456789"},
        ],
    })
}

fn presave(ctx: &RunContext) -> Value {
    json!({
        "artistId": ctx.get(ContextKey::ArtistId),
        "releaseDate": days_from_now(30),
        "timezone": "America/New_York",
        "shortId": format!("presave-{}", Utc::now().timestamp()),
        "domain": "https://ffm.to",
        "title": format!("Sandbox Pre-Save {}", Local::now().format("%Y%m%d")),
        "image": "https://via.placeholder.com/500",
        "stores": [
            {"storeId": "spotify", "url": "https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"},
        ],
    })
}

fn action_page(ctx: &RunContext) -> Value {
    let mut page = json!({
        "title": "Fan Engagement Hub",
        "artist_name": "Test Artist",
        "description": "Complete actions to earn rewards!",
        "actions": [
            {"type": "spotify_follow", "points": 10, "label": "Follow on Spotify",
             "url": "https://open.spotify.com/artist/test"},
            {"type": "instagram_follow", "points": 10, "label": "Follow on Instagram",
             "url": "https://instagram.com/testartist"},
            {"type": "youtube_subscribe", "points": 15, "label": "Subscribe on YouTube",
             "url": "https://youtube.com/c/testartist"},
            {"type": "email_signup", "points": 20, "label": "Join mailing list"},
        ],
        "rewards": [
            {"points_required": 30, "title": "Exclusive Track Download",
             "description": "Get our unreleased track"},
            {"points_required": 50, "title": "Signed Merchandise",
             "description": "Receive signed poster"},
        ],
        "theme": {"primary_color": "#FF6B6B", "background_color": "#1A1A2E"},
    });
    if let (Some(id), Some(obj)) = (ctx.get(ContextKey::ArtistId), page.as_object_mut()) {
        obj.insert("artist_id".to_string(), json!(id));
    }
    page
}

fn release(ctx: &RunContext) -> Value {
    let ts = Utc::now().timestamp();
    let mut release = json!({
        "title": format!("Test Album {}", Local::now().format("%Y%m%d")),
        "artist_name": "Test Artist",
        "type": "album",
        "release_date": days_from_now(14),
        "label": "Test Records",
        "upc": format!("TEST{}", ts),
        "tracks": [
            {"title": "Track 1", "duration": 180, "isrc": format!("TEST{}01", ts)},
            {"title": "Track 2", "duration": 210, "isrc": format!("TEST{}02", ts)},
        ],
        "platforms": {
            "spotify": "https://open.spotify.com/album/test",
            "appleMusic": "https://music.apple.com/album/test",
            "youtube": "https://music.youtube.com/playlist?list=test",
        },
        "artwork_url": "https://via.placeholder.com/500",
    });
    if let (Some(id), Some(obj)) = (ctx.get(ContextKey::ArtistId), release.as_object_mut()) {
        obj.insert("artist_id".to_string(), json!(id));
    }
    release
}

fn webhook(_: &RunContext) -> Value {
    json!({
        "url": "https://webhook.site/test-feature-fm",
        "events": ["smartlink.created", "smartlink.clicked", "campaign.conversion", "presave.completed"],
        "active": true,
        "description": "Test webhook for Feature.fm events",
    })
}

fn overview_window(_: &RunContext) -> Value {
    json!({
        "from": days_from_now(-30),
        "to": days_from_now(0),
    })
}

fn consumer(_: &RunContext) -> Value {
    json!({
        "consumerId": format!("test_consumer_{}", Utc::now().timestamp()),
        "platform": "test",
        "timestamp": Local::now().to_rfc3339(),
    })
}

fn conversion_session(_: &RunContext) -> Value {
    json!({
        "sessionId": format!("test_session_{}", Utc::now().timestamp()),
        "timestamp": Local::now().to_rfc3339(),
        "platform": "test",
    })
}

fn track_event(_: &RunContext) -> Value {
    json!({
        "timestamp": Local::now().to_rfc3339(),
        "platform": "test",
    })
}

fn transaction(_: &RunContext) -> Value {
    json!({
        "transactionId": format!("test_txn_{}", Utc::now().timestamp()),
        "amount": 9.99,
        "currency": "USD",
        "timestamp": Local::now().to_rfc3339(),
    })
}

fn empty(_: &RunContext) -> Value {
    json!({})
}

/// The ordered list of every known case
pub fn registry() -> Vec<TestCase> {
    use Category::*;
    use ContextKey::*;

    vec![
        // Dashboard suite
        TestCase::get("auth", "Authentication Test", "Verify API authentication with credentials", Authentication, "auth/verify"),
        TestCase::get("links_list", "List Smart Links", "Retrieve all smart links", SmartLinks, "links"),
        TestCase::post("links_create", "Create Smart Link", "Create a new smart link", SmartLinks, "links")
            .payload(dashboard_link),
        TestCase::get("analytics_overview", "Analytics Overview", "Get analytics overview data", Analytics, "analytics/overview")
            .query(&[("period", "7d")]),
        TestCase::get("analytics_clicks", "Click Analytics", "Get detailed click analytics", Analytics, "analytics/clicks")
            .query(&[("period", "30d"), ("group_by", "day")]),
        TestCase::get("artists_list", "List Artists", "Retrieve all artists", Artists, "artists"),
        TestCase::get("releases_list", "List Releases", "Retrieve all releases", Releases, "releases"),
        TestCase::get("campaigns_list", "List Campaigns", "Retrieve all marketing campaigns", Campaigns, "campaigns"),
        TestCase::get("pixels_list", "List Tracking Pixels", "Retrieve all tracking pixels", Tracking, "pixels"),
        TestCase::get("webhooks_list", "List Webhooks", "Retrieve configured webhooks", Webhooks, "webhooks"),
        // Full API suite
        TestCase::get("basic_auth", "Basic Authentication", "Authenticate with API key, issuer and secret", Authentication, "artists")
            .manage(),
        TestCase::get("jwt_auth", "JWT Authentication", "Authenticate with a signed bearer token", Authentication, "artists")
            .manage()
            .jwt()
            .on_failure(FailurePolicy::Warn),
        TestCase::get("hmac_auth", "HMAC Signed Request", "Sign the request with an HMAC of method, path and body", Authentication, "artists")
            .manage()
            .hmac()
            .on_failure(FailurePolicy::Warn),
        TestCase::get("list_artists", "List Artists", "List artists and remember the first id", Artists, "artists")
            .manage()
            .captures(ArtistId, CaptureFrom::FirstOfList),
        TestCase::get("search_artists", "Search Artists", "Search artists by term", Artists, "artists/search")
            .manage()
            .query(&[("term", "test")])
            .on_failure(FailurePolicy::Warn),
        TestCase::post("create_artist", "Create Artist", "Create a test artist", Artists, "artist")
            .manage()
            .payload(artist)
            .captures(ArtistId, CaptureFrom::Object)
            .on_failure(FailurePolicy::WarnOn(&[403])),
        TestCase::get("get_artist_details", "Get Artist Details", "Fetch a single artist", Artists, "artist/{artist_id}")
            .manage()
            .requires(ArtistId),
        TestCase::get("list_actionpages", "List Action Pages", "List action pages", ActionPages, "actionpages")
            .manage()
            .on_failure(FailurePolicy::Warn),
        TestCase::get("search_actionpages", "Search Action Pages", "Search action pages by term", ActionPages, "actionpages/search")
            .manage()
            .query(&[("term", "test")])
            .on_failure(FailurePolicy::Warn),
        TestCase::get("list_smartlinks", "List Smart Links", "List smart links and remember the first id", SmartLinks, "smartlinks")
            .manage()
            .query(&[("limit", "10"), ("offset", "0")])
            .captures(SmartlinkId, CaptureFrom::FirstOfList),
        TestCase::post("create_smartlink", "Create Smart Link", "Create a smart link for the test artist", SmartLinks, "smartlink")
            .manage()
            .payload(smartlink)
            .requires(ArtistId)
            .captures(SmartlinkId, CaptureFrom::Object),
        TestCase::get("get_smartlink", "Get Smart Link Details", "Fetch a single smart link", SmartLinks, "smartlink/{smartlink_id}")
            .manage()
            .requires(SmartlinkId),
        TestCase::get("smartlink_analytics", "Smart Link Analytics", "Retrieve analytics for a smart link", SmartLinks, "smartlink/{smartlink_id}/analytics")
            .manage()
            .requires(SmartlinkId)
            .alternates(&["analytics/smartlink/{smartlink_id}", "smartlink/{smartlink_id}/stats"])
            .on_failure(FailurePolicy::Warn),
        TestCase::post("create_presave", "Create Pre-Save Campaign", "Create a pre-save campaign", Campaigns, "smartlink/pre-save")
            .manage()
            .payload(presave)
            .requires(ArtistId)
            .on_failure(FailurePolicy::WarnOn(&[404])),
        TestCase::get("list_campaigns", "List Campaigns", "List campaigns", Campaigns, "campaigns")
            .manage()
            .on_failure(FailurePolicy::Warn),
        TestCase::post("create_actionpage", "Create Action Page", "Create an action page", ActionPages, "actionpage")
            .manage()
            .payload(action_page)
            .on_failure(FailurePolicy::WarnOn(&[403, 404])),
        TestCase::post("create_release", "Create Release", "Create a release", Releases, "releases")
            .manage()
            .payload(release)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("create_webhook", "Create Webhook", "Register a webhook", Webhooks, "webhooks")
            .manage()
            .payload(webhook)
            .on_failure(FailurePolicy::Warn),
        TestCase::get("overview_analytics", "Overview Analytics", "Analytics for the last 30 days", Analytics, "analytics/overview")
            .manage()
            .payload(overview_window)
            .on_failure(FailurePolicy::Warn),
        TestCase::get("partners_promoted", "Partners API - Promoted Content", "Fetch promoted content", Partners, "v2/promoted")
            .manage()
            .alternates(&["partners/promoted", "promoted/songs"])
            .on_failure(FailurePolicy::Warn),
        TestCase::post("publisher_identify_consumer", "Publisher API - Identify Consumer", "Identify a test consumer", Publisher, "consumer/identify")
            .payload(consumer)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("publisher_featured_song", "Publisher API - Featured Song", "Fetch the featured song", Publisher, "featured/song")
            .payload(empty)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("publisher_track_play", "Publisher API - Track Play", "Track a play event", Publisher, "event/{song_play_id}/play")
            .payload(track_event)
            .requires(SongPlayId)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("publisher_track_like", "Publisher API - Track Like", "Track a like event", Publisher, "event/{song_play_id}/like")
            .payload(track_event)
            .requires(SongPlayId)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("conversion_init_session", "Conversion API - Initialize Session", "Open a conversion session", Conversion, "conversion/session/init")
            .payload(conversion_session)
            .on_failure(FailurePolicy::Warn),
        TestCase::post("conversion_report_transaction", "Conversion API - Report Transaction", "Report a test transaction", Conversion, "conversion/transaction")
            .payload(transaction)
            .on_failure(FailurePolicy::Warn),
    ]
}

/// Resolve a selection against the registry, keeping registry order
pub fn resolve(registry: &[TestCase], selection: &Selection) -> Vec<TestCase> {
    let ids = match selection {
        Selection::All => return registry.to_vec(),
        Selection::Ids(ids) => ids,
    };

    for unknown in ids.iter().filter(|id| find(registry, id).is_none()) {
        tracing::warn!(test = %unknown, "Ignoring unknown test id");
    }

    let selected: Vec<TestCase> = registry
        .iter()
        .filter(|case| ids.iter().any(|id| id == case.id))
        .cloned()
        .collect();

    if selected.is_empty() {
        tracing::warn!("No known test ids selected, running all tests");
        return registry.to_vec();
    }
    selected
}

pub fn find<'a>(registry: &'a [TestCase], id: &str) -> Option<&'a TestCase> {
    registry.iter().find(|case| case.id == id)
}

/// Cases grouped by category, categories in first-seen order
pub fn categories(registry: &[TestCase]) -> Vec<(Category, Vec<&TestCase>)> {
    let mut groups: Vec<(Category, Vec<&TestCase>)> = Vec::new();
    for case in registry {
        match groups.iter_mut().find(|(c, _)| *c == case.category) {
            Some((_, cases)) => cases.push(case),
            None => groups.push((case.category, vec![case])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registry_ids_unique_and_auth_first() {
        let reg = registry();
        assert_eq!(reg[0].id, "auth");
        assert_eq!(reg[0].endpoint, "auth/verify");
        assert_eq!(reg[0].method, HttpMethod::Get);

        let ids: HashSet<_> = reg.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), reg.len());
    }

    #[test]
    fn test_templated_endpoints_declare_requirement() {
        for case in registry() {
            for endpoint in case.endpoints() {
                for key in ContextKey::ALL {
                    if endpoint.contains(key.placeholder()) {
                        assert_eq!(case.requires, Some(key), "{} uses {}", case.id, key.placeholder());
                    }
                }
            }
        }
    }

    #[test]
    fn test_bases_follow_api_family() {
        let reg = registry();
        for id in ["list_artists", "create_smartlink", "get_smartlink", "hmac_auth", "partners_promoted"] {
            assert_eq!(find(&reg, id).unwrap().base, ApiBase::Manage, "{}", id);
        }
        for id in ["auth", "links_list", "publisher_track_play", "conversion_report_transaction"] {
            assert_eq!(find(&reg, id).unwrap().base, ApiBase::Root, "{}", id);
        }
        assert!(find(&reg, "hmac_auth").unwrap().use_hmac);
    }

    #[test]
    fn test_seeded_context_fills_song_play_id() {
        let ctx = RunContext::seeded();
        let endpoint = ctx.fill("event/{song_play_id}/like").unwrap();
        assert!(endpoint.starts_with("event/test_play_"));
        assert!(endpoint.ends_with("/like"));
        assert_eq!(ctx.fill("artist/{artist_id}"), None);
    }

    #[test]
    fn test_category_family() {
        assert_eq!(Category::Artists.family(), ApiFamily::Marketing);
        assert_eq!(Category::Publisher.family(), ApiFamily::Publisher);
        assert_eq!(Category::Conversion.family(), ApiFamily::Conversion);
    }

    #[test]
    fn test_resolve_keeps_registry_order() {
        let reg = registry();
        let selected = resolve(
            &reg,
            &Selection::Ids(vec!["webhooks_list".into(), "auth".into(), "nope".into()]),
        );
        let ids: Vec<_> = selected.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["auth", "webhooks_list"]);
    }

    #[test]
    fn test_resolve_falls_back_to_all() {
        let reg = registry();
        assert_eq!(resolve(&reg, &Selection::All).len(), reg.len());
        assert_eq!(resolve(&reg, &Selection::Ids(vec!["bogus".into()])).len(), reg.len());
        assert_eq!(resolve(&reg, &Selection::Ids(vec![])).len(), reg.len());
    }

    #[test]
    fn test_selection_deserialize() {
        let all: Selection = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(all, Selection::All);
        let other: Selection = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(other, Selection::All);
        let ids: Selection = serde_json::from_value(json!(["auth", 7])).unwrap();
        assert_eq!(ids, Selection::Ids(vec!["auth".into()]));
    }

    #[test]
    fn test_context_fill() {
        let mut ctx = RunContext::default();
        assert_eq!(ctx.fill("artist/{artist_id}"), None);
        ctx.set_if_absent(ContextKey::ArtistId, "a1".into());
        ctx.set_if_absent(ContextKey::ArtistId, "a2".into());
        assert_eq!(ctx.fill("artist/{artist_id}").as_deref(), Some("artist/a1"));
        assert_eq!(ctx.fill("artists").as_deref(), Some("artists"));
    }

    #[test]
    fn test_capture_extract() {
        let first = Capture { key: ContextKey::ArtistId, from: CaptureFrom::FirstOfList };
        assert_eq!(first.extract(&json!([{"id": "x"}, {"id": "y"}])).as_deref(), Some("x"));
        assert_eq!(first.extract(&json!([])), None);

        let object = Capture { key: ContextKey::SmartlinkId, from: CaptureFrom::Object };
        assert_eq!(object.extract(&json!({"id": 17})).as_deref(), Some("17"));
        assert_eq!(object.extract(&json!({"name": "no id"})), None);
    }

    #[test]
    fn test_failure_policy() {
        assert!(!FailurePolicy::Fail.is_warning(403));
        assert!(FailurePolicy::Warn.is_warning(500));
        assert!(FailurePolicy::WarnOn(&[403, 404]).is_warning(404));
        assert!(!FailurePolicy::WarnOn(&[403]).is_warning(500));
    }

    #[test]
    fn test_categories_grouping() {
        let reg = registry();
        let groups = categories(&reg);
        assert_eq!(groups[0].0, Category::Authentication);
        let total: usize = groups.iter().map(|(_, cases)| cases.len()).sum();
        assert_eq!(total, reg.len());
    }
}
