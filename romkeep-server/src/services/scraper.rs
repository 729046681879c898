//! Lookup service client and metadata resolution cascade.
//!
//! Resolution cascades through ordered tiers, stopping at the first
//! validated hit:
//!
//! 1. **Hash-exact** - whole-file digest query, only for files at or
//!    under the size threshold whose extension is not a large container
//!    format.
//! 2. **Filename-exact** - normalized stem query.
//! 3. **Fuzzy text** - free-text search on the cleaned name, scoped to
//!    the system's lookup id when one is configured. Skipped for
//!    arcade-classified systems and for cleaned names shorter than four
//!    characters; free-text search on cryptic arcade set codes produces
//!    unacceptably noisy matches.
//!
//! Transport errors are per-tier misses; the cascade continues. Total
//! exhaustion returns `None` and the caller keeps whatever it had.

use romkeep_common::config::ScraperConfig;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;

const USER_AGENT: &str = concat!("romkeep/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Whole-file hashing is skipped above this size
const HASH_SIZE_LIMIT: u64 = 64 * 1024 * 1024;

/// Container formats where hashing the whole image is wasteful
const LARGE_FORMAT_SKIP: &[&str] = &["iso", "chd", "cso", "pbp", "img", "bin", "cue"];

/// Minimum cleaned-name length for a fuzzy search
const MIN_FUZZY_LEN: usize = 4;

/// Titles carrying this prefix mark placeholder/non-game records
const PLACEHOLDER_TITLE_PREFIX: &str = "zzz(notgame";

/// Region codes scanned in priority order when localizing text and media
pub const REGION_PRIORITY: &[&str] = &["us", "wor", "eu", "jp", "ss"];

const COVER_TAGS: &[&str] = &["box-2D", "box-2d", "flyer"];
const SCREENSHOT_TAGS: &[&str] = &["ss", "sstitle", "screenshot"];
const VIDEO_TAGS: &[&str] = &["video-normalized", "video"];
const MARQUEE_TAGS: &[&str] = &["wheel", "wheel-hd", "marquee", "screenmarquee"];

/// Lookup service client errors
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Lookup service not configured")]
    NotConfigured,
}

// ── Wire types ───────────────────────────────────────────────────────

/// Region-tagged text field
#[derive(Debug, Clone, Deserialize)]
pub struct RegionText {
    pub region: Option<String>,
    pub text: String,
}

/// One media asset reference on a game record
#[derive(Debug, Clone, Deserialize)]
pub struct MediaRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub region: Option<String>,
    pub url: String,
}

/// Game record returned by the lookup service
#[derive(Debug, Clone, Deserialize)]
pub struct GameHit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub names: Vec<RegionText>,
    #[serde(default)]
    pub synopsis: Vec<RegionText>,
    #[serde(default)]
    pub dates: Vec<RegionText>,
    #[serde(default)]
    pub medias: Vec<MediaRef>,
    pub rating: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub players: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    game: Option<GameHit>,
}

// ── Resolved types ───────────────────────────────────────────────────

/// Media URLs selected per category from a validated hit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaUrls {
    pub cover: Option<String>,
    pub screenshot: Option<String>,
    pub video: Option<String>,
    pub marquee: Option<String>,
}

/// Localized, validated match result
#[derive(Debug, Clone)]
pub struct GameMatch {
    pub id: String,
    pub title: String,
    pub synopsis: Option<String>,
    pub rating: Option<String>,
    pub released: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub players: Option<String>,
    pub media: MediaUrls,
}

// ── Client ───────────────────────────────────────────────────────────

/// HTTP client for the external lookup service
pub struct LookupClient {
    http: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl LookupClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, ScrapeError> {
        let base_url = config
            .base_url
            .clone()
            .ok_or(ScrapeError::NotConfigured)?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Single game lookup. A 404 is a clean miss, not an error.
    async fn query(&self, params: &[(&str, String)]) -> Result<Option<GameHit>, ScrapeError> {
        let mut request = self
            .http
            .get(format!("{}/api/game", self.base_url))
            .query(params);

        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            request = request.query(&[("ssid", user.as_str()), ("sspassword", pass.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Api(status.as_u16(), body));
        }

        let parsed: LookupResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Parse(e.to_string()))?;

        Ok(parsed.game)
    }

    pub async fn lookup_by_digest(
        &self,
        lookup_id: u32,
        filename: &str,
        size: u64,
        digest: &str,
    ) -> Result<Option<GameHit>, ScrapeError> {
        self.query(&[
            ("systemeid", lookup_id.to_string()),
            ("romnom", filename.to_string()),
            ("romtaille", size.to_string()),
            ("romsha256", digest.to_string()),
        ])
        .await
    }

    pub async fn lookup_by_name(
        &self,
        lookup_id: u32,
        stem: &str,
    ) -> Result<Option<GameHit>, ScrapeError> {
        self.query(&[
            ("systemeid", lookup_id.to_string()),
            ("romnom", stem.to_string()),
        ])
        .await
    }

    pub async fn search(
        &self,
        lookup_id: Option<u32>,
        text: &str,
    ) -> Result<Option<GameHit>, ScrapeError> {
        let mut params = vec![("recherche", text.to_string())];
        if let Some(id) = lookup_id {
            params.push(("systemeid", id.to_string()));
        }
        self.query(&params).await
    }
}

// ── Resolver ─────────────────────────────────────────────────────────

/// Multi-tier metadata resolver over a [`LookupClient`]
pub struct MetadataResolver {
    client: Option<LookupClient>,
}

impl MetadataResolver {
    pub fn new(client: LookupClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// Resolver with no lookup service; every resolution misses
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// Resolve metadata for one file. Returns `None` on exhaustion.
    pub async fn resolve(
        &self,
        lookup_id: Option<u32>,
        arcade: bool,
        filename: &str,
        full_path: &Path,
    ) -> Option<GameMatch> {
        let client = self.client.as_ref()?;
        if let Some(id) = lookup_id {
            // Tier 1: hash-exact
            if let Some(size) = hashable_size(full_path, filename) {
                match hash_file(full_path).await {
                    Ok(digest) => {
                        match client.lookup_by_digest(id, filename, size, &digest).await {
                            Ok(Some(hit)) => {
                                if let Some(matched) = validate_hit(hit) {
                                    tracing::debug!(filename, tier = 1, "Resolved by digest");
                                    return Some(matched);
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(filename, error = %e, "Digest lookup failed, continuing cascade");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(filename, error = %e, "Could not hash file, skipping tier 1");
                    }
                }
            }

            // Tier 2: filename-exact on the normalized stem
            let stem = file_stem(filename);
            match client.lookup_by_name(id, stem).await {
                Ok(Some(hit)) => {
                    if let Some(matched) = validate_hit(hit) {
                        tracing::debug!(filename, tier = 2, "Resolved by filename");
                        return Some(matched);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(filename, error = %e, "Filename lookup failed, continuing cascade");
                }
            }
        }

        // Tier 3: fuzzy text search
        let cleaned = clean_name(filename);
        if arcade || cleaned.len() < MIN_FUZZY_LEN {
            tracing::debug!(filename, "Fuzzy search skipped");
            return None;
        }

        match client.search(lookup_id, &cleaned).await {
            Ok(Some(hit)) => {
                if let Some(matched) = validate_hit(hit) {
                    tracing::debug!(filename, tier = 3, "Resolved by fuzzy search");
                    return Some(matched);
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(filename, error = %e, "Fuzzy search failed");
                None
            }
        }
    }
}

// ── Validation and localization ──────────────────────────────────────

/// Accept a hit only when it carries a non-empty id and its localized
/// title is not a placeholder/non-game sentinel.
fn validate_hit(hit: GameHit) -> Option<GameMatch> {
    if hit.id.is_empty() {
        return None;
    }

    let title = localize(&hit.names)?;
    if title
        .to_ascii_lowercase()
        .starts_with(PLACEHOLDER_TITLE_PREFIX)
    {
        return None;
    }

    let media = MediaUrls {
        cover: select_media(&hit.medias, COVER_TAGS),
        screenshot: select_media(&hit.medias, SCREENSHOT_TAGS),
        video: select_media(&hit.medias, VIDEO_TAGS),
        marquee: select_media(&hit.medias, MARQUEE_TAGS),
    };

    Some(GameMatch {
        id: hit.id,
        title: decode_entities(&title),
        synopsis: localize(&hit.synopsis).map(|s| decode_entities(&s)),
        rating: hit.rating,
        released: localize(&hit.dates),
        developer: hit.developer.map(|s| decode_entities(&s)),
        publisher: hit.publisher.map(|s| decode_entities(&s)),
        genre: hit.genre.map(|s| decode_entities(&s)),
        players: hit.players,
        media,
    })
}

/// Region-priority scan with first-available fallback
fn localize(texts: &[RegionText]) -> Option<String> {
    for region in REGION_PRIORITY {
        if let Some(entry) = texts
            .iter()
            .find(|t| t.region.as_deref() == Some(*region))
        {
            return Some(entry.text.clone());
        }
    }
    texts.first().map(|t| t.text.clone())
}

/// Select a media URL by tag allow-list, tags in precedence order,
/// regions within each tag by the usual priority-then-first fallback.
fn select_media(medias: &[MediaRef], tags: &[&str]) -> Option<String> {
    for tag in tags {
        let tagged: Vec<&MediaRef> = medias.iter().filter(|m| m.kind == *tag).collect();
        if tagged.is_empty() {
            continue;
        }
        for region in REGION_PRIORITY {
            if let Some(media) = tagged
                .iter()
                .find(|m| m.region.as_deref() == Some(*region))
            {
                return Some(media.url.clone());
            }
        }
        return tagged.first().map(|m| m.url.clone());
    }
    None
}

// ── Name handling ────────────────────────────────────────────────────

/// Filename without its extension
pub fn file_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(filename)
}

/// Clean a filename for fuzzy search: strip bracketed/parenthesized
/// annotations and version tokens, collapse punctuation to spaces.
pub fn clean_name(filename: &str) -> String {
    let stem = file_stem(filename);

    let mut stripped = String::with_capacity(stem.len());
    let mut paren_depth = 0u32;
    let mut bracket_depth = 0u32;
    for c in stem.chars() {
        match c {
            '(' => paren_depth += 1,
            ')' => paren_depth = paren_depth.saturating_sub(1),
            '[' => bracket_depth += 1,
            ']' => bracket_depth = bracket_depth.saturating_sub(1),
            _ if paren_depth == 0 && bracket_depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let spaced: String = stripped
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    spaced
        .split_whitespace()
        .filter(|token| !is_version_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_version_token(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    if lower == "rev" || lower == "version" {
        return true;
    }
    let mut chars = lower.chars();
    matches!(chars.next(), Some('v')) && chars.all(|c| c.is_ascii_digit())
}

// ── Hashing ──────────────────────────────────────────────────────────

/// File size when the file qualifies for tier-1 hashing
fn hashable_size(path: &Path, filename: &str) -> Option<u64> {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        if LARGE_FORMAT_SKIP.contains(&ext.to_ascii_lowercase().as_str()) {
            return None;
        }
    }

    let size = std::fs::metadata(path).ok()?.len();
    if size > HASH_SIZE_LIMIT {
        return None;
    }
    Some(size)
}

/// Streamed SHA-256 of a whole file
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// ── Text decoding ────────────────────────────────────────────────────

/// Decode the HTML entities the lookup service emits in text fields
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, title: &str) -> GameHit {
        GameHit {
            id: id.to_string(),
            names: vec![RegionText {
                region: Some("us".to_string()),
                text: title.to_string(),
            }],
            synopsis: vec![],
            dates: vec![],
            medias: vec![],
            rating: None,
            developer: None,
            publisher: None,
            genre: None,
            players: None,
        }
    }

    #[test]
    fn test_clean_name_strips_annotations() {
        assert_eq!(
            clean_name("Super Mario Bros. (USA) [!].nes"),
            "Super Mario Bros"
        );
        assert_eq!(clean_name("Sonic_The_Hedgehog (Rev 1).md"), "Sonic The Hedgehog");
        assert_eq!(clean_name("Doom v1.9.zip"), "Doom 9");
    }

    #[test]
    fn test_clean_name_drops_version_tokens() {
        assert_eq!(clean_name("Tetris rev 2.gb"), "Tetris 2");
        assert_eq!(clean_name("Quake v2.zip"), "Quake");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("mslug.zip"), "mslug");
        assert_eq!(file_stem("no_extension"), "no_extension");
        assert_eq!(file_stem("a.b.zip"), "a.b");
    }

    #[test]
    fn test_localize_region_priority() {
        let texts = vec![
            RegionText {
                region: Some("jp".to_string()),
                text: "Japanese".to_string(),
            },
            RegionText {
                region: Some("us".to_string()),
                text: "American".to_string(),
            },
        ];
        assert_eq!(localize(&texts).as_deref(), Some("American"));
    }

    #[test]
    fn test_localize_first_available_fallback() {
        let texts = vec![RegionText {
            region: Some("br".to_string()),
            text: "Fallback".to_string(),
        }];
        assert_eq!(localize(&texts).as_deref(), Some("Fallback"));
        assert!(localize(&[]).is_none());
    }

    #[test]
    fn test_select_media_tag_then_region() {
        let medias = vec![
            MediaRef {
                kind: "flyer".to_string(),
                region: Some("us".to_string()),
                url: "flyer-us".to_string(),
            },
            MediaRef {
                kind: "box-2D".to_string(),
                region: Some("jp".to_string()),
                url: "box-jp".to_string(),
            },
        ];
        // box-2D is a higher-precedence tag than flyer, even off-region
        assert_eq!(select_media(&medias, COVER_TAGS).as_deref(), Some("box-jp"));
    }

    #[test]
    fn test_validate_rejects_empty_id_and_placeholder() {
        assert!(validate_hit(hit("", "Real Game")).is_none());
        assert!(validate_hit(hit("42", "ZZZ(notgame):BIOS")).is_none());
        assert!(validate_hit(hit("42", "Real Game")).is_some());
    }

    #[test]
    fn test_validate_decodes_entities() {
        let matched = validate_hit(hit("42", "Tom &amp; Jerry")).unwrap();
        assert_eq!(matched.title, "Tom & Jerry");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &lt;b&gt; &amp; c&#39;s"), "a <b> & c's");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[tokio::test]
    async fn test_hash_file_streams_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rom.bin");
        std::fs::write(&path, b"abc").unwrap();

        let digest = hash_file(&path).await.unwrap();
        // SHA-256 of "abc"
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hashable_size_skips_large_formats() {
        let dir = tempfile::tempdir().unwrap();
        let iso = dir.path().join("game.iso");
        let zip = dir.path().join("game.zip");
        std::fs::write(&iso, b"data").unwrap();
        std::fs::write(&zip, b"data").unwrap();

        assert!(hashable_size(&iso, "game.iso").is_none());
        assert_eq!(hashable_size(&zip, "game.zip"), Some(4));
    }

    #[test]
    fn test_client_requires_base_url() {
        let config = ScraperConfig::default();
        assert!(matches!(
            LookupClient::new(&config),
            Err(ScrapeError::NotConfigured)
        ));
    }
}
