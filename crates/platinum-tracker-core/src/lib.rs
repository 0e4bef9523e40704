use std::fmt::{Display, Formatter};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Current transfer token envelope version.
///
/// The original interchange format was a bare base64 bundle with no version
/// marker; the envelope is a deliberate drift so future schema changes can be
/// detected on import. Bare bundles are still accepted on decode.
pub const TOKEN_VERSION: u32 = 1;

pub const PROFILE_NAME_SENTINEL: &str = "LINK ACCOUNT";
pub const PROFILE_LEVEL_OFFLINE: &str = "OFFLINE";

pub const DEFAULT_PRIMARY_COLOR: &str = "#00f3ff";
pub const DEFAULT_SECONDARY_COLOR: &str = "#ff00ff";
pub const DEFAULT_BACKGROUND_COLOR: &str = "#050505";

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TrackerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("enrichment lookup failed: {0}")]
    Transport(String),
    #[error("transfer token error: {0}")]
    CorruptToken(String),
}

/// Record identifier: the creation instant in Unix milliseconds.
///
/// Unique within a record list; monotonic by creation order for any realistic
/// submission rate (one record per CLI invocation).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordId(pub i64);

impl RecordId {
    #[must_use]
    pub fn from_instant(instant: OffsetDateTime) -> Self {
        Self(i64::try_from(instant.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn now() -> Self {
        Self::from_instant(OffsetDateTime::now_utc())
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum Difficulty {
    #[serde(rename = "HARDCORE")]
    Hardcore,
    #[serde(rename = "MODERATE")]
    Moderate,
    #[serde(rename = "CASUAL")]
    Casual,
    #[serde(rename = "UNKNOWN")]
    Unknown,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Difficulty {
    /// Classify from reported playtime hours. Tier bounds are exclusive on the
    /// lower end and inclusive on the upper end: 51 is HARDCORE, 50 MODERATE,
    /// 21 MODERATE, 20 CASUAL, 1 CASUAL, 0 UNKNOWN.
    #[must_use]
    pub fn classify(playtime_hours: u32) -> Self {
        if playtime_hours > 50 {
            Self::Hardcore
        } else if playtime_hours > 20 {
            Self::Moderate
        } else if playtime_hours > 0 {
            Self::Casual
        } else {
            Self::Unknown
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hardcore => "HARDCORE",
            Self::Moderate => "MODERATE",
            Self::Casual => "CASUAL",
            Self::Unknown => "UNKNOWN",
            Self::NotAvailable => "N/A",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HARDCORE" => Some(Self::Hardcore),
            "MODERATE" => Some(Self::Moderate),
            "CASUAL" => Some(Self::Casual),
            "UNKNOWN" => Some(Self::Unknown),
            "N/A" => Some(Self::NotAvailable),
            _ => None,
        }
    }
}

/// Metacritic field as persisted: an integer score when the lookup returned
/// one, otherwise the literal string `"N/A"`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
pub enum Metacritic {
    Score(i64),
    Text(String),
}

impl Default for Metacritic {
    fn default() -> Self {
        Self::Text("N/A".to_string())
    }
}

impl Display for Metacritic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Score(score) => write!(f, "{score}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// One platinum completion entry. Immutable once assembled; removed only by
/// id or by wholesale list replacement on import.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRecord {
    pub id: RecordId,
    pub name: String,
    pub platform: String,
    pub date: String,
    // Tokens exported by earlier versions carry a null image for titles the
    // metadata service has no artwork for.
    #[serde(deserialize_with = "null_to_empty")]
    pub image: String,
    pub genres: String,
    pub playtime: String,
    pub difficulty: Difficulty,
    pub metacritic: Metacritic,
}

fn null_to_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Best-effort metadata for one game title, as returned by an enrichment
/// source. Absent fields keep the assembler defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameMetadata {
    pub image: Option<String>,
    pub genres: Vec<String>,
    pub playtime_hours: u32,
    pub metacritic: Option<i64>,
}

/// Capability-typed enrichment collaborator. A present implementation implies
/// a usable credential; the assembler never inspects credentials itself.
pub trait MetadataSource {
    /// Look up the best match for a game name with a single attempt.
    ///
    /// # Errors
    /// Returns [`TrackerError::Transport`] on network failure, a non-success
    /// response, or an undecodable body. An empty result set is `Ok(None)`.
    fn lookup(&self, name: &str) -> Result<Option<GameMetadata>, TrackerError>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewRecordRequest {
    pub name: String,
    pub platform: String,
}

/// Assembler output: the finalized record plus an optional non-fatal warning
/// when enrichment was attempted and failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledRecord {
    pub record: CompletionRecord,
    pub warning: Option<String>,
}

/// Combine user input and optional enrichment into a finalized record.
///
/// # Errors
/// Returns [`TrackerError::Validation`] when the name or platform is empty or
/// whitespace-only after trimming. Enrichment failures never abort assembly;
/// they degrade to the default metadata with a warning on the result.
pub fn assemble(
    request: &NewRecordRequest,
    source: Option<&dyn MetadataSource>,
) -> Result<AssembledRecord, TrackerError> {
    assemble_at(request, source, OffsetDateTime::now_utc())
}

/// [`assemble`] with an explicit creation instant.
///
/// # Errors
/// Same contract as [`assemble`].
pub fn assemble_at(
    request: &NewRecordRequest,
    source: Option<&dyn MetadataSource>,
    created_at: OffsetDateTime,
) -> Result<AssembledRecord, TrackerError> {
    let name = request.name.trim();
    let platform = request.platform.trim();

    if name.is_empty() {
        return Err(TrackerError::Validation("game name MUST be provided".to_string()));
    }
    if platform.is_empty() {
        return Err(TrackerError::Validation("platform MUST be provided".to_string()));
    }

    let mut record = CompletionRecord {
        id: RecordId::from_instant(created_at),
        name: name.to_string(),
        platform: platform.to_string(),
        date: display_date(created_at),
        image: String::new(),
        genres: "UNKNOWN".to_string(),
        playtime: "??".to_string(),
        difficulty: Difficulty::NotAvailable,
        metacritic: Metacritic::default(),
    };

    let mut warning = None;
    if let Some(source) = source {
        match source.lookup(name) {
            Ok(Some(metadata)) => apply_metadata(&mut record, &metadata),
            // The original behavior: an empty result set keeps the manual
            // defaults without surfacing anything to the caller.
            Ok(None) => {}
            Err(err) => {
                warning = Some(format!("enrichment unavailable, using manual mode: {err}"));
            }
        }
    }

    Ok(AssembledRecord { record, warning })
}

fn apply_metadata(record: &mut CompletionRecord, metadata: &GameMetadata) {
    record.image = metadata.image.clone().unwrap_or_default();
    record.genres = if metadata.genres.is_empty() {
        "GENERIC".to_string()
    } else {
        metadata.genres.join(", ")
    };
    record.playtime = if metadata.playtime_hours > 0 {
        format!("{}H", metadata.playtime_hours)
    } else {
        "VARIES".to_string()
    };
    // A zero score reads as no score, matching how records were always stored.
    record.metacritic = match metadata.metacritic {
        Some(score) if score != 0 => Metacritic::Score(score),
        _ => Metacritic::default(),
    };
    record.difficulty = Difficulty::classify(metadata.playtime_hours);
}

fn display_date(instant: OffsetDateTime) -> String {
    let date = instant.date();
    format!("{}/{}/{}", date.day(), u8::from(date.month()), date.year())
}

/// Theme and credential configuration. Wire keys match the legacy
/// `platinumConfig` storage shape.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SettingsConfig {
    #[serde(rename = "primary")]
    pub primary_color: String,
    #[serde(rename = "secondary")]
    pub secondary_color: String,
    #[serde(rename = "bg")]
    pub background_color: String,
    #[serde(rename = "apiKey", default)]
    pub api_key: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
            api_key: String::new(),
        }
    }
}

/// Transparent color variants derived from the primary color; recomputed on
/// every settings change.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DerivedTheme {
    pub panel_bg: String,
    pub grid_color: String,
}

impl DerivedTheme {
    #[must_use]
    pub fn from_config(config: &SettingsConfig) -> Self {
        let primary = if hex_to_rgba(&config.primary_color, 1.0).is_some() {
            config.primary_color.as_str()
        } else {
            DEFAULT_PRIMARY_COLOR
        };

        Self {
            panel_bg: hex_to_rgba(primary, 0.05).unwrap_or_default(),
            grid_color: hex_to_rgba(primary, 0.1).unwrap_or_default(),
        }
    }
}

/// Expand a `#rrggbb` color into an `rgba(r, g, b, a)` string. Returns `None`
/// for anything that is not a seven-character hex color.
#[must_use]
pub fn hex_to_rgba(hex: &str, alpha: f32) -> Option<String> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }

    let red = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let green = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let blue = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some(format!("rgba({red}, {green}, {blue}, {alpha})"))
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ProfileSlot {
    One,
    Two,
}

impl ProfileSlot {
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::One => "profile1",
            Self::Two => "profile2",
        }
    }

    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }

    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            _ => None,
        }
    }
}

/// One linked-account profile. Two fixed slots exist; each persists and loads
/// independently.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ProfileRecord {
    pub platform: String,
    pub name: String,
    pub level: String,
    pub avatar: String,
    pub url: String,
}

impl Default for ProfileRecord {
    fn default() -> Self {
        Self {
            platform: String::new(),
            name: PROFILE_NAME_SENTINEL.to_string(),
            level: PROFILE_LEVEL_OFFLINE.to_string(),
            avatar: String::new(),
            url: String::new(),
        }
    }
}

impl ProfileRecord {
    /// Editor-save normalization: platforms are stored uppercased and an empty
    /// name falls back to the link-account sentinel.
    #[must_use]
    pub fn normalized_for_save(mut self) -> Self {
        self.platform = self.platform.to_uppercase();
        if self.name.trim().is_empty() {
            self.name = PROFILE_NAME_SENTINEL.to_string();
        }
        self
    }
}

/// Snapshot of the full local state, constructed on demand for export and
/// discarded after import. `games` is always present; the other fields are
/// carried only when a persisted value exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransferBundle {
    #[serde(default)]
    pub games: Vec<CompletionRecord>,
    #[serde(default)]
    pub profile1: Option<ProfileRecord>,
    #[serde(default)]
    pub profile2: Option<ProfileRecord>,
    #[serde(default)]
    pub config: Option<SettingsConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    version: u32,
    payload: TransferBundle,
}

/// Encode a bundle into a single-line portable token: base64 over the UTF-8
/// JSON of a versioned envelope. Round-trips arbitrary Unicode content.
///
/// # Errors
/// Returns [`TrackerError::CorruptToken`] when the bundle cannot be
/// serialized; this does not happen for well-formed bundles.
pub fn encode_token(bundle: &TransferBundle) -> Result<String, TrackerError> {
    let envelope = TokenEnvelope { version: TOKEN_VERSION, payload: bundle.clone() };
    let json = serde_json::to_string(&envelope)
        .map_err(|err| TrackerError::CorruptToken(format!("bundle did not serialize: {err}")))?;
    Ok(BASE64.encode(json.as_bytes()))
}

/// Decode a portable token back into a bundle. Accepts both the versioned
/// envelope and the legacy bare-bundle format.
///
/// # Errors
/// Returns [`TrackerError::CorruptToken`] when the token is not base64, not
/// UTF-8 JSON, carries an unsupported envelope version, or is not
/// bundle-shaped. Nothing is partially decoded: any failure yields no bundle.
pub fn decode_token(token: &str) -> Result<TransferBundle, TrackerError> {
    let bytes = BASE64
        .decode(token.trim().as_bytes())
        .map_err(|err| TrackerError::CorruptToken(format!("not valid base64: {err}")))?;
    let json = String::from_utf8(bytes)
        .map_err(|err| TrackerError::CorruptToken(format!("not valid UTF-8: {err}")))?;
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|err| TrackerError::CorruptToken(format!("not valid JSON: {err}")))?;

    if value.get("version").is_some() {
        let envelope: TokenEnvelope = serde_json::from_value(value).map_err(|err| {
            TrackerError::CorruptToken(format!("malformed token envelope: {err}"))
        })?;
        if envelope.version != TOKEN_VERSION {
            return Err(TrackerError::CorruptToken(format!(
                "unsupported token version {}; expected {TOKEN_VERSION}",
                envelope.version
            )));
        }
        return Ok(envelope.payload);
    }

    serde_json::from_value(value)
        .map_err(|err| TrackerError::CorruptToken(format!("not a transfer bundle: {err}")))
}

/// Player rank derived from the completion count.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PlayerRank {
    pub title: &'static str,
    pub color: &'static str,
}

impl PlayerRank {
    #[must_use]
    pub fn for_count(count: usize) -> Self {
        if count >= 50 {
            Self { title: "OMNI-GOD", color: "#ff0000" }
        } else if count >= 25 {
            Self { title: "TITANIUM LEGEND", color: "#ffd700" }
        } else if count >= 10 {
            Self { title: "PHANTOM ELITE", color: "#c0c0c0" }
        } else if count >= 5 {
            Self { title: "CYBER HUNTER", color: "#00f3ff" }
        } else {
            Self { title: "NEON ROOKIE", color: "#ffffff" }
        }
    }

    /// The ladder color, unless the caller opts into the legacy neutral
    /// override that pins the rank display to the theme's primary color.
    #[must_use]
    pub fn display_color<'a>(&'a self, neutral_override: Option<&'a str>) -> &'a str {
        neutral_override.unwrap_or(self.color)
    }
}
