use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatType {
    Malware,
    SocialEngineering,
    PotentiallyHarmfulApplication,
    UnwantedSoftware,
}

impl ThreatType {
    pub fn code(&self) -> u8 {
        match self {
            ThreatType::Malware => 1,
            ThreatType::SocialEngineering => 2,
            ThreatType::PotentiallyHarmfulApplication => 3,
            ThreatType::UnwantedSoftware => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ThreatType::Malware),
            2 => Some(ThreatType::SocialEngineering),
            3 => Some(ThreatType::PotentiallyHarmfulApplication),
            4 => Some(ThreatType::UnwantedSoftware),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlatformType {
    AnyPlatform,
    Windows,
    Linux,
    Osx,
    AllPlatforms,
    Chrome,
    Android,
    Ios,
}

impl PlatformType {
    pub fn code(&self) -> u8 {
        match self {
            PlatformType::AnyPlatform => 1,
            PlatformType::Windows => 2,
            PlatformType::Linux => 3,
            PlatformType::Osx => 4,
            PlatformType::AllPlatforms => 5,
            PlatformType::Chrome => 6,
            PlatformType::Android => 7,
            PlatformType::Ios => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PlatformType::AnyPlatform),
            2 => Some(PlatformType::Windows),
            3 => Some(PlatformType::Linux),
            4 => Some(PlatformType::Osx),
            5 => Some(PlatformType::AllPlatforms),
            6 => Some(PlatformType::Chrome),
            7 => Some(PlatformType::Android),
            8 => Some(PlatformType::Ios),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatEntryType {
    Url,
    IpRange,
}

impl ThreatEntryType {
    pub fn code(&self) -> u8 {
        match self {
            ThreatEntryType::Url => 1,
            ThreatEntryType::IpRange => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ThreatEntryType::Url),
            2 => Some(ThreatEntryType::IpRange),
            _ => None,
        }
    }
}

/// One tracked threat list: the (threat, platform, entry) triple the remote
/// service keys its update protocol on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListIdentity {
    pub threat_type: ThreatType,
    pub platform_type: PlatformType,
    pub threat_entry_type: ThreatEntryType,
}

impl ListIdentity {
    pub const fn new(
        threat_type: ThreatType,
        platform_type: PlatformType,
        threat_entry_type: ThreatEntryType,
    ) -> Self {
        Self {
            threat_type,
            platform_type,
            threat_entry_type,
        }
    }

    /// Stable numeric code used as the storage key segment for this list.
    pub fn code(&self) -> String {
        format!(
            "{}{}{}",
            self.threat_type.code(),
            self.platform_type.code(),
            self.threat_entry_type.code()
        )
    }

    pub fn from_code(code: &str) -> Option<Self> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 {
            return None;
        }
        let digit = |b: u8| (b as char).to_digit(10).map(|d| d as u8);
        Some(Self {
            threat_type: ThreatType::from_code(digit(bytes[0])?)?,
            platform_type: PlatformType::from_code(digit(bytes[1])?)?,
            threat_entry_type: ThreatEntryType::from_code(digit(bytes[2])?)?,
        })
    }
}

impl fmt::Display for ListIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{:?}/{:?}",
            self.threat_type, self.platform_type, self.threat_entry_type
        )
    }
}

/// A confirmed full-hash match, also the record cached between lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub threat_type: ThreatType,
    pub platform_type: PlatformType,
    pub threat_entry_type: ThreatEntryType,
    /// Base64 of the full 32-byte hash the service confirmed.
    pub threat_hash: String,
    /// The list's version token at the time of the match.
    pub client_state: String,
    pub cache_duration_secs: u64,
}

impl MatchRecord {
    pub fn list_identity(&self) -> ListIdentity {
        ListIdentity::new(self.threat_type, self.platform_type, self.threat_entry_type)
    }
}

// Wire types. Field and enum names follow the remote service's JSON bodies.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub client_id: String,
    pub client_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateRequest {
    pub threat_type: ThreatType,
    pub platform_type: PlatformType,
    pub threat_entry_type: ThreatEntryType,
    /// Empty for a list never synced before; the server answers with a
    /// full update.
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchUpdatesRequest {
    pub client: ClientInfo,
    pub list_update_requests: Vec<ListUpdateRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    FullUpdate,
    PartialUpdate,
    #[serde(other)]
    Unspecified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawHashes {
    /// Width in bytes of each prefix in the concatenated payload.
    pub prefix_size: usize,
    /// Base64 of the concatenated fixed-width prefixes.
    pub raw_hashes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIndices {
    pub indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEntrySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_hashes: Option<RawHashes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_indices: Option<RawIndices>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUpdateResponse {
    pub threat_type: ThreatType,
    pub platform_type: PlatformType,
    pub threat_entry_type: ThreatEntryType,
    pub response_type: ResponseType,
    #[serde(default)]
    pub additions: Vec<ThreatEntrySet>,
    #[serde(default)]
    pub removals: Vec<ThreatEntrySet>,
    pub new_client_state: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchUpdatesResponse {
    #[serde(default)]
    pub list_update_responses: Vec<ListUpdateResponse>,
    /// Protocol duration string such as `"593.44s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_wait_duration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatEntry {
    /// Base64 of a hash prefix (requests) or full hash (responses).
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatInfo {
    pub threat_types: Vec<ThreatType>,
    pub platform_types: Vec<PlatformType>,
    pub threat_entry_types: Vec<ThreatEntryType>,
    pub threat_entries: Vec<ThreatEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindFullHashesRequest {
    pub client: ClientInfo,
    pub client_states: Vec<String>,
    pub threat_info: ThreatInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatMatch {
    pub threat_type: ThreatType,
    pub platform_type: PlatformType,
    pub threat_entry_type: ThreatEntryType,
    pub threat: ThreatEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindFullHashesResponse {
    #[serde(default)]
    pub matches: Vec<ThreatMatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_cache_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_wait_duration: Option<String>,
}

/// Parses the service's `"300s"` / `"593.44s"` duration strings into
/// seconds. Anything non-numeric or negative is `None`.
pub(crate) fn parse_protocol_duration(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('s').unwrap_or(trimmed);
    let secs: f64 = trimmed.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs)
    } else {
        None
    }
}
