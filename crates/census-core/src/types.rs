use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::census_state::{CensusEvent, CensusState, CensusStateMachine};
use crate::error::CensusError;

/// Number of buckets in every histogram (age and continent).
pub const BUCKET_COUNT: usize = 7;

/// Published root of a census before anything has been published.
pub const ZERO_ROOT: [u8; 32] = [0u8; 32];

pub const MAX_CENSUS_ID_LEN: usize = 32;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_DESCRIPTION_LEN: usize = 256;
pub const MAX_SNAPSHOT_REF_LEN: usize = 64;

/// Parse 32 bytes from a hex string, with or without a `0x` prefix.
pub fn parse_hex32(s: &str) -> Result<[u8; 32], CensusError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|e| CensusError::Validation(format!("invalid hex '{}': {}", s, e)))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CensusError::Validation(format!("expected 32 bytes, got {}", b.len()))
    })
}

/// Serde adapter encoding `[u8; 32]` as a lowercase hex string.
pub mod hex32 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        super::parse_hex32(&s).map_err(de::Error::custom)
    }
}

/// Stable, immutable census identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CensusId(pub String);

impl CensusId {
    /// Validate an externally supplied identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, CensusError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_CENSUS_ID_LEN {
            return Err(CensusError::Validation(format!(
                "census id must be 1..={} characters, got {}",
                MAX_CENSUS_ID_LEN,
                id.len()
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CensusError::Validation(format!(
                "census id '{}' contains characters outside [A-Za-z0-9_-]",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh, time-ordered identifier (32 hex characters).
    pub fn generate() -> Self {
        Self(Uuid::now_v7().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CensusId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 32-byte nullifier: unique per (identity, census), reveals neither.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NullifierHash(pub [u8; 32]);

impl NullifierHash {
    pub fn from_hex(s: &str) -> Result<Self, CensusError> {
        parse_hex32(s).map(Self)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullifierHash({})", self.to_hex())
    }
}

impl Serialize for NullifierHash {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NullifierHash {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Age bracket attested by a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AgeRange {
    Under18 = 0,
    From18To24 = 1,
    From25To34 = 2,
    From35To44 = 3,
    From45To54 = 4,
    From55To64 = 5,
    Over65 = 6,
}

impl AgeRange {
    pub const ALL: [AgeRange; BUCKET_COUNT] = [
        Self::Under18,
        Self::From18To24,
        Self::From25To34,
        Self::From35To44,
        Self::From45To54,
        Self::From55To64,
        Self::Over65,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<u8> for AgeRange {
    type Error = CensusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| CensusError::Validation(format!("age range {} outside [0,6]", value)))
    }
}

impl From<AgeRange> for u8 {
    fn from(value: AgeRange) -> Self {
        value as u8
    }
}

impl fmt::Display for AgeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Under18 => "0-17",
            Self::From18To24 => "18-24",
            Self::From25To34 => "25-34",
            Self::From35To44 => "35-44",
            Self::From45To54 => "45-54",
            Self::From55To64 => "55-64",
            Self::Over65 => "65+",
        };
        write!(f, "{}", label)
    }
}

/// Continent bucket attested by a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Continent {
    Africa = 0,
    Asia = 1,
    Europe = 2,
    NorthAmerica = 3,
    SouthAmerica = 4,
    Oceania = 5,
    Antarctica = 6,
}

impl Continent {
    pub const ALL: [Continent; BUCKET_COUNT] = [
        Self::Africa,
        Self::Asia,
        Self::Europe,
        Self::NorthAmerica,
        Self::SouthAmerica,
        Self::Oceania,
        Self::Antarctica,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<u8> for Continent {
    type Error = CensusError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| CensusError::Validation(format!("continent {} outside [0,6]", value)))
    }
}

impl From<Continent> for u8 {
    fn from(value: Continent) -> Self {
        value as u8
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Africa => "Africa",
            Self::Asia => "Asia",
            Self::Europe => "Europe",
            Self::NorthAmerica => "North America",
            Self::SouthAmerica => "South America",
            Self::Oceania => "Oceania",
            Self::Antarctica => "Antarctica",
        };
        write!(f, "{}", label)
    }
}

/// Parameters accepted by census creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enable_location: bool,
    /// Minimum age bucket in `[0,6]`; 0 admits everyone.
    #[serde(default)]
    pub min_age: u8,
    /// Base58 Ed25519 public key allowed to close the census and publish roots.
    #[serde(default)]
    pub creator: Option<String>,
}

fn default_true() -> bool {
    true
}

impl CensusConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            enable_location: true,
            min_age: 0,
            creator: None,
        }
    }

    pub fn validate(&self) -> Result<AgeRange, CensusError> {
        if self.name.trim().is_empty() {
            return Err(CensusError::Validation("census name is required".into()));
        }
        if self.name.chars().count() > MAX_NAME_LEN {
            return Err(CensusError::Validation(format!(
                "census name exceeds {} characters",
                MAX_NAME_LEN
            )));
        }
        if self.description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CensusError::Validation(format!(
                "census description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        AgeRange::try_from(self.min_age)
    }
}

/// Authoritative census record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    pub id: CensusId,
    pub name: String,
    pub description: String,
    pub creator: Option<String>,
    pub enable_location: bool,
    pub min_age: AgeRange,
    pub state: CensusState,
    /// Last published root; lags the accumulator until the next publication.
    #[serde(with = "hex32")]
    pub merkle_root: [u8; 32],
    /// Content address of the leaf snapshot backing `merkle_root`.
    pub snapshot_ref: Option<String>,
    /// Number of leaves covered by `merkle_root`.
    pub published_leaf_count: u64,
    pub total_members: u64,
    pub age_histogram: [u64; BUCKET_COUNT],
    pub continent_histogram: [u64; BUCKET_COUNT],
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Census {
    /// Build a new, already active census with all counters at zero.
    pub fn new(id: CensusId, config: CensusConfig, now: DateTime<Utc>) -> Result<Self, CensusError> {
        let min_age = config.validate()?;
        let state = CensusStateMachine::transition(CensusState::Created, CensusEvent::Activate)?;
        Ok(Self {
            id,
            name: config.name,
            description: config.description,
            creator: config.creator,
            enable_location: config.enable_location,
            min_age,
            state,
            merkle_root: ZERO_ROOT,
            snapshot_ref: None,
            published_leaf_count: 0,
            total_members: 0,
            age_histogram: [0; BUCKET_COUNT],
            continent_histogram: [0; BUCKET_COUNT],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_active(&self) -> bool {
        self.state == CensusState::Active
    }

    /// Fail with `CensusClosed` unless the census accepts writes.
    pub fn ensure_active(&self) -> Result<(), CensusError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(CensusError::CensusClosed(self.id.to_string()))
        }
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), CensusError> {
        self.state = CensusStateMachine::transition(self.state, CensusEvent::Close)?;
        self.updated_at = now;
        Ok(())
    }

    /// Count one accepted registration.
    pub fn record_member(
        &mut self,
        age: AgeRange,
        continent: Continent,
        now: DateTime<Utc>,
    ) -> Result<(), CensusError> {
        let overflow = || CensusError::Internal(format!("counter overflow in census {}", self.id));
        let total = self.total_members.checked_add(1).ok_or_else(overflow)?;
        let age_count = self.age_histogram[age.index()]
            .checked_add(1)
            .ok_or_else(overflow)?;
        let continent_count = if self.enable_location {
            Some(
                self.continent_histogram[continent.index()]
                    .checked_add(1)
                    .ok_or_else(overflow)?,
            )
        } else {
            None
        };

        self.total_members = total;
        self.age_histogram[age.index()] = age_count;
        if let Some(count) = continent_count {
            self.continent_histogram[continent.index()] = count;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn statistics(&self) -> CensusStatistics {
        CensusStatistics {
            total_members: self.total_members,
            age_distribution: self.age_histogram,
            continent_distribution: self.continent_histogram,
            last_updated: self.updated_at,
        }
    }

    /// Histogram sums must match the member count.
    pub fn check_invariants(&self) -> Result<(), CensusError> {
        let stats = self.statistics();
        if stats.is_consistent(self.enable_location) {
            Ok(())
        } else {
            Err(CensusError::Internal(format!(
                "census {} histograms do not sum to total_members={}",
                self.id, self.total_members
            )))
        }
    }
}

/// One accepted nullifier: the write-ahead fact every other store derives from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierEntry {
    pub census_id: CensusId,
    pub nullifier_hash: NullifierHash,
    /// 0-based, gap-free leaf position within the census.
    pub index: u64,
    pub age_range: AgeRange,
    pub continent: Continent,
    pub timestamp: DateTime<Utc>,
}

impl NullifierEntry {
    /// Reference to this entry in the authoritative ledger.
    pub fn ledger_ref(&self) -> String {
        format!("ledger:{}:{}", self.census_id, self.index)
    }
}

/// Status of an off-chain registration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Accepted by the ledger, not yet reflected in tree and counters.
    Pending,
    Verified,
    Rejected,
}

impl RegistrationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Verified => write!(f, "verified"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Off-chain projection of a registration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: Uuid,
    pub census_id: CensusId,
    pub nullifier_hash: NullifierHash,
    pub age_range: AgeRange,
    pub continent: Continent,
    /// Unix seconds.
    pub timestamp: i64,
    pub external_tx_ref: String,
    pub status: RegistrationStatus,
}

impl RegistrationRecord {
    /// Record derived from an accepted ledger entry.
    pub fn from_entry(entry: &NullifierEntry, status: RegistrationStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            census_id: entry.census_id.clone(),
            nullifier_hash: entry.nullifier_hash,
            age_range: entry.age_range,
            continent: entry.continent,
            timestamp: entry.timestamp.timestamp(),
            external_tx_ref: entry.ledger_ref(),
            status,
        }
    }
}

/// Bucketed, anonymity-preserving statistics of one census.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusStatistics {
    pub total_members: u64,
    pub age_distribution: [u64; BUCKET_COUNT],
    pub continent_distribution: [u64; BUCKET_COUNT],
    pub last_updated: DateTime<Utc>,
}

impl CensusStatistics {
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            total_members: 0,
            age_distribution: [0; BUCKET_COUNT],
            continent_distribution: [0; BUCKET_COUNT],
            last_updated: at,
        }
    }

    /// Fold one verified registration into the distribution.
    pub fn record(&mut self, age: AgeRange, continent: Option<Continent>, at: DateTime<Utc>) {
        self.total_members += 1;
        self.age_distribution[age.index()] += 1;
        if let Some(c) = continent {
            self.continent_distribution[c.index()] += 1;
        }
        if at > self.last_updated {
            self.last_updated = at;
        }
    }

    pub fn is_consistent(&self, enable_location: bool) -> bool {
        let age_sum: u64 = self.age_distribution.iter().sum();
        let continent_sum: u64 = self.continent_distribution.iter().sum();
        let expected_continents = if enable_location { self.total_members } else { 0 };
        age_sum == self.total_members && continent_sum == expected_continents
    }

    /// Same counts, ignoring `last_updated`.
    pub fn same_counts(&self, other: &CensusStatistics) -> bool {
        self.total_members == other.total_members
            && self.age_distribution == other.age_distribution
            && self.continent_distribution == other.continent_distribution
    }
}

/// Figures across all censuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_censuses: u64,
    pub active_censuses: u64,
    pub total_registrations: u64,
}
