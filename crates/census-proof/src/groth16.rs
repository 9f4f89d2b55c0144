use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use census_core::{AgeRange, CensusId, Continent, NullifierHash};

use crate::error::ProofError;

/// Longest decimal rendering of a bn128 field element.
const MAX_FIELD_DIGITS: usize = 78;

/// Proof as received from a client, before any validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub protocol: String,
    pub curve: String,
}

/// Public signals as received from a client. Buckets are wide integers so
/// out-of-range values reach validation instead of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPublicSignals {
    pub nullifier_hash: String,
    pub age_range: i64,
    pub continent: i64,
    pub census_id: String,
    pub timestamp: i64,
}

/// Decimal string of a field element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldElement(String);

impl FieldElement {
    pub fn parse(s: &str) -> Result<Self, ProofError> {
        if s.is_empty() || s.len() > MAX_FIELD_DIGITS || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProofError::Malformed(format!(
                "'{}' is not a decimal field element",
                s
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A structurally valid Groth16 proof over bn128.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groth16Proof {
    pub pi_a: [FieldElement; 2],
    pub pi_b: [[FieldElement; 2]; 2],
    pub pi_c: [FieldElement; 2],
}

/// Public signals bound to a proof, validated once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals {
    pub nullifier_hash: NullifierHash,
    pub age_range: AgeRange,
    pub continent: Continent,
    pub census_id: CensusId,
    pub timestamp: DateTime<Utc>,
}

fn point(coords: &[String], name: &str) -> Result<[FieldElement; 2], ProofError> {
    match coords {
        [x, y] => Ok([FieldElement::parse(x)?, FieldElement::parse(y)?]),
        _ => Err(ProofError::Malformed(format!(
            "{} must have 2 coordinates, got {}",
            name,
            coords.len()
        ))),
    }
}

impl RawProof {
    pub fn validate(&self) -> Result<Groth16Proof, ProofError> {
        if self.protocol != "groth16" {
            return Err(ProofError::Malformed(format!(
                "unsupported protocol '{}'",
                self.protocol
            )));
        }
        if self.curve != "bn128" {
            return Err(ProofError::Malformed(format!("unsupported curve '{}'", self.curve)));
        }
        let pi_b = match self.pi_b.as_slice() {
            [b0, b1] => [point(b0, "pi_b[0]")?, point(b1, "pi_b[1]")?],
            other => {
                return Err(ProofError::Malformed(format!(
                    "pi_b must have 2 rows, got {}",
                    other.len()
                )))
            }
        };
        Ok(Groth16Proof {
            pi_a: point(&self.pi_a, "pi_a")?,
            pi_b,
            pi_c: point(&self.pi_c, "pi_c")?,
        })
    }
}

fn bucket(value: i64, name: &str) -> Result<u8, ProofError> {
    u8::try_from(value)
        .ok()
        .filter(|v| (*v as usize) < census_core::BUCKET_COUNT)
        .ok_or_else(|| ProofError::Malformed(format!("{} {} outside [0,6]", name, value)))
}

impl RawPublicSignals {
    /// Validate shape, ranges and freshness against `now`.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        max_clock_skew_secs: i64,
    ) -> Result<PublicSignals, ProofError> {
        let nullifier_hash = NullifierHash::from_hex(&self.nullifier_hash)
            .map_err(|e| ProofError::Malformed(format!("nullifierHash: {}", e)))?;
        let age_range = AgeRange::try_from(bucket(self.age_range, "ageRange")?)
            .map_err(|e| ProofError::Malformed(e.to_string()))?;
        let continent = Continent::try_from(bucket(self.continent, "continent")?)
            .map_err(|e| ProofError::Malformed(e.to_string()))?;
        let census_id = CensusId::new(self.census_id.clone())
            .map_err(|e| ProofError::Malformed(format!("censusId: {}", e)))?;

        let timestamp = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .ok_or_else(|| ProofError::Malformed(format!("timestamp {} out of range", self.timestamp)))?;
        // Whole seconds on both sides; `now` carries a sub-second part.
        let skew = now
            .timestamp()
            .saturating_sub(self.timestamp)
            .saturating_abs();
        if skew > max_clock_skew_secs {
            return Err(ProofError::Malformed(format!(
                "timestamp is {}s away from server time (max {}s)",
                skew, max_clock_skew_secs
            )));
        }

        Ok(PublicSignals {
            nullifier_hash,
            age_range,
            continent,
            census_id,
            timestamp,
        })
    }
}
