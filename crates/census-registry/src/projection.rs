use chrono::Utc;
use dashmap::DashMap;

use census_core::{
    Census, CensusId, CensusStatistics, RegistrationRecord, RegistrationStatus, BUCKET_COUNT,
};

/// Read-side statistics per census.
///
/// Never a source of truth: entries are refreshed from the census counters
/// and can be rebuilt from verified registration records at any time.
#[derive(Debug, Default)]
pub struct StatsProjection {
    stats: DashMap<CensusId, CensusStatistics>,
}

impl StatsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the view of one census from its authoritative counters.
    pub fn refresh(&self, census: &Census) {
        self.stats.insert(census.id.clone(), census.statistics());
    }

    pub fn get(&self, census_id: &CensusId) -> Option<CensusStatistics> {
        self.stats.get(census_id).map(|s| s.value().clone())
    }

    /// Statistics derived from verified records alone.
    pub fn derive(census: &Census, records: &[RegistrationRecord]) -> CensusStatistics {
        let mut stats = CensusStatistics::empty(census.created_at);
        for record in records
            .iter()
            .filter(|r| r.status == RegistrationStatus::Verified)
        {
            let continent = census.enable_location.then_some(record.continent);
            let at = chrono::DateTime::from_timestamp(record.timestamp, 0).unwrap_or_else(Utc::now);
            stats.record(record.age_range, continent, at);
        }
        stats
    }

    /// Replace the cached view with one rebuilt from records.
    pub fn rebuild(&self, census: &Census, records: &[RegistrationRecord]) -> CensusStatistics {
        let stats = Self::derive(census, records);
        self.stats.insert(census.id.clone(), stats.clone());
        tracing::debug!(
            census_id = %census.id,
            total_members = stats.total_members,
            "statistics rebuilt from records"
        );
        stats
    }

    pub fn age_distribution(&self, census_id: &CensusId) -> Option<[u64; BUCKET_COUNT]> {
        self.get(census_id).map(|s| s.age_distribution)
    }

    pub fn continent_distribution(&self, census_id: &CensusId) -> Option<[u64; BUCKET_COUNT]> {
        self.get(census_id).map(|s| s.continent_distribution)
    }
}
