//! ---
//! warden_section: "07-resilience-fault-tolerance"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Endpoint selection and failover control loop."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
use warden_common::LocalityConfig;
use warden_directory::Endpoint;

/// Load assumed for an endpoint that is not listed.
pub const WORST_LOAD: u8 = 100;

/// Cities and country an endpoint must be located in to be a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalityFilter {
    cities: Vec<String>,
    country: Option<String>,
}

impl LocalityFilter {
    /// City names compare case-insensitively; the country must match exactly.
    pub fn new<I, S>(cities: I, country: Option<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cities: cities
                .into_iter()
                .map(|city| city.as_ref().trim().to_owned())
                .filter(|city| !city.is_empty())
                .collect(),
            country: country
                .map(|country| country.trim().to_owned())
                .filter(|country| !country.is_empty()),
        }
    }

    pub fn from_config(config: &LocalityConfig) -> Self {
        Self::new(&config.cities, config.country.clone())
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    pub fn matches(&self, endpoint: &Endpoint) -> bool {
        if let Some(country) = &self.country {
            if endpoint.country != *country {
                return false;
            }
        }
        let city = endpoint.city.to_lowercase();
        self.cities.iter().any(|target| target.to_lowercase() == city)
    }
}

/// Outcome of reducing one directory listing to a decision input.
#[derive(Debug, Clone)]
pub struct Selection<'a> {
    /// Load of the live endpoint, [`WORST_LOAD`] when it is not listed.
    pub current_load: u8,
    /// Active endpoints passing the filter, least loaded first.
    pub candidates: Vec<&'a Endpoint>,
}

impl<'a> Selection<'a> {
    /// Least loaded candidate.
    pub fn best(&self) -> Option<&'a Endpoint> {
        self.candidates.first().copied()
    }

    /// Load of the best candidate, [`WORST_LOAD`] when there is none.
    pub fn best_load(&self) -> u8 {
        self.best().map_or(WORST_LOAD, |endpoint| endpoint.load)
    }
}

/// Rank the active endpoints passing `filter` by load.
///
/// Equal loads keep their listing order.
pub fn select_candidates<'a>(
    endpoints: &'a [Endpoint],
    filter: &LocalityFilter,
    current: Option<&str>,
) -> Selection<'a> {
    let mut current_load = None;
    let mut candidates = Vec::new();

    for endpoint in endpoints {
        if current_load.is_none() && current == Some(endpoint.name.as_str()) {
            current_load = Some(endpoint.load);
        }
        if filter.matches(endpoint) && endpoint.is_active() {
            candidates.push(endpoint);
        }
    }
    candidates.sort_by_key(|endpoint| endpoint.load);

    Selection {
        current_load: current_load.unwrap_or(WORST_LOAD),
        candidates,
    }
}

#[cfg(test)]
mod tests {
    use warden_directory::EndpointStatus;

    use super::*;

    fn filter() -> LocalityFilter {
        LocalityFilter::new(["San Jose", " los angeles "], None)
    }

    #[test]
    fn best_is_least_loaded_active_candidate() {
        let endpoints = vec![
            Endpoint::new("US-CA#1", "US", "San Jose", 55),
            Endpoint::new("US-CA#2", "US", "SAN JOSE", 12).with_status(EndpointStatus::Maintenance),
            Endpoint::new("US-NY#1", "US", "New York", 3),
            Endpoint::new("US-CA#3", "US", "Los Angeles", 20),
            Endpoint::new("US-CA#4", "US", "san jose", 20),
        ];
        let selection = select_candidates(&endpoints, &filter(), Some("US-CA#1"));

        assert_eq!(selection.current_load, 55);
        let names: Vec<_> = selection.candidates.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["US-CA#3", "US-CA#4", "US-CA#1"]);
        assert_eq!(selection.best().map(|e| e.name.as_str()), Some("US-CA#3"));
        assert_eq!(selection.best_load(), 20);
    }

    #[test]
    fn unlisted_current_counts_as_worst_load() {
        let endpoints = vec![Endpoint::new("US-CA#1", "US", "San Jose", 40)];
        assert_eq!(select_candidates(&endpoints, &filter(), Some("gone")).current_load, 100);
        assert_eq!(select_candidates(&endpoints, &filter(), None).current_load, 100);
    }

    #[test]
    fn current_load_is_recorded_outside_the_filter() {
        let endpoints = vec![Endpoint::new("CH#1", "CH", "Zurich", 64)];
        let selection = select_candidates(&endpoints, &filter(), Some("CH#1"));
        assert_eq!(selection.current_load, 64);
        assert!(selection.best().is_none());
        assert_eq!(selection.best_load(), 100);
    }

    #[test]
    fn country_must_match_exactly() {
        let filter = LocalityFilter::new(["Toronto"], Some("CA".into()));
        let endpoints = vec![
            Endpoint::new("US#9", "US", "Toronto", 1),
            Endpoint::new("CA#1", "CA", "toronto", 30),
            Endpoint::new("ca#2", "ca", "Toronto", 2),
        ];
        let selection = select_candidates(&endpoints, &filter, None);
        let names: Vec<_> = selection.candidates.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["CA#1"]);
    }

    #[test]
    fn blank_country_disables_country_filter() {
        let filter = LocalityFilter::new(["Toronto"], Some("  ".into()));
        assert_eq!(filter.country(), None);
        assert!(filter.matches(&Endpoint::new("CA#1", "CA", "Toronto", 1)));
    }
}
