//! ---
//! warden_section: "07-resilience-fault-tolerance"
//! warden_subsection: "module"
//! warden_type: "source"
//! warden_scope: "code"
//! warden_description: "Endpoint selection and failover control loop."
//! warden_version: "v0.0.0-prealpha"
//! warden_owner: "tbd"
//! ---
//! Read-only reports for the `check` and `localities` commands.
use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use warden_directory::Endpoint;

use crate::selector::{select_candidates, LocalityFilter};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSummary {
    pub name: String,
    pub load: u8,
    pub entry_address: String,
}

/// Live endpoint compared with the best candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub current: Option<String>,
    pub current_load: u8,
    pub best: Option<CandidateSummary>,
    pub cities: Vec<String>,
}

impl CheckReport {
    pub fn build(endpoints: &[Endpoint], filter: &LocalityFilter, current: Option<&str>) -> Self {
        let selection = select_candidates(endpoints, filter, current);
        Self {
            current: current.map(str::to_owned),
            current_load: selection.current_load,
            best: selection.best().map(|best| CandidateSummary {
                name: best.name.clone(),
                load: best.load,
                entry_address: best.entry_address.clone(),
            }),
            cities: filter.cities().to_vec(),
        }
    }

    pub fn render(&self) -> String {
        let cities = self.cities.join(", ");
        let mut out = String::new();
        let _ = writeln!(out, "--- REPORT ---");
        let _ = writeln!(
            out,
            "Current endpoint: {} (load: {}%)",
            self.current.as_deref().unwrap_or("none"),
            self.current_load
        );
        match &self.best {
            Some(best) => {
                let _ = writeln!(out, "Best endpoint in [{cities}]: {} (load: {}%)", best.name, best.load);
                let _ = writeln!(out, "Entry address: {}", best.entry_address);
            }
            None => {
                let _ = writeln!(out, "No active servers found in [{cities}]");
            }
        }
        let _ = writeln!(out, "--------------");
        out
    }
}

/// Active endpoints aggregated per country and city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalityRow {
    pub country: String,
    pub city: String,
    pub endpoints: usize,
    /// Integer mean, rounded down.
    pub average_load: u8,
}

/// Aggregate active endpoints by `(country, city)`, sorted by country then city.
///
/// `country` filters case-insensitively.
pub fn locality_table(endpoints: &[Endpoint], country: Option<&str>) -> Vec<LocalityRow> {
    let country = country.map(str::trim).filter(|c| !c.is_empty());
    let mut stats: BTreeMap<(String, String), (usize, u32)> = BTreeMap::new();

    for endpoint in endpoints.iter().filter(|e| e.is_active()) {
        if country.is_some_and(|c| !endpoint.country.eq_ignore_ascii_case(c)) {
            continue;
        }
        let city = if endpoint.city.is_empty() {
            "Unknown".to_owned()
        } else {
            endpoint.city.clone()
        };
        let entry = stats.entry((endpoint.country.clone(), city)).or_default();
        entry.0 += 1;
        entry.1 += u32::from(endpoint.load);
    }

    stats
        .into_iter()
        .map(|((country, city), (count, load_sum))| LocalityRow {
            country,
            city,
            endpoints: count,
            average_load: (load_sum / count as u32) as u8,
        })
        .collect()
}

pub fn render_locality_table(rows: &[LocalityRow]) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{:<8} {:<30} {:<10} {:<10}", "COUNTRY", "CITY", "SERVERS", "AVG LOAD");
    let _ = writeln!(out, "{rule}");
    for row in rows {
        let _ = writeln!(
            out,
            "{:<8} {:<30} {:<10} {}%",
            row.country, row.city, row.endpoints, row.average_load
        );
    }
    let _ = writeln!(out, "{rule}");
    out
}
