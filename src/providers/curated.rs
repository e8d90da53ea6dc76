/*
 * src/providers/curated.rs
 *
 * The local POI dataset: a JSON array loaded once at startup, read-only and
 * shared freely afterwards. Facts ship with per-attribute provenance; anything
 * the file does not tag is promoted to Curated on load.
 */

use std::collections::HashMap;

use async_trait::async_trait;

use super::{PoiSearch, ProviderError};
use crate::models::{FactSource, Poi};
use tracing::{info, warn};

pub struct CuratedDataset {
	by_city: HashMap<String, Vec<Poi>>,
}

impl CuratedDataset {
	/// Loads the dataset file. A missing or unparseable file yields an empty
	/// dataset; the retriever then leans on its other sources.
	pub fn load(path: &str) -> Self {
		let raw = match std::fs::read_to_string(path) {
			Ok(raw) => raw,
			Err(e) => {
				warn!(target: "providers", path, error = %e, "POI dataset unreadable, starting empty");
				return Self {
					by_city: HashMap::new(),
				};
			}
		};
		match serde_json::from_str::<Vec<Poi>>(&raw) {
			Ok(pois) => Self::from_pois(pois),
			Err(e) => {
				warn!(target: "providers", path, error = %e, "POI dataset malformed, starting empty");
				Self {
					by_city: HashMap::new(),
				}
			}
		}
	}

	pub fn from_pois(pois: Vec<Poi>) -> Self {
		let mut by_city: HashMap<String, Vec<Poi>> = HashMap::new();
		for mut poi in pois {
			poi.tag_missing_facts(FactSource::Curated);
			by_city
				.entry(poi.city.to_ascii_lowercase())
				.or_default()
				.push(poi);
		}
		info!(
			target: "providers",
			cities = by_city.len(),
			pois = by_city.values().map(Vec::len).sum::<usize>(),
			"curated POI dataset loaded"
		);
		Self { by_city }
	}

	pub fn city_count(&self) -> usize {
		self.by_city.len()
	}

	pub fn knows_city(&self, city: &str) -> bool {
		self.by_city.contains_key(&city.to_ascii_lowercase())
	}

	/// City names known to the dataset, useful as an intake gazetteer.
	pub fn cities(&self) -> impl Iterator<Item = &str> {
		self.by_city
			.values()
			.filter_map(|pois| pois.first())
			.map(|poi| poi.city.as_str())
	}
}

#[async_trait]
impl PoiSearch for CuratedDataset {
	fn name(&self) -> &'static str {
		"curated"
	}

	async fn search_pois(
		&self,
		city: &str,
		themes: &[String],
		limit: usize,
	) -> Result<Vec<Poi>, ProviderError> {
		let Some(pois) = self.by_city.get(&city.to_ascii_lowercase()) else {
			return Ok(Vec::new());
		};

		// Theme-matching entries first, then the rest by popularity.
		let mut matched: Vec<&Poi> = pois
			.iter()
			.filter(|p| themes.is_empty() || themes.iter().any(|t| p.has_theme(t)))
			.collect();
		let mut rest: Vec<&Poi> = pois
			.iter()
			.filter(|p| !themes.is_empty() && !themes.iter().any(|t| p.has_theme(t)))
			.collect();
		matched.sort_by(|a, b| b.popularity.total_cmp(&a.popularity).then(a.name.cmp(&b.name)));
		rest.sort_by(|a, b| b.popularity.total_cmp(&a.popularity).then(a.name.cmp(&b.name)));
		matched.extend(rest);

		Ok(matched.into_iter().take(limit).cloned().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample() -> CuratedDataset {
		let pois = vec![
			Poi {
				id: "bj-1".into(),
				name: "Palace Museum".into(),
				city: "Beijing".into(),
				themes: vec!["history".into()],
				popularity: 0.9,
				..Default::default()
			},
			Poi {
				id: "bj-2".into(),
				name: "Wangfujing Snack Street".into(),
				city: "Beijing".into(),
				themes: vec!["food".into()],
				popularity: 0.6,
				..Default::default()
			},
		];
		CuratedDataset::from_pois(pois)
	}

	#[tokio::test]
	async fn search_prefers_theme_matches() {
		let dataset = sample();
		let hits = dataset
			.search_pois("beijing", &["food".into()], 10)
			.await
			.unwrap();
		assert_eq!(hits[0].id, "bj-2");
		assert_eq!(hits.len(), 2);
	}

	#[tokio::test]
	async fn unknown_city_yields_empty() {
		let dataset = sample();
		let hits = dataset.search_pois("Atlantis", &[], 10).await.unwrap();
		assert!(hits.is_empty());
	}

	#[test]
	fn load_tags_curated_provenance() {
		let dataset = sample();
		let poi = &dataset.by_city["beijing"][0];
		assert_eq!(poi.source_of("name"), FactSource::Curated);
	}
}
