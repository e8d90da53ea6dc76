/*
 * src/pipeline/routing.rs
 *
 * Geographic helpers for the scheduler: haversine distance, single-link
 * clustering for day partitioning, and intra-day visit ordering
 * (nearest-neighbor construction refined by 2-opt on an open path).
 */

#[derive(Clone, Copy, Debug)]
pub struct GeoPoint {
	pub lat: f64,
	pub lon: f64,
}

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
	let d_lat = (lat2 - lat1).to_radians();
	let d_lon = (lon2 - lon1).to_radians();
	let a = (d_lat / 2.0).sin().powi(2)
		+ lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
	2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

fn dist(a: GeoPoint, b: GeoPoint) -> f64 {
	haversine_km(a.lat, a.lon, b.lat, b.lon)
}

//
// ---------------------------
// Day partitioning
// ---------------------------
//

/// Single-link clustering: points within `radius_km` of any cluster member
/// join that cluster. Returns a cluster index per point. Deterministic for a
/// fixed input order.
pub fn single_link_clusters(points: &[GeoPoint], radius_km: f64) -> Vec<usize> {
	let n = points.len();
	let mut cluster = vec![usize::MAX; n];
	let mut next_cluster = 0;

	for i in 0..n {
		if cluster[i] != usize::MAX {
			continue;
		}
		cluster[i] = next_cluster;
		// Grow the cluster to a fixpoint over the remaining points.
		let mut grew = true;
		while grew {
			grew = false;
			for j in 0..n {
				if cluster[j] != usize::MAX {
					continue;
				}
				let touches = (0..n)
					.any(|k| cluster[k] == next_cluster && dist(points[j], points[k]) <= radius_km);
				if touches {
					cluster[j] = next_cluster;
					grew = true;
				}
			}
		}
		next_cluster += 1;
	}

	cluster
}

//
// ---------------------------
// Route construction
// ---------------------------
//

fn nearest_neighbor_path(points: &[GeoPoint], start: usize) -> Vec<usize> {
	let n = points.len();
	let mut visited = vec![false; n];
	let mut route = Vec::with_capacity(n);

	let mut current = start;
	visited[current] = true;
	route.push(current);

	for _ in 1..n {
		let mut best = None;
		let mut best_dist = f64::INFINITY;
		for i in 0..n {
			if !visited[i] {
				let d = dist(points[current], points[i]);
				if d < best_dist {
					best_dist = d;
					best = Some(i);
				}
			}
		}
		let next = best.expect("unvisited point must exist");
		visited[next] = true;
		route.push(next);
		current = next;
	}

	route
}

//
// ---------------------------
// 2-opt optimization
// ---------------------------
//

fn two_opt_path(points: &[GeoPoint], route: &mut [usize]) {
	let n = route.len();
	if n < 4 {
		return;
	}
	let mut improved = true;

	// route[0] must not move: the day starts at its anchor.
	while improved {
		improved = false;
		for i in 1..n - 2 {
			for j in i + 1..n - 1 {
				let a = route[i - 1];
				let b = route[i];
				let c = route[j];
				let d = route[j + 1];

				let before = dist(points[a], points[b]) + dist(points[c], points[d]);
				let after = dist(points[a], points[c]) + dist(points[b], points[d]);

				if after < before {
					route[i..=j].reverse();
					improved = true;
				}
			}
		}
	}
}

//
// ---------------------------
// Public API
// ---------------------------
//

/// Orders one day's points for visiting. The walk starts at `anchor` when
/// given (the first pinned POI), otherwise at the most northwesterly point,
/// and is refined with 2-opt keeping the start fixed.
pub fn order_day(points: &[GeoPoint], anchor: Option<usize>) -> Vec<usize> {
	if points.is_empty() {
		return Vec::new();
	}
	let start = anchor.unwrap_or_else(|| northwest_most(points));
	let mut route = nearest_neighbor_path(points, start);
	two_opt_path(points, &mut route);
	route
}

/// Index of the point farthest to the northwest (max lat − lon).
fn northwest_most(points: &[GeoPoint]) -> usize {
	let mut best = 0;
	for (i, p) in points.iter().enumerate() {
		if p.lat - p.lon > points[best].lat - points[best].lon {
			best = i;
		}
	}
	best
}

pub fn centroid(points: &[GeoPoint]) -> GeoPoint {
	let n = points.len().max(1) as f64;
	GeoPoint {
		lat: points.iter().map(|p| p.lat).sum::<f64>() / n,
		lon: points.iter().map(|p| p.lon).sum::<f64>() / n,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn p(lat: f64, lon: f64) -> GeoPoint {
		GeoPoint { lat, lon }
	}

	#[test]
	fn haversine_known_distance() {
		// Beijing to Shanghai, roughly 1070 km.
		let km = haversine_km(39.9042, 116.4074, 31.2304, 121.4737);
		assert!((km - 1070.0).abs() < 30.0, "got {km}");
	}

	#[test]
	fn clustering_separates_distant_groups() {
		let points = vec![
			p(39.90, 116.40),
			p(39.91, 116.41), // ~1.4 km from the first
			p(40.20, 116.90), // tens of km away
		];
		let clusters = single_link_clusters(&points, 3.0);
		assert_eq!(clusters[0], clusters[1]);
		assert_ne!(clusters[0], clusters[2]);
	}

	#[test]
	fn clustering_chains_through_neighbors() {
		// a-b and b-c are within radius, a-c is not: single link joins all.
		let points = vec![p(39.900, 116.40), p(39.920, 116.40), p(39.940, 116.40)];
		let clusters = single_link_clusters(&points, 2.5);
		assert_eq!(clusters[0], clusters[1]);
		assert_eq!(clusters[1], clusters[2]);
	}

	#[test]
	fn ordering_visits_every_point_once() {
		let points = vec![
			p(39.90, 116.40),
			p(39.95, 116.30),
			p(39.99, 116.27),
			p(39.92, 116.44),
		];
		let route = order_day(&points, None);
		let mut sorted = route.clone();
		sorted.sort_unstable();
		assert_eq!(sorted, vec![0, 1, 2, 3]);
	}

	#[test]
	fn anchor_is_respected() {
		let points = vec![p(39.90, 116.40), p(39.95, 116.30), p(39.99, 116.27)];
		let route = order_day(&points, Some(1));
		assert_eq!(route[0], 1);
	}

	#[test]
	fn two_opt_untangles_a_crossing() {
		// Square visited in a crossing order gets uncrossed.
		let points = vec![p(0.0, 0.0), p(0.0, 1.0), p(1.0, 0.0), p(1.0, 1.0)];
		let mut route = vec![0, 3, 1, 2];
		two_opt_path(&points, &mut route);
		let total: f64 = route
			.windows(2)
			.map(|w| dist(points[w[0]], points[w[1]]))
			.sum();
		let best: f64 = [vec![0, 1, 3, 2], vec![0, 2, 3, 1]]
			.iter()
			.map(|r| {
				r.windows(2)
					.map(|w| dist(points[w[0]], points[w[1]]))
					.sum::<f64>()
			})
			.fold(f64::INFINITY, f64::min);
		assert!((total - best).abs() < 1e-6);
	}
}
