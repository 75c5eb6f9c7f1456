//! Two-stage proximity search.
//!
//! Stage 1 keeps candidates inside a bounding box around the center. Stage 2
//! keeps only those whose haversine distance is within the radius. The box
//! is never narrower than the circle, so stage 1 cannot drop a true hit.

use trafficwatch_common::{newest_first, BoundingBox, GeoPoint, Incident, IncidentStatus};

/// Status restriction for proximity queries.
///
/// No filter (or an empty one) means active incidents only; an explicit list
/// is used as given.
pub fn effective_statuses(filter: Option<&[IncidentStatus]>) -> Vec<IncidentStatus> {
    match filter {
        Some(statuses) if !statuses.is_empty() => statuses.to_vec(),
        _ => vec![IncidentStatus::Active],
    }
}

/// Incidents within `radius_km` of `center` whose status is in `statuses`,
/// newest first, at most `limit`.
pub fn find_within_radius<I>(
    center: GeoPoint,
    radius_km: f64,
    candidates: I,
    statuses: &[IncidentStatus],
    limit: usize,
) -> Vec<Incident>
where
    I: IntoIterator<Item = Incident>,
{
    let bounds = BoundingBox::around(center, radius_km);

    let mut hits: Vec<Incident> = candidates
        .into_iter()
        .filter(|i| statuses.contains(&i.status))
        .filter(|i| bounds.contains(&i.location))
        .filter(|i| center.distance_km(&i.location) <= radius_km)
        .collect();

    hits.sort_by(newest_first);
    hits.truncate(limit);
    hits
}
