use crate::collection::Document;
use crate::common::{Value, EARTH_RADIUS_METERS};
use crate::errors::{ErrorKind, LodestoneError, LodestoneResult};
use crate::filter::{expand_arrays_in_branches, Branch, BranchedMatcher, Compiler, MatchResult};

#[derive(Clone, Copy, Debug)]
enum NearTarget {
    /// A plain coordinate pair, measured with euclidean distance.
    Legacy([f64; 2]),
    /// A GeoJSON point (`[lng, lat]`), measured in meters on a sphere.
    GeoJson([f64; 2]),
}

/// Compiled `$near`.
///
/// Among all the branches found at the path, keeps the closest point that
/// lies within the optional maximum distance, reporting that distance and
/// the array position it was found at.
#[derive(Clone, Debug)]
pub(crate) struct NearMatcher {
    target: NearTarget,
    max_distance: Option<f64>,
    for_update: bool,
}

impl NearMatcher {
    pub(crate) fn evaluate(&self, branches: &[Branch<'_>]) -> LodestoneResult<MatchResult> {
        let mut result = MatchResult::no_match();
        for branch in expand_arrays_in_branches(branches, false) {
            if self.for_update {
                // updates only need to know that some branch exists
                result.result = true;
                result.array_indices = non_empty(&branch);
                break;
            }

            let value = match branch.value {
                Some(value) if value.is_indexable() => value,
                _ => continue,
            };
            let distance = match self.distance(value) {
                Some(distance) => distance,
                None => continue,
            };
            if self.max_distance.is_some_and(|max| distance > max) {
                continue;
            }
            if result.distance.is_some_and(|best| best <= distance) {
                continue;
            }

            result.result = true;
            result.distance = Some(distance);
            result.array_indices = non_empty(&branch);
        }
        Ok(result)
    }

    fn distance(&self, value: &Value) -> Option<f64> {
        match self.target {
            NearTarget::Legacy(point) => {
                let other = point_to_array(value)?;
                let x = point[0] - other[0];
                let y = point[1] - other[1];
                if !x.is_finite() || !y.is_finite() {
                    return None;
                }
                Some((x * x + y * y).sqrt())
            }
            NearTarget::GeoJson(point) => {
                let other = match value {
                    Value::Document(doc) if doc.contains_key("type") => geojson_point(doc)?,
                    _ => point_to_array(value)?,
                };
                let distance = point_distance(point, other);
                if distance.is_nan() {
                    None
                } else {
                    Some(distance)
                }
            }
        }
    }
}

fn non_empty(branch: &Branch<'_>) -> Option<crate::filter::ArrayIndices> {
    if branch.array_indices.is_empty() {
        None
    } else {
        Some(branch.array_indices.clone())
    }
}

/// Reads a legacy coordinate pair: `[x, y]` or `{x, y}`.
fn point_to_array(value: &Value) -> Option<[f64; 2]> {
    match value {
        Value::Array(items) => {
            let x = items.first().and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
            let y = items.get(1).and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
            Some([x, y])
        }
        Value::Document(doc) => {
            let x = doc.get("x").and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
            let y = doc.get("y").and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
            Some([x, y])
        }
        _ => None,
    }
}

/// Coordinates of a GeoJSON `Point`. Other geometry types are not points.
fn geojson_point(doc: &Document) -> Option<[f64; 2]> {
    if doc.get("type").and_then(|t| t.as_str()) != Some("Point") {
        return None;
    }
    let coordinates = doc.get("coordinates")?.as_array()?;
    let lng = coordinates.first()?.as_f64()?;
    let lat = coordinates.get(1)?.as_f64()?;
    Some([lng, lat])
}

/// Great circle distance in meters between two `[lng, lat]` points.
fn point_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let d_lat = (b[1] - a[1]).to_radians();
    let d_lon = (b[0] - a[0]).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a[1].to_radians().cos() * b[1].to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

impl Compiler {
    pub(crate) fn compile_near(
        &mut self,
        operand: &Value,
        value_selector: &Document,
        is_root: bool,
    ) -> LodestoneResult<BranchedMatcher> {
        if !is_root {
            log::error!("$near used inside another operator");
            return Err(LodestoneError::new(
                "$near can't be inside another $ operator",
                ErrorKind::SelectorError,
            ));
        }
        self.has_geo_query = true;

        let geometry = operand
            .as_document()
            .and_then(|near| near.get("$geometry").map(|geometry| (near, geometry)));

        let (target, max_distance) = match geometry {
            Some((near, geometry)) => {
                let point = geometry.as_document().and_then(geojson_point).ok_or_else(|| {
                    log::error!("$near $geometry must be a GeoJSON point, found {}", geometry);
                    LodestoneError::new(
                        "$near $geometry must be a GeoJSON Point",
                        ErrorKind::SelectorError,
                    )
                })?;
                (
                    NearTarget::GeoJson(point),
                    near.get("$maxDistance").and_then(|m| m.as_f64()),
                )
            }
            None => {
                if !operand.is_indexable() {
                    log::error!("Invalid $near argument {}", operand);
                    return Err(LodestoneError::new(
                        "$near argument must be coordinate pair or GeoJSON",
                        ErrorKind::SelectorError,
                    ));
                }
                let point = point_to_array(operand).unwrap_or([f64::NAN, f64::NAN]);
                (
                    NearTarget::Legacy(point),
                    value_selector.get("$maxDistance").and_then(|m| m.as_f64()),
                )
            }
        };

        Ok(BranchedMatcher::Near(NearMatcher {
            target,
            max_distance,
            for_update: self.is_update,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ArrayIndex, PathLookup};
    use crate::{doc, val};
    use smallvec::smallvec;

    fn near(selector: Value) -> BranchedMatcher {
        let selector = selector.as_document().cloned().unwrap();
        Compiler::new(false)
            .compile_near(selector.get("$near").unwrap(), &selector, true)
            .unwrap()
    }

    fn evaluate(matcher: &BranchedMatcher, doc: &Document) -> MatchResult {
        matcher.evaluate(&PathLookup::new("loc").lookup(doc)).unwrap()
    }

    #[test]
    fn legacy_pairs_use_euclidean_distance() {
        let matcher = near(val!(doc! { "$near": [0, 0] }));
        let result = evaluate(&matcher, &doc! { loc: [3, 4] });
        assert!(result.result);
        assert_eq!(result.distance, Some(5.0));

        let result = evaluate(&matcher, &doc! { loc: { x: 6, y: 8 } });
        assert_eq!(result.distance, Some(10.0));
    }

    #[test]
    fn max_distance_filters() {
        let matcher = near(val!(doc! { "$near": [0, 0], "$maxDistance": 4 }));
        assert!(!evaluate(&matcher, &doc! { loc: [3, 4] }).result);
        assert!(evaluate(&matcher, &doc! { loc: [1, 1] }).result);
    }

    #[test]
    fn closest_branch_wins() {
        let matcher = near(val!(doc! { "$near": [0, 0] }));
        let result = evaluate(&matcher, &doc! { loc: [[5, 5], [1, 0], [2, 0]] });
        assert!(result.result);
        assert_eq!(result.distance, Some(1.0));
        assert_eq!(result.array_indices, Some(smallvec![ArrayIndex::Position(1)]));
    }

    #[test]
    fn missing_or_scalar_does_not_qualify() {
        let matcher = near(val!(doc! { "$near": [0, 0] }));
        assert!(!evaluate(&matcher, &doc! { other: 1 }).result);
        assert!(!evaluate(&matcher, &doc! { loc: "here" }).result);
    }

    #[test]
    fn geojson_points_use_great_circle_distance() {
        let matcher = near(val!(doc! {
            "$near": { "$geometry": { type: "Point", coordinates: [0, 0] }, "$maxDistance": 200000 }
        }));
        let result = evaluate(&matcher, &doc! { loc: { type: "Point", coordinates: [1, 0] } });
        assert!(result.result);
        let meters = result.distance.unwrap();
        assert!((meters - 111_194.9).abs() < 1.0, "{}", meters);

        assert!(!evaluate(&matcher, &doc! { loc: { type: "Point", coordinates: [3, 0] } }).result);
        assert!(!evaluate(&matcher, &doc! { loc: { type: "LineString", coordinates: [[0, 0], [1, 1]] } }).result);
        // a bare pair is treated as [lng, lat]
        assert!(evaluate(&matcher, &doc! { loc: [0, 1] }).result);
    }

    #[test]
    fn near_must_be_at_root() {
        let selector = doc! { "$near": [0, 0] };
        let err = Compiler::new(false)
            .compile_near(selector.get("$near").unwrap(), &selector, false)
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::SelectorError);
    }

    #[test]
    fn near_needs_pair_or_geometry() {
        let selector = doc! { "$near": 5 };
        assert!(Compiler::new(false)
            .compile_near(selector.get("$near").unwrap(), &selector, true)
            .is_err());
    }

    #[test]
    fn update_mode_matches_any_branch() {
        let selector = doc! { "$near": [0, 0] };
        let matcher = Compiler::new(true)
            .compile_near(selector.get("$near").unwrap(), &selector, true)
            .unwrap();
        let result = evaluate(&matcher, &doc! { other: 1 });
        assert!(result.result);
        assert_eq!(result.distance, None);
    }
}
