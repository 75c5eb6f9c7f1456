//! Property tests for the distance calculator and bounding-box pre-filter.

use proptest::prelude::*;
use trafficwatch_common::{BoundingBox, GeoPoint};

fn wrap(lng: f64) -> f64 {
    if lng > 180.0 {
        lng - 360.0
    } else if lng < -180.0 {
        lng + 360.0
    } else {
        lng
    }
}

proptest! {
    #[test]
    fn distance_is_symmetric(
        lat1 in -90.0f64..=90.0, lng1 in -180.0f64..=180.0,
        lat2 in -90.0f64..=90.0, lng2 in -180.0f64..=180.0,
    ) {
        let a = GeoPoint::new(lat1, lng1);
        let b = GeoPoint::new(lat2, lng2);
        prop_assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
    }

    #[test]
    fn distance_to_self_is_zero(lat in -90.0f64..=90.0, lng in -180.0f64..=180.0) {
        let p = GeoPoint::new(lat, lng);
        prop_assert_eq!(p.distance_km(&p), 0.0);
    }

    #[test]
    fn bounding_box_never_excludes_a_true_positive(
        center_lat in -89.5f64..=89.5,
        center_lng in -180.0f64..=180.0,
        d_lat in -3.0f64..=3.0,
        d_lng in -6.0f64..=6.0,
        radius_km in 0.0f64..=400.0,
    ) {
        let center = GeoPoint::new(center_lat, center_lng);
        let point = GeoPoint::new(
            (center_lat + d_lat).clamp(-90.0, 90.0),
            wrap(center_lng + d_lng),
        );
        if center.distance_km(&point) <= radius_km {
            let bbox = BoundingBox::around(center, radius_km);
            prop_assert!(
                bbox.contains(&point),
                "{:?} within {} km of {:?} but outside {:?}",
                point, radius_km, center, bbox
            );
        }
    }
}
