use serde::{Deserialize, Serialize};

use crate::models::{Point, ShotEvent};

/// Bias of the group relative to the target centre (+x right, +y high).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DirectionalTrend {
    #[serde(rename = "Centered")]
    Centered,
    #[serde(rename = "High")]
    High,
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Left")]
    Left,
    #[serde(rename = "Right")]
    Right,
    #[serde(rename = "High Left")]
    HighLeft,
    #[serde(rename = "High Right")]
    HighRight,
    #[serde(rename = "Low Left")]
    LowLeft,
    #[serde(rename = "Low Right")]
    LowRight,
}

impl DirectionalTrend {
    pub fn label(&self) -> &'static str {
        match self {
            DirectionalTrend::Centered => "Centered",
            DirectionalTrend::High => "High",
            DirectionalTrend::Low => "Low",
            DirectionalTrend::Left => "Left",
            DirectionalTrend::Right => "Right",
            DirectionalTrend::HighLeft => "High Left",
            DirectionalTrend::HighRight => "High Right",
            DirectionalTrend::LowLeft => "Low Left",
            DirectionalTrend::LowRight => "Low Right",
        }
    }

    pub fn classify(offset: Point, threshold: f64) -> Self {
        use std::cmp::Ordering::*;

        let axis = |value: f64| {
            if value > threshold {
                Greater
            } else if value < -threshold {
                Less
            } else {
                Equal
            }
        };

        match (axis(offset.y), axis(offset.x)) {
            (Equal, Equal) => DirectionalTrend::Centered,
            (Greater, Equal) => DirectionalTrend::High,
            (Less, Equal) => DirectionalTrend::Low,
            (Equal, Less) => DirectionalTrend::Left,
            (Equal, Greater) => DirectionalTrend::Right,
            (Greater, Less) => DirectionalTrend::HighLeft,
            (Greater, Greater) => DirectionalTrend::HighRight,
            (Less, Less) => DirectionalTrend::LowLeft,
            (Less, Greater) => DirectionalTrend::LowRight,
        }
    }
}

/// Largest distance between any two shots (extreme spread).
pub fn group_size(shots: &[ShotEvent]) -> f64 {
    let mut widest: f64 = 0.0;
    for (i, a) in shots.iter().enumerate() {
        for b in &shots[i + 1..] {
            widest = widest.max(a.position().distance_to(&b.position()));
        }
    }
    widest
}

pub fn mean_point_of_impact(shots: &[ShotEvent]) -> Option<Point> {
    if shots.is_empty() {
        return None;
    }
    let n = shots.len() as f64;
    let (sum_x, sum_y) = shots
        .iter()
        .fold((0.0, 0.0), |(sx, sy), shot| (sx + shot.x, sy + shot.y));
    Some(Point::new(sum_x / n, sum_y / n))
}

/// Average distance of each shot from `center`.
pub fn mean_radius(shots: &[ShotEvent], center: Point) -> f64 {
    if shots.is_empty() {
        return 0.0;
    }
    radial_distances(shots, center).iter().sum::<f64>() / shots.len() as f64
}

/// Population standard deviation of x and y.
pub fn std_dev_xy(shots: &[ShotEvent], center: Point) -> (f64, f64) {
    if shots.is_empty() {
        return (0.0, 0.0);
    }
    let n = shots.len() as f64;
    let var_x = shots.iter().map(|s| (s.x - center.x).powi(2)).sum::<f64>() / n;
    let var_y = shots.iter().map(|s| (s.y - center.y).powi(2)).sum::<f64>() / n;
    (var_x.sqrt(), var_y.sqrt())
}

/// Shots whose distance from the group centre exceeds mean + k * std-dev.
/// Fewer than three shots never have flyers.
pub fn flyer_count(shots: &[ShotEvent], center: Point, std_devs: f64) -> usize {
    if shots.len() < 3 {
        return 0;
    }
    let distances = radial_distances(shots, center);
    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let sigma = (distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
    let limit = mean + std_devs * sigma;
    distances.iter().filter(|d| **d > limit).count()
}

fn radial_distances(shots: &[ShotEvent], center: Point) -> Vec<f64> {
    shots
        .iter()
        .map(|shot| shot.position().distance_to(&center))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::summary::tests::shot_at;

    #[test]
    fn group_size_is_max_pairwise_distance() {
        let shots = vec![shot_at(0.0, 0.0), shot_at(3.0, 4.0)];
        assert_eq!(group_size(&shots), 5.0);

        let shots = vec![shot_at(0.0, 0.0), shot_at(1.0, 0.0), shot_at(-2.0, 0.0)];
        assert_eq!(group_size(&shots), 3.0);
    }

    #[test]
    fn group_size_of_fewer_than_two_is_zero() {
        assert_eq!(group_size(&[]), 0.0);
        assert_eq!(group_size(&[shot_at(5.0, 5.0)]), 0.0);
    }

    #[test]
    fn mpi_and_mean_radius() {
        let shots = vec![shot_at(2.0, 0.0), shot_at(-2.0, 0.0), shot_at(0.0, 2.0), shot_at(0.0, -2.0)];
        let mpi = mean_point_of_impact(&shots).unwrap();
        assert_eq!(mpi, Point::new(0.0, 0.0));
        assert_eq!(mean_radius(&shots, mpi), 2.0);
        assert_eq!(std_dev_xy(&shots, mpi), (2.0f64.sqrt(), 2.0f64.sqrt()));
    }

    #[test]
    fn classify_trend_by_axis() {
        let t = 2.0;
        assert_eq!(DirectionalTrend::classify(Point::new(0.5, -1.0), t), DirectionalTrend::Centered);
        assert_eq!(DirectionalTrend::classify(Point::new(0.0, 5.0), t), DirectionalTrend::High);
        assert_eq!(DirectionalTrend::classify(Point::new(0.0, -5.0), t), DirectionalTrend::Low);
        assert_eq!(DirectionalTrend::classify(Point::new(-5.0, 1.0), t), DirectionalTrend::Left);
        assert_eq!(DirectionalTrend::classify(Point::new(5.0, 0.0), t), DirectionalTrend::Right);
        assert_eq!(DirectionalTrend::classify(Point::new(-3.0, 3.0), t), DirectionalTrend::HighLeft);
        assert_eq!(DirectionalTrend::classify(Point::new(3.0, -3.0), t), DirectionalTrend::LowRight);
    }

    #[test]
    fn trend_serializes_as_label() {
        let json = serde_json::to_string(&DirectionalTrend::HighLeft).unwrap();
        assert_eq!(json, "\"High Left\"");
        assert_eq!(DirectionalTrend::LowRight.label(), "Low Right");
    }

    #[test]
    fn single_outlier_is_a_flyer() {
        let mut shots: Vec<_> = (0..9).map(|_| shot_at(0.0, 0.0)).collect();
        shots.push(shot_at(40.0, 40.0));
        let mpi = mean_point_of_impact(&shots).unwrap();
        assert_eq!(flyer_count(&shots, mpi, 2.0), 1);
    }

    #[test]
    fn tight_or_tiny_groups_have_no_flyers() {
        let shots = vec![shot_at(1.0, 0.0), shot_at(-1.0, 0.0), shot_at(0.0, 1.0), shot_at(0.0, -1.0)];
        assert_eq!(flyer_count(&shots, Point::default(), 2.0), 0);
        assert_eq!(flyer_count(&shots[..2], Point::default(), 0.0), 0);
    }
}
