//! Environment geometry: bounds, rectangular obstacles and distance queries
//!
//! The estimator treats the environment as read-only. Obstacles are axis-aligned rectangles that
//! never change after construction, and the only query the estimator needs from them is the
//! Euclidean distance from a point to the closest point of a rectangle (boundary or interior).
//! Coordinates follow screen conventions: the origin is the top-left corner, `x` grows to the
//! right and `y` grows downward.
//!
//! Collision detection lives here as well, although the estimator itself never calls it. It is
//! the gate the drive loop applies to a movement command before handing it to
//! [`crate::particle::move_particles`].

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::{LocalizationError, Result};

/// Axis-aligned bounding rectangle of the environment, `[0, width] x [0, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    /// Create new bounds, rejecting non-positive or non-finite extents.
    pub fn new(width: f64, height: f64) -> Result<Self> {
        let bounds = Bounds { width, height };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0)
            || !(self.height.is_finite() && self.height > 0.0)
        {
            return Err(LocalizationError::InvalidArgument(format!(
                "environment bounds must be positive and finite, got {} x {}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Clip a point into the bounding rectangle.
    pub fn clamp(&self, point: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            point.x.clamp(0.0, self.width),
            point.y.clamp(0.0, self.height),
        )
    }

    pub fn contains(&self, point: &Vector2<f64>) -> bool {
        (0.0..=self.width).contains(&point.x) && (0.0..=self.height).contains(&point.y)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            width: 400.0,
            height: 400.0,
        }
    }
}

/// An immutable axis-aligned rectangular obstacle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl Obstacle {
    /// Create a new obstacle from its minimum and maximum corners.
    ///
    /// # Example
    /// ```rust
    /// use mcl::geometry::Obstacle;
    ///
    /// let obstacle = Obstacle::new(50.0, 50.0, 120.0, 80.0).unwrap();
    /// assert!(obstacle.contains_strictly(&nalgebra::Vector2::new(60.0, 60.0)));
    /// assert!(Obstacle::new(10.0, 0.0, 5.0, 1.0).is_err());
    /// ```
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<Self> {
        let obstacle = Obstacle {
            x_min,
            y_min,
            x_max,
            y_max,
        };
        obstacle.validate()?;
        Ok(obstacle)
    }

    pub fn validate(&self) -> Result<()> {
        let finite = [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_min > self.x_max || self.y_min > self.y_max {
            return Err(LocalizationError::InvalidArgument(format!(
                "obstacle corners must be finite with min <= max, got ({}, {}) to ({}, {})",
                self.x_min, self.y_min, self.x_max, self.y_max
            )));
        }
        Ok(())
    }

    /// Closest point of the rectangle (boundary or interior) to `point`.
    pub fn closest_point(&self, point: &Vector2<f64>) -> Vector2<f64> {
        Vector2::new(
            point.x.clamp(self.x_min, self.x_max),
            point.y.clamp(self.y_min, self.y_max),
        )
    }

    /// Open-interior test; points on the boundary are not inside.
    pub fn contains_strictly(&self, point: &Vector2<f64>) -> bool {
        self.x_min < point.x && point.x < self.x_max && self.y_min < point.y && point.y < self.y_max
    }
}

/// Euclidean distance from `point` to the nearest point of `obstacle`.
///
/// The point is clamped into the rectangle and the norm of the residual is returned, so any
/// point inside the rectangle or on its boundary is at distance zero.
///
/// # Example
/// ```rust
/// use mcl::geometry::{Obstacle, calculate_distance_to_obstacle};
/// use nalgebra::Vector2;
///
/// let obstacle = Obstacle::new(0.0, 0.0, 10.0, 10.0).unwrap();
/// assert_eq!(calculate_distance_to_obstacle(&Vector2::new(5.0, 5.0), &obstacle), 0.0);
/// assert_eq!(calculate_distance_to_obstacle(&Vector2::new(13.0, 14.0), &obstacle), 5.0);
/// ```
pub fn calculate_distance_to_obstacle(point: &Vector2<f64>, obstacle: &Obstacle) -> f64 {
    let closest = obstacle.closest_point(point);
    (point.x - closest.x).hypot(point.y - closest.y)
}

/// Distance from `point` to the nearest obstacle, or `f64::INFINITY` if there are none.
pub fn distance_to_nearest_obstacle(point: &Vector2<f64>, obstacles: &[Obstacle]) -> f64 {
    obstacles
        .iter()
        .map(|obstacle| calculate_distance_to_obstacle(point, obstacle))
        .fold(f64::INFINITY, f64::min)
}

/// The static layout the robot moves in: a bounding rectangle plus its obstacles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub bounds: Bounds,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl Environment {
    pub fn new(bounds: Bounds, obstacles: Vec<Obstacle>) -> Result<Self> {
        let environment = Environment { bounds, obstacles };
        environment.validate()?;
        Ok(environment)
    }

    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        self.obstacles.iter().try_for_each(Obstacle::validate)
    }

    /// The 400 x 400 reference layout with seven obstacles.
    pub fn default_layout() -> Self {
        let corners = [
            (50.0, 50.0, 120.0, 80.0),
            (300.0, 50.0, 350.0, 150.0),
            (150.0, 100.0, 250.0, 130.0),
            (100.0, 200.0, 150.0, 350.0),
            (250.0, 250.0, 320.0, 280.0),
            (50.0, 300.0, 120.0, 350.0),
            (300.0, 320.0, 380.0, 370.0),
        ];
        Environment {
            bounds: Bounds::default(),
            obstacles: corners
                .iter()
                .map(|&(x_min, y_min, x_max, y_max)| Obstacle {
                    x_min,
                    y_min,
                    x_max,
                    y_max,
                })
                .collect(),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::default_layout()
    }
}

/// Check whether moving from `current` by `displacement` would end inside an obstacle.
///
/// The candidate position is clipped to the environment bounds first, matching the motion
/// model. Only the open interior of an obstacle counts as a collision, so sliding along an
/// obstacle edge is allowed.
pub fn detect_collision(
    current: &Vector2<f64>,
    displacement: &Vector2<f64>,
    environment: &Environment,
) -> bool {
    let candidate = environment.bounds.clamp(&(current + displacement));
    environment
        .obstacles
        .iter()
        .any(|obstacle| obstacle.contains_strictly(&candidate))
}
