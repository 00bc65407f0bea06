//! The tagged runtime value model that flows along graph edges.

use std::fmt::{self, Display};

use number::{BipolarFloat, UnipolarFloat};
use serde::{Deserialize, Serialize};

use crate::entity::FixtureId;

/// The closed set of port types a graph edge may carry.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PortType {
    Scalar,
    Bool,
    Trigger,
    Color,
    Position,
    Bundle,
    Selection,
}

impl PortType {
    /// True if a value of `self` may flow into a port declaring `target`.
    ///
    /// Mirrors the compiler's edge compatibility table: same type is always
    /// compatible, a Trigger may drive a Bool, and Scalar/Color/Position may
    /// all widen into a Bundle.
    pub fn compatible_with(self, target: PortType) -> bool {
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (PortType::Trigger, PortType::Bool)
                | (PortType::Color, PortType::Bundle)
                | (PortType::Position, PortType::Bundle)
                | (PortType::Scalar, PortType::Bundle)
        )
    }
}

impl Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PortType::Scalar => "Scalar",
            PortType::Bool => "Bool",
            PortType::Trigger => "Trigger",
            PortType::Color => "Color",
            PortType::Position => "Position",
            PortType::Bundle => "Bundle",
            PortType::Selection => "Selection",
        };
        write!(f, "{name}")
    }
}

/// An RGB color, each component clamped to 0..1.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Color {
    pub r: UnipolarFloat,
    pub g: UnipolarFloat,
    pub b: UnipolarFloat,
}

impl Color {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: UnipolarFloat::new(r),
            g: UnipolarFloat::new(g),
            b: UnipolarFloat::new(b),
        }
    }
}

/// A pan/tilt position, each component clamped to -1..1.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Position {
    pub pan: BipolarFloat,
    pub tilt: BipolarFloat,
}

impl Position {
    pub fn new(pan: f64, tilt: f64) -> Self {
        Self {
            pan: BipolarFloat::new(pan),
            tilt: BipolarFloat::new(tilt),
        }
    }
}

/// A color bundle field: each channel independently written or absent, so
/// one writer setting only `r` and another setting only `g` both persist
/// through a merge instead of one clobbering the other's unset channels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PartialColor {
    pub r: Option<UnipolarFloat>,
    pub g: Option<UnipolarFloat>,
    pub b: Option<UnipolarFloat>,
}

impl From<Color> for PartialColor {
    fn from(c: Color) -> Self {
        Self {
            r: Some(c.r),
            g: Some(c.g),
            b: Some(c.b),
        }
    }
}

/// A partial attribute record. A field of `None` means "not written" —
/// this is semantically load-bearing throughout the merge stage.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AttributeBundle {
    pub intensity: Option<UnipolarFloat>,
    pub color: PartialColor,
    pub pan: Option<BipolarFloat>,
    pub tilt: Option<BipolarFloat>,
    pub zoom: Option<UnipolarFloat>,
}

impl AttributeBundle {
    /// Merge `other` on top of `self`: present fields in `other` win.
    /// Color merges channel-by-channel, so a writer that only sets `r`
    /// doesn't clear a `g`/`b` already written by an earlier writer.
    pub fn overlay(&mut self, other: &AttributeBundle) {
        if let Some(i) = other.intensity {
            self.intensity = Some(i);
        }
        if let Some(r) = other.color.r {
            self.color.r = Some(r);
        }
        if let Some(g) = other.color.g {
            self.color.g = Some(g);
        }
        if let Some(b) = other.color.b {
            self.color.b = Some(b);
        }
        if let Some(p) = other.pan {
            self.pan = Some(p);
        }
        if let Some(t) = other.tilt {
            self.tilt = Some(t);
        }
        if let Some(z) = other.zoom {
            self.zoom = Some(z);
        }
    }
}

/// An unordered, deduplicated set of fixture ids.
pub type Selection = std::collections::BTreeSet<FixtureId>;

/// A tagged runtime value, one variant per [`PortType`].
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(f64),
    Bool(bool),
    Trigger(bool),
    Color(Color),
    Position(Position),
    Bundle(AttributeBundle),
    Selection(Selection),
}

impl Value {
    pub fn port_type(&self) -> PortType {
        match self {
            Value::Scalar(_) => PortType::Scalar,
            Value::Bool(_) => PortType::Bool,
            Value::Trigger(_) => PortType::Trigger,
            Value::Color(_) => PortType::Color,
            Value::Position(_) => PortType::Position,
            Value::Bundle(_) => PortType::Bundle,
            Value::Selection(_) => PortType::Selection,
        }
    }

    /// Coerce to a scalar, per §4.1: Scalar passes, Bool/Trigger become
    /// {1,0}, everything else falls back to `default`.
    pub fn as_scalar(&self, default: f64) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Bool(b) => bool_to_unit(*b),
            Value::Trigger(fired) => bool_to_unit(*fired),
            _ => default,
        }
    }

    /// Coerce to a bool, per §4.1: Bool passes, Scalar is thresholded at
    /// 0.5, Trigger is true iff it fired this frame.
    pub fn as_bool(&self, default: bool) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Scalar(v) => *v >= 0.5,
            Value::Trigger(fired) => *fired,
            _ => default,
        }
    }

    pub fn as_color(&self, default: Color) -> Color {
        match self {
            Value::Color(c) => *c,
            Value::Bundle(bundle) => Color {
                r: bundle.color.r.unwrap_or(default.r),
                g: bundle.color.g.unwrap_or(default.g),
                b: bundle.color.b.unwrap_or(default.b),
            },
            _ => default,
        }
    }

    pub fn as_position(&self, default: Position) -> Position {
        match self {
            Value::Position(p) => *p,
            Value::Bundle(b) => Position {
                pan: b.pan.unwrap_or(default.pan),
                tilt: b.tilt.unwrap_or(default.tilt),
            },
            _ => default,
        }
    }

    pub fn as_bundle(&self, default: AttributeBundle) -> AttributeBundle {
        match self {
            Value::Bundle(b) => *b,
            Value::Color(c) => AttributeBundle {
                color: PartialColor::from(*c),
                ..default
            },
            Value::Position(p) => AttributeBundle {
                pan: Some(p.pan),
                tilt: Some(p.tilt),
                ..default
            },
            Value::Scalar(v) => AttributeBundle {
                intensity: Some(UnipolarFloat::new(*v)),
                ..default
            },
            _ => default,
        }
    }

    pub fn as_selection(&self, default: &Selection) -> Selection {
        match self {
            Value::Selection(s) => s.clone(),
            _ => default.clone(),
        }
    }
}

fn bool_to_unit(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
