use serde::{Deserialize, Serialize};

/// Geographic position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
    /// Meters above the ellipsoid.
    pub elevation: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, elevation: f64) -> Self {
        Self { latitude, longitude, elevation }
    }
}

/// Point in node coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Rectangle in node coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Something the engine found under the pick point.
#[derive(Clone, Debug, PartialEq)]
pub struct PickedObject {
    pub id: u64,
    pub label: String,
    pub position: Option<Position>,
    /// The globe surface itself rather than an object on it.
    pub terrain: bool,
    /// Drawn on top of everything else at the pick point.
    pub on_top: bool,
}

impl PickedObject {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            position: None,
            terrain: false,
            on_top: false,
        }
    }

    pub fn terrain(id: u64, position: Position) -> Self {
        Self {
            id,
            label: "terrain".into(),
            position: Some(position),
            terrain: true,
            on_top: false,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn on_top(mut self) -> Self {
        self.on_top = true;
        self
    }
}

/// Ordered result of a pick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PickedObjectList(Vec<PickedObject>);

impl PickedObjectList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, object: PickedObject) {
        self.0.push(object);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PickedObject> {
        self.0.iter()
    }

    /// The object marked on-top when there is more than one, otherwise the first one.
    pub fn top_picked_object(&self) -> Option<&PickedObject> {
        if self.0.len() > 1 {
            if let Some(top) = self.0.iter().find(|o| o.on_top) {
                return Some(top);
            }
        }
        self.0.first()
    }

    pub fn terrain_object(&self) -> Option<&PickedObject> {
        self.0.iter().find(|o| o.terrain)
    }

    pub fn has_non_terrain_objects(&self) -> bool {
        self.0.len() > 1 || (self.0.len() == 1 && self.terrain_object().is_none())
    }

    /// Position under the pick point. The top object's own position wins; an object without
    /// one falls back to the terrain position behind it.
    pub fn current_position(&self) -> Option<Position> {
        let top = self.top_picked_object()?;
        if let Some(p) = top.position {
            return Some(p);
        }
        if self.has_non_terrain_objects() {
            return self.terrain_object().and_then(|t| t.position);
        }
        None
    }

    /// The top object unless it is the terrain.
    pub fn current_selection(&self) -> Option<&PickedObject> {
        self.top_picked_object().filter(|o| !o.terrain)
    }
}

impl From<Vec<PickedObject>> for PickedObjectList {
    fn from(objects: Vec<PickedObject>) -> Self {
        Self(objects)
    }
}

impl<'a> IntoIterator for &'a PickedObjectList {
    type Item = &'a PickedObject;
    type IntoIter = std::slice::Iter<'a, PickedObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
