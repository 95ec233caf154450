//! Events emitted by a globe node and messages delivered to its model.
//!
//! # Main Types
//!
//! - [`RenderingEvent`]: Emitted before and after every rendered frame.
//! - [`PositionEvent`]: The geographic position under the pick point changed.
//! - [`SelectEvent`]: Rollover and box-rollover notifications.
//! - [`PropertyChangeEvent`]: A window property changed.
//! - [`Message`]: Notifications delivered to the [`Model`](crate::world::scene::Model).

use crate::world::pick::{PickedObjectList, Position, ScreenPoint, ScreenRect};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifies a globe node as the source of events and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingStage {
    BeforeRendering,
    AfterRendering,
}

impl Display for RenderingStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderingStage::BeforeRendering => write!(f, "BeforeRendering"),
            RenderingStage::AfterRendering => write!(f, "AfterRendering"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderingEvent {
    pub source: NodeId,
    pub stage: RenderingStage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionEvent {
    pub source: NodeId,
    pub screen_point: Option<ScreenPoint>,
    pub previous: Option<Position>,
    pub current: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectEventKind {
    /// The pointer moved over (or off) an object.
    Rollover,
    /// Objects inside the selection box changed.
    BoxRollover,
    LeftClick,
    LeftPress,
    RightClick,
    Hover,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectEvent {
    pub source: NodeId,
    pub kind: SelectEventKind,
    pub pick_point: Option<ScreenPoint>,
    pub pick_rect: Option<ScreenRect>,
    pub objects: PickedObjectList,
}

/// Window properties that can be observed individually.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowProperty {
    Model,
    View,
    SceneController,
    InputHandler,
    GpuResourceCache,
    /// A property of an engine object attached to the window (layer, view parameter, ...).
    Custom(String),
}

impl Display for WindowProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowProperty::Model => write!(f, "model"),
            WindowProperty::View => write!(f, "view"),
            WindowProperty::SceneController => write!(f, "scene-controller"),
            WindowProperty::InputHandler => write!(f, "input-handler"),
            WindowProperty::GpuResourceCache => write!(f, "gpu-resource-cache"),
            WindowProperty::Custom(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChangeEvent {
    pub property: WindowProperty,
    pub old: Option<serde_json::Value>,
    pub new: Option<serde_json::Value>,
}

impl PropertyChangeEvent {
    pub fn new(property: WindowProperty) -> Self {
        Self { property, old: None, new: None }
    }
}

/// Messages delivered to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// The view has not changed for the whole view-stop delay.
    ViewStopped { source: NodeId },
}
