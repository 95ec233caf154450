use crate::world::events::{PropertyChangeEvent, WindowProperty};
use crate::world::listeners::{Listener, ListenerSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Key of a window attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeKey {
    /// Duration of the last frame in milliseconds.
    FrameTime,
    /// Frames per second, as reported by the scene controller.
    FrameRate,
    Custom(String),
}

impl From<&str> for AttributeKey {
    fn from(name: &str) -> Self {
        AttributeKey::Custom(name.to_string())
    }
}

/// Attribute bag of a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    values: BTreeMap<AttributeKey, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AttributeKey) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of `key`, when the value is a string.
    pub fn get_str(&self, key: &AttributeKey) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// Sets `key` and returns the previous value.
    pub fn set(&mut self, key: AttributeKey, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key, value.into())
    }

    /// Copies every entry of `other` into this bag.
    pub fn set_all(&mut self, other: &Attributes) {
        self.values.extend(other.values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub fn remove(&mut self, key: &AttributeKey) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn has(&self, key: &AttributeKey) -> bool {
        self.values.contains_key(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AttributeKey, &Value)> {
        self.values.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.values.values()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

pub type PropertyObserver = Listener<PropertyChangeEvent>;

/// Property-change observers: some watch every property, others a single one.
pub struct PropertyObservers {
    all: ListenerSet<PropertyChangeEvent>,
    keyed: HashMap<WindowProperty, ListenerSet<PropertyChangeEvent>>,
}

impl Default for PropertyObservers {
    fn default() -> Self {
        Self {
            all: ListenerSet::new("property-change"),
            keyed: HashMap::new(),
        }
    }
}

impl PropertyObservers {
    pub fn add(&mut self, observer: PropertyObserver) -> bool {
        self.all.add(observer)
    }

    pub fn remove(&mut self, observer: &PropertyObserver) -> bool {
        self.all.remove(observer)
    }

    pub fn add_for(&mut self, property: WindowProperty, observer: PropertyObserver) -> bool {
        self.keyed
            .entry(property)
            .or_insert_with(|| ListenerSet::new("property-change"))
            .add(observer)
    }

    pub fn remove_for(&mut self, property: &WindowProperty, observer: &PropertyObserver) -> bool {
        let Some(set) = self.keyed.get_mut(property) else {
            return false;
        };
        let removed = set.remove(observer);
        if set.is_empty() {
            self.keyed.remove(property);
        }
        removed
    }

    /// Notifies the observers of `event.property`. Nothing is sent when a known old value
    /// equals the new one.
    pub fn fire(&self, event: &PropertyChangeEvent) -> bool {
        if event.old.is_some() && event.old == event.new {
            return false;
        }
        self.all.dispatch(event);
        if let Some(set) = self.keyed.get(&event.property) {
            set.dispatch(event);
        }
        true
    }

    pub fn clear(&mut self) {
        self.all.clear();
        self.keyed.clear();
    }
}

/// Statistics a host can ask to be collected every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticKey {
    FrameTime,
    FrameRate,
}

impl StatisticKey {
    pub fn attribute_key(&self) -> AttributeKey {
        match self {
            StatisticKey::FrameTime => AttributeKey::FrameTime,
            StatisticKey::FrameRate => AttributeKey::FrameRate,
        }
    }
}

impl Display for StatisticKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticKey::FrameTime => write!(f, "Frame time (ms)"),
            StatisticKey::FrameRate => write!(f, "Frame rate (fps)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStatistic {
    pub key: StatisticKey,
    pub value: f64,
}

/// The statistics collected for the last frame, restricted to the enabled keys.
#[derive(Debug, Clone, Default)]
pub struct FrameStatistics {
    enabled: HashSet<StatisticKey>,
    last: Vec<PerformanceStatistic>,
}

impl FrameStatistics {
    pub fn set_keys(&mut self, keys: impl IntoIterator<Item = StatisticKey>) {
        self.enabled = keys.into_iter().collect();
        self.last.retain(|s| self.enabled.contains(&s.key));
    }

    pub fn is_enabled(&self, key: StatisticKey) -> bool {
        self.enabled.contains(&key)
    }

    pub fn record(&mut self, key: StatisticKey, value: f64) {
        if !self.is_enabled(key) {
            return;
        }
        match self.last.iter_mut().find(|s| s.key == key) {
            Some(s) => s.value = value,
            None => self.last.push(PerformanceStatistic { key, value }),
        }
    }

    pub fn snapshot(&self) -> Vec<PerformanceStatistic> {
        self.last.clone()
    }
}
