//! Netatmo home model and API seam
//!
//! A home aggregates the persons known to the security cameras and the
//! modules (cameras, sirens, door tags) installed in it. The model is filled
//! from the `homesdata` topology and refreshed from `homestatus` payloads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Netatmo API request failed: {0}")]
    Request(String),

    #[error("Unknown home: {0}")]
    UnknownHome(String),
}

/// Remote calls the integration needs from the Netatmo client.
#[async_trait]
pub trait HomeApi: Send + Sync {
    /// Topology of every home the account can see
    async fn homes_data(&self) -> Result<Vec<Home>, ApiError>;

    /// Current person and module status of one home
    async fn home_status(&self, home_id: &str) -> Result<HomeStatus, ApiError>;

    /// Mark the given persons as at home
    async fn set_persons_home(&self, home_id: &str, person_ids: &[String]) -> Result<(), ApiError>;

    /// Mark one person, or everyone when `person_id` is `None`, as away
    async fn set_persons_away(&self, home_id: &str, person_id: Option<&str>)
    -> Result<(), ApiError>;
}

/// Deserialize a monitoring flag that can be a boolean or an `"on"`/`"off"` string.
///
/// Cameras report monitoring as `"on"`/`"off"` while sirens use booleans.
fn deserialize_monitoring<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;

    struct Monitoring;

    impl<'de> de::Visitor<'de> for Monitoring {
        type Value = Option<bool>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("boolean, \"on\", \"off\", or null")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
            Ok(Some(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            match v {
                "on" => Ok(Some(true)),
                "off" => Ok(Some(false)),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }

    deserializer.deserialize_any(Monitoring)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ModuleType {
    #[serde(rename = "NACamera")]
    Camera,
    #[serde(rename = "NOC")]
    OutdoorCamera,
    #[serde(rename = "NIS")]
    Siren,
    #[serde(rename = "NACamDoorTag")]
    DoorTag,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Person {
    #[serde(rename = "id")]
    pub entity_id: String,

    /// Display name chosen in the Netatmo app
    #[serde(default)]
    pub pseudo: Option<String>,

    /// True when the cameras have not seen this person for a while
    #[serde(default)]
    pub out_of_sight: bool,
}

/// Raw module attribute, as exposed to entity value functions.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Module {
    #[serde(rename = "id")]
    pub entity_id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub module_type: ModuleType,

    /// Id of the parent module this one is paired with (e.g. a siren's camera)
    #[serde(default)]
    pub bridge: Option<String>,

    #[serde(default, deserialize_with = "deserialize_monitoring")]
    pub monitoring: Option<bool>,

    #[serde(default)]
    pub reachable: Option<bool>,

    #[serde(default)]
    pub status: Option<String>,
}

impl Module {
    /// Attribute names this kind of module exposes
    pub fn features(&self) -> &'static [&'static str] {
        match self.module_type {
            ModuleType::Siren => &["monitoring", "status", "reachable"],
            ModuleType::DoorTag => &["status", "reachable"],
            ModuleType::Camera | ModuleType::OutdoorCamera => &["monitoring", "reachable"],
            ModuleType::Other => &[],
        }
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.features().contains(&name)
    }

    /// Look up an attribute by its Netatmo name
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        match name {
            "monitoring" => self.monitoring.map(AttrValue::Bool),
            "reachable" => self.reachable.map(AttrValue::Bool),
            "status" => self.status.clone().map(AttrValue::Str),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HomeData {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    persons: Vec<Person>,
    #[serde(default)]
    modules: Vec<Module>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "HomeData")]
pub struct Home {
    pub entity_id: String,
    pub name: String,
    pub persons: BTreeMap<String, Person>,
    pub modules: BTreeMap<String, Module>,
}

impl From<HomeData> for Home {
    fn from(data: HomeData) -> Self {
        Self {
            entity_id: data.id,
            name: data.name,
            persons: data
                .persons
                .into_iter()
                .map(|p| (p.entity_id.clone(), p))
                .collect(),
            modules: data
                .modules
                .into_iter()
                .map(|m| (m.entity_id.clone(), m))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PersonStatus {
    pub id: String,
    #[serde(default)]
    pub out_of_sight: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModuleStatus {
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_monitoring")]
    pub monitoring: Option<bool>,
    #[serde(default)]
    pub reachable: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Body of a `homestatus` response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HomeStatus {
    #[serde(default)]
    pub persons: Vec<PersonStatus>,
    #[serde(default)]
    pub modules: Vec<ModuleStatus>,
}

impl Home {
    /// Fold a status payload into the topology. Ids the topology doesn't know
    /// are ignored; absent module fields keep their previous value.
    pub fn apply_status(&mut self, status: HomeStatus) {
        for person in status.persons {
            match self.persons.get_mut(&person.id) {
                Some(p) => p.out_of_sight = person.out_of_sight,
                None => debug!("Ignoring status for unknown person {}", person.id),
            }
        }

        for module in status.modules {
            let Some(m) = self.modules.get_mut(&module.id) else {
                debug!("Ignoring status for unknown module {}", module.id);
                continue;
            };
            if module.monitoring.is_some() {
                m.monitoring = module.monitoring;
            }
            if module.reachable.is_some() {
                m.reachable = module.reachable;
            }
            if module.status.is_some() {
                m.status = module.status;
            }
        }
    }
}

/// A home shared between the data handler and the entities built on it,
/// paired with the API used to act on it.
#[derive(Clone)]
pub struct SharedHome {
    entity_id: String,
    data: Arc<RwLock<Home>>,
    api: Arc<dyn HomeApi>,
}

impl SharedHome {
    pub fn new(home: Home, api: Arc<dyn HomeApi>) -> Self {
        Self {
            entity_id: home.entity_id.clone(),
            data: Arc::new(RwLock::new(home)),
            api,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Home> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Home> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn set_persons_home(&self, person_ids: &[String]) -> Result<(), ApiError> {
        self.api.set_persons_home(&self.entity_id, person_ids).await
    }

    /// Mark everyone in the home as away
    pub async fn set_persons_away(&self) -> Result<(), ApiError> {
        self.api.set_persons_away(&self.entity_id, None).await
    }

    /// Fetch the latest status and apply it
    pub async fn update_status(&self) -> Result<(), ApiError> {
        let status = self.api.home_status(&self.entity_id).await?;
        self.write().apply_status(status);
        Ok(())
    }
}

impl std::fmt::Debug for SharedHome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedHome")
            .field("entity_id", &self.entity_id)
            .field("api", &"<api>")
            .finish()
    }
}
