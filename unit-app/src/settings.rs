use log::warn;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tauri::AppHandle;
use tauri_plugin_store::StoreExt;
use unit_logic::{SettingsStore, prelude::*};

const STORE_NAME: &str = "settings.json";

const BACKGROUND_KEY: &str = "background_geolocation";
const ACTIVE_UNIT_KEY: &str = "active_unit";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, specta::Type)]
#[serde(rename_all = "camelCase")]
/// The persisted settings the host can read and change
pub struct UnitSettings {
    pub background_tracking: bool,
    pub active_unit: Option<String>,
}

/// [SettingsStore] persisted with the store plugin
pub struct TauriSettings(AppHandle);

impl TauriSettings {
    pub fn new(app: AppHandle) -> Self {
        Self(app)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let store = self
            .0
            .store(STORE_NAME)
            .inspect_err(|why| warn!("Couldn't open settings store: {why:?}"))
            .ok()?;

        store
            .get(key)
            .and_then(|v| serde_json::from_value::<T>(v).ok())
    }

    fn write(&self, key: &str, value: impl Serialize) -> Result {
        let store = self
            .0
            .store(STORE_NAME)
            .context("Couldn't open settings store")?;
        let value = serde_json::to_value(value).context("Failed to serialize setting")?;
        store.set(key, value);
        Ok(())
    }

    pub fn set_background_tracking(&self, enabled: bool) -> Result {
        self.write(BACKGROUND_KEY, enabled)
    }

    pub fn set_active_unit(&self, unit_id: Option<String>) -> Result {
        self.write(ACTIVE_UNIT_KEY, unit_id)
    }

    pub fn snapshot(&self) -> UnitSettings {
        UnitSettings {
            background_tracking: self.background_tracking_enabled(),
            active_unit: self.active_unit_id(),
        }
    }
}

impl SettingsStore for TauriSettings {
    fn background_tracking_enabled(&self) -> bool {
        self.read(BACKGROUND_KEY).unwrap_or(false)
    }

    fn active_unit_id(&self) -> Option<String> {
        self.read::<Option<String>>(ACTIVE_UNIT_KEY)
            .flatten()
            .filter(|id| !id.is_empty())
    }
}
